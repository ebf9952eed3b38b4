//! Raw extraction: published partitions into staging tables, one reporting
//! year per transaction.

pub mod coerce;
pub mod partition;

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::db::{quote_ident, DatabaseKind, DbHandle};
use crate::error::{ConfigError, EtlError, ExtractionFailure, Result};
use crate::metrics::ExtractMetrics;
use crate::schema::ddl::EXTRACTION_LOG;
use crate::schema::{ResolvedTable, SchemaHandle};
use crate::tables::{RegisteredTable, StagingTable};
use crate::years::YearSpan;

pub use coerce::coerce;
pub use partition::{checksum, decode, FsPartitionSource, PartitionSource};

/// Outcome of extracting one table over a span of years.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub table: StagingTable,
    pub rows_per_year: BTreeMap<u16, u64>,
    pub failures: Vec<ExtractionFailure>,
}

impl ExtractionReport {
    fn new(table: StagingTable) -> Self {
        Self {
            table,
            rows_per_year: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn total(&self) -> u64 {
        self.rows_per_year.values().sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn any per-year failure into an error.
    pub fn ensure_complete(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(EtlError::Extraction(self.failures))
        }
    }
}

/// Extract `table` for every year in `years` into an empty, already-defined
/// staging table.
///
/// Everything that can be checked without reading partitions is checked
/// first. A missing or malformed partition fails only its own year.
#[instrument(skip(handle, schema, years, partitions), fields(table = %table, years = ?years.to_vec()))]
pub fn extract(
    handle: &DbHandle,
    schema: &SchemaHandle,
    table: StagingTable,
    years: &YearSpan,
    partitions: &dyn PartitionSource,
) -> Result<ExtractionReport> {
    let source = table.dataset();
    if years.source() != source {
        return Err(ConfigError::UnknownTable {
            dataset: years.source().to_string(),
            name: table.name().to_string(),
        }
        .into());
    }
    handle.ensure_kind(DatabaseKind::Staging(source))?;
    let resolved = schema
        .table(table.name())
        .filter(|_| schema.database == handle.kind())
        .ok_or_else(|| ConfigError::TableNotDefined {
            table: table.name().to_string(),
        })?;
    if !handle.table_exists(table.name())? {
        return Err(ConfigError::TableNotDefined {
            table: table.name().to_string(),
        }
        .into());
    }
    let existing = handle.row_count(table.name())?;
    if existing > 0 {
        return Err(ConfigError::NonEmptyTable {
            table: table.name().to_string(),
            rows: existing,
        }
        .into());
    }

    let mut report = ExtractionReport::new(table);
    for year in years.iter() {
        match extract_year(handle, resolved, table, year, partitions) {
            Ok(rows) => {
                debug!("{} {}: {} rows", table, year, rows);
                ExtractMetrics::record_partition_extracted(table, rows);
                report.rows_per_year.insert(year, rows);
            }
            Err(reason) => {
                warn!("{} {} not extracted: {}", table, year, reason);
                ExtractMetrics::record_partition_failed(table);
                report.failures.push(ExtractionFailure {
                    table: table.to_string(),
                    year,
                    reason,
                });
            }
        }
    }

    info!(
        "Extracted {} rows into {} ({} years, {} failed)",
        report.total(),
        table,
        report.rows_per_year.len(),
        report.failures.len()
    );
    Ok(report)
}

fn extract_year(
    handle: &DbHandle,
    resolved: &ResolvedTable,
    table: StagingTable,
    year: u16,
    partitions: &dyn PartitionSource,
) -> std::result::Result<u64, String> {
    let bytes = partitions
        .read(table, year)
        .map_err(|e| format!("missing partition {}: {}", partitions.describe(table, year), e))?;
    let rows = parse_partition(&bytes, resolved, year)?;
    insert_rows(handle, resolved, year, &rows, &checksum(&bytes))
        .map_err(|e| format!("insert failed: {e}"))?;
    Ok(rows.len() as u64)
}

/// Parse and coerce a partition into rows ordered like `table.columns`.
pub fn parse_partition(bytes: &[u8], table: &ResolvedTable, year: u16) -> std::result::Result<Vec<Vec<Value>>, String> {
    let (text, fallback) = decode(bytes);
    if fallback {
        debug!("{} {}: decoded as Windows-1252", table.name, year);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(|e| format!("unreadable header: {e}"))?.clone();
    let mut mapping: Vec<Option<usize>> = Vec::with_capacity(headers.len());
    for header in headers.iter() {
        let idx = table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(header));
        if idx.is_none() {
            debug!("{}: ignoring unknown column `{}`", table.name, header);
        }
        mapping.push(idx);
    }
    let year_idx = table.columns.iter().position(|c| c.name == "report_year");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("malformed row: {e}"))?;
        let line = record.position().map_or(0, |p| p.line());
        let mut row = vec![Value::Null; table.columns.len()];
        for (field, idx) in record.iter().zip(&mapping) {
            if let Some(idx) = *idx {
                let column = &table.columns[idx];
                row[idx] = coerce(field, column).map_err(|e| format!("line {line}, {}: {e}", column.name))?;
            }
        }
        if let Some(idx) = year_idx {
            let expected = Value::Integer(i64::from(year));
            if row[idx] == Value::Null {
                row[idx] = expected;
            } else if row[idx] != expected {
                return Err(format!("line {line}: report_year {:?} in the {year} partition", row[idx]));
            }
        }
        if let Some(missing) = table
            .columns
            .iter()
            .zip(&row)
            .find(|(c, v)| c.required && matches!(v, Value::Null))
        {
            return Err(format!("line {line}: {} is required", missing.0.name));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn insert_rows(
    handle: &DbHandle,
    table: &ResolvedTable,
    year: u16,
    rows: &[Vec<Value>],
    sha256: &str,
) -> Result<()> {
    let tx = handle.conn().unchecked_transaction()?;
    {
        let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(c.name)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table.name),
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = tx.prepare(&sql)?;
        for row in rows {
            stmt.execute(params_from_iter(row.iter()))?;
        }
    }
    tx.execute(
        &format!(
            "INSERT OR REPLACE INTO {} (table_name, report_year, rows, sha256, extracted_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            quote_ident(EXTRACTION_LOG)
        ),
        params![table.name, year, rows.len() as i64, sha256, Utc::now().to_rfc3339()],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::constants::Source;
    use crate::schema::{define_schema, SchemaRegistry};
    use crate::tables::TableSelection;
    use crate::years::ReferenceYear;

    #[derive(Default)]
    struct MemoryPartitions(HashMap<(StagingTable, u16), Vec<u8>>);

    impl MemoryPartitions {
        fn with(mut self, table: StagingTable, year: u16, csv: &str) -> Self {
            self.0.insert((table, year), csv.as_bytes().to_vec());
            self
        }
    }

    impl PartitionSource for MemoryPartitions {
        fn read(&self, table: StagingTable, year: u16) -> Result<Vec<u8>> {
            self.0.get(&(table, year)).cloned().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such partition").into()
            })
        }

        fn describe(&self, table: StagingTable, year: u16) -> String {
            format!("memory:{table}/{year}")
        }
    }

    fn fuel_db() -> (DbHandle, SchemaHandle) {
        let registry = SchemaRegistry::new().unwrap();
        let handle = DbHandle::in_memory(DatabaseKind::Staging(Source::Ferc1)).unwrap();
        let schema = define_schema(
            &handle,
            &registry,
            ReferenceYear::new(Source::Ferc1, 2010).unwrap(),
            &TableSelection::parse(Source::Ferc1, ["f1_fuel"]).unwrap(),
        )
        .unwrap();
        (handle, schema)
    }

    const FUEL_2009: &str = "respondent_id,spplmnt_num,row_number,plant_name,fuel,fuel_unit,fuel_quantity\n\
        1,0,1,Comanche,coal,tons,\"1,200\"\n\
        1,0,2,Comanche,gas,mcf,300.5\n";
    const FUEL_2010: &str = "RESPONDENT_ID,SPPLMNT_NUM,ROW_NUMBER,PLANT_NAME,FUEL,REPORT_YEAR\n\
        2,0,1,Cherokee,coal,2010\n";

    #[test]
    fn rows_are_counted_per_year() {
        let (handle, schema) = fuel_db();
        let partitions = MemoryPartitions::default()
            .with(StagingTable::F1Fuel, 2009, FUEL_2009)
            .with(StagingTable::F1Fuel, 2010, FUEL_2010);
        let years = YearSpan::new(Source::Ferc1, [2009, 2010]).unwrap();

        let report = extract(&handle, &schema, StagingTable::F1Fuel, &years, &partitions).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.rows_per_year.get(&2009), Some(&2));
        assert_eq!(report.total(), 3);
        assert_eq!(handle.row_count("f1_fuel").unwrap(), 3);

        let qty: f64 = handle
            .conn()
            .query_row("SELECT fuel_quantity FROM f1_fuel WHERE row_number = 1 AND report_year = 2009", [], |r| r.get(0))
            .unwrap();
        assert_eq!(qty, 1200.0);
        assert_eq!(handle.row_count(EXTRACTION_LOG).unwrap(), 2);
    }

    #[test]
    fn bad_year_is_isolated_and_rolled_back() {
        let (handle, schema) = fuel_db();
        let broken = "respondent_id,spplmnt_num,row_number,plant_name\n1,0,1,Good\n1,0,x,Bad\n";
        let partitions = MemoryPartitions::default().with(StagingTable::F1Fuel, 2009, broken);
        let years = YearSpan::new(Source::Ferc1, [2009, 2010]).unwrap();

        let report = extract(&handle, &schema, StagingTable::F1Fuel, &years, &partitions).unwrap();
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].reason.contains("row_number"));
        assert!(report.failures[1].reason.contains("missing partition"));
        assert_eq!(handle.row_count("f1_fuel").unwrap(), 0);
        assert!(matches!(report.ensure_complete(), Err(EtlError::Extraction(f)) if f.len() == 2));
    }

    #[test]
    fn conflicting_report_year_is_malformed() {
        let (handle, schema) = fuel_db();
        let partitions = MemoryPartitions::default().with(StagingTable::F1Fuel, 2009, FUEL_2010);
        let years = YearSpan::new(Source::Ferc1, [2009]).unwrap();
        let report = extract(&handle, &schema, StagingTable::F1Fuel, &years, &partitions).unwrap();
        assert!(report.failures[0].reason.contains("report_year"));
    }

    #[test]
    fn duplicate_keys_fail_the_year() {
        let (handle, schema) = fuel_db();
        let dup = "respondent_id,spplmnt_num,row_number,plant_name\n1,0,1,A\n1,0,1,B\n";
        let partitions = MemoryPartitions::default()
            .with(StagingTable::F1Fuel, 2009, dup)
            .with(StagingTable::F1Fuel, 2010, FUEL_2010);
        let years = YearSpan::new(Source::Ferc1, [2009, 2010]).unwrap();
        let report = extract(&handle, &schema, StagingTable::F1Fuel, &years, &partitions).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].year, 2009);
        assert_eq!(handle.row_count("f1_fuel").unwrap(), 1);
    }

    #[test]
    fn non_empty_table_is_rejected() {
        let (handle, schema) = fuel_db();
        let partitions = MemoryPartitions::default().with(StagingTable::F1Fuel, 2009, FUEL_2009);
        let years = YearSpan::new(Source::Ferc1, [2009]).unwrap();
        extract(&handle, &schema, StagingTable::F1Fuel, &years, &partitions).unwrap();

        let err = extract(&handle, &schema, StagingTable::F1Fuel, &years, &partitions).unwrap_err();
        assert_eq!(
            err.as_config(),
            Some(&ConfigError::NonEmptyTable {
                table: "f1_fuel".into(),
                rows: 2
            })
        );
    }

    #[test]
    fn table_outside_schema_is_rejected() {
        let (handle, schema) = fuel_db();
        let years = YearSpan::new(Source::Ferc1, [2009]).unwrap();
        let err = extract(&handle, &schema, StagingTable::F1Steam, &years, &MemoryPartitions::default()).unwrap_err();
        assert!(matches!(err.as_config(), Some(ConfigError::TableNotDefined { .. })));
    }

    #[test]
    fn cp1252_partition_is_decoded() {
        let (handle, schema) = fuel_db();
        let mut partitions = MemoryPartitions::default();
        partitions.0.insert(
            (StagingTable::F1Fuel, 2009),
            b"respondent_id,spplmnt_num,row_number,plant_name\n1,0,1,Pe\xf1asco\n".to_vec(),
        );
        let years = YearSpan::new(Source::Ferc1, [2009]).unwrap();
        extract(&handle, &schema, StagingTable::F1Fuel, &years, &partitions).unwrap();
        let name: String = handle
            .conn()
            .query_row("SELECT plant_name FROM f1_fuel", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Peñasco");
    }
}
