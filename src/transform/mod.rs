//! Transform/load: staging rows into the integrated database.
//!
//! Every integrated table is loaded by one call to [`load`], inside its own
//! transaction. Rows that cannot be linked are excluded and reported rather
//! than failing the table.

pub mod crosswalk;
mod eia860;
mod eia923;
pub mod entities;
mod ferc1;
pub mod normalize;
pub mod resolve;
pub mod staging;
mod static_tables;

use std::collections::{BTreeMap, HashSet};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::constants::Source;
use crate::db::{quote_ident, DatabaseKind, DbHandle};
use crate::error::{ConfigError, Result};
use crate::metrics::LoadMetrics;
use crate::tables::{IntegratedTable, RegisteredTable, StagingTable};
use crate::years::YearSpan;

pub use crosswalk::{Crosswalk, CrosswalkMatch};
pub use resolve::Conflict;
pub use staging::StagingRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// A reference to a utility, plant or respondent that resolved nowhere.
    Orphan { reference: String },
    /// The crosswalk links the record to more than one entity.
    AmbiguousMerge { candidates: Vec<i64> },
    MissingRequired { column: &'static str },
    /// Another staging record already produced the same integrated key.
    Duplicate { key: String },
}

/// A staging record left out of an integrated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub table: StagingTable,
    pub record: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub table: IntegratedTable,
    pub rows_loaded: u64,
    pub exclusions: Vec<Exclusion>,
    pub conflicts: Vec<Conflict>,
}

impl LoadReport {
    fn new(table: IntegratedTable) -> Self {
        Self {
            table,
            rows_loaded: 0,
            exclusions: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn orphan_count(&self) -> usize {
        self.exclusions
            .iter()
            .filter(|e| matches!(e.reason, ExclusionReason::Orphan { .. }))
            .count()
    }

    pub fn ambiguous_count(&self) -> usize {
        self.exclusions
            .iter()
            .filter(|e| matches!(e.reason, ExclusionReason::AmbiguousMerge { .. }))
            .count()
    }
}

/// Integrated keys already emitted by one load. Later records with a key
/// seen before are excluded.
#[derive(Debug, Default)]
pub(crate) struct EmittedKeys {
    seen: HashSet<String>,
}

impl EmittedKeys {
    pub(crate) fn admit(&mut self, row: &StagingRow, key_columns: &[&str], key: String, report: &mut LoadReport) -> bool {
        if self.seen.contains(&key) {
            report.exclusions.push(Exclusion {
                table: row.table,
                record: row.describe(key_columns),
                reason: ExclusionReason::Duplicate { key },
            });
            return false;
        }
        self.seen.insert(key);
        true
    }
}

/// The years to read from each source.
#[derive(Debug, Clone, Default)]
pub struct LoadYears {
    spans: BTreeMap<Source, YearSpan>,
}

impl LoadYears {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, span: YearSpan) -> Self {
        self.spans.insert(span.source(), span);
        self
    }

    pub fn for_source(&self, source: Source) -> Option<&YearSpan> {
        self.spans.get(&source)
    }

    pub fn spans(&self) -> impl Iterator<Item = &YearSpan> {
        self.spans.values()
    }
}

/// Staging databases available to a load, plus the FERC-EIA crosswalk.
#[derive(Debug, Default)]
pub struct StagingSources<'a> {
    handles: BTreeMap<Source, &'a DbHandle>,
    crosswalk: Crosswalk,
}

impl<'a> StagingSources<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a staging handle; its kind says which source it holds.
    pub fn with(mut self, handle: &'a DbHandle) -> Result<Self> {
        match handle.kind() {
            DatabaseKind::Staging(source) => {
                self.handles.insert(source, handle);
                Ok(self)
            }
            other => Err(ConfigError::KindMismatch {
                expected: DatabaseKind::Staging(Source::Ferc1),
                actual: other,
            }
            .into()),
        }
    }

    pub fn with_crosswalk(mut self, crosswalk: Crosswalk) -> Self {
        self.crosswalk = crosswalk;
        self
    }

    pub fn handle(&self, source: Source) -> Option<&'a DbHandle> {
        self.handles.get(&source).copied()
    }

    pub fn crosswalk(&self) -> &Crosswalk {
        &self.crosswalk
    }

    /// Rows a selected table is built from; the source must be present.
    pub(crate) fn rows(&self, table: StagingTable, years: &LoadYears) -> Result<Vec<StagingRow>> {
        let source = table.dataset();
        let handle = self.handle(source).ok_or(ConfigError::MissingStaging(source))?;
        let span = years
            .for_source(source)
            .ok_or(ConfigError::EmptyYears { dataset: source })?;
        staging::read_rows(handle, table, span)
    }

    /// Rows that contribute entity claims when available.
    pub(crate) fn optional_rows(&self, table: StagingTable, years: &LoadYears) -> Result<Vec<StagingRow>> {
        let source = table.dataset();
        match (self.handle(source), years.for_source(source)) {
            (Some(handle), Some(span)) => staging::read_rows_if_present(handle, table, span),
            _ => Ok(Vec::new()),
        }
    }
}

pub(crate) fn insert_rows(conn: &Connection, table: IntegratedTable, columns: &[&str], rows: &[Vec<Value>]) -> Result<u64> {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table.name()),
        quoted.join(", "),
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    for row in rows {
        stmt.execute(params_from_iter(row.iter()))?;
    }
    Ok(rows.len() as u64)
}

/// Load one integrated table from staging. The table must exist and be
/// empty; tables it references must already be loaded.
#[instrument(skip(handle, sources, years), fields(table = %table))]
pub fn load(
    handle: &DbHandle,
    table: IntegratedTable,
    sources: &StagingSources<'_>,
    years: &LoadYears,
) -> Result<LoadReport> {
    handle.ensure_kind(DatabaseKind::Integrated)?;
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

    let mut report = LoadReport::new(table);
    let tx = handle.conn().unchecked_transaction()?;
    report.rows_loaded = match table {
        IntegratedTable::FuelTypes => static_tables::load_fuel_types(&tx)?,
        IntegratedTable::PrimeMovers => static_tables::load_prime_movers(&tx)?,
        IntegratedTable::Utilities => entities::load_utilities(&tx, sources, years, &mut report)?,
        IntegratedTable::Plants => entities::load_plants(&tx, sources, years, &mut report)?,
        IntegratedTable::GeneratorsEia860 => eia860::load_generators(&tx, sources, years, &mut report)?,
        IntegratedTable::GenerationEia923 => eia923::load_generation(&tx, sources, years, &mut report)?,
        IntegratedTable::GenerationFuelEia923 => eia923::load_generation_fuel(&tx, sources, years, &mut report)?,
        IntegratedTable::FuelReceiptsCostsEia923 => {
            eia923::load_fuel_receipts_costs(&tx, sources, years, &mut report)?
        }
        IntegratedTable::PlantsSteamFerc1 => ferc1::load_plants_steam(&tx, sources, years, &mut report)?,
        IntegratedTable::FuelFerc1 => ferc1::load_fuel(&tx, sources, years, &mut report)?,
        IntegratedTable::PurchasedPowerFerc1 => ferc1::load_purchased_power(&tx, sources, years, &mut report)?,
    };
    tx.commit()?;
    LoadMetrics::record_table_loaded(table, report.rows_loaded, report.exclusions.len());

    if !report.exclusions.is_empty() {
        warn!(
            "{}: excluded {} rows ({} orphans)",
            table,
            report.exclusions.len(),
            report.orphan_count()
        );
    }
    info!(
        "Loaded {} rows into {} ({} conflicts resolved)",
        report.rows_loaded,
        table,
        report.conflicts.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{define_integrated_schema, SchemaRegistry};
    use crate::tables::TableSelection;

    fn staging(source: Source, ddl: &str) -> DbHandle {
        let handle = DbHandle::in_memory(DatabaseKind::Staging(source)).unwrap();
        handle.execute_ddl(ddl).unwrap();
        handle
    }

    fn integrated(tables: &[&str]) -> DbHandle {
        let handle = DbHandle::in_memory(DatabaseKind::Integrated).unwrap();
        let registry = SchemaRegistry::new().unwrap();
        let selection = TableSelection::<IntegratedTable>::parse_any(tables.iter().copied()).unwrap();
        define_integrated_schema(&handle, &registry, &selection).unwrap();
        handle
    }

    fn load_core(db: &DbHandle, sources: &StagingSources<'_>, years: &LoadYears) -> Vec<LoadReport> {
        IntegratedTable::CORE
            .iter()
            .map(|t| load(db, *t, sources, years).unwrap())
            .collect()
    }

    #[test]
    fn ferc1_is_authoritative_for_utilities() {
        let ferc1 = staging(
            Source::Ferc1,
            "CREATE TABLE f1_respondent_id (respondent_id INTEGER, report_year INTEGER, respondent_name TEXT, respondent_state TEXT);
             INSERT INTO f1_respondent_id VALUES (145, 2015, 'Public Service Company of Colorado', 'CO');",
        );
        let eia860 = staging(
            Source::Eia860,
            "CREATE TABLE utility (utility_id INTEGER, report_year INTEGER, utility_name TEXT, state TEXT, entity_type TEXT);
             INSERT INTO utility VALUES (15466, 2015, 'PSCo', 'CO', 'Investor Owned');",
        );
        let mut crosswalk = Crosswalk::empty();
        crosswalk.link_utility(145, 15466);
        let sources = StagingSources::new()
            .with(&ferc1)
            .unwrap()
            .with(&eia860)
            .unwrap()
            .with_crosswalk(crosswalk);
        let years = LoadYears::new()
            .with(YearSpan::new(Source::Ferc1, [2015]).unwrap())
            .with(YearSpan::new(Source::Eia860, [2015]).unwrap());

        let db = integrated(&["utilities"]);
        let reports = load_core(&db, &sources, &years);
        assert_eq!(reports[2].rows_loaded, 1);
        assert_eq!(reports[2].conflicts.len(), 1);

        let (name, eia, ferc, entity): (String, i64, i64, String) = db
            .conn()
            .query_row(
                "SELECT utility_name, utility_id_eia, utility_id_ferc1, entity_type FROM utilities",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(name, "Public Service Company of Colorado");
        assert_eq!((eia, ferc), (15466, 145));
        assert_eq!(entity, "Investor Owned");
    }

    #[test]
    fn orphan_plants_are_excluded_while_siblings_load() {
        let eia860 = staging(
            Source::Eia860,
            "CREATE TABLE utility (utility_id INTEGER, report_year INTEGER, utility_name TEXT);
             INSERT INTO utility VALUES (100, 2014, 'Good Utility');
             CREATE TABLE plant (plant_id INTEGER, report_year INTEGER, plant_name TEXT, utility_id INTEGER);
             INSERT INTO plant VALUES (1, 2014, 'Valid Plant', 100), (2, 2014, 'Lost Plant', 999);",
        );
        let sources = StagingSources::new().with(&eia860).unwrap();
        let years = LoadYears::new().with(YearSpan::new(Source::Eia860, [2014]).unwrap());
        let db = integrated(&["plants"]);
        let reports = load_core(&db, &sources, &years);

        let plants = &reports[3];
        assert_eq!(plants.rows_loaded, 1);
        assert_eq!(plants.orphan_count(), 1);
        assert_eq!(
            plants.exclusions[0].reason,
            ExclusionReason::Orphan {
                reference: "utility eia:999".into()
            }
        );
        let name: String = db
            .conn()
            .query_row("SELECT plant_name FROM plants", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Valid Plant");
    }

    #[test]
    fn ambiguous_crosswalk_rows_are_excluded() {
        let ferc1 = staging(
            Source::Ferc1,
            "CREATE TABLE f1_respondent_id (respondent_id INTEGER, report_year INTEGER, respondent_name TEXT);
             INSERT INTO f1_respondent_id VALUES (1, 2015, 'Split Co'), (2, 2015, 'Solo Co');",
        );
        let mut crosswalk = Crosswalk::empty();
        crosswalk.link_utility(1, 10).link_utility(1, 11);
        let sources = StagingSources::new().with(&ferc1).unwrap().with_crosswalk(crosswalk);
        let years = LoadYears::new().with(YearSpan::new(Source::Ferc1, [2015]).unwrap());
        let db = integrated(&["utilities"]);
        let reports = load_core(&db, &sources, &years);
        assert_eq!(reports[2].rows_loaded, 1);
        assert_eq!(reports[2].ambiguous_count(), 1);
    }

    #[test]
    fn fuel_records_are_normalized_and_orphans_reported() {
        let ferc1 = staging(
            Source::Ferc1,
            "CREATE TABLE f1_respondent_id (respondent_id INTEGER, report_year INTEGER, respondent_name TEXT);
             INSERT INTO f1_respondent_id VALUES (1, 2010, 'Known Co');
             CREATE TABLE f1_fuel (respondent_id INTEGER, report_year INTEGER, spplmnt_num INTEGER, row_number INTEGER,
                 plant_name TEXT, fuel TEXT, fuel_unit TEXT, fuel_quantity REAL, fuel_avg_heat REAL,
                 fuel_cost_delvd REAL, fuel_cost_burned REAL, fuel_cost_btu REAL);
             INSERT INTO f1_fuel VALUES
                 (1, 2010, 0, 1, 'Big  Plant', 'Bituminous Coal', 'Tons', 100.0, 24000000.0, 40.0, 41.0, 1.7),
                 (7, 2010, 0, 1, 'Unknown Plant', 'Gas', 'mcf', 5.0, 1000000.0, 4.0, 4.0, 4.0);",
        );
        let sources = StagingSources::new().with(&ferc1).unwrap();
        let years = LoadYears::new().with(YearSpan::new(Source::Ferc1, [2010]).unwrap());
        let db = integrated(&["fuel_ferc1"]);
        load_core(&db, &sources, &years);
        let report = load(&db, IntegratedTable::FuelFerc1, &sources, &years).unwrap();
        assert_eq!(report.rows_loaded, 1);
        assert_eq!(report.orphan_count(), 1);

        let (name, fuel, unit, mmbtu): (String, String, String, f64) = db
            .conn()
            .query_row(
                "SELECT plant_name, fuel_type_code_pudl, fuel_unit, fuel_mmbtu_per_unit FROM fuel_ferc1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(name, "Big Plant");
        assert_eq!(fuel, "coal");
        assert_eq!(unit, "ton");
        assert_eq!(mmbtu, 24.0);
    }

    #[test]
    fn codes_differing_only_in_case_load_once() {
        let eia923 = staging(
            Source::Eia923,
            "CREATE TABLE generation_fuel (plant_id INTEGER, report_year INTEGER, report_month INTEGER,
                 prime_mover TEXT, fuel_type TEXT, plant_name TEXT, operator_id INTEGER, operator_name TEXT,
                 net_generation_mwh REAL);
             INSERT INTO generation_fuel VALUES
                 (470, 2015, 1, 'ST', 'SUB', 'Comanche', 15466, 'PSCo', 100.0),
                 (470, 2015, 1, 'st', 'SUB', 'Comanche', 15466, 'PSCo', 90.0),
                 (471, 2015, 1, 'ST', 'NG', 'Cherokee', 15466, 'PSCo', 50.0);",
        );
        let sources = StagingSources::new().with(&eia923).unwrap();
        let years = LoadYears::new().with(YearSpan::new(Source::Eia923, [2015]).unwrap());
        let db = integrated(&["generation_fuel_eia923"]);
        load_core(&db, &sources, &years);

        let report = load(&db, IntegratedTable::GenerationFuelEia923, &sources, &years).unwrap();
        assert_eq!(report.rows_loaded, 2);
        assert_eq!(report.exclusions.len(), 1);
        assert!(matches!(report.exclusions[0].reason, ExclusionReason::Duplicate { .. }));
        assert!(report.exclusions[0].record.contains("prime_mover=st"));
        assert_eq!(db.row_count("generation_fuel_eia923").unwrap(), 2);
    }

    #[test]
    fn selected_table_needs_its_staging_source() {
        let db = integrated(&["generators_eia860"]);
        let sources = StagingSources::new();
        let years = LoadYears::new();
        load_core(&db, &sources, &years);
        let err = load(&db, IntegratedTable::GeneratorsEia860, &sources, &years).unwrap_err();
        assert_eq!(err.as_config(), Some(&ConfigError::MissingStaging(Source::Eia860)));
    }

    #[test]
    fn loading_twice_is_rejected() {
        let db = integrated(&["utilities"]);
        let sources = StagingSources::new();
        let years = LoadYears::new();
        load(&db, IntegratedTable::FuelTypes, &sources, &years).unwrap();
        let err = load(&db, IntegratedTable::FuelTypes, &sources, &years).unwrap_err();
        assert!(matches!(err.as_config(), Some(ConfigError::NonEmptyTable { .. })));
    }
}
