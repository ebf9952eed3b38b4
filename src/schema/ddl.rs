//! Materializes resolved schemas. Test instances are rebuilt from scratch;
//! live instances are only ever added to.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument};

use super::{ResolvedTable, SchemaHandle, SchemaRegistry};
use crate::db::{quote_ident, DatabaseKind, DbHandle};
use crate::error::{ConfigError, Result};
use crate::tables::{IntegratedTable, StagingTable, TableSelection};
use crate::years::ReferenceYear;

/// Audit table of every extracted partition, present in staging databases.
pub const EXTRACTION_LOG: &str = "_extraction_log";
/// Audit table of integrated loads.
pub const ETL_RUNS: &str = "_etl_runs";

const EXTRACTION_LOG_DDL: &str = "CREATE TABLE IF NOT EXISTS \"_extraction_log\" (
    table_name TEXT NOT NULL,
    report_year INTEGER NOT NULL,
    rows INTEGER NOT NULL,
    sha256 TEXT NOT NULL,
    extracted_at TEXT NOT NULL,
    PRIMARY KEY (table_name, report_year)
)";

const ETL_RUNS_DDL: &str = "CREATE TABLE IF NOT EXISTS \"_etl_runs\" (
    run_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    tables TEXT NOT NULL,
    years TEXT NOT NULL,
    rows_loaded INTEGER NOT NULL,
    exclusions INTEGER NOT NULL
)";

/// `CREATE TABLE` statement for a resolved layout.
pub fn create_sql(table: &ResolvedTable) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(c.name), c.ty.sql());
            if c.required {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();
    if !table.primary_key.is_empty() {
        let key: Vec<String> = table.primary_key.iter().map(|k| quote_ident(k)).collect();
        parts.push(format!("PRIMARY KEY ({})", key.join(", ")));
    }
    for fk in &table.foreign_keys {
        parts.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(fk.column),
            quote_ident(fk.table),
            quote_ident(fk.references)
        ));
    }
    format!("CREATE TABLE {} (\n    {}\n)", quote_ident(table.name), parts.join(",\n    "))
}

/// Resolve and create the staging tables for `reference_year`.
///
/// Resolution happens before the database is touched, so an unknown layout
/// leaves the instance as it was.
#[instrument(skip(handle, registry, tables), fields(db = %handle.kind(), target = %handle.target(), year = reference_year.year()))]
pub fn define_schema(
    handle: &DbHandle,
    registry: &SchemaRegistry,
    reference_year: ReferenceYear,
    tables: &TableSelection<StagingTable>,
) -> Result<SchemaHandle> {
    handle.ensure_kind(DatabaseKind::Staging(reference_year.source()))?;
    let schema = registry.resolve_staging(reference_year, tables)?;
    materialize(handle, &schema)?;
    handle.execute_ddl(EXTRACTION_LOG_DDL)?;
    info!(
        "Defined {} staging tables for reference year {}",
        schema.tables.len(),
        reference_year.year()
    );
    Ok(schema)
}

/// Resolve and create the integrated tables (core tables always included).
#[instrument(skip(handle, registry, tables), fields(target = %handle.target()))]
pub fn define_integrated_schema(
    handle: &DbHandle,
    registry: &SchemaRegistry,
    tables: &TableSelection<IntegratedTable>,
) -> Result<SchemaHandle> {
    handle.ensure_kind(DatabaseKind::Integrated)?;
    let schema = registry.resolve_integrated(tables)?;
    if !handle.is_live() {
        // Children first so foreign keys never block a drop.
        let managed = registry.managed_tables(DatabaseKind::Integrated);
        drop_existing(handle, managed.iter().rev().copied())?;
    }
    materialize(handle, &schema)?;
    handle.execute_ddl(ETL_RUNS_DDL)?;
    info!("Defined {} integrated tables", schema.tables.len());
    Ok(schema)
}

fn materialize(handle: &DbHandle, schema: &SchemaHandle) -> Result<()> {
    if handle.is_live() {
        // Verify everything before creating anything.
        let mut missing = Vec::new();
        for table in &schema.tables {
            if handle.table_exists(table.name)? {
                check_layout(handle, table)?;
            } else {
                missing.push(table);
            }
        }
        for table in missing {
            info!("Creating missing live table {}", table.name);
            handle.execute_ddl(&create_sql(table))?;
        }
        return Ok(());
    }

    drop_existing(handle, schema.tables.iter().rev().map(|t| t.name))?;
    for table in &schema.tables {
        debug!("Creating {}", table.name);
        handle.execute_ddl(&create_sql(table))?;
    }
    Ok(())
}

fn check_layout(handle: &DbHandle, table: &ResolvedTable) -> Result<()> {
    let actual: BTreeSet<String> = handle
        .column_names(table.name)?
        .into_iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let expected: BTreeSet<String> = table.columns.iter().map(|c| c.name.to_ascii_lowercase()).collect();
    if actual == expected {
        return Ok(());
    }
    let missing: Vec<&str> = expected.difference(&actual).map(String::as_str).collect();
    let extra: Vec<&str> = actual.difference(&expected).map(String::as_str).collect();
    Err(ConfigError::LayoutMismatch {
        table: table.name.to_string(),
        detail: format!("missing [{}], unexpected [{}]", missing.join(", "), extra.join(", ")),
    }
    .into())
}

fn drop_existing<'a>(handle: &DbHandle, names: impl Iterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut dropped = Vec::new();
    for name in names {
        if handle.table_exists(name)? {
            handle.execute_ddl(&format!("DROP TABLE {}", quote_ident(name)))?;
            dropped.push(name.to_string());
        }
    }
    Ok(dropped)
}

/// Drop every table the pipeline manages in `handle`'s database, children
/// first, and return the names actually dropped.
///
/// Refuses on a live handle before issuing any statement.
#[instrument(skip(handle, registry), fields(db = %handle.kind(), target = %handle.target()))]
pub fn drop_managed_tables(handle: &DbHandle, registry: &SchemaRegistry) -> Result<Vec<String>> {
    if handle.is_live() {
        return Err(ConfigError::LiveDropRefused(handle.kind()).into());
    }
    let kind = handle.kind();
    let mut names: Vec<&str> = registry.managed_tables(kind);
    names.reverse();
    names.push(match kind {
        DatabaseKind::Staging(_) => EXTRACTION_LOG,
        DatabaseKind::Integrated => ETL_RUNS,
    });
    let dropped = drop_existing(handle, names.into_iter())?;
    info!("Dropped {} tables from the {} database", dropped.len(), kind);
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Source;
    use crate::db::{ConnectionProvider, DbTarget};
    use crate::tables::RegisteredTable;
    use tempfile::tempdir;

    fn ferc1_selection(names: &[&str]) -> TableSelection<StagingTable> {
        TableSelection::parse(Source::Ferc1, names.iter().copied()).unwrap()
    }

    #[test]
    fn create_sql_carries_keys_and_constraints() {
        let registry = SchemaRegistry::new().unwrap();
        let schema = registry
            .resolve_integrated(&TableSelection::parse_any(["plants"]).unwrap())
            .unwrap();
        let sql = create_sql(schema.table("plants").unwrap());
        assert!(sql.starts_with("CREATE TABLE \"plants\""));
        assert!(sql.contains("\"plant_name\" TEXT NOT NULL"));
        assert!(sql.contains("PRIMARY KEY (\"plant_id_pudl\")"));
        assert!(sql.contains("FOREIGN KEY (\"utility_id_pudl\") REFERENCES \"utilities\" (\"utility_id_pudl\")"));
    }

    #[test]
    fn test_define_replaces_existing_tables() {
        let registry = SchemaRegistry::new().unwrap();
        let handle = DbHandle::in_memory(DatabaseKind::Staging(Source::Ferc1)).unwrap();
        handle
            .execute_ddl("CREATE TABLE f1_fuel (junk TEXT); INSERT INTO f1_fuel VALUES ('x');")
            .unwrap();

        let year = ReferenceYear::new(Source::Ferc1, 2010).unwrap();
        define_schema(&handle, &registry, year, &ferc1_selection(&["f1_fuel"])).unwrap();

        assert_eq!(handle.row_count("f1_fuel").unwrap(), 0);
        assert!(handle.column_names("f1_fuel").unwrap().contains(&"fuel_avg_heat".to_string()));
        assert!(handle.table_exists(EXTRACTION_LOG).unwrap());
    }

    #[test]
    fn wrong_database_kind_is_rejected() {
        let registry = SchemaRegistry::new().unwrap();
        let handle = DbHandle::in_memory(DatabaseKind::Integrated).unwrap();
        let err = define_schema(
            &handle,
            &registry,
            ReferenceYear::latest(Source::Ferc1),
            &ferc1_selection(&["f1_fuel"]),
        )
        .unwrap_err();
        assert!(err.is_config());
        assert_eq!(handle.ddl_issued(), 0);
    }

    #[test]
    fn integrated_define_creates_core_and_selected_tables() {
        let registry = SchemaRegistry::new().unwrap();
        let handle = DbHandle::in_memory(DatabaseKind::Integrated).unwrap();
        let selection = TableSelection::<IntegratedTable>::defaults(Source::Eia860);
        define_integrated_schema(&handle, &registry, &selection).unwrap();
        let names = handle.table_names().unwrap();
        for table in IntegratedTable::CORE {
            assert!(names.contains(&table.name().to_string()));
        }
        assert!(names.contains(&"generators_eia860".to_string()));
        assert!(names.contains(&ETL_RUNS.to_string()));

        // Redefining a populated test instance starts over.
        handle
            .conn()
            .execute("INSERT INTO fuel_types VALUES ('coal', 'Coal')", [])
            .unwrap();
        define_integrated_schema(&handle, &registry, &selection).unwrap();
        assert_eq!(handle.row_count("fuel_types").unwrap(), 0);
    }

    #[test]
    fn live_define_creates_missing_and_never_drops() {
        let dir = tempdir().unwrap();
        let live = dir.path().join("ferc1_live.sqlite");
        rusqlite::Connection::open(&live)
            .unwrap()
            .execute_batch(
                "CREATE TABLE f1_respondent_id (respondent_id INTEGER, report_year INTEGER, respondent_name TEXT, respondent_state TEXT, status TEXT);
                 INSERT INTO f1_respondent_id VALUES (1, 2016, 'Utility', 'CO', 'A');",
            )
            .unwrap();
        let kind = DatabaseKind::Staging(Source::Ferc1);
        let provider = ConnectionProvider::for_test_dir(dir.path().join("test")).with_live(kind, &live);
        let handle = provider.connect(kind, DbTarget::Live).unwrap();
        let registry = SchemaRegistry::new().unwrap();

        define_schema(
            &handle,
            &registry,
            ReferenceYear::latest(Source::Ferc1),
            &ferc1_selection(&["f1_respondent_id", "f1_fuel"]),
        )
        .unwrap();
        assert_eq!(handle.row_count("f1_respondent_id").unwrap(), 1);
        assert!(handle.table_exists("f1_fuel").unwrap());
    }

    #[test]
    fn live_layout_mismatch_is_reported_before_any_ddl() {
        let dir = tempdir().unwrap();
        let live = dir.path().join("ferc1_live.sqlite");
        rusqlite::Connection::open(&live)
            .unwrap()
            .execute_batch("CREATE TABLE f1_fuel (respondent_id INTEGER, something_else TEXT);")
            .unwrap();
        let kind = DatabaseKind::Staging(Source::Ferc1);
        let provider = ConnectionProvider::for_test_dir(dir.path().join("test")).with_live(kind, &live);
        let handle = provider.connect(kind, DbTarget::Live).unwrap();
        let registry = SchemaRegistry::new().unwrap();

        let err = define_schema(
            &handle,
            &registry,
            ReferenceYear::latest(Source::Ferc1),
            &ferc1_selection(&["f1_fuel", "f1_steam"]),
        )
        .unwrap_err();
        assert!(matches!(err.as_config(), Some(ConfigError::LayoutMismatch { .. })));
        assert_eq!(handle.ddl_issued(), 0);
        assert!(!handle.table_exists("f1_steam").unwrap());
    }

    #[test]
    fn drop_removes_managed_tables_only() {
        let registry = SchemaRegistry::new().unwrap();
        let handle = DbHandle::in_memory(DatabaseKind::Staging(Source::Ferc1)).unwrap();
        define_schema(
            &handle,
            &registry,
            ReferenceYear::new(Source::Ferc1, 2010).unwrap(),
            &ferc1_selection(&["f1_fuel", "f1_steam"]),
        )
        .unwrap();
        handle.execute_ddl("CREATE TABLE notes (x TEXT)").unwrap();

        let dropped = drop_managed_tables(&handle, &registry).unwrap();
        assert_eq!(dropped.len(), 3);
        assert_eq!(handle.table_names().unwrap(), vec!["notes".to_string()]);
    }
}
