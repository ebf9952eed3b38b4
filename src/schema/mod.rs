//! Schema metadata for staging and integrated databases.
//!
//! Staging layouts change from year to year as publishers add and retire
//! fields, so every staging table is described as a family of versions, each
//! valid for a window of reporting years. The [`SchemaRegistry`] is built
//! once, validated, and passed to whoever needs to resolve or materialize a
//! schema.

pub mod ddl;
pub mod eia860;
pub mod eia923;
pub mod ferc1;
pub mod integrated;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::warn;

use crate::constants::Source;
use crate::db::DatabaseKind;
use crate::error::{ConfigError, Result};
use crate::tables::{IntegratedTable, RegisteredTable, StagingTable, TableSelection};
use crate::years::ReferenceYear;

pub use ddl::{define_integrated_schema, define_schema, drop_managed_tables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    /// ISO-8601 `YYYY-MM-DD`, stored as text.
    Date,
    /// Stored as 0/1.
    Boolean,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text | ColumnType::Date => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    pub required: bool,
}

/// Nullable column.
pub const fn col(name: &'static str, ty: ColumnType) -> ColumnSpec {
    ColumnSpec {
        name,
        ty,
        required: false,
    }
}

/// NOT NULL column.
pub const fn req(name: &'static str, ty: ColumnType) -> ColumnSpec {
    ColumnSpec { name, ty, required: true }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub column: &'static str,
    pub table: &'static str,
    pub references: &'static str,
}

/// One layout of a staging table, valid for `first_year..=last_year`.
/// Columns are the family's base columns minus `removed` plus `added`.
#[derive(Debug, Clone, Copy)]
pub struct SchemaVersion {
    pub first_year: u16,
    pub last_year: u16,
    pub added: &'static [ColumnSpec],
    pub removed: &'static [&'static str],
}

impl SchemaVersion {
    pub fn contains(&self, year: u16) -> bool {
        (self.first_year..=self.last_year).contains(&year)
    }
}

/// Every known layout of one staging table.
#[derive(Debug)]
pub struct TableFamily {
    pub table: StagingTable,
    pub primary_key: &'static [&'static str],
    pub base: &'static [ColumnSpec],
    /// Ascending, non-overlapping.
    pub versions: &'static [SchemaVersion],
}

impl TableFamily {
    pub fn columns_for(&self, version: &SchemaVersion) -> Vec<ColumnSpec> {
        self.base
            .iter()
            .filter(|c| !version.removed.contains(&c.name))
            .chain(version.added.iter())
            .copied()
            .collect()
    }

    /// The version covering `year`, or else the nearest earlier one (flagged
    /// `exact == false`).
    pub fn version_for(&self, year: u16) -> Option<(&SchemaVersion, bool)> {
        if let Some(v) = self.versions.iter().find(|v| v.contains(year)) {
            return Some((v, true));
        }
        self.versions
            .iter()
            .filter(|v| v.last_year < year)
            .max_by_key(|v| v.last_year)
            .map(|v| (v, false))
    }
}

/// Layout of an integrated table.
#[derive(Debug)]
pub struct IntegratedDef {
    pub table: IntegratedTable,
    pub columns: &'static [ColumnSpec],
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
}

/// A table layout picked for materialization.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTable {
    pub name: &'static str,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<&'static str>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Validity window of the staging version used, if any.
    pub version: Option<(u16, u16)>,
}

impl ResolvedTable {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

/// Recorded when a table had no version for the reference year and an
/// earlier one was used instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibilityNote {
    pub table: String,
    pub reference_year: u16,
    pub used_first_year: u16,
    pub used_last_year: u16,
}

impl std::fmt::Display for CompatibilityNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: no layout for {}, using {}..={}",
            self.table, self.reference_year, self.used_first_year, self.used_last_year
        )
    }
}

/// The resolved schema of one database: what gets created, in order.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaHandle {
    pub database: DatabaseKind,
    pub reference_year: Option<u16>,
    pub tables: Vec<ResolvedTable>,
    pub notes: Vec<CompatibilityNote>,
}

impl SchemaHandle {
    pub fn table(&self, name: &str) -> Option<&ResolvedTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name).collect()
    }

    pub fn is_degraded(&self) -> bool {
        !self.notes.is_empty()
    }
}

/// All staging and integrated layouts known to the pipeline.
#[derive(Debug)]
pub struct SchemaRegistry {
    staging: BTreeMap<StagingTable, &'static TableFamily>,
    integrated: BTreeMap<IntegratedTable, &'static IntegratedDef>,
}

impl SchemaRegistry {
    /// The built-in layouts.
    pub fn new() -> Result<Self> {
        let families = ferc1::FAMILIES
            .iter()
            .chain(eia923::FAMILIES.iter())
            .chain(eia860::FAMILIES.iter());
        Self::from_parts(families, integrated::TABLES.iter())
    }

    pub fn from_parts(
        families: impl IntoIterator<Item = &'static TableFamily>,
        integrated: impl IntoIterator<Item = &'static IntegratedDef>,
    ) -> Result<Self> {
        let mut registry = Self {
            staging: BTreeMap::new(),
            integrated: BTreeMap::new(),
        };
        for family in families {
            if registry.staging.insert(family.table, family).is_some() {
                return Err(invalid(format!("{} defined twice", family.table)));
            }
        }
        for def in integrated {
            if registry.integrated.insert(def.table, def).is_some() {
                return Err(invalid(format!("{} defined twice", def.table)));
            }
        }
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<()> {
        for family in self.staging.values() {
            if family.versions.is_empty() {
                return Err(invalid(format!("{} has no versions", family.table)));
            }
            let mut previous_last: Option<u16> = None;
            for version in family.versions {
                if version.first_year > version.last_year {
                    return Err(invalid(format!(
                        "{} has an empty window {}..={}",
                        family.table, version.first_year, version.last_year
                    )));
                }
                if previous_last.is_some_and(|last| version.first_year <= last) {
                    return Err(invalid(format!("{} has overlapping versions", family.table)));
                }
                previous_last = Some(version.last_year);

                let columns = family.columns_for(version);
                let mut seen = BTreeSet::new();
                for c in &columns {
                    if !seen.insert(c.name) {
                        return Err(invalid(format!("{} repeats column {}", family.table, c.name)));
                    }
                }
                for key in family.primary_key {
                    if !seen.contains(key) {
                        return Err(invalid(format!(
                            "{} {}..={} lacks key column {}",
                            family.table, version.first_year, version.last_year, key
                        )));
                    }
                }
            }
        }

        let mut defined: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for def in self.integrated.values() {
            let columns: BTreeSet<&str> = def.columns.iter().map(|c| c.name).collect();
            for key in def.primary_key {
                if !columns.contains(key) {
                    return Err(invalid(format!("{} lacks key column {}", def.table, key)));
                }
            }
            for fk in def.foreign_keys {
                let parent = defined.get(fk.table).ok_or_else(|| {
                    invalid(format!("{} references {} before it is defined", def.table, fk.table))
                })?;
                if !columns.contains(fk.column) || !parent.contains(fk.references) {
                    return Err(invalid(format!(
                        "{}.{} -> {}.{} does not resolve",
                        def.table, fk.column, fk.table, fk.references
                    )));
                }
            }
            defined.insert(def.table.name(), columns);
        }
        Ok(())
    }

    pub fn family(&self, table: StagingTable) -> Option<&'static TableFamily> {
        self.staging.get(&table).copied()
    }

    pub fn integrated_def(&self, table: IntegratedTable) -> Option<&'static IntegratedDef> {
        self.integrated.get(&table).copied()
    }

    /// Resolve the staging layouts for `tables` at `reference_year`. Pure;
    /// nothing touches a database.
    pub fn resolve_staging(
        &self,
        reference_year: ReferenceYear,
        tables: &TableSelection<StagingTable>,
    ) -> Result<SchemaHandle> {
        let source = reference_year.source();
        let year = reference_year.year();
        let mut resolved = Vec::with_capacity(tables.len());
        let mut notes = Vec::new();

        for table in tables.iter() {
            if table.dataset() != source {
                return Err(ConfigError::UnknownTable {
                    dataset: source.to_string(),
                    name: table.name().to_string(),
                }
                .into());
            }
            let family = self.family(table).ok_or_else(|| no_schema(source, table, year))?;
            let (version, exact) = family.version_for(year).ok_or_else(|| no_schema(source, table, year))?;
            if !exact {
                let note = CompatibilityNote {
                    table: table.name().to_string(),
                    reference_year: year,
                    used_first_year: version.first_year,
                    used_last_year: version.last_year,
                };
                warn!("Degraded schema compatibility: {}", note);
                notes.push(note);
            }
            resolved.push(ResolvedTable {
                name: table.name(),
                columns: family.columns_for(version),
                primary_key: family.primary_key.to_vec(),
                foreign_keys: Vec::new(),
                version: Some((version.first_year, version.last_year)),
            });
        }

        Ok(SchemaHandle {
            database: DatabaseKind::Staging(source),
            reference_year: Some(year),
            tables: resolved,
            notes,
        })
    }

    /// Resolve the integrated layouts for `tables` plus the core tables,
    /// in load order.
    pub fn resolve_integrated(&self, tables: &TableSelection<IntegratedTable>) -> Result<SchemaHandle> {
        let wanted = tables.clone().with_core();
        let mut resolved = Vec::with_capacity(wanted.len());
        for table in wanted.iter() {
            let def = self
                .integrated_def(table)
                .ok_or_else(|| invalid(format!("no layout for integrated table {table}")))?;
            resolved.push(ResolvedTable {
                name: table.name(),
                columns: def.columns.to_vec(),
                primary_key: def.primary_key.to_vec(),
                foreign_keys: def.foreign_keys.to_vec(),
                version: None,
            });
        }
        Ok(SchemaHandle {
            database: DatabaseKind::Integrated,
            reference_year: None,
            tables: resolved,
            notes: Vec::new(),
        })
    }

    /// Every table name this registry can create in a database of `kind`.
    pub fn managed_tables(&self, kind: DatabaseKind) -> Vec<&'static str> {
        match kind {
            DatabaseKind::Staging(source) => self
                .staging
                .keys()
                .filter(|t| t.dataset() == source)
                .map(|t| t.name())
                .collect(),
            DatabaseKind::Integrated => self.integrated.keys().map(|t| t.name()).collect(),
        }
    }
}

fn invalid(msg: String) -> crate::error::EtlError {
    ConfigError::InvalidRegistry(msg).into()
}

fn no_schema(source: Source, table: StagingTable, year: u16) -> crate::error::EtlError {
    ConfigError::NoSchemaForYear {
        dataset: source,
        table: table.name().to_string(),
        year,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_valid_and_complete() {
        let registry = SchemaRegistry::new().unwrap();
        for table in StagingTable::registry() {
            assert!(registry.family(*table).is_some(), "{table} has no layout");
        }
        for table in IntegratedTable::registry() {
            assert!(registry.integrated_def(*table).is_some(), "{table} has no layout");
        }
    }

    #[test]
    fn exact_window_is_preferred() {
        let registry = SchemaRegistry::new().unwrap();
        let selection = TableSelection::parse(Source::Ferc1, ["f1_steam"]).unwrap();
        let handle = registry
            .resolve_staging(ReferenceYear::new(Source::Ferc1, 2008).unwrap(), &selection)
            .unwrap();
        let steam = handle.table("f1_steam").unwrap();
        assert_eq!(steam.version, Some((2004, 2010)));
        assert!(steam.column("asset_retire_cost").is_none());
        assert!(!handle.is_degraded());

        let handle = registry
            .resolve_staging(ReferenceYear::new(Source::Ferc1, 2012).unwrap(), &selection)
            .unwrap();
        assert!(handle.table("f1_steam").unwrap().column("asset_retire_cost").is_some());
    }

    #[test]
    fn nearest_earlier_version_is_used_with_a_note() {
        let registry = SchemaRegistry::new().unwrap();
        let selection = TableSelection::parse(Source::Ferc1, ["f1_steam", "f1_fuel"]).unwrap();
        let handle = registry
            .resolve_staging(ReferenceYear::latest(Source::Ferc1), &selection)
            .unwrap();
        assert_eq!(handle.reference_year, Some(2016));
        assert_eq!(handle.table("f1_steam").unwrap().version, Some((2011, 2015)));
        assert_eq!(
            handle.notes,
            vec![CompatibilityNote {
                table: "f1_steam".into(),
                reference_year: 2016,
                used_first_year: 2011,
                used_last_year: 2015,
            }]
        );
    }

    #[test]
    fn table_without_an_early_enough_version_is_a_config_error() {
        let registry = SchemaRegistry::new().unwrap();
        let selection = TableSelection::parse(Source::Ferc1, ["f1_purchased_pwr"]).unwrap();
        let err = registry
            .resolve_staging(ReferenceYear::new(Source::Ferc1, 2005).unwrap(), &selection)
            .unwrap_err();
        assert_eq!(
            err.as_config(),
            Some(&ConfigError::NoSchemaForYear {
                dataset: Source::Ferc1,
                table: "f1_purchased_pwr".into(),
                year: 2005,
            })
        );
    }

    #[test]
    fn integrated_resolution_always_includes_core_tables() {
        let registry = SchemaRegistry::new().unwrap();
        let selection = TableSelection::parse_any(["fuel_ferc1"]).unwrap();
        let handle = registry.resolve_integrated(&selection).unwrap();
        assert_eq!(
            handle.table_names(),
            vec!["fuel_types", "prime_movers", "utilities", "plants", "fuel_ferc1"]
        );
    }

    static OVERLAPPING: TableFamily = TableFamily {
        table: StagingTable::F1Fuel,
        primary_key: &[],
        base: &[col("plant_name", ColumnType::Text)],
        versions: &[
            SchemaVersion {
                first_year: 2004,
                last_year: 2010,
                added: &[],
                removed: &[],
            },
            SchemaVersion {
                first_year: 2010,
                last_year: 2016,
                added: &[],
                removed: &[],
            },
        ],
    };

    #[test]
    fn overlapping_windows_are_rejected() {
        let err = SchemaRegistry::from_parts([&OVERLAPPING], Vec::<&'static IntegratedDef>::new()).unwrap_err();
        assert!(matches!(err.as_config(), Some(ConfigError::InvalidRegistry(_))));
    }
}
