//! Enum-indexed table registries. Table names coming from callers are parsed
//! here, so an unknown name is rejected when a selection is built rather than
//! halfway through a run.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::constants::{
    Source, EIA860_PUDL_TABLES, EIA923_PUDL_TABLES, FERC1_DEFAULT_TABLES, FERC1_PUDL_TABLES,
};
use crate::error::{ConfigError, Result};

/// A table known to one of the registries.
pub trait RegisteredTable: Copy + Ord + fmt::Debug + 'static {
    fn name(self) -> &'static str;
    fn registry() -> &'static [Self];
    /// The source whose data the table holds, if any single one.
    fn source(self) -> Option<Source>;

    fn lookup(source: Option<Source>, name: &str) -> Option<Self> {
        let wanted = name.trim();
        Self::registry()
            .iter()
            .copied()
            .filter(|t| source.is_none() || t.source() == source)
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
    }
}

/// Raw staging tables, one family per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StagingTable {
    F1RespondentId,
    F1Steam,
    F1Fuel,
    F1PurchasedPwr,
    Eia923GenerationFuel,
    Eia923Generator,
    Eia923FuelReceiptsCosts,
    Eia860Utility,
    Eia860Plant,
    Eia860Generator,
}

impl RegisteredTable for StagingTable {
    fn name(self) -> &'static str {
        match self {
            StagingTable::F1RespondentId => "f1_respondent_id",
            StagingTable::F1Steam => "f1_steam",
            StagingTable::F1Fuel => "f1_fuel",
            StagingTable::F1PurchasedPwr => "f1_purchased_pwr",
            StagingTable::Eia923GenerationFuel => "generation_fuel",
            StagingTable::Eia923Generator => "generator",
            StagingTable::Eia923FuelReceiptsCosts => "fuel_receipts_costs",
            StagingTable::Eia860Utility => "utility",
            StagingTable::Eia860Plant => "plant",
            StagingTable::Eia860Generator => "generator",
        }
    }

    fn registry() -> &'static [Self] {
        &[
            StagingTable::F1RespondentId,
            StagingTable::F1Steam,
            StagingTable::F1Fuel,
            StagingTable::F1PurchasedPwr,
            StagingTable::Eia923GenerationFuel,
            StagingTable::Eia923Generator,
            StagingTable::Eia923FuelReceiptsCosts,
            StagingTable::Eia860Utility,
            StagingTable::Eia860Plant,
            StagingTable::Eia860Generator,
        ]
    }

    fn source(self) -> Option<Source> {
        Some(self.dataset())
    }
}

impl StagingTable {
    pub fn dataset(self) -> Source {
        match self {
            StagingTable::F1RespondentId
            | StagingTable::F1Steam
            | StagingTable::F1Fuel
            | StagingTable::F1PurchasedPwr => Source::Ferc1,
            StagingTable::Eia923GenerationFuel
            | StagingTable::Eia923Generator
            | StagingTable::Eia923FuelReceiptsCosts => Source::Eia923,
            StagingTable::Eia860Utility | StagingTable::Eia860Plant | StagingTable::Eia860Generator => {
                Source::Eia860
            }
        }
    }

    pub fn of_source(source: Source) -> impl Iterator<Item = StagingTable> {
        Self::registry()
            .iter()
            .copied()
            .filter(move |t| t.dataset() == source)
    }
}

impl fmt::Display for StagingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset(), self.name())
    }
}

/// Tables of the integrated database, declared in load order: every table
/// only references tables declared before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntegratedTable {
    FuelTypes,
    PrimeMovers,
    Utilities,
    Plants,
    GeneratorsEia860,
    GenerationEia923,
    GenerationFuelEia923,
    FuelReceiptsCostsEia923,
    PlantsSteamFerc1,
    FuelFerc1,
    PurchasedPowerFerc1,
}

impl RegisteredTable for IntegratedTable {
    fn name(self) -> &'static str {
        match self {
            IntegratedTable::FuelTypes => "fuel_types",
            IntegratedTable::PrimeMovers => "prime_movers",
            IntegratedTable::Utilities => "utilities",
            IntegratedTable::Plants => "plants",
            IntegratedTable::GeneratorsEia860 => "generators_eia860",
            IntegratedTable::GenerationEia923 => "generation_eia923",
            IntegratedTable::GenerationFuelEia923 => "generation_fuel_eia923",
            IntegratedTable::FuelReceiptsCostsEia923 => "fuel_receipts_costs_eia923",
            IntegratedTable::PlantsSteamFerc1 => "plants_steam_ferc1",
            IntegratedTable::FuelFerc1 => "fuel_ferc1",
            IntegratedTable::PurchasedPowerFerc1 => "purchased_power_ferc1",
        }
    }

    fn registry() -> &'static [Self] {
        &[
            IntegratedTable::FuelTypes,
            IntegratedTable::PrimeMovers,
            IntegratedTable::Utilities,
            IntegratedTable::Plants,
            IntegratedTable::GeneratorsEia860,
            IntegratedTable::GenerationEia923,
            IntegratedTable::GenerationFuelEia923,
            IntegratedTable::FuelReceiptsCostsEia923,
            IntegratedTable::PlantsSteamFerc1,
            IntegratedTable::FuelFerc1,
            IntegratedTable::PurchasedPowerFerc1,
        ]
    }

    fn source(self) -> Option<Source> {
        match self {
            IntegratedTable::GeneratorsEia860 => Some(Source::Eia860),
            IntegratedTable::GenerationEia923
            | IntegratedTable::GenerationFuelEia923
            | IntegratedTable::FuelReceiptsCostsEia923 => Some(Source::Eia923),
            IntegratedTable::PlantsSteamFerc1
            | IntegratedTable::FuelFerc1
            | IntegratedTable::PurchasedPowerFerc1 => Some(Source::Ferc1),
            IntegratedTable::FuelTypes
            | IntegratedTable::PrimeMovers
            | IntegratedTable::Utilities
            | IntegratedTable::Plants => None,
        }
    }
}

impl IntegratedTable {
    /// Static lookup tables and merged entities; present in every integrated
    /// schema.
    pub const CORE: [IntegratedTable; 4] = [
        IntegratedTable::FuelTypes,
        IntegratedTable::PrimeMovers,
        IntegratedTable::Utilities,
        IntegratedTable::Plants,
    ];

    pub fn is_core(self) -> bool {
        Self::CORE.contains(&self)
    }

    /// Staging tables this table is built from.
    pub fn inputs(self) -> &'static [StagingTable] {
        match self {
            IntegratedTable::FuelTypes | IntegratedTable::PrimeMovers => &[],
            IntegratedTable::Utilities => &[
                StagingTable::F1RespondentId,
                StagingTable::Eia860Utility,
                StagingTable::Eia923GenerationFuel,
            ],
            IntegratedTable::Plants => &[
                StagingTable::Eia860Plant,
                StagingTable::Eia923GenerationFuel,
                StagingTable::F1Steam,
            ],
            IntegratedTable::GeneratorsEia860 => &[StagingTable::Eia860Generator],
            IntegratedTable::GenerationEia923 => &[StagingTable::Eia923Generator],
            IntegratedTable::GenerationFuelEia923 => &[StagingTable::Eia923GenerationFuel],
            IntegratedTable::FuelReceiptsCostsEia923 => &[StagingTable::Eia923FuelReceiptsCosts],
            IntegratedTable::PlantsSteamFerc1 => &[StagingTable::F1Steam],
            IntegratedTable::FuelFerc1 => &[StagingTable::F1Fuel],
            IntegratedTable::PurchasedPowerFerc1 => &[StagingTable::F1PurchasedPwr],
        }
    }
}

impl fmt::Display for IntegratedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for StagingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl Serialize for IntegratedTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// A validated, ordered subset of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelection<T: RegisteredTable> {
    tables: BTreeSet<T>,
}

impl<T: RegisteredTable> TableSelection<T> {
    /// Parse `names` against the tables belonging to `source`. Fails on the
    /// first name the registry does not know, or on an empty selection.
    pub fn parse<I, S>(source: Source, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parse_scoped(Some(source), names)
    }

    /// Parse `names` against the whole registry.
    pub fn parse_any<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::parse_scoped(None, names)
    }

    fn parse_scoped<I, S>(source: Option<Source>, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tables = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let table = T::lookup(source, name).ok_or_else(|| ConfigError::UnknownTable {
                dataset: source.map_or_else(|| "integrated".to_string(), |s| s.to_string()),
                name: name.to_string(),
            })?;
            tables.insert(table);
        }
        if tables.is_empty() {
            return Err(ConfigError::EmptySelection.into());
        }
        Ok(Self { tables })
    }

    pub fn from_tables(tables: impl IntoIterator<Item = T>) -> Result<Self> {
        let tables: BTreeSet<T> = tables.into_iter().collect();
        if tables.is_empty() {
            return Err(ConfigError::EmptySelection.into());
        }
        Ok(Self { tables })
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.tables.iter().copied()
    }

    pub fn contains(&self, table: T) -> bool {
        self.tables.contains(&table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name()).collect()
    }
}

impl TableSelection<StagingTable> {
    /// The staging tables extracted for a source when the caller names none.
    pub fn defaults(source: Source) -> Self {
        let tables = match source {
            Source::Ferc1 => FERC1_DEFAULT_TABLES
                .iter()
                .filter_map(|n| StagingTable::lookup(Some(source), n))
                .collect(),
            other => StagingTable::of_source(other).collect(),
        };
        Self { tables }
    }

    pub fn source(&self) -> Option<Source> {
        self.tables.iter().next().map(|t| t.dataset())
    }
}

impl TableSelection<IntegratedTable> {
    /// The integrated tables loaded from a source when the caller names none.
    pub fn defaults(source: Source) -> Self {
        let names = match source {
            Source::Ferc1 => FERC1_PUDL_TABLES,
            Source::Eia923 => EIA923_PUDL_TABLES,
            Source::Eia860 => EIA860_PUDL_TABLES,
        };
        let tables = names
            .iter()
            .filter_map(|n| IntegratedTable::lookup(Some(source), n))
            .collect();
        Self { tables }
    }

    /// Adds the core tables every integrated schema carries.
    pub fn with_core(mut self) -> Self {
        self.tables.extend(IntegratedTable::CORE);
        self
    }

    pub fn merge(mut self, other: &Self) -> Self {
        self.tables.extend(other.tables.iter().copied());
        self
    }
}
