//! Static reference data: the source registry, the years each source has
//! published, and the code tables used to translate source vocabularies into
//! the integrated one.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The upstream datasets integrated by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// FERC Form 1, the financial filing of investor-owned utilities.
    Ferc1,
    /// EIA Form 923, monthly generation and fuel data.
    Eia923,
    /// EIA Form 860, the annual generator inventory.
    Eia860,
}

pub const FERC1: &str = "ferc1";
pub const EIA923: &str = "eia923";
pub const EIA860: &str = "eia860";

impl Source {
    pub const ALL: [Source; 3] = [Source::Ferc1, Source::Eia923, Source::Eia860];

    pub fn slug(self) -> &'static str {
        match self {
            Source::Ferc1 => FERC1,
            Source::Eia923 => EIA923,
            Source::Eia860 => EIA860,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Source::Ferc1 => "FERC Form 1",
            Source::Eia923 => "EIA-923",
            Source::Eia860 => "EIA-860",
        }
    }

    /// Inclusive range of reporting years with extractable data.
    pub fn working_years(self) -> (u16, u16) {
        match self {
            Source::Ferc1 => (2004, 2016),
            Source::Eia923 => (2009, 2016),
            Source::Eia860 => (2011, 2015),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            FERC1 => Ok(Source::Ferc1),
            EIA923 => Ok(Source::Eia923),
            EIA860 => Ok(Source::Eia860),
            other => Err(ConfigError::InvalidSetting(format!("unknown source `{other}`"))),
        }
    }
}

/// Which source's values win when claims about one entity disagree.
/// Utilities are financial entities, so FERC Form 1 is authoritative;
/// plants are physical, so the EIA surveys are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Utility,
    Plant,
}

impl EntityKind {
    pub fn precedence(self) -> [Source; 3] {
        match self {
            EntityKind::Utility => [Source::Ferc1, Source::Eia860, Source::Eia923],
            EntityKind::Plant => [Source::Eia860, Source::Eia923, Source::Ferc1],
        }
    }

    /// Lower rank wins.
    pub fn rank(self, source: Source) -> usize {
        self.precedence()
            .iter()
            .position(|s| *s == source)
            .unwrap_or(usize::MAX)
    }
}

// Integrated fuel type codes
pub const FUEL_COAL: &str = "coal";
pub const FUEL_GAS: &str = "gas";
pub const FUEL_OIL: &str = "oil";
pub const FUEL_NUCLEAR: &str = "nuclear";
pub const FUEL_HYDRO: &str = "hydro";
pub const FUEL_WIND: &str = "wind";
pub const FUEL_SOLAR: &str = "solar";
pub const FUEL_WASTE: &str = "waste";
pub const FUEL_OTHER: &str = "other";

/// Rows of the static `fuel_types` table.
pub const FUEL_TYPES: &[(&str, &str)] = &[
    (FUEL_COAL, "Coal, petroleum coke and synthetic coal"),
    (FUEL_GAS, "Natural gas and other gaseous fuels"),
    (FUEL_OIL, "Petroleum liquids"),
    (FUEL_NUCLEAR, "Nuclear fuel"),
    (FUEL_HYDRO, "Conventional and pumped-storage hydro"),
    (FUEL_WIND, "Wind"),
    (FUEL_SOLAR, "Solar photovoltaic and thermal"),
    (FUEL_WASTE, "Biomass, wood and municipal solid waste"),
    (FUEL_OTHER, "Other or unreported fuel"),
];

/// Rows of the static `prime_movers` table (EIA prime mover codes).
pub const PRIME_MOVERS: &[(&str, &str)] = &[
    ("BA", "Energy storage, battery"),
    ("CA", "Combined cycle steam part"),
    ("CE", "Energy storage, compressed air"),
    ("CS", "Combined cycle single shaft"),
    ("CT", "Combined cycle combustion turbine part"),
    ("FC", "Fuel cell"),
    ("GT", "Combustion (gas) turbine"),
    ("HY", "Hydraulic turbine"),
    ("IC", "Internal combustion engine"),
    ("OT", "Other"),
    ("PS", "Energy storage, reversible hydraulic turbine"),
    ("PV", "Photovoltaic"),
    ("ST", "Steam turbine"),
    ("WT", "Wind turbine, onshore"),
    ("WS", "Wind turbine, offshore"),
];

/// EIA energy source codes mapped to integrated fuel types.
pub static ENERGY_SOURCE_TO_FUEL: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let coal = ["ANT", "BIT", "LIG", "SUB", "SGC", "WC", "RC", "PC", "SC"];
    let gas = ["NG", "BFG", "OG", "PG", "SG"];
    let oil = ["DFO", "RFO", "JF", "KER", "WO", "PET"];
    let waste = ["AB", "BLQ", "LFG", "MSB", "MSN", "MSW", "OBG", "OBL", "OBS", "SLW", "TDF", "WDL", "WDS"];
    let mut map = HashMap::new();
    for code in coal {
        map.insert(code, FUEL_COAL);
    }
    for code in gas {
        map.insert(code, FUEL_GAS);
    }
    for code in oil {
        map.insert(code, FUEL_OIL);
    }
    for code in waste {
        map.insert(code, FUEL_WASTE);
    }
    map.insert("NUC", FUEL_NUCLEAR);
    map.insert("WAT", FUEL_HYDRO);
    map.insert("WND", FUEL_WIND);
    map.insert("SUN", FUEL_SOLAR);
    map
});

/// Substrings of the free-text FERC Form 1 fuel column, checked in order.
pub const FERC1_FUEL_STRINGS: &[(&str, &str)] = &[
    ("nuc", FUEL_NUCLEAR),
    ("uranium", FUEL_NUCLEAR),
    ("coal", FUEL_COAL),
    ("lignite", FUEL_COAL),
    ("coke", FUEL_COAL),
    ("gas", FUEL_GAS),
    ("oil", FUEL_OIL),
    ("diesel", FUEL_OIL),
    ("#2", FUEL_OIL),
    ("#6", FUEL_OIL),
    ("bbl", FUEL_OIL),
    ("wood", FUEL_WASTE),
    ("refuse", FUEL_WASTE),
    ("biomass", FUEL_WASTE),
];

/// Spellings of FERC Form 1 fuel units mapped to canonical units.
pub const FERC1_FUEL_UNITS: &[(&str, &str)] = &[
    ("ton", "ton"),
    ("tons", "ton"),
    ("tn", "ton"),
    ("mcf", "mcf"),
    ("mcft", "mcf"),
    ("bbl", "bbl"),
    ("barrel", "bbl"),
    ("barrels", "bbl"),
    ("gal", "gal"),
    ("gallon", "gal"),
    ("gallons", "gal"),
    ("kgu", "kgU"),
    ("mmbtu", "mmbtu"),
];

/// Staging tables extracted into the FERC Form 1 database by default.
pub const FERC1_DEFAULT_TABLES: &[&str] = &["f1_respondent_id", "f1_steam", "f1_fuel", "f1_purchased_pwr"];

/// Integrated tables loaded from each source by default.
pub const FERC1_PUDL_TABLES: &[&str] = &["plants_steam_ferc1", "fuel_ferc1", "purchased_power_ferc1"];
pub const EIA923_PUDL_TABLES: &[&str] =
    &["generation_fuel_eia923", "generation_eia923", "fuel_receipts_costs_eia923"];
pub const EIA860_PUDL_TABLES: &[&str] = &["generators_eia860"];
