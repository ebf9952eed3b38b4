//! EIA-860 staging layouts.

use super::ColumnType::{Integer, Real, Text};
use super::{col, req, SchemaVersion, TableFamily};
use crate::tables::StagingTable;

pub static FAMILIES: &[TableFamily] = &[
    TableFamily {
        table: StagingTable::Eia860Utility,
        primary_key: &["utility_id", "report_year"],
        base: &[
            req("utility_id", Integer),
            req("report_year", Integer),
            req("utility_name", Text),
            col("street_address", Text),
            col("city", Text),
            col("state", Text),
            col("zip_code", Text),
        ],
        versions: &[
            SchemaVersion {
                first_year: 2011,
                last_year: 2012,
                added: &[],
                removed: &[],
            },
            SchemaVersion {
                first_year: 2013,
                last_year: 2015,
                added: &[col("entity_type", Text)],
                removed: &[],
            },
        ],
    },
    TableFamily {
        table: StagingTable::Eia860Plant,
        primary_key: &["plant_id", "report_year"],
        base: &[
            req("plant_id", Integer),
            req("report_year", Integer),
            req("plant_name", Text),
            col("utility_id", Integer),
            col("utility_name", Text),
            col("street_address", Text),
            col("city", Text),
            col("state", Text),
            col("county", Text),
            col("latitude", Real),
            col("longitude", Real),
            col("nerc_region", Text),
        ],
        versions: &[
            SchemaVersion {
                first_year: 2011,
                last_year: 2012,
                added: &[],
                removed: &[],
            },
            SchemaVersion {
                first_year: 2013,
                last_year: 2015,
                added: &[col("sector_name", Text)],
                removed: &[],
            },
        ],
    },
    TableFamily {
        table: StagingTable::Eia860Generator,
        primary_key: &["plant_id", "generator_id", "report_year"],
        base: &[
            req("plant_id", Integer),
            req("generator_id", Text),
            req("report_year", Integer),
            col("utility_id", Integer),
            col("prime_mover", Text),
            col("nameplate_capacity_mw", Real),
            col("status", Text),
            col("operating_year", Integer),
            col("energy_source_1", Text),
        ],
        versions: &[SchemaVersion {
            first_year: 2011,
            last_year: 2015,
            added: &[],
            removed: &[],
        }],
    },
];
