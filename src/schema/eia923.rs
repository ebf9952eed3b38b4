//! EIA-923 staging layouts.

use super::ColumnType::{Integer, Real, Text};
use super::{col, req, SchemaVersion, TableFamily};
use crate::tables::StagingTable;

pub static FAMILIES: &[TableFamily] = &[
    TableFamily {
        table: StagingTable::Eia923GenerationFuel,
        primary_key: &["plant_id", "report_year", "report_month", "prime_mover", "fuel_type"],
        base: &[
            req("plant_id", Integer),
            req("report_year", Integer),
            req("report_month", Integer),
            req("prime_mover", Text),
            req("fuel_type", Text),
            col("plant_name", Text),
            col("operator_id", Integer),
            col("operator_name", Text),
            col("plant_state", Text),
            col("nerc_region", Text),
            col("total_fuel_consumption_mmbtu", Real),
            col("elec_fuel_consumption_mmbtu", Real),
            col("net_generation_mwh", Real),
        ],
        versions: &[
            SchemaVersion {
                first_year: 2009,
                last_year: 2012,
                added: &[],
                removed: &[],
            },
            SchemaVersion {
                first_year: 2013,
                last_year: 2016,
                added: &[col("balancing_authority_code", Text)],
                removed: &["nerc_region"],
            },
        ],
    },
    TableFamily {
        table: StagingTable::Eia923Generator,
        primary_key: &["plant_id", "generator_id", "report_year", "report_month"],
        base: &[
            req("plant_id", Integer),
            req("generator_id", Text),
            req("report_year", Integer),
            req("report_month", Integer),
            col("operator_id", Integer),
            col("net_generation_mwh", Real),
        ],
        versions: &[SchemaVersion {
            first_year: 2009,
            last_year: 2016,
            added: &[],
            removed: &[],
        }],
    },
    TableFamily {
        table: StagingTable::Eia923FuelReceiptsCosts,
        primary_key: &[],
        base: &[
            req("plant_id", Integer),
            req("report_year", Integer),
            req("report_month", Integer),
            col("supplier_name", Text),
            req("energy_source", Text),
            col("fuel_group", Text),
            col("contract_type", Text),
            col("quantity", Real),
            col("average_heat_content", Real),
            col("average_sulfur_content", Real),
            col("average_ash_content", Real),
            col("fuel_cost", Real),
        ],
        versions: &[
            SchemaVersion {
                first_year: 2009,
                last_year: 2013,
                added: &[],
                removed: &[],
            },
            SchemaVersion {
                first_year: 2014,
                last_year: 2016,
                added: &[col("primary_transportation_mode", Text)],
                removed: &[],
            },
        ],
    },
];
