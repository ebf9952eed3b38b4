//! FERC Form 1 staging layouts.

use super::ColumnType::{Integer, Real, Text};
use super::{col, req, SchemaVersion, TableFamily};
use crate::tables::StagingTable;

pub static FAMILIES: &[TableFamily] = &[
    TableFamily {
        table: StagingTable::F1RespondentId,
        primary_key: &["respondent_id", "report_year"],
        base: &[
            req("respondent_id", Integer),
            req("report_year", Integer),
            req("respondent_name", Text),
            col("respondent_state", Text),
            col("status", Text),
        ],
        versions: &[SchemaVersion {
            first_year: 2004,
            last_year: 2016,
            added: &[],
            removed: &[],
        }],
    },
    TableFamily {
        table: StagingTable::F1Steam,
        primary_key: &["respondent_id", "report_year", "spplmnt_num", "row_number"],
        base: &[
            req("respondent_id", Integer),
            req("report_year", Integer),
            req("spplmnt_num", Integer),
            req("row_number", Integer),
            req("plant_name", Text),
            col("plant_kind", Text),
            col("type_const", Text),
            col("yr_const", Integer),
            col("yr_installed", Integer),
            col("tot_capacity", Real),
            col("peak_demand", Real),
            col("net_generation", Real),
            col("cost_land", Real),
            col("cost_structure", Real),
            col("cost_equipment", Real),
            col("expns_operations", Real),
            col("expns_fuel", Real),
        ],
        versions: &[
            SchemaVersion {
                first_year: 2004,
                last_year: 2010,
                added: &[],
                removed: &[],
            },
            // Asset retirement costs reported separately from 2011.
            SchemaVersion {
                first_year: 2011,
                last_year: 2015,
                added: &[col("asset_retire_cost", Real)],
                removed: &[],
            },
        ],
    },
    TableFamily {
        table: StagingTable::F1Fuel,
        primary_key: &["respondent_id", "report_year", "spplmnt_num", "row_number"],
        base: &[
            req("respondent_id", Integer),
            req("report_year", Integer),
            req("spplmnt_num", Integer),
            req("row_number", Integer),
            req("plant_name", Text),
            col("fuel", Text),
            col("fuel_unit", Text),
            col("fuel_quantity", Real),
            col("fuel_avg_heat", Real),
            col("fuel_cost_delvd", Real),
            col("fuel_cost_burned", Real),
            col("fuel_cost_btu", Real),
        ],
        versions: &[SchemaVersion {
            first_year: 2004,
            last_year: 2016,
            added: &[],
            removed: &[],
        }],
    },
    TableFamily {
        table: StagingTable::F1PurchasedPwr,
        primary_key: &["respondent_id", "report_year", "spplmnt_num", "row_number"],
        base: &[
            req("respondent_id", Integer),
            req("report_year", Integer),
            req("spplmnt_num", Integer),
            req("row_number", Integer),
            col("athrty_co_name", Text),
            col("sttstcl_clssfctn", Text),
            col("mwh_purchased", Real),
            col("demand_charges", Real),
            col("energy_charges", Real),
            col("other_charges", Real),
            col("settlement_tot", Real),
        ],
        versions: &[
            SchemaVersion {
                first_year: 2006,
                last_year: 2012,
                added: &[col("mwh_recv", Real), col("mwh_delvd", Real)],
                removed: &[],
            },
            SchemaVersion {
                first_year: 2013,
                last_year: 2016,
                added: &[],
                removed: &[],
            },
        ],
    },
];
