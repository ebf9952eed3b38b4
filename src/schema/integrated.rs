//! Layouts of the integrated (PUDL) database. Independent of any source year.

use super::ColumnType::{Date, Integer, Real, Text};
use super::{col, req, ForeignKey, IntegratedDef};
use crate::tables::IntegratedTable;

const fn fk(column: &'static str, table: &'static str, references: &'static str) -> ForeignKey {
    ForeignKey {
        column,
        table,
        references,
    }
}

const UTILITY_FK: ForeignKey = fk("utility_id_pudl", "utilities", "utility_id_pudl");
const PLANT_FK: ForeignKey = fk("plant_id_pudl", "plants", "plant_id_pudl");
const FUEL_FK: ForeignKey = fk("fuel_type_code_pudl", "fuel_types", "fuel_type_code_pudl");

/// In load order.
pub static TABLES: &[IntegratedDef] = &[
    IntegratedDef {
        table: IntegratedTable::FuelTypes,
        columns: &[req("fuel_type_code_pudl", Text), req("description", Text)],
        primary_key: &["fuel_type_code_pudl"],
        foreign_keys: &[],
    },
    IntegratedDef {
        table: IntegratedTable::PrimeMovers,
        columns: &[req("prime_mover_code", Text), req("description", Text)],
        primary_key: &["prime_mover_code"],
        foreign_keys: &[],
    },
    IntegratedDef {
        table: IntegratedTable::Utilities,
        columns: &[
            req("utility_id_pudl", Integer),
            req("utility_name", Text),
            col("utility_id_eia", Integer),
            col("utility_id_ferc1", Integer),
            col("state", Text),
            col("entity_type", Text),
            req("sources", Text),
        ],
        primary_key: &["utility_id_pudl"],
        foreign_keys: &[],
    },
    IntegratedDef {
        table: IntegratedTable::Plants,
        columns: &[
            req("plant_id_pudl", Integer),
            req("plant_name", Text),
            col("plant_id_eia", Integer),
            col("utility_id_pudl", Integer),
            col("city", Text),
            col("state", Text),
            col("county", Text),
            col("latitude", Real),
            col("longitude", Real),
            req("sources", Text),
        ],
        primary_key: &["plant_id_pudl"],
        foreign_keys: &[UTILITY_FK],
    },
    IntegratedDef {
        table: IntegratedTable::GeneratorsEia860,
        columns: &[
            req("plant_id_pudl", Integer),
            req("generator_id", Text),
            req("report_year", Integer),
            col("utility_id_pudl", Integer),
            col("prime_mover_code", Text),
            col("nameplate_capacity_mw", Real),
            col("status", Text),
            col("operating_year", Integer),
            col("energy_source_code", Text),
            req("fuel_type_code_pudl", Text),
        ],
        primary_key: &["plant_id_pudl", "generator_id", "report_year"],
        foreign_keys: &[PLANT_FK, UTILITY_FK, FUEL_FK],
    },
    IntegratedDef {
        table: IntegratedTable::GenerationEia923,
        columns: &[
            req("plant_id_pudl", Integer),
            req("generator_id", Text),
            req("report_date", Date),
            col("net_generation_mwh", Real),
        ],
        primary_key: &["plant_id_pudl", "generator_id", "report_date"],
        foreign_keys: &[PLANT_FK],
    },
    IntegratedDef {
        table: IntegratedTable::GenerationFuelEia923,
        columns: &[
            req("plant_id_pudl", Integer),
            req("report_date", Date),
            req("prime_mover_code", Text),
            req("energy_source_code", Text),
            req("fuel_type_code_pudl", Text),
            col("fuel_consumed_mmbtu", Real),
            col("fuel_consumed_for_electricity_mmbtu", Real),
            col("net_generation_mwh", Real),
        ],
        primary_key: &["plant_id_pudl", "report_date", "prime_mover_code", "energy_source_code"],
        foreign_keys: &[PLANT_FK, FUEL_FK],
    },
    IntegratedDef {
        table: IntegratedTable::FuelReceiptsCostsEia923,
        columns: &[
            req("fuel_receipt_id", Integer),
            req("plant_id_pudl", Integer),
            req("report_date", Date),
            col("supplier_name", Text),
            req("energy_source_code", Text),
            req("fuel_type_code_pudl", Text),
            col("fuel_group", Text),
            col("contract_type", Text),
            col("fuel_qty_units", Real),
            col("heat_content_mmbtu_per_unit", Real),
            col("sulfur_content_pct", Real),
            col("ash_content_pct", Real),
            col("fuel_cost_per_mmbtu", Real),
        ],
        primary_key: &["fuel_receipt_id"],
        foreign_keys: &[PLANT_FK, FUEL_FK],
    },
    IntegratedDef {
        table: IntegratedTable::PlantsSteamFerc1,
        columns: &[
            req("plant_steam_id", Integer),
            req("utility_id_pudl", Integer),
            col("plant_id_pudl", Integer),
            req("report_year", Integer),
            req("plant_name", Text),
            col("plant_kind", Text),
            col("construction_type", Text),
            col("construction_year", Integer),
            col("installation_year", Integer),
            col("capacity_mw", Real),
            col("peak_demand_mw", Real),
            col("net_generation_mwh", Real),
            col("capex_total", Real),
            col("opex_operations", Real),
            col("opex_fuel", Real),
            col("asset_retirement_cost", Real),
        ],
        primary_key: &["plant_steam_id"],
        foreign_keys: &[UTILITY_FK, PLANT_FK],
    },
    IntegratedDef {
        table: IntegratedTable::FuelFerc1,
        columns: &[
            req("fuel_ferc1_id", Integer),
            req("utility_id_pudl", Integer),
            req("report_year", Integer),
            req("plant_name", Text),
            req("fuel_type_code_pudl", Text),
            col("fuel_unit", Text),
            col("fuel_qty_burned", Real),
            col("fuel_mmbtu_per_unit", Real),
            col("fuel_cost_per_unit_delivered", Real),
            col("fuel_cost_per_unit_burned", Real),
            col("fuel_cost_per_mmbtu", Real),
        ],
        primary_key: &["fuel_ferc1_id"],
        foreign_keys: &[UTILITY_FK, FUEL_FK],
    },
    IntegratedDef {
        table: IntegratedTable::PurchasedPowerFerc1,
        columns: &[
            req("purchased_power_id", Integer),
            req("utility_id_pudl", Integer),
            req("report_year", Integer),
            col("seller_name", Text),
            col("purchase_type", Text),
            col("purchased_mwh", Real),
            col("demand_charges", Real),
            col("energy_charges", Real),
            col("other_charges", Real),
            col("total_settlement", Real),
        ],
        primary_key: &["purchased_power_id"],
        foreign_keys: &[UTILITY_FK],
    },
];
