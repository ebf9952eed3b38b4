//! FERC Form 1 staging tables into their integrated counterparts.

use rusqlite::types::Value;
use rusqlite::Connection;

use super::entities::{PlantIndex, UtilityIndex};
use super::normalize::{btu_to_mmbtu, clean_name, fuel_type_from_ferc1, fuel_unit_from_ferc1, kwh_to_mwh};
use super::staging::StagingRow;
use super::{insert_rows, Exclusion, ExclusionReason, LoadReport, LoadYears, StagingSources};
use crate::constants::FUEL_OTHER;
use crate::error::Result;
use crate::tables::{IntegratedTable, StagingTable};

const ROW_KEY: &[&str] = &["respondent_id", "spplmnt_num", "row_number"];

/// The integrated utility a FERC row's respondent resolved to, or an orphan
/// exclusion.
fn respondent_utility(row: &StagingRow, utilities: &UtilityIndex, report: &mut LoadReport) -> Option<(i64, i64)> {
    let respondent = row.int("respondent_id");
    match respondent.and_then(|r| utilities.by_respondent(r).map(|u| (r, u))) {
        Some(found) => Some(found),
        None => {
            report.exclusions.push(Exclusion {
                table: row.table,
                record: row.describe(ROW_KEY),
                reason: ExclusionReason::Orphan {
                    reference: format!("respondent {}", respondent.map_or("NULL".to_string(), |r| r.to_string())),
                },
            });
            None
        }
    }
}

/// Sum of the parts that are present; NULL when none are.
fn sum_present(parts: &[Option<f64>]) -> Option<f64> {
    parts
        .iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

pub(crate) fn load_plants_steam(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    let utilities = UtilityIndex::load(conn)?;
    let plants = PlantIndex::load(conn)?;
    let mut rows = Vec::new();
    for row in sources.rows(StagingTable::F1Steam, years)? {
        let Some((respondent, utility)) = respondent_utility(&row, &utilities, report) else {
            continue;
        };
        let Some(name) = row.text("plant_name").and_then(|n| clean_name(&n)) else {
            continue;
        };
        let plant = plants.for_ferc1(sources, respondent, utility, &name);
        let capex = sum_present(&[row.real("cost_land"), row.real("cost_structure"), row.real("cost_equipment")]);
        rows.push(vec![
            Value::Integer(rows.len() as i64 + 1),
            Value::Integer(utility),
            Value::from(plant),
            Value::Integer(i64::from(row.year)),
            Value::Text(name),
            Value::from(row.text("plant_kind")),
            Value::from(row.text("type_const")),
            Value::from(row.int("yr_const")),
            Value::from(row.int("yr_installed")),
            Value::from(row.real("tot_capacity")),
            Value::from(row.real("peak_demand")),
            Value::from(row.real("net_generation").map(kwh_to_mwh)),
            Value::from(capex),
            Value::from(row.real("expns_operations")),
            Value::from(row.real("expns_fuel")),
            Value::from(row.real("asset_retire_cost")),
        ]);
    }
    insert_rows(
        conn,
        IntegratedTable::PlantsSteamFerc1,
        &[
            "plant_steam_id",
            "utility_id_pudl",
            "plant_id_pudl",
            "report_year",
            "plant_name",
            "plant_kind",
            "construction_type",
            "construction_year",
            "installation_year",
            "capacity_mw",
            "peak_demand_mw",
            "net_generation_mwh",
            "capex_total",
            "opex_operations",
            "opex_fuel",
            "asset_retirement_cost",
        ],
        &rows,
    )
}

pub(crate) fn load_fuel(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    let utilities = UtilityIndex::load(conn)?;
    let mut rows = Vec::new();
    for row in sources.rows(StagingTable::F1Fuel, years)? {
        let Some((_, utility)) = respondent_utility(&row, &utilities, report) else {
            continue;
        };
        let Some(name) = row.text("plant_name").and_then(|n| clean_name(&n)) else {
            continue;
        };
        let fuel = row.text("fuel").map_or(FUEL_OTHER, |f| fuel_type_from_ferc1(&f));
        rows.push(vec![
            Value::Integer(rows.len() as i64 + 1),
            Value::Integer(utility),
            Value::Integer(i64::from(row.year)),
            Value::Text(name),
            Value::Text(fuel.to_string()),
            Value::from(row.text("fuel_unit").and_then(|u| fuel_unit_from_ferc1(&u)).map(str::to_string)),
            Value::from(row.real("fuel_quantity")),
            Value::from(row.real("fuel_avg_heat").map(btu_to_mmbtu)),
            Value::from(row.real("fuel_cost_delvd")),
            Value::from(row.real("fuel_cost_burned")),
            Value::from(row.real("fuel_cost_btu")),
        ]);
    }
    insert_rows(
        conn,
        IntegratedTable::FuelFerc1,
        &[
            "fuel_ferc1_id",
            "utility_id_pudl",
            "report_year",
            "plant_name",
            "fuel_type_code_pudl",
            "fuel_unit",
            "fuel_qty_burned",
            "fuel_mmbtu_per_unit",
            "fuel_cost_per_unit_delivered",
            "fuel_cost_per_unit_burned",
            "fuel_cost_per_mmbtu",
        ],
        &rows,
    )
}

pub(crate) fn load_purchased_power(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    let utilities = UtilityIndex::load(conn)?;
    let mut rows = Vec::new();
    for row in sources.rows(StagingTable::F1PurchasedPwr, years)? {
        let Some((_, utility)) = respondent_utility(&row, &utilities, report) else {
            continue;
        };
        rows.push(vec![
            Value::Integer(rows.len() as i64 + 1),
            Value::Integer(utility),
            Value::Integer(i64::from(row.year)),
            Value::from(row.text("athrty_co_name").and_then(|n| clean_name(&n))),
            Value::from(row.text("sttstcl_clssfctn")),
            Value::from(row.real("mwh_purchased")),
            Value::from(row.real("demand_charges")),
            Value::from(row.real("energy_charges")),
            Value::from(row.real("other_charges")),
            Value::from(row.real("settlement_tot")),
        ]);
    }
    insert_rows(
        conn,
        IntegratedTable::PurchasedPowerFerc1,
        &[
            "purchased_power_id",
            "utility_id_pudl",
            "report_year",
            "seller_name",
            "purchase_type",
            "purchased_mwh",
            "demand_charges",
            "energy_charges",
            "other_charges",
            "total_settlement",
        ],
        &rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capex_sums_only_reported_parts() {
        assert_eq!(sum_present(&[Some(1.0), None, Some(2.5)]), Some(3.5));
        assert_eq!(sum_present(&[None, None]), None);
    }
}
