//! EIA-923 generation and fuel receipt tables.

use rusqlite::types::Value;
use rusqlite::Connection;

use super::entities::PlantIndex;
use super::normalize::{cents_to_dollars, fuel_type_from_energy_source, report_date};
use super::staging::StagingRow;
use super::{insert_rows, EmittedKeys, Exclusion, ExclusionReason, LoadReport, LoadYears, StagingSources};
use crate::error::Result;
use crate::tables::{IntegratedTable, StagingTable};

/// Integrated plant and report date for a monthly EIA-923 row; orphans and
/// undatable rows are recorded and skipped.
fn plant_and_date(row: &StagingRow, key: &[&str], plants: &PlantIndex, report: &mut LoadReport) -> Option<(i64, String)> {
    let plant_id = row.int("plant_id");
    let Some(plant) = plant_id.and_then(|id| plants.by_eia(id)) else {
        report.exclusions.push(Exclusion {
            table: row.table,
            record: row.describe(key),
            reason: ExclusionReason::Orphan {
                reference: format!("plant eia:{}", plant_id.map_or("NULL".to_string(), |p| p.to_string())),
            },
        });
        return None;
    };
    let Some(date) = row.int("report_month").and_then(|m| report_date(i64::from(row.year), m)) else {
        report.exclusions.push(Exclusion {
            table: row.table,
            record: row.describe(key),
            reason: ExclusionReason::MissingRequired { column: "report_month" },
        });
        return None;
    };
    Some((plant, date))
}

pub(crate) fn load_generation(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    const KEY: &[&str] = &["plant_id", "generator_id", "report_month"];
    let plants = PlantIndex::load(conn)?;
    let mut emitted = EmittedKeys::default();
    let mut rows = Vec::new();
    for row in sources.rows(StagingTable::Eia923Generator, years)? {
        let Some((plant, date)) = plant_and_date(&row, KEY, &plants, report) else {
            continue;
        };
        let Some(generator) = row.text("generator_id") else {
            continue;
        };
        if !emitted.admit(&row, KEY, format!("{plant}/{generator}/{date}"), report) {
            continue;
        }
        rows.push(vec![
            Value::Integer(plant),
            Value::Text(generator),
            Value::Text(date),
            Value::from(row.real("net_generation_mwh")),
        ]);
    }
    insert_rows(
        conn,
        IntegratedTable::GenerationEia923,
        &["plant_id_pudl", "generator_id", "report_date", "net_generation_mwh"],
        &rows,
    )
}

pub(crate) fn load_generation_fuel(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    const KEY: &[&str] = &["plant_id", "report_month", "prime_mover", "fuel_type"];
    let plants = PlantIndex::load(conn)?;
    let mut emitted = EmittedKeys::default();
    let mut rows = Vec::new();
    for row in sources.rows(StagingTable::Eia923GenerationFuel, years)? {
        let Some((plant, date)) = plant_and_date(&row, KEY, &plants, report) else {
            continue;
        };
        let (Some(prime_mover), Some(energy_source)) = (row.text("prime_mover"), row.text("fuel_type")) else {
            continue;
        };
        let prime_mover = prime_mover.to_ascii_uppercase();
        let energy_source = energy_source.to_ascii_uppercase();
        if !emitted.admit(&row, KEY, format!("{plant}/{date}/{prime_mover}/{energy_source}"), report) {
            continue;
        }
        rows.push(vec![
            Value::Integer(plant),
            Value::Text(date),
            Value::Text(prime_mover),
            Value::Text(fuel_type_from_energy_source(&energy_source).to_string()),
            Value::Text(energy_source),
            Value::from(row.real("total_fuel_consumption_mmbtu")),
            Value::from(row.real("elec_fuel_consumption_mmbtu")),
            Value::from(row.real("net_generation_mwh")),
        ]);
    }
    insert_rows(
        conn,
        IntegratedTable::GenerationFuelEia923,
        &[
            "plant_id_pudl",
            "report_date",
            "prime_mover_code",
            "fuel_type_code_pudl",
            "energy_source_code",
            "fuel_consumed_mmbtu",
            "fuel_consumed_for_electricity_mmbtu",
            "net_generation_mwh",
        ],
        &rows,
    )
}

pub(crate) fn load_fuel_receipts_costs(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    const KEY: &[&str] = &["plant_id", "report_month", "supplier_name", "energy_source"];
    let plants = PlantIndex::load(conn)?;
    let mut rows = Vec::new();
    for row in sources.rows(StagingTable::Eia923FuelReceiptsCosts, years)? {
        let Some((plant, date)) = plant_and_date(&row, KEY, &plants, report) else {
            continue;
        };
        let Some(energy_source) = row.text("energy_source").map(|s| s.to_ascii_uppercase()) else {
            continue;
        };
        rows.push(vec![
            Value::Integer(rows.len() as i64 + 1),
            Value::Integer(plant),
            Value::Text(date),
            Value::from(row.text("supplier_name")),
            Value::Text(fuel_type_from_energy_source(&energy_source).to_string()),
            Value::Text(energy_source),
            Value::from(row.text("fuel_group")),
            Value::from(row.text("contract_type")),
            Value::from(row.real("quantity")),
            Value::from(row.real("average_heat_content")),
            Value::from(row.real("average_sulfur_content")),
            Value::from(row.real("average_ash_content")),
            Value::from(row.real("fuel_cost").map(cents_to_dollars)),
        ]);
    }
    insert_rows(
        conn,
        IntegratedTable::FuelReceiptsCostsEia923,
        &[
            "fuel_receipt_id",
            "plant_id_pudl",
            "report_date",
            "supplier_name",
            "fuel_type_code_pudl",
            "energy_source_code",
            "fuel_group",
            "contract_type",
            "fuel_qty_units",
            "heat_content_mmbtu_per_unit",
            "sulfur_content_pct",
            "ash_content_pct",
            "fuel_cost_per_mmbtu",
        ],
        &rows,
    )
}
