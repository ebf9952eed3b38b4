use rusqlite::types::Value;
use rusqlite::Connection;

use super::entities::{PlantIndex, UtilityIndex};
use super::normalize::fuel_type_from_energy_source;
use super::{insert_rows, Exclusion, ExclusionReason, LoadReport, LoadYears, StagingSources};
use crate::constants::FUEL_OTHER;
use crate::error::Result;
use crate::tables::{IntegratedTable, StagingTable};

const KEY: &[&str] = &["plant_id", "generator_id"];

/// EIA-860 generators, one row per plant, generator and year.
pub(crate) fn load_generators(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    let plants = PlantIndex::load(conn)?;
    let utilities = UtilityIndex::load(conn)?;
    let mut rows = Vec::new();
    for row in sources.rows(StagingTable::Eia860Generator, years)? {
        let plant_id = row.int("plant_id");
        let Some(plant) = plant_id.and_then(|id| plants.by_eia(id)) else {
            report.exclusions.push(Exclusion {
                table: row.table,
                record: row.describe(KEY),
                reason: ExclusionReason::Orphan {
                    reference: format!("plant eia:{}", plant_id.map_or("NULL".to_string(), |p| p.to_string())),
                },
            });
            continue;
        };
        let utility = match row.int("utility_id") {
            None => None,
            Some(eia) => match utilities.by_eia(eia) {
                Some(pudl) => Some(pudl),
                None => {
                    report.exclusions.push(Exclusion {
                        table: row.table,
                        record: row.describe(KEY),
                        reason: ExclusionReason::Orphan {
                            reference: format!("utility eia:{eia}"),
                        },
                    });
                    continue;
                }
            },
        };
        let Some(generator) = row.text("generator_id") else {
            continue;
        };
        let energy_source = row.text("energy_source_1").map(|s| s.to_ascii_uppercase());
        let fuel = energy_source
            .as_deref()
            .map_or(FUEL_OTHER, fuel_type_from_energy_source);
        rows.push(vec![
            Value::Integer(plant),
            Value::Text(generator),
            Value::Integer(i64::from(row.year)),
            Value::from(utility),
            Value::from(row.text("prime_mover").map(|p| p.to_ascii_uppercase())),
            Value::from(row.real("nameplate_capacity_mw")),
            Value::from(row.text("status")),
            Value::from(row.int("operating_year")),
            Value::from(energy_source),
            Value::Text(fuel.to_string()),
        ]);
    }
    insert_rows(
        conn,
        IntegratedTable::GeneratorsEia860,
        &[
            "plant_id_pudl",
            "generator_id",
            "report_year",
            "utility_id_pudl",
            "prime_mover_code",
            "nameplate_capacity_mw",
            "status",
            "operating_year",
            "energy_source_code",
            "fuel_type_code_pudl",
        ],
        &rows,
    )
}
