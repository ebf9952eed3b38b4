//! The merged `utilities` and `plants` entities and lookups into them.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::{debug, info};

use super::crosswalk::CrosswalkMatch;
use super::normalize::{clean_name, name_key};
use super::resolve::{merge, Claim, Merged};
use super::staging::StagingRow;
use super::{insert_rows, Exclusion, ExclusionReason, LoadReport, LoadYears, StagingSources};
use crate::constants::{EntityKind, Source};
use crate::error::Result;
use crate::tables::{IntegratedTable, StagingTable};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UtilityKey {
    Eia(i64),
    /// A respondent with no EIA counterpart.
    Ferc1(i64),
}

impl fmt::Display for UtilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UtilityKey::Eia(id) => write!(f, "eia:{id}"),
            UtilityKey::Ferc1(id) => write!(f, "ferc1:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlantKey {
    Eia(i64),
    /// A FERC plant with no EIA counterpart, by respondent and name key.
    Ferc1 { respondent_id: i64, name: String },
}

impl fmt::Display for PlantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlantKey::Eia(id) => write!(f, "eia:{id}"),
            PlantKey::Ferc1 { respondent_id, name } => write!(f, "ferc1:{respondent_id}:{name}"),
        }
    }
}

fn text(value: Option<String>) -> Value {
    Value::from(value)
}

fn exclude_ambiguous(report: &mut LoadReport, seen: &mut BTreeSet<String>, row: &StagingRow, record: String, candidates: Vec<i64>) {
    if seen.insert(record.clone()) {
        report.exclusions.push(Exclusion {
            table: row.table,
            record,
            reason: ExclusionReason::AmbiguousMerge { candidates },
        });
    }
}

fn utility_claims(
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<Vec<Claim<UtilityKey>>> {
    let mut claims = Vec::new();
    let mut ambiguous = BTreeSet::new();

    for row in sources.optional_rows(StagingTable::F1RespondentId, years)? {
        let Some(respondent_id) = row.int("respondent_id") else {
            continue;
        };
        let key = match sources.crosswalk().utility(respondent_id) {
            CrosswalkMatch::Mapped(eia) => UtilityKey::Eia(eia),
            CrosswalkMatch::Unmapped => UtilityKey::Ferc1(respondent_id),
            CrosswalkMatch::Ambiguous(candidates) => {
                exclude_ambiguous(report, &mut ambiguous, &row, format!("respondent {respondent_id}"), candidates);
                continue;
            }
        };
        let eia = match key {
            UtilityKey::Eia(id) => Some(id),
            UtilityKey::Ferc1(_) => None,
        };
        claims.push(
            Claim::new(key, Source::Ferc1, row.year)
                .with("utility_id_ferc1", Value::Integer(respondent_id))
                .with("utility_id_eia", Value::from(eia))
                .with("utility_name", text(row.text("respondent_name").and_then(|n| clean_name(&n))))
                .with("state", text(row.text("respondent_state"))),
        );
    }

    for row in sources.optional_rows(StagingTable::Eia860Utility, years)? {
        let Some(id) = row.int("utility_id") else {
            continue;
        };
        claims.push(
            Claim::new(UtilityKey::Eia(id), Source::Eia860, row.year)
                .with("utility_id_eia", Value::Integer(id))
                .with("utility_name", text(row.text("utility_name").and_then(|n| clean_name(&n))))
                .with("state", text(row.text("state")))
                .with("entity_type", text(row.text("entity_type"))),
        );
    }

    for row in sources.optional_rows(StagingTable::Eia923GenerationFuel, years)? {
        let Some(id) = row.int("operator_id") else {
            continue;
        };
        claims.push(
            Claim::new(UtilityKey::Eia(id), Source::Eia923, row.year)
                .with("utility_id_eia", Value::Integer(id))
                .with("utility_name", text(row.text("operator_name").and_then(|n| clean_name(&n)))),
        );
    }
    Ok(claims)
}

/// Merge utility claims from every available source and insert them.
pub(crate) fn load_utilities(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    let claims = utility_claims(sources, years, report)?;
    debug!("{} utility claims", claims.len());
    let (merged, conflicts) = merge(EntityKind::Utility, claims);
    report.conflicts.extend(conflicts);

    let mut rows = Vec::with_capacity(merged.len());
    for utility in &merged {
        let Some(name) = utility.text("utility_name") else {
            let origin = if utility.sources.contains(&Source::Ferc1) {
                StagingTable::F1RespondentId
            } else if utility.sources.contains(&Source::Eia860) {
                StagingTable::Eia860Utility
            } else {
                StagingTable::Eia923GenerationFuel
            };
            report.exclusions.push(Exclusion {
                table: origin,
                record: format!("utility {}", utility.key),
                reason: ExclusionReason::MissingRequired { column: "utility_name" },
            });
            continue;
        };
        let id = rows.len() as i64 + 1;
        rows.push(vec![
            Value::Integer(id),
            Value::Text(name),
            utility.get("utility_id_eia").clone(),
            utility.get("utility_id_ferc1").clone(),
            utility.get("state").clone(),
            utility.get("entity_type").clone(),
            Value::Text(utility.sources_label()),
        ]);
    }
    insert_rows(
        conn,
        IntegratedTable::Utilities,
        &[
            "utility_id_pudl",
            "utility_name",
            "utility_id_eia",
            "utility_id_ferc1",
            "state",
            "entity_type",
            "sources",
        ],
        &rows,
    )
}

/// Integrated utility ids by source identifier.
#[derive(Debug, Default)]
pub struct UtilityIndex {
    by_eia: HashMap<i64, i64>,
    by_ferc1: HashMap<i64, i64>,
}

impl UtilityIndex {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut index = Self::default();
        let mut stmt = conn.prepare("SELECT utility_id_pudl, utility_id_eia, utility_id_ferc1 FROM utilities")?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, Option<i64>>(1)?, r.get::<_, Option<i64>>(2)?))
        })?;
        for row in rows {
            let (pudl, eia, ferc1) = row?;
            if let Some(eia) = eia {
                index.by_eia.insert(eia, pudl);
            }
            if let Some(ferc1) = ferc1 {
                index.by_ferc1.insert(ferc1, pudl);
            }
        }
        Ok(index)
    }

    pub fn by_eia(&self, utility_id_eia: i64) -> Option<i64> {
        self.by_eia.get(&utility_id_eia).copied()
    }

    pub fn by_respondent(&self, respondent_id: i64) -> Option<i64> {
        self.by_ferc1.get(&respondent_id).copied()
    }
}

fn plant_claims(
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<Vec<Claim<PlantKey>>> {
    let mut claims = Vec::new();
    let mut ambiguous = BTreeSet::new();

    for row in sources.optional_rows(StagingTable::Eia860Plant, years)? {
        let Some(id) = row.int("plant_id") else {
            continue;
        };
        claims.push(
            Claim::new(PlantKey::Eia(id), Source::Eia860, row.year)
                .with("plant_id_eia", Value::Integer(id))
                .with("plant_name", text(row.text("plant_name").and_then(|n| clean_name(&n))))
                .with("utility_id_eia", Value::from(row.int("utility_id")))
                .with("city", text(row.text("city")))
                .with("state", text(row.text("state")))
                .with("county", text(row.text("county")))
                .with("latitude", Value::from(row.real("latitude")))
                .with("longitude", Value::from(row.real("longitude"))),
        );
    }

    for row in sources.optional_rows(StagingTable::Eia923GenerationFuel, years)? {
        let Some(id) = row.int("plant_id") else {
            continue;
        };
        claims.push(
            Claim::new(PlantKey::Eia(id), Source::Eia923, row.year)
                .with("plant_id_eia", Value::Integer(id))
                .with("plant_name", text(row.text("plant_name").and_then(|n| clean_name(&n))))
                .with("utility_id_eia", Value::from(row.int("operator_id")))
                .with("state", text(row.text("plant_state"))),
        );
    }

    for row in sources.optional_rows(StagingTable::F1Steam, years)? {
        let (Some(respondent_id), Some(name)) = (row.int("respondent_id"), row.text("plant_name")) else {
            continue;
        };
        let key = match sources.crosswalk().plant(respondent_id, &name) {
            CrosswalkMatch::Mapped(eia) => PlantKey::Eia(eia),
            CrosswalkMatch::Unmapped => PlantKey::Ferc1 {
                respondent_id,
                name: name_key(&name),
            },
            CrosswalkMatch::Ambiguous(candidates) => {
                let record = format!("respondent {respondent_id} plant {}", name_key(&name));
                exclude_ambiguous(report, &mut ambiguous, &row, record, candidates);
                continue;
            }
        };
        let eia = match key {
            PlantKey::Eia(id) => Some(id),
            PlantKey::Ferc1 { .. } => None,
        };
        claims.push(
            Claim::new(key, Source::Ferc1, row.year)
                .with("plant_id_eia", Value::from(eia))
                .with("plant_name", text(clean_name(&name)))
                .with("utility_id_ferc1", Value::Integer(respondent_id)),
        );
    }
    Ok(claims)
}

/// The integrated utility a merged plant belongs to. `Err` carries the
/// unresolved reference.
fn plant_utility(plant: &Merged<PlantKey>, utilities: &UtilityIndex) -> std::result::Result<Option<i64>, String> {
    if let Some(eia) = plant.int("utility_id_eia") {
        return utilities.by_eia(eia).map(Some).ok_or_else(|| format!("utility eia:{eia}"));
    }
    if let Some(respondent) = plant.int("utility_id_ferc1") {
        return utilities
            .by_respondent(respondent)
            .map(Some)
            .ok_or_else(|| format!("utility ferc1:{respondent}"));
    }
    Ok(None)
}

/// Merge plant claims and insert them; plants citing an unknown utility
/// are excluded as orphans.
pub(crate) fn load_plants(
    conn: &Connection,
    sources: &StagingSources<'_>,
    years: &LoadYears,
    report: &mut LoadReport,
) -> Result<u64> {
    let utilities = UtilityIndex::load(conn)?;
    let claims = plant_claims(sources, years, report)?;
    debug!("{} plant claims", claims.len());
    let (merged, conflicts) = merge(EntityKind::Plant, claims);
    report.conflicts.extend(conflicts);

    let mut rows = Vec::with_capacity(merged.len());
    for plant in &merged {
        let origin = if plant.sources.contains(&Source::Eia860) {
            StagingTable::Eia860Plant
        } else if plant.sources.contains(&Source::Eia923) {
            StagingTable::Eia923GenerationFuel
        } else {
            StagingTable::F1Steam
        };
        let utility = match plant_utility(plant, &utilities) {
            Ok(utility) => utility,
            Err(reference) => {
                report.exclusions.push(Exclusion {
                    table: origin,
                    record: format!("plant {}", plant.key),
                    reason: ExclusionReason::Orphan { reference },
                });
                continue;
            }
        };
        let Some(name) = plant.text("plant_name") else {
            report.exclusions.push(Exclusion {
                table: origin,
                record: format!("plant {}", plant.key),
                reason: ExclusionReason::MissingRequired { column: "plant_name" },
            });
            continue;
        };
        let id = rows.len() as i64 + 1;
        rows.push(vec![
            Value::Integer(id),
            Value::Text(name),
            plant.get("plant_id_eia").clone(),
            Value::from(utility),
            plant.get("city").clone(),
            plant.get("state").clone(),
            plant.get("county").clone(),
            plant.get("latitude").clone(),
            plant.get("longitude").clone(),
            Value::Text(plant.sources_label()),
        ]);
    }
    let loaded = insert_rows(
        conn,
        IntegratedTable::Plants,
        &[
            "plant_id_pudl",
            "plant_name",
            "plant_id_eia",
            "utility_id_pudl",
            "city",
            "state",
            "county",
            "latitude",
            "longitude",
            "sources",
        ],
        &rows,
    )?;
    info!("Resolved {} plants from {} merged entities", loaded, merged.len());
    Ok(loaded)
}

/// Integrated plant ids by EIA id, and by owner and name for FERC-only
/// plants.
#[derive(Debug, Default)]
pub struct PlantIndex {
    by_eia: HashMap<i64, i64>,
    ferc_only: HashMap<(i64, String), i64>,
}

impl PlantIndex {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut index = Self::default();
        let mut stmt = conn.prepare("SELECT plant_id_pudl, plant_id_eia, utility_id_pudl, plant_name FROM plants")?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, Option<i64>>(1)?,
                r.get::<_, Option<i64>>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?;
        for row in rows {
            let (pudl, eia, utility, name) = row?;
            match (eia, utility) {
                (Some(eia), _) => {
                    index.by_eia.insert(eia, pudl);
                }
                (None, Some(utility)) => {
                    index.ferc_only.insert((utility, name_key(&name)), pudl);
                }
                (None, None) => {}
            }
        }
        Ok(index)
    }

    pub fn by_eia(&self, plant_id_eia: i64) -> Option<i64> {
        self.by_eia.get(&plant_id_eia).copied()
    }

    /// The plant a FERC record names, through the crosswalk when mapped.
    pub fn for_ferc1(&self, sources: &StagingSources<'_>, respondent_id: i64, utility_id_pudl: i64, plant_name: &str) -> Option<i64> {
        match sources.crosswalk().plant(respondent_id, plant_name) {
            CrosswalkMatch::Mapped(eia) => self.by_eia(eia),
            CrosswalkMatch::Unmapped => self.ferc_only.get(&(utility_id_pudl, name_key(plant_name))).copied(),
            CrosswalkMatch::Ambiguous(_) => None,
        }
    }
}
