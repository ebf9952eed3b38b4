//! Claim merging for cross-source entities.
//!
//! Every staging row that mentions an entity becomes a [`Claim`]. Claims
//! sharing a natural key are merged attribute by attribute: the most
//! authoritative source for the entity kind wins, and within one source the
//! latest report year wins. Values are never combined arithmetically.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rusqlite::types::Value;
use serde::Serialize;

use crate::constants::{EntityKind, Source};

/// One source's statement about an entity in one report year.
#[derive(Debug, Clone)]
pub struct Claim<K> {
    pub key: K,
    pub source: Source,
    pub year: u16,
    pub attributes: BTreeMap<&'static str, Value>,
}

impl<K> Claim<K> {
    pub fn new(key: K, source: Source, year: u16) -> Self {
        Self {
            key,
            source,
            year,
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute; NULLs are not recorded, so they never win.
    pub fn with(mut self, name: &'static str, value: impl Into<Option<Value>>) -> Self {
        if let Some(value) = value.into().filter(|v| *v != Value::Null) {
            self.attributes.insert(name, value);
        }
        self
    }
}

/// The merged view of one entity.
#[derive(Debug, Clone)]
pub struct Merged<K> {
    pub key: K,
    pub attributes: BTreeMap<&'static str, Value>,
    pub sources: BTreeSet<Source>,
}

impl<K> Merged<K> {
    pub fn get(&self, name: &str) -> &Value {
        self.attributes.get(name).unwrap_or(&Value::Null)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Comma-joined source slugs, in source order.
    pub fn sources_label(&self) -> String {
        self.sources.iter().map(|s| s.slug()).collect::<Vec<_>>().join(",")
    }
}

/// Two sources disagreed about an attribute; `kept` came from `kept_source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub entity: EntityKind,
    pub key: String,
    pub attribute: &'static str,
    pub kept_source: Source,
    pub kept: String,
    pub overridden: Vec<(Source, String)>,
}

pub fn render(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Merge claims into one entity per key, in key order.
pub fn merge<K>(entity: EntityKind, claims: Vec<Claim<K>>) -> (Vec<Merged<K>>, Vec<Conflict>)
where
    K: Ord + Clone + fmt::Display,
{
    let mut grouped: BTreeMap<K, Vec<Claim<K>>> = BTreeMap::new();
    for claim in claims {
        grouped.entry(claim.key.clone()).or_default().push(claim);
    }

    let mut merged = Vec::with_capacity(grouped.len());
    let mut conflicts = Vec::new();
    for (key, mut group) in grouped {
        // Most authoritative first, then most recent.
        group.sort_by(|a, b| {
            entity
                .rank(a.source)
                .cmp(&entity.rank(b.source))
                .then(b.year.cmp(&a.year))
        });

        let names: BTreeSet<&'static str> = group.iter().flat_map(|c| c.attributes.keys().copied()).collect();
        let mut attributes = BTreeMap::new();
        for name in names {
            let mut candidates = group
                .iter()
                .filter_map(|c| c.attributes.get(name).map(|v| (c.source, v)));
            let Some((kept_source, kept)) = candidates.next() else {
                continue;
            };
            let mut overridden: Vec<(Source, String)> = Vec::new();
            for (source, value) in candidates {
                if source != kept_source && value != kept {
                    let rendered = (source, render(value));
                    if !overridden.contains(&rendered) {
                        overridden.push(rendered);
                    }
                }
            }
            if !overridden.is_empty() {
                conflicts.push(Conflict {
                    entity,
                    key: key.to_string(),
                    attribute: name,
                    kept_source,
                    kept: render(kept),
                    overridden,
                });
            }
            attributes.insert(name, kept.clone());
        }

        merged.push(Merged {
            key,
            sources: group.iter().map(|c| c.source).collect(),
            attributes,
        });
    }
    (merged, conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn authoritative_source_wins_conflicts() {
        let claims = vec![
            Claim::new(7, Source::Eia860, 2015).with("utility_name", text("PSCo")),
            Claim::new(7, Source::Ferc1, 2010).with("utility_name", text("Public Service Co of Colorado")),
        ];
        let (merged, conflicts) = merge(EntityKind::Utility, claims);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text("utility_name").as_deref(), Some("Public Service Co of Colorado"));
        assert_eq!(merged[0].sources_label(), "ferc1,eia860");
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kept_source, Source::Ferc1);
        assert_eq!(conflicts[0].overridden, vec![(Source::Eia860, "PSCo".to_string())]);
    }

    #[test]
    fn plants_prefer_eia() {
        let claims = vec![
            Claim::new(470, Source::Ferc1, 2015).with("plant_name", text("Comanche Station")),
            Claim::new(470, Source::Eia923, 2015).with("plant_name", text("Comanche (CO)")),
            Claim::new(470, Source::Eia860, 2012).with("plant_name", text("Comanche")),
        ];
        let (merged, _) = merge(EntityKind::Plant, claims);
        assert_eq!(merged[0].text("plant_name").as_deref(), Some("Comanche"));
    }

    #[test]
    fn latest_year_wins_within_a_source_without_conflict() {
        let claims = vec![
            Claim::new(1, Source::Eia860, 2011).with("state", text("CO")),
            Claim::new(1, Source::Eia860, 2014).with("state", text("WY")),
        ];
        let (merged, conflicts) = merge(EntityKind::Plant, claims);
        assert_eq!(merged[0].text("state").as_deref(), Some("WY"));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn missing_attributes_are_filled_from_lesser_sources() {
        let claims = vec![
            Claim::new(1, Source::Ferc1, 2015)
                .with("utility_name", text("Xcel"))
                .with("state", Value::Null),
            Claim::new(1, Source::Eia860, 2015)
                .with("utility_name", text("Xcel"))
                .with("entity_type", text("Investor Owned")),
        ];
        let (merged, conflicts) = merge(EntityKind::Utility, claims);
        assert_eq!(merged[0].text("entity_type").as_deref(), Some("Investor Owned"));
        assert_eq!(merged[0].get("state"), &Value::Null);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn numeric_attributes_are_never_averaged() {
        let claims = vec![
            Claim::new(1, Source::Eia923, 2015).with("latitude", Value::Real(40.0)),
            Claim::new(1, Source::Eia860, 2015).with("latitude", Value::Real(38.2)),
        ];
        let (merged, conflicts) = merge(EntityKind::Plant, claims);
        assert_eq!(merged[0].get("latitude"), &Value::Real(38.2));
        assert_eq!(conflicts[0].kept, "38.2");
    }

    #[test]
    fn keys_come_out_sorted() {
        let claims = vec![Claim::new(9, Source::Eia860, 2015), Claim::new(2, Source::Eia860, 2015)];
        let (merged, _) = merge(EntityKind::Plant, claims);
        assert_eq!(merged.iter().map(|m| m.key).collect::<Vec<_>>(), vec![2, 9]);
    }
}
