//! Unit conversion and code translation into the integrated vocabulary.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::constants::{ENERGY_SOURCE_TO_FUEL, FERC1_FUEL_STRINGS, FERC1_FUEL_UNITS, FUEL_OTHER};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static UNIT_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid unit noise regex"));

/// Collapse runs of whitespace and trim. Empty names become `None`.
pub fn clean_name(raw: &str) -> Option<String> {
    let cleaned = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Matching key for names: cleaned and lower-cased.
pub fn name_key(raw: &str) -> String {
    clean_name(raw).unwrap_or_default().to_lowercase()
}

/// EIA energy source code to integrated fuel type.
pub fn fuel_type_from_energy_source(code: &str) -> &'static str {
    let code = code.trim().to_ascii_uppercase();
    match ENERGY_SOURCE_TO_FUEL.get(code.as_str()) {
        Some(fuel) => fuel,
        None => {
            debug!("Unknown energy source code `{}`", code);
            FUEL_OTHER
        }
    }
}

/// Free-text FERC Form 1 fuel description to integrated fuel type.
pub fn fuel_type_from_ferc1(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    FERC1_FUEL_STRINGS
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, fuel)| *fuel)
        .unwrap_or_else(|| {
            debug!("Unrecognized FERC fuel `{}`", text);
            FUEL_OTHER
        })
}

/// FERC Form 1 fuel unit spelling to a canonical unit.
pub fn fuel_unit_from_ferc1(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    let key = UNIT_NOISE.replace_all(&lowered, "").into_owned();
    let unit = FERC1_FUEL_UNITS.iter().find(|(spelling, _)| *spelling == key).map(|(_, unit)| *unit);
    if unit.is_none() && !key.is_empty() {
        debug!("Unrecognized FERC fuel unit `{}`", text);
    }
    unit
}

pub fn kwh_to_mwh(kwh: f64) -> f64 {
    kwh / 1_000.0
}

pub fn btu_to_mmbtu(btu: f64) -> f64 {
    btu / 1_000_000.0
}

pub fn cents_to_dollars(cents: f64) -> f64 {
    cents / 100.0
}

/// First day of the reporting month, ISO formatted.
pub fn report_date(year: i64, month: i64) -> Option<String> {
    let year = i32::try_from(year).ok()?;
    let month = u32::try_from(month).ok()?;
    NaiveDate::from_ymd_opt(year, month, 1).map(|d| d.format("%Y-%m-%d").to_string())
}
