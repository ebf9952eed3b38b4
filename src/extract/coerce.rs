//! Cell-level type coercion into staging column types.

use std::borrow::Cow;

use chrono::NaiveDate;
use rusqlite::types::Value;

use crate::schema::{ColumnSpec, ColumnType};

/// Coerce one raw cell. Empty cells are NULL; the caller enforces NOT NULL.
pub fn coerce(raw: &str, column: &ColumnSpec) -> Result<Value, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    match column.ty {
        ColumnType::Integer => parse_integer(raw).map(Value::Integer),
        ColumnType::Real => parse_real(raw).map(Value::Real),
        ColumnType::Text => Ok(Value::Text(raw.to_string())),
        ColumnType::Boolean => parse_bool(raw).map(|b| Value::Integer(i64::from(b))),
        ColumnType::Date => parse_date(raw).map(|d| Value::Text(d.format("%Y-%m-%d").to_string())),
    }
}

fn strip_separators(raw: &str) -> Cow<'_, str> {
    if raw.contains(',') {
        Cow::Owned(raw.replace(',', ""))
    } else {
        Cow::Borrowed(raw)
    }
}

pub fn parse_integer(raw: &str) -> Result<i64, String> {
    let cleaned = strip_separators(raw);
    if let Ok(n) = cleaned.parse::<i64>() {
        return Ok(n);
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(format!("`{raw}` is not an integer")),
    }
}

pub fn parse_real(raw: &str) -> Result<f64, String> {
    strip_separators(raw)
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| format!("`{raw}` is not a number"))
}

pub fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "0" => Ok(false),
        _ => Err(format!("`{raw}` is not a boolean")),
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| format!("`{raw}` is not a date"))
}
