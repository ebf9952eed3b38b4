use std::collections::HashMap;
use std::rc::Rc;

use rusqlite::types::Value;
use rusqlite::params_from_iter;
use tracing::debug;

use crate::constants::Source;
use crate::db::{quote_ident, DbHandle};
use crate::error::{ConfigError, Result};
use crate::tables::{RegisteredTable, StagingTable};
use crate::years::YearSpan;

/// One staging record, addressed by column name.
#[derive(Debug, Clone)]
pub struct StagingRow {
    pub table: StagingTable,
    pub year: u16,
    columns: Rc<HashMap<String, usize>>,
    values: Vec<Value>,
}

impl StagingRow {
    pub fn source(&self) -> Source {
        self.table.dataset()
    }

    pub fn value(&self, column: &str) -> &Value {
        self.columns
            .get(column)
            .and_then(|idx| self.values.get(*idx))
            .unwrap_or(&Value::Null)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        match self.value(column) {
            Value::Integer(n) => Some(*n),
            Value::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn real(&self, column: &str) -> Option<f64> {
        match self.value(column) {
            Value::Real(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn text(&self, column: &str) -> Option<String> {
        match self.value(column) {
            Value::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Integer(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Human-readable natural key for reports.
    pub fn describe(&self, key_columns: &[&str]) -> String {
        let parts: Vec<String> = key_columns
            .iter()
            .map(|c| match self.value(c) {
                Value::Null => format!("{c}=NULL"),
                Value::Integer(n) => format!("{c}={n}"),
                Value::Real(f) => format!("{c}={f}"),
                Value::Text(s) => format!("{c}={s}"),
                Value::Blob(_) => format!("{c}=<blob>"),
            })
            .collect();
        format!("{} {} [{}]", self.table, self.year, parts.join(", "))
    }
}

/// Read the rows of `table` for `years`, in storage order.
pub fn read_rows(handle: &DbHandle, table: StagingTable, years: &YearSpan) -> Result<Vec<StagingRow>> {
    if !handle.table_exists(table.name())? {
        return Err(ConfigError::TableNotDefined {
            table: table.to_string(),
        }
        .into());
    }
    let placeholders: Vec<String> = (1..=years.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT * FROM {} WHERE report_year IN ({}) ORDER BY rowid",
        quote_ident(table.name()),
        placeholders.join(", ")
    );
    let mut stmt = handle.conn().prepare(&sql)?;
    let columns: Rc<HashMap<String, usize>> = Rc::new(
        stmt.column_names()
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.to_ascii_lowercase(), i))
            .collect(),
    );
    let width = columns.len();
    let year_idx = columns.get("report_year").copied();

    let mut rows = Vec::new();
    let mut query = stmt.query(params_from_iter(years.iter()))?;
    while let Some(row) = query.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(row.get::<_, Value>(i)?);
        }
        let year = year_idx
            .and_then(|i| match values.get(i) {
                Some(Value::Integer(y)) => u16::try_from(*y).ok(),
                _ => None,
            })
            .unwrap_or_default();
        rows.push(StagingRow {
            table,
            year,
            columns: Rc::clone(&columns),
            values,
        });
    }
    debug!("Read {} rows from {}", rows.len(), table);
    Ok(rows)
}

/// Like [`read_rows`], but a table that was never extracted reads as empty.
pub fn read_rows_if_present(handle: &DbHandle, table: StagingTable, years: &YearSpan) -> Result<Vec<StagingRow>> {
    if handle.table_exists(table.name())? {
        read_rows(handle, table, years)
    } else {
        debug!("{} not present in staging, skipping", table);
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseKind;

    #[test]
    fn rows_are_filtered_by_year_and_addressed_by_name() {
        let handle = DbHandle::in_memory(DatabaseKind::Staging(Source::Eia860)).unwrap();
        handle
            .execute_ddl(
                "CREATE TABLE utility (utility_id INTEGER, report_year INTEGER, utility_name TEXT);
                 INSERT INTO utility VALUES (1, 2011, ' Xcel '), (1, 2012, 'Xcel Energy'), (2, 2013, NULL);",
            )
            .unwrap();
        let years = YearSpan::new(Source::Eia860, [2011, 2013]).unwrap();
        let rows = read_rows(&handle, StagingTable::Eia860Utility, &years).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].year, 2011);
        assert_eq!(rows[0].text("utility_name"), Some("Xcel".into()));
        assert_eq!(rows[1].text("utility_name"), None);
        assert_eq!(rows[1].int("utility_id"), Some(2));
        assert_eq!(rows[1].real("no_such_column"), None);
    }

    #[test]
    fn absent_table_is_an_error_unless_optional() {
        let handle = DbHandle::in_memory(DatabaseKind::Staging(Source::Eia860)).unwrap();
        let years = YearSpan::new(Source::Eia860, [2011]).unwrap();
        assert!(read_rows(&handle, StagingTable::Eia860Plant, &years).is_err());
        assert!(read_rows_if_present(&handle, StagingTable::Eia860Plant, &years)
            .unwrap()
            .is_empty());
    }
}
