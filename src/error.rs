use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::constants::Source;
use crate::db::{DatabaseKind, DbTarget};

/// Problems detected before any I/O: bad table names, out-of-range years,
/// unsafe database targets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown {dataset} table `{name}`")]
    UnknownTable { dataset: String, name: String },

    #[error("{dataset} has no published data for {year} (valid {first}..={last})")]
    YearOutOfRange {
        dataset: Source,
        year: u16,
        first: u16,
        last: u16,
    },

    #[error("no {dataset} years requested")]
    EmptyYears { dataset: Source },

    #[error("no tables selected")]
    EmptySelection,

    #[error("table `{table}` has no {dataset} schema defined for any year <= {year}")]
    NoSchemaForYear {
        dataset: Source,
        table: String,
        year: u16,
    },

    #[error("refusing to drop tables in the live {0} database")]
    LiveDropRefused(DatabaseKind),

    #[error("{kind} handle targets the {actual} instance but the run expects {expected}")]
    TargetMismatch {
        kind: DatabaseKind,
        expected: DbTarget,
        actual: DbTarget,
    },

    #[error("expected a {expected} handle, got {actual}")]
    KindMismatch {
        expected: DatabaseKind,
        actual: DatabaseKind,
    },

    #[error("table `{table}` already holds {rows} rows; drop it before extracting again")]
    NonEmptyTable { table: String, rows: u64 },

    #[error("table `{table}` is not part of the defined schema")]
    TableNotDefined { table: String },

    #[error("live table `{table}` does not match the resolved layout: {detail}")]
    LayoutMismatch { table: String, detail: String },

    #[error("the {0} database is already initialized; drop it first")]
    AlreadyInitialized(DatabaseKind),

    #[error("missing staging database for {0}")]
    MissingStaging(Source),

    #[error("invalid schema registry: {0}")]
    InvalidRegistry(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

/// One (table, year) partition that could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionFailure {
    pub table: String,
    pub year: u16,
    pub reason: String,
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.table, self.year, self.reason)
    }
}

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction failed for {} partition(s): {}", .0.len(), join_failures(.0))]
    Extraction(Vec<ExtractionFailure>),

    #[error("Database unreachable at {location}: {source}")]
    Connection {
        location: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_failures(failures: &[ExtractionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EtlError {
    /// Configuration errors are raised before any database work happens.
    pub fn is_config(&self) -> bool {
        matches!(self, EtlError::Config(_))
    }

    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            EtlError::Config(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_error_lists_every_partition() {
        let err = EtlError::Extraction(vec![
            ExtractionFailure {
                table: "f1_fuel".into(),
                year: 2009,
                reason: "missing partition".into(),
            },
            ExtractionFailure {
                table: "f1_fuel".into(),
                year: 2010,
                reason: "row 3: bad integer".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 partition(s)"));
        assert!(msg.contains("f1_fuel 2009: missing partition"));
        assert!(msg.contains("f1_fuel 2010"));
    }

    #[test]
    fn config_errors_are_flagged() {
        let err: EtlError = ConfigError::EmptySelection.into();
        assert!(err.is_config());
        assert_eq!(err.as_config(), Some(&ConfigError::EmptySelection));
    }
}
