use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::constants::Source;
use crate::error::{ConfigError, Result};

/// The inclusive range of years a source has published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkingYears {
    pub source: Source,
    pub first: u16,
    pub last: u16,
}

impl WorkingYears {
    pub fn of(source: Source) -> Self {
        let (first, last) = source.working_years();
        Self { source, first, last }
    }

    pub fn contains(&self, year: u16) -> bool {
        (self.first..=self.last).contains(&year)
    }

    pub fn check(&self, year: u16) -> std::result::Result<(), ConfigError> {
        if self.contains(year) {
            Ok(())
        } else {
            Err(ConfigError::YearOutOfRange {
                dataset: self.source,
                year,
                first: self.first,
                last: self.last,
            })
        }
    }

    pub fn all(&self) -> YearSpan {
        YearSpan {
            source: self.source,
            years: (self.first..=self.last).collect(),
        }
    }

    /// First day of the earliest working year.
    pub fn start_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(i32::from(self.first), 1, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the latest working year.
    pub fn end_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(i32::from(self.last), 12, 31).unwrap_or(NaiveDate::MAX)
    }
}

/// A validated set of years for one source, in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearSpan {
    source: Source,
    years: BTreeSet<u16>,
}

impl YearSpan {
    pub fn new(source: Source, years: impl IntoIterator<Item = u16>) -> Result<Self> {
        let range = WorkingYears::of(source);
        let years: BTreeSet<u16> = years.into_iter().collect();
        if years.is_empty() {
            return Err(ConfigError::EmptyYears { dataset: source }.into());
        }
        for year in &years {
            range.check(*year)?;
        }
        Ok(Self { source, years })
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.years.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn contains(&self, year: u16) -> bool {
        self.years.contains(&year)
    }

    pub fn min(&self) -> u16 {
        self.years.iter().next().copied().unwrap_or_default()
    }

    pub fn max(&self) -> u16 {
        self.years.iter().next_back().copied().unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<u16> {
        self.years.iter().copied().collect()
    }
}

/// The single year whose schema versions are materialized by a
/// schema-definition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReferenceYear {
    source: Source,
    year: u16,
}

impl ReferenceYear {
    pub fn new(source: Source, year: u16) -> Result<Self> {
        WorkingYears::of(source).check(year)?;
        Ok(Self { source, year })
    }

    /// The latest working year of the source.
    pub fn latest(source: Source) -> Self {
        Self {
            source,
            year: WorkingYears::of(source).last,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn year(&self) -> u16 {
        self.year
    }
}
