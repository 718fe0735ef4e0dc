//! Period naming for shard files
//!
//! Shards are named from the start of the period they cover:
//! `YYYY` for yearly, `YYYYMM` for monthly and `YYYYQn` for quarterly
//! sharding.

use crate::storage::error::StorageError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sharding granularity, fixed per store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SplitFrequency {
    Year,
    Month,
    #[default]
    Quarter,
}

impl SplitFrequency {
    /// Number of sub-periods per year (1 for yearly sharding)
    fn cycle_len(&self) -> u32 {
        match self {
            SplitFrequency::Year => 1,
            SplitFrequency::Month => 12,
            SplitFrequency::Quarter => 4,
        }
    }

    /// Sub-period of `date` within its year, starting at 1
    fn minor(&self, date: NaiveDate) -> u32 {
        match self {
            SplitFrequency::Year => 1,
            SplitFrequency::Month => date.month(),
            SplitFrequency::Quarter => (date.month() - 1) / 3 + 1,
        }
    }

    fn format(&self, year: i32, minor: u32) -> String {
        match self {
            SplitFrequency::Year => format!("{:04}", year),
            SplitFrequency::Month => format!("{:04}{:02}", year, minor),
            SplitFrequency::Quarter => format!("{:04}Q{}", year, minor),
        }
    }
}

impl fmt::Display for SplitFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitFrequency::Year => write!(f, "YEAR"),
            SplitFrequency::Month => write!(f, "MONTH"),
            SplitFrequency::Quarter => write!(f, "QUARTER"),
        }
    }
}

impl FromStr for SplitFrequency {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YEAR" => Ok(SplitFrequency::Year),
            "MONTH" => Ok(SplitFrequency::Month),
            "QUARTER" => Ok(SplitFrequency::Quarter),
            other => Err(StorageError::Config(format!(
                "unknown split frequency: {}",
                other
            ))),
        }
    }
}

/// Shard name of the period containing `date`
pub fn period_key(date: NaiveDate, frequency: SplitFrequency) -> String {
    frequency.format(date.year(), frequency.minor(date))
}

/// Every period key touched by `[start, end]`, inclusive, in order
///
/// Walks a (year, minor) cursor like a clock: `minor` cycles through the
/// sub-periods of a year and rolls the year over on overflow.
pub fn period_key_range(start: NaiveDate, end: NaiveDate, frequency: SplitFrequency) -> Vec<String> {
    let cycle_len = frequency.cycle_len();
    let (end_year, end_minor) = (end.year(), frequency.minor(end));
    let (mut year, mut minor) = (start.year(), frequency.minor(start));

    let mut out = Vec::new();
    while year < end_year || (year == end_year && minor <= end_minor) {
        out.push(frequency.format(year, minor));
        minor += 1;
        if minor > cycle_len {
            year += 1;
            minor = 1;
        }
    }
    out
}
