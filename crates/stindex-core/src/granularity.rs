//! Time granularities and their canonical partition-key mapping.
//!
//! A [`Granularity`] defines two things and nothing else:
//!
//! - the name of the home directory holding partitions of that size, and
//! - a pure, deterministic mapping from a UTC timestamp to a partition key.
//!
//! Two records whose timestamps fall into the same bucket always yield the
//! identical key, across repeated calls and across process restarts. Keys
//! are plain ASCII and directory-name-safe, so they double as directory
//! names in both the slice home and the index home.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use snafu::Snafu;

/// The time-bucket size used to derive partition keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// One bucket per hour; keys look like `2024-03-14-10`.
    Hour,
    /// One bucket per calendar day; keys look like `2024-03-14`.
    Day,
    /// One bucket per ISO week; keys look like `2024-W11`. The ISO
    /// week-based year is used, so keys near year boundaries stay stable.
    Week,
    /// One bucket per calendar month; keys look like `2024-03`.
    Month,
    /// One bucket per calendar year; keys look like `2024`.
    Year,
}

/// Error returned when parsing an unrecognized granularity name.
///
/// This is a configuration error: the whole run is rejected before any
/// discovery or build work starts.
#[derive(Debug, Snafu)]
#[snafu(display(
    "unrecognized granularity '{value}' (expected one of: hour, day, week, month, year)"
))]
pub struct ParseGranularityError {
    /// The value that failed to parse.
    pub value: String,
}

impl Granularity {
    /// All supported granularities, coarsest last.
    pub const ALL: [Granularity; 5] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Year,
    ];

    /// Home-directory name for this granularity (`hour`, `day`, ...).
    ///
    /// Both the slice home and the index home use this name, which is what
    /// lets the catalog match partitions between the two trees.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }

    /// Map a UTC timestamp to its canonical partition key.
    ///
    /// The mapping is total over the chrono timestamp range and carries no
    /// hidden state. Coarser granularities collapse more timestamps onto
    /// the same key; under [`Granularity::Week`] the key uses the ISO
    /// week-based year, which can differ from the calendar year in the
    /// first and last days of a year.
    pub fn partition_key(&self, ts: DateTime<Utc>) -> String {
        match self {
            Granularity::Hour => ts.format("%Y-%m-%d-%H").to_string(),
            Granularity::Day => ts.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week = ts.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => ts.format("%Y-%m").to_string(),
            Granularity::Year => ts.format("%Y").to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Granularity {
    type Err = ParseGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            other => Err(ParseGranularityError {
                value: other.to_string(),
            }),
        }
    }
}
