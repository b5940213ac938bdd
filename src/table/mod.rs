//! Partitioned Delta table façade.
//!
//! Atomic append and overwrite are provided by the Delta transaction log in
//! `deltalake`; this module derives partition columns and routes calls, it
//! never stages partial state of its own.

mod partition;
mod reader;
mod writer;

pub use partition::{with_partition_columns, PARTITION_COLUMNS};
pub use reader::{TableMetadata, TableReader};
pub use writer::{TableWriter, WriteOutcome};

use std::fmt;

use deltalake::protocol::SaveMode;

use crate::error::{Error, Result};

pub const DEFAULT_DATE_COLUMN: &str = "date";

/// Registers the S3 handlers with deltalake. Safe to call repeatedly.
pub fn ensure_handlers_registered() {
    deltalake::aws::register_handlers(None);
}

/// Storage root of a Delta table: a bucket plus a prefix inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableLocation {
    bucket: String,
    prefix: String,
}

impl TableLocation {
    pub fn new(bucket: &str, prefix: &str) -> Result<Self> {
        if bucket.is_empty() || bucket.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "invalid bucket '{}' for table location",
                bucket
            )));
        }

        let segments: Vec<&str> = prefix
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return Err(Error::InvalidArgument(
                "table path must not be empty".to_string(),
            ));
        }
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(Error::InvalidArgument(format!(
                "table path '{}' must not contain relative segments",
                prefix
            )));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            prefix: segments.join("/"),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl fmt::Display for TableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Append,
    Overwrite,
}

impl WriteMode {
    fn save_mode(self) -> SaveMode {
        match self {
            WriteMode::Append => SaveMode::Append,
            WriteMode::Overwrite => SaveMode::Overwrite,
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Append => f.write_str("append"),
            WriteMode::Overwrite => f.write_str("overwrite"),
        }
    }
}

/// Equality filter over the `year`/`month`/`day` partition columns. Unset
/// components match every value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionFilter {
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub day: Option<i32>,
}

impl PartitionFilter {
    pub fn date(date: chrono::NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            year: Some(date.year()),
            month: Some(date.month() as i32),
            day: Some(date.day() as i32),
        }
    }

    pub fn ymd(year: i32, month: i32, day: i32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
        }
    }

    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }

    /// Column/value pairs for the components that are set.
    pub fn predicates(&self) -> Vec<(&'static str, i32)> {
        [
            ("year", self.year),
            ("month", self.month),
            ("day", self.day),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_normalises_prefix() {
        let location = TableLocation::new("lake", "/events//daily/").unwrap();
        assert_eq!(location.bucket(), "lake");
        assert_eq!(location.prefix(), "events/daily");
        assert_eq!(location.to_string(), "lake/events/daily");
    }

    #[test]
    fn test_location_rejects_invalid_paths() {
        assert!(TableLocation::new("lake", "").is_err());
        assert!(TableLocation::new("lake", "///").is_err());
        assert!(TableLocation::new("lake", "a/../b").is_err());
        assert!(TableLocation::new("", "events").is_err());
        assert!(TableLocation::new("la/ke", "events").is_err());
    }

    #[test]
    fn test_partition_filter_predicates() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let filter = PartitionFilter::date(date);
        assert_eq!(
            filter.predicates(),
            vec![("year", 2024), ("month", 3), ("day", 7)]
        );

        let filter = PartitionFilter::year(2023);
        assert_eq!(filter.predicates(), vec![("year", 2023)]);
        assert!(!filter.is_empty());
        assert!(PartitionFilter::default().is_empty());
    }
}
