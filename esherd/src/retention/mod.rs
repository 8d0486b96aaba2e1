//! Snapshot retention
//!
//! Keeps many recent snapshots and progressively fewer older ones. The
//! policy reserves a number of time buckets per granularity, anchored at the
//! newest snapshot and extending backward:
//!
//! ```text
//! catch-all | year × n | month × n | week × n | day × n | hour × n | newest
//! ```
//!
//! See [`plan`] for how snapshots are chosen from the buckets.

pub mod engine;
pub mod snapshooter;
pub mod timeseries;

pub use engine::{plan, RetentionPlan};
pub use snapshooter::{SnapshotReport, Snapshooter};
pub use timeseries::Timeseries;

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot names are timestamps, so lexical order is chronological order
pub const SNAPSHOT_NAME_FORMAT: &str = "%Y-%m-%dt%H-%M-%S";

/// Upper bound on the total number of buckets a policy may define
pub const MAX_BUCKETS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    /// Finest first
    pub const ALL: [Granularity; 5] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Year,
    ];

    /// Bucket width; months are 30 days and years 365 days
    pub fn width(&self) -> Duration {
        match self {
            Granularity::Hour => Duration::hours(1),
            Granularity::Day => Duration::days(1),
            Granularity::Week => Duration::weeks(1),
            Granularity::Month => Duration::days(30),
            Granularity::Year => Duration::days(365),
        }
    }
}

/// Number of buckets to keep per granularity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub hour: u32,
    #[serde(default)]
    pub day: u32,
    #[serde(default)]
    pub week: u32,
    #[serde(default)]
    pub month: u32,
    #[serde(default)]
    pub year: u32,
}

impl RetentionConfig {
    pub fn count(&self, granularity: Granularity) -> u32 {
        match granularity {
            Granularity::Hour => self.hour,
            Granularity::Day => self.day,
            Granularity::Week => self.week,
            Granularity::Month => self.month,
            Granularity::Year => self.year,
        }
    }

    /// Total number of buckets
    pub fn len(&self) -> u64 {
        Granularity::ALL.iter().map(|g| u64::from(self.count(*g))).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finest granularity with at least one bucket; snapshots should not
    /// be taken more often than this
    pub fn min_interval(&self) -> Option<Granularity> {
        Granularity::ALL
            .into_iter()
            .find(|g| self.count(*g) > 0)
    }

    /// At least one bucket and no more than [`MAX_BUCKETS`]
    pub fn validate(&self) -> Result<()> {
        let len = self.len();
        if len == 0 {
            return Err(Error::Config("snapshot retention defines no buckets".into()));
        }
        if len > MAX_BUCKETS {
            return Err(Error::Config(format!(
                "snapshot retention defines {} buckets, at most {} allowed",
                len, MAX_BUCKETS
            )));
        }
        Ok(())
    }
}

pub fn snapshot_name(t: DateTime<Utc>) -> String {
    t.format(SNAPSHOT_NAME_FORMAT).to_string()
}

/// Parse a snapshot name produced by [`snapshot_name`]
pub fn parse_snapshot_name(name: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(name, SNAPSHOT_NAME_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_min_interval() {
        let config = RetentionConfig {
            day: 7,
            month: 12,
            ..Default::default()
        };
        assert_eq!(config.min_interval(), Some(Granularity::Day));
        assert_eq!(config.len(), 19);
        assert_eq!(RetentionConfig::default().min_interval(), None);
        assert!(RetentionConfig::default().is_empty());
    }

    #[test]
    fn test_len_does_not_overflow() {
        let config = RetentionConfig {
            hour: u32::MAX,
            day: u32::MAX,
            ..Default::default()
        };
        assert_eq!(config.len(), 2 * u64::from(u32::MAX));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at most 10000"));
    }

    #[test]
    fn test_validate_bounds() {
        assert!(RetentionConfig::default().validate().is_err());
        let config = RetentionConfig {
            hour: 24,
            day: 7,
            year: 10,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        let config = RetentionConfig {
            year: 1_000_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_snapshot_name_round_trip() {
        let t = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        let name = snapshot_name(t);
        assert_eq!(name, "2006-01-02t15-04-05");
        assert_eq!(parse_snapshot_name(&name), Some(t));
    }

    #[test]
    fn test_snapshot_names_sort_chronologically() {
        let a = snapshot_name(Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap());
        let b = snapshot_name(Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap());
        assert!(a < b);
    }

    #[test]
    fn test_foreign_names_do_not_parse() {
        assert_eq!(parse_snapshot_name("nightly-backup"), None);
        assert_eq!(parse_snapshot_name(""), None);
    }

    #[test]
    fn test_config_from_toml() {
        let config: RetentionConfig = toml::from_str("hour = 24\nday = 6\n").unwrap();
        assert_eq!(config.hour, 24);
        assert_eq!(config.day, 6);
        assert_eq!(config.year, 0);
    }
}
