//! Partitions definitions owned by assets.
//!
//! A definition fixes the universe of partition keys an asset can have.
//! Time-window definitions grow as time passes: a window only exists once
//! it has closed, so the key universe is always evaluated as of an
//! effective time.

use crate::space::PartitionSubset;
use crate::window::TimeWindow;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use sluice_core::{CoreError, CoreResult, PartitionKey, Timestamp};
use std::collections::BTreeSet;

/// Partitions definition of one asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionsDefinition {
    /// The asset is a single unit
    #[default]
    Unpartitioned,
    /// Fixed, ordered set of keys
    Static(StaticPartitions),
    /// Fixed-cadence time windows
    TimeWindow(TimeWindowPartitions),
}

impl PartitionsDefinition {
    /// Static definition from keys
    ///
    /// # Errors
    ///
    /// Returns error if keys are empty, blank, or duplicated
    pub fn static_keys<I, S>(keys: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<PartitionKey>,
    {
        StaticPartitions::new(keys).map(Self::Static)
    }

    /// Hourly definition
    ///
    /// # Errors
    ///
    /// Returns error if the bounds are invalid
    pub fn hourly(start: Timestamp, end: Option<Timestamp>) -> CoreResult<Self> {
        TimeWindowPartitions::new(Cadence::Hourly, start, end).map(Self::TimeWindow)
    }

    /// Daily definition
    ///
    /// # Errors
    ///
    /// Returns error if the bounds are invalid or `start` is not midnight
    pub fn daily(start: Timestamp, end: Option<Timestamp>) -> CoreResult<Self> {
        TimeWindowPartitions::new(Cadence::Daily, start, end).map(Self::TimeWindow)
    }

    /// Whether the asset has partition keys at all
    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        !matches!(self, Self::Unpartitioned)
    }

    /// Get the time-window definition, if any
    #[must_use]
    pub fn as_time_window(&self) -> Option<&TimeWindowPartitions> {
        match self {
            Self::TimeWindow(tw) => Some(tw),
            _ => None,
        }
    }

    /// Get the static definition, if any
    #[must_use]
    pub fn as_static(&self) -> Option<&StaticPartitions> {
        match self {
            Self::Static(s) => Some(s),
            _ => None,
        }
    }

    /// Check internal consistency (used for deserialized definitions)
    ///
    /// # Errors
    ///
    /// Returns error describing the first problem found
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            Self::Unpartitioned => Ok(()),
            Self::Static(s) => s.validate(),
            Self::TimeWindow(tw) => tw.validate(),
        }
    }

    /// All keys valid as of `effective_dt`, in definition order
    #[must_use]
    pub fn partition_keys(&self, effective_dt: Timestamp) -> Vec<PartitionKey> {
        match self {
            Self::Unpartitioned => Vec::new(),
            Self::Static(s) => s.keys().iter().cloned().collect(),
            Self::TimeWindow(tw) => tw.partition_keys(effective_dt),
        }
    }

    /// Whether `key` is a valid key as of `effective_dt`
    #[must_use]
    pub fn has_partition_key(&self, key: &str, effective_dt: Timestamp) -> bool {
        match self {
            Self::Unpartitioned => false,
            Self::Static(s) => s.contains(key),
            Self::TimeWindow(tw) => tw.has_partition_key(key, effective_dt),
        }
    }

    /// The whole currently valid space
    #[must_use]
    pub fn complete_subset(&self, effective_dt: Timestamp) -> PartitionSubset {
        match self {
            Self::Unpartitioned => PartitionSubset::Unpartitioned { present: true },
            _ => PartitionSubset::Keys(self.partition_keys(effective_dt).into_iter().collect()),
        }
    }

    /// The empty subset of the right shape
    #[must_use]
    pub fn empty_subset(&self) -> PartitionSubset {
        match self {
            Self::Unpartitioned => PartitionSubset::Unpartitioned { present: false },
            _ => PartitionSubset::Keys(BTreeSet::new()),
        }
    }
}

/// Static partitions definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPartitions {
    keys: IndexSet<PartitionKey>,
}

impl StaticPartitions {
    /// Create from keys
    ///
    /// # Errors
    ///
    /// Returns error if keys are empty, blank, or duplicated
    pub fn new<I, S>(keys: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<PartitionKey>,
    {
        let mut set = IndexSet::new();
        for key in keys {
            let key = key.into();
            if !set.insert(key.clone()) {
                return Err(CoreError::InvalidPartitionKey {
                    key,
                    reason: "duplicate static partition key".to_string(),
                });
            }
        }
        let partitions = Self { keys: set };
        partitions.validate()?;
        Ok(partitions)
    }

    /// Check the definition is usable
    ///
    /// # Errors
    ///
    /// Returns error if there are no keys or a key is blank
    pub fn validate(&self) -> CoreResult<()> {
        if self.keys.is_empty() {
            return Err(CoreError::Validation {
                field: "static_partitions".to_string(),
                reason: "no partition keys".to_string(),
            });
        }
        if self.keys.iter().any(|k| k.is_empty()) {
            return Err(CoreError::InvalidPartitionKey {
                key: String::new(),
                reason: "blank static partition key".to_string(),
            });
        }
        Ok(())
    }

    /// Keys in definition order
    #[must_use]
    pub fn keys(&self) -> &IndexSet<PartitionKey> {
        &self.keys
    }

    /// Whether `key` is declared
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

/// Window length of a time-window definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// One hour
    Hourly,
    /// One day
    Daily,
    /// Seven days, aligned to the definition start
    Weekly,
    /// Fixed number of seconds
    Interval {
        /// Window length in seconds
        seconds: i64,
    },
}

impl Cadence {
    /// Window length in seconds
    #[must_use]
    pub const fn period_seconds(&self) -> i64 {
        match self {
            Self::Hourly => 3_600,
            Self::Daily => 86_400,
            Self::Weekly => 604_800,
            Self::Interval { seconds } => *seconds,
        }
    }

    /// strftime format of partition keys
    #[must_use]
    pub const fn key_format(&self) -> &'static str {
        match self {
            Self::Hourly => "%Y-%m-%d-%H:%M",
            Self::Daily | Self::Weekly => "%Y-%m-%d",
            Self::Interval { .. } => "%Y-%m-%dT%H:%M:%S",
        }
    }

    const fn has_time_of_day(&self) -> bool {
        matches!(self, Self::Hourly | Self::Interval { .. })
    }
}

/// Time-window partitions definition
///
/// Window `i` is `[start + i * period, start + (i + 1) * period)`. A
/// window exists once its end is at or before both `end` (if set) and
/// the effective time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowPartitions {
    /// Window length
    pub cadence: Cadence,
    /// Start of the first window
    pub start: Timestamp,
    /// Exclusive upper bound on window ends
    #[serde(default)]
    pub end: Option<Timestamp>,
}

impl TimeWindowPartitions {
    /// Create a definition
    ///
    /// # Errors
    ///
    /// Returns error if the bounds are invalid
    pub fn new(cadence: Cadence, start: Timestamp, end: Option<Timestamp>) -> CoreResult<Self> {
        let partitions = Self {
            cadence,
            start,
            end,
        };
        partitions.validate()?;
        Ok(partitions)
    }

    /// Check the definition is usable
    ///
    /// # Errors
    ///
    /// Returns error if the period is not positive or too long to count
    /// in milliseconds, `end` precedes `start`, or `start` cannot be
    /// written as a partition key
    pub fn validate(&self) -> CoreResult<()> {
        let period = self.cadence.period_seconds();
        if period <= 0 {
            return Err(CoreError::Validation {
                field: "cadence".to_string(),
                reason: "window length must be positive".to_string(),
            });
        }
        if period.checked_mul(1_000).is_none() {
            return Err(CoreError::Validation {
                field: "cadence".to_string(),
                reason: format!("window length of {period}s is out of range"),
            });
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(CoreError::Validation {
                    field: "end".to_string(),
                    reason: format!("end {} precedes start {}", end, self.start),
                });
            }
        }
        let start_key = self.format_key(self.start);
        if self.parse_key_instant(&start_key)? != self.start {
            return Err(CoreError::Validation {
                field: "start".to_string(),
                reason: format!(
                    "start {} is not aligned to the `{}` key format",
                    self.start,
                    self.cadence.key_format()
                ),
            });
        }
        Ok(())
    }

    /// Saturates for definitions that skipped `validate`
    fn period_millis(&self) -> i64 {
        self.cadence.period_seconds().saturating_mul(1_000).max(1)
    }

    fn format_key(&self, instant: Timestamp) -> PartitionKey {
        instant
            .as_datetime()
            .format(self.cadence.key_format())
            .to_string()
    }

    fn parse_key_instant(&self, key: &str) -> CoreResult<Timestamp> {
        let format = self.cadence.key_format();
        let naive = if self.cadence.has_time_of_day() {
            NaiveDateTime::parse_from_str(key, format).ok()
        } else {
            NaiveDate::parse_from_str(key, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        };
        naive
            .map(|n| Timestamp::from_datetime(Utc.from_utc_datetime(&n)))
            .ok_or_else(|| CoreError::InvalidPartitionKey {
                key: key.to_string(),
                reason: format!("does not match `{}`", format),
            })
    }

    /// Offset of `instant` from `start`, in milliseconds
    fn offset_millis(&self, instant: Timestamp) -> i64 {
        instant.signed_duration_since(&self.start).num_milliseconds()
    }

    fn window_at(&self, index: i64) -> Option<TimeWindow> {
        let period = self.cadence.period_seconds();
        let start = self
            .start
            .checked_add(TimeDelta::try_seconds(index.checked_mul(period)?)?)?;
        let end = start.checked_add(TimeDelta::try_seconds(period)?)?;
        Some(TimeWindow { start, end })
    }

    fn key_at(&self, index: i64) -> Option<PartitionKey> {
        self.window_at(index).map(|w| self.format_key(w.start))
    }

    /// Latest instant a window may end at, as of `effective_dt`
    fn limit(&self, effective_dt: Timestamp) -> Timestamp {
        match self.end {
            Some(end) if end < effective_dt => end,
            _ => effective_dt,
        }
    }

    /// Number of windows that exist as of `effective_dt`
    #[must_use]
    pub fn window_count(&self, effective_dt: Timestamp) -> i64 {
        let offset = self.offset_millis(self.limit(effective_dt));
        if offset <= 0 {
            0
        } else {
            offset / self.period_millis()
        }
    }

    /// Windows that exist as of `effective_dt`, oldest first
    #[must_use]
    pub fn time_windows(&self, effective_dt: Timestamp) -> Vec<TimeWindow> {
        (0..self.window_count(effective_dt))
            .filter_map(|i| self.window_at(i))
            .collect()
    }

    /// Keys that exist as of `effective_dt`, oldest first
    #[must_use]
    pub fn partition_keys(&self, effective_dt: Timestamp) -> Vec<PartitionKey> {
        (0..self.window_count(effective_dt))
            .filter_map(|i| self.key_at(i))
            .collect()
    }

    /// Window named by `key`
    ///
    /// # Errors
    ///
    /// Returns error if the key is malformed, misaligned, or outside the
    /// definition bounds (ignoring the effective time)
    pub fn time_window_for_key(&self, key: &str) -> CoreResult<TimeWindow> {
        let instant = self.parse_key_instant(key)?;
        let invalid = |reason: &str| CoreError::InvalidPartitionKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.format_key(instant) != key {
            return Err(invalid("not in canonical form"));
        }
        let offset = self.offset_millis(instant);
        if offset < 0 {
            return Err(invalid("before the first window"));
        }
        if offset % self.period_millis() != 0 {
            return Err(invalid("not aligned to a window start"));
        }
        let window = self
            .window_at(offset / self.period_millis())
            .ok_or_else(|| invalid("window out of range"))?;
        if let Some(end) = self.end {
            if window.end > end {
                return Err(invalid("after the last window"));
            }
        }
        Ok(window)
    }

    /// Whether `key` names a window that exists as of `effective_dt`
    #[must_use]
    pub fn has_partition_key(&self, key: &str, effective_dt: Timestamp) -> bool {
        self.time_window_for_key(key)
            .map(|w| w.end <= self.limit(effective_dt))
            .unwrap_or(false)
    }

    /// Key of the window containing `instant`, if inside the bounds
    #[must_use]
    pub fn partition_key_for_dt(&self, instant: Timestamp) -> Option<PartitionKey> {
        let offset = self.offset_millis(instant);
        if offset < 0 {
            return None;
        }
        let window = self.window_at(offset / self.period_millis())?;
        if let Some(end) = self.end {
            if window.end > end {
                return None;
            }
        }
        Some(self.format_key(window.start))
    }

    /// Keys of existing windows that overlap `window`
    #[must_use]
    pub fn keys_overlapping(&self, window: &TimeWindow, effective_dt: Timestamp) -> Vec<PartitionKey> {
        let count = self.window_count(effective_dt);
        if count == 0 || window.is_empty() {
            return Vec::new();
        }
        let period = self.period_millis();
        let first = self.offset_millis(window.start).div_euclid(period).max(0);
        let end_offset = self.offset_millis(window.end);
        if end_offset <= 0 {
            return Vec::new();
        }
        let last = (end_offset / period + i64::from(end_offset % period != 0)).min(count);
        (first..last).filter_map(|i| self.key_at(i)).collect()
    }

    /// The `n` most recent keys as of `effective_dt`, oldest first
    #[must_use]
    pub fn latest_keys(&self, n: usize, effective_dt: Timestamp) -> Vec<PartitionKey> {
        let count = self.window_count(effective_dt);
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        let first = count.saturating_sub(n).max(0);
        (first..count).filter_map(|i| self.key_at(i)).collect()
    }
}
