//! Time types for sluice.
//!
//! All instants are UTC. Scheduling logic never reads the wall clock
//! directly; the effective time of a plan build is always passed in.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A UTC instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wrap a chrono datetime
    #[must_use]
    pub const fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Current wall clock time (callers pin it once per plan build)
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create from calendar fields
    ///
    /// # Errors
    ///
    /// Returns error if the fields do not name a valid instant
    pub fn from_ymd_hms(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> CoreResult<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .map(Self)
            .ok_or_else(|| CoreError::InvalidTimestamp {
                reason: format!(
                    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02} is not a valid UTC instant",
                    year, month, day, hour, minute, second
                ),
            })
    }

    /// Create midnight of a calendar day
    ///
    /// # Errors
    ///
    /// Returns error if the date is invalid
    pub fn from_ymd(year: i32, month: u32, day: u32) -> CoreResult<Self> {
        Self::from_ymd_hms(year, month, day, 0, 0, 0)
    }

    /// Parse an RFC 3339 string
    ///
    /// # Errors
    ///
    /// Returns error if the string is not RFC 3339
    pub fn parse_rfc3339(value: &str) -> CoreResult<Self> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| CoreError::InvalidTimestamp {
                reason: format!("`{}`: {}", value, e),
            })
    }

    /// Get the chrono datetime
    #[must_use]
    pub const fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Seconds since the Unix epoch
    #[must_use]
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// Add a span, `None` on overflow
    #[must_use]
    pub fn checked_add(&self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).map(Self)
    }

    /// Subtract a span, `None` on overflow
    #[must_use]
    pub fn checked_sub(&self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_sub_signed(delta).map(Self)
    }

    /// Signed span from `earlier` to `self`
    #[must_use]
    pub fn signed_duration_since(&self, earlier: &Timestamp) -> TimeDelta {
        self.0.signed_duration_since(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}
