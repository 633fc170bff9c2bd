//! Half-open time windows.

use serde::{Deserialize, Serialize};
use sluice_core::{CoreError, CoreResult, Timestamp};
use std::fmt;

/// A half-open interval `[start, end)` of UTC time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start
    pub start: Timestamp,
    /// Exclusive end
    pub end: Timestamp,
}

impl TimeWindow {
    /// Create a window
    ///
    /// # Errors
    ///
    /// Returns error if `end` is before `start`
    pub fn new(start: Timestamp, end: Timestamp) -> CoreResult<Self> {
        if end < start {
            return Err(CoreError::Validation {
                field: "time_window".to_string(),
                reason: format!("end {} precedes start {}", end, start),
            });
        }
        Ok(Self { start, end })
    }

    /// Whether the window covers no time
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the two windows share any instant
    #[must_use]
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely inside this window
    #[must_use]
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the instant lies inside this window
    #[must_use]
    pub fn contains_instant(&self, instant: Timestamp) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> Timestamp {
        Timestamp::from_ymd(2021, 1, d).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted() {
        assert!(TimeWindow::new(day(2), day(1)).is_err());
        assert!(TimeWindow::new(day(1), day(1)).unwrap().is_empty());
    }

    #[test]
    fn test_overlaps_is_half_open() {
        let first = TimeWindow::new(day(1), day(2)).unwrap();
        let second = TimeWindow::new(day(2), day(3)).unwrap();
        let both = TimeWindow::new(day(1), day(3)).unwrap();

        assert!(!first.overlaps(&second));
        assert!(first.overlaps(&both));
        assert!(both.contains(&second));
        assert!(!second.contains(&both));
    }

    #[test]
    fn test_contains_instant() {
        let w = TimeWindow::new(day(1), day(2)).unwrap();
        assert!(w.contains_instant(day(1)));
        assert!(!w.contains_instant(day(2)));
    }
}
