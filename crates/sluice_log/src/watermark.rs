//! Watermarks that bound what a plan build may see of the event log.

use crate::event::EventRef;
use serde::{Deserialize, Serialize};
use sluice_core::{EventId, Timestamp};
use std::fmt;

/// The `(effective_dt, last_event_id)` point a plan build reads at
///
/// An event is visible iff its id is at or below `last_event_id` and its
/// timestamp is at or before `effective_dt`. A watermark with no
/// `last_event_id` sees no events at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Watermark {
    /// Evaluation time
    pub effective_dt: Timestamp,
    /// Newest visible event id
    pub last_event_id: Option<EventId>,
}

impl Watermark {
    /// Create a watermark
    #[must_use]
    pub const fn new(effective_dt: Timestamp, last_event_id: Option<EventId>) -> Self {
        Self {
            effective_dt,
            last_event_id,
        }
    }

    /// Whether the event is visible
    #[must_use]
    pub fn admits(&self, event: &EventRef) -> bool {
        self.last_event_id.is_some_and(|last| event.id <= last) && event.timestamp <= self.effective_dt
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_event_id {
            Some(id) => write!(f, "{} through {}", self.effective_dt, id),
            None => write!(f, "{} (no events)", self.effective_dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u64, hour: u32) -> EventRef {
        EventRef {
            id: EventId::from_raw(id),
            timestamp: Timestamp::from_ymd_hms(2024, 1, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_admits_by_id_and_time() {
        let noon = Timestamp::from_ymd_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let wm = Watermark::new(noon, Some(EventId::from_raw(5)));

        assert!(wm.admits(&event(5, 12)));
        assert!(!wm.admits(&event(6, 1)));
        assert!(!wm.admits(&event(1, 13)));
    }

    #[test]
    fn test_no_last_event_admits_nothing() {
        let wm = Watermark::new(Timestamp::from_ymd(2030, 1, 1).unwrap(), None);
        assert!(!wm.admits(&event(1, 0)));
        assert!(wm.to_string().ends_with("(no events)"));
    }
}
