//! Event types for the asset event log.

use serde::{Deserialize, Serialize};
use sluice_core::{AssetKey, AssetPartition, EventId, PartitionKey, Timestamp};

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The partition was (re)computed
    Materialization,
    /// An external data version was checked without recomputation
    Observation,
}

/// Id and time of a stored event, as returned by queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRef {
    /// Storage id
    pub id: EventId,
    /// When the event happened
    pub timestamp: Timestamp,
}

impl EventRef {
    /// Whether this event is newer than `other` (always true if there is none)
    #[must_use]
    pub fn is_newer_than(&self, other: Option<&EventRef>) -> bool {
        other.is_none_or(|o| self.id > o.id)
    }

    /// The later of two optional events, by storage id
    #[must_use]
    pub fn latest(a: Option<EventRef>, b: Option<EventRef>) -> Option<EventRef> {
        match (a, b) {
            (Some(a), Some(b)) => Some(if b.id > a.id { b } else { a }),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

/// A stored event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEvent {
    /// Storage id, assigned on append
    pub id: EventId,
    /// Event kind
    pub kind: EventKind,
    /// Asset partition the event is about
    pub asset_partition: AssetPartition,
    /// When the event happened
    pub timestamp: Timestamp,
    /// Data version reported with the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_version: Option<String>,
}

impl AssetEvent {
    /// Id and time of this event
    #[must_use]
    pub const fn event_ref(&self) -> EventRef {
        EventRef {
            id: self.id,
            timestamp: self.timestamp,
        }
    }
}

/// An event as reported to an instance, before it has an id
///
/// This is also the record format of JSON event log files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedEvent {
    /// Event kind
    pub kind: EventKind,
    /// Asset the event is about
    pub asset_key: AssetKey,
    /// Partition, for partitioned assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionKey>,
    /// When the event happened
    pub timestamp: Timestamp,
    /// Reported data version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_version: Option<String>,
}

impl ReportedEvent {
    /// Materialization of `partition` at `timestamp`
    #[must_use]
    pub fn materialization(partition: AssetPartition, timestamp: Timestamp) -> Self {
        Self::new(EventKind::Materialization, partition, timestamp)
    }

    /// Observation of `partition` at `timestamp`
    #[must_use]
    pub fn observation(partition: AssetPartition, timestamp: Timestamp) -> Self {
        Self::new(EventKind::Observation, partition, timestamp)
    }

    fn new(kind: EventKind, partition: AssetPartition, timestamp: Timestamp) -> Self {
        Self {
            kind,
            asset_key: partition.asset_key,
            partition: partition.partition_key,
            timestamp,
            data_version: None,
        }
    }

    /// Attach a data version
    #[must_use]
    pub fn with_data_version(mut self, version: impl Into<String>) -> Self {
        self.data_version = Some(version.into());
        self
    }

    /// Asset partition the event is about
    #[must_use]
    pub fn asset_partition(&self) -> AssetPartition {
        AssetPartition::new(self.asset_key.clone(), self.partition.clone())
    }
}
