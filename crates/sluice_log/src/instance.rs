//! In-memory instance event log.

use crate::event::{AssetEvent, EventKind, EventRef, ReportedEvent};
use crate::query::{InstanceQueryer, QueryError, QueryResult};
use crate::watermark::Watermark;
use sluice_core::{AssetKey, AssetPartition, EventId, Timestamp};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct LogState {
    events: Vec<AssetEvent>,
    /// Positions in `events`, ascending by id
    by_partition: BTreeMap<(AssetPartition, EventKind), Vec<usize>>,
}

/// Append-only, thread-safe event log
///
/// Ids are assigned from 1 upward in append order.
#[derive(Debug, Default)]
pub struct MemoryInstance {
    state: RwLock<LogState>,
}

impl MemoryInstance {
    /// Create an empty instance
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an instance holding the given events, in order
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be written
    pub fn from_reported_events<I>(events: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = ReportedEvent>,
    {
        let instance = Self::new();
        for event in events {
            instance.report(event)?;
        }
        Ok(instance)
    }

    /// Load a JSON array of reported events
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is not a list of events
    pub fn from_json_str(json: &str) -> QueryResult<Self> {
        let events: Vec<ReportedEvent> = serde_json::from_str(json).map_err(|e| QueryError::Malformed {
            reason: e.to_string(),
        })?;
        Self::from_reported_events(events)
    }

    fn read(&self) -> QueryResult<RwLockReadGuard<'_, LogState>> {
        self.state.read().map_err(|_| QueryError::Unavailable {
            reason: "event log lock poisoned".to_string(),
        })
    }

    fn write(&self) -> QueryResult<RwLockWriteGuard<'_, LogState>> {
        self.state.write().map_err(|_| QueryError::Unavailable {
            reason: "event log lock poisoned".to_string(),
        })
    }

    /// Append an event
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be written
    pub fn report(&self, event: ReportedEvent) -> QueryResult<EventId> {
        let mut state = self.write()?;
        let id = state
            .events
            .last()
            .map_or(EventId::from_raw(1), |last| last.id.next());
        let asset_partition = event.asset_partition();
        let position = state.events.len();
        state
            .by_partition
            .entry((asset_partition.clone(), event.kind))
            .or_default()
            .push(position);
        state.events.push(AssetEvent {
            id,
            kind: event.kind,
            asset_partition,
            timestamp: event.timestamp,
            data_version: event.data_version,
        });
        Ok(id)
    }

    /// Record a materialization
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be written
    pub fn report_materialization(&self, partition: AssetPartition, timestamp: Timestamp) -> QueryResult<EventId> {
        self.report(ReportedEvent::materialization(partition, timestamp))
    }

    /// Record an observation
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be written
    pub fn report_observation(&self, partition: AssetPartition, timestamp: Timestamp) -> QueryResult<EventId> {
        self.report(ReportedEvent::observation(partition, timestamp))
    }

    /// Number of stored events
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be read
    pub fn len(&self) -> QueryResult<usize> {
        Ok(self.read()?.events.len())
    }

    /// Whether no events are stored
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be read
    pub fn is_empty(&self) -> QueryResult<bool> {
        Ok(self.read()?.events.is_empty())
    }

    /// Copy of every stored event, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be read
    pub fn events(&self) -> QueryResult<Vec<AssetEvent>> {
        Ok(self.read()?.events.clone())
    }

    fn latest(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        kind: EventKind,
        watermark: &Watermark,
    ) -> QueryResult<Option<EventRef>> {
        let state = self.read()?;
        let partition = AssetPartition::new(asset_key.clone(), partition_key.map(str::to_string));
        let Some(positions) = state.by_partition.get(&(partition, kind)) else {
            return Ok(None);
        };
        Ok(positions
            .iter()
            .rev()
            .filter_map(|&i| state.events.get(i))
            .map(AssetEvent::event_ref)
            .find(|event| watermark.admits(event)))
    }
}

impl InstanceQueryer for MemoryInstance {
    fn latest_materialization_event(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        watermark: &Watermark,
    ) -> QueryResult<Option<EventRef>> {
        self.latest(asset_key, partition_key, EventKind::Materialization, watermark)
    }

    fn latest_observation_event(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        watermark: &Watermark,
    ) -> QueryResult<Option<EventRef>> {
        self.latest(asset_key, partition_key, EventKind::Observation, watermark)
    }

    fn latest_event_id(&self) -> QueryResult<Option<EventId>> {
        Ok(self.read()?.events.last().map(|e| e.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> AssetKey {
        AssetKey::from_user_string(name).unwrap()
    }

    fn hour(h: u32) -> Timestamp {
        Timestamp::from_ymd_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_ids_are_sequential() {
        let instance = MemoryInstance::new();
        assert_eq!(instance.latest_event_id().unwrap(), None);
        let first = instance
            .report_materialization(AssetPartition::unpartitioned(key("a")), hour(1))
            .unwrap();
        let second = instance
            .report_observation(AssetPartition::unpartitioned(key("b")), hour(2))
            .unwrap();
        assert_eq!(first, EventId::from_raw(1));
        assert_eq!(second, EventId::from_raw(2));
        assert_eq!(instance.latest_event_id().unwrap(), Some(second));
        assert_eq!(instance.len().unwrap(), 2);
    }

    #[test]
    fn test_latest_respects_watermark() {
        let instance = MemoryInstance::new();
        let p = AssetPartition::keyed(key("a"), "2024-01-01");
        let first = instance.report_materialization(p.clone(), hour(1)).unwrap();
        let second = instance.report_materialization(p.clone(), hour(3)).unwrap();

        let all = Watermark::new(hour(23), Some(second));
        let latest = instance
            .latest_materialization_event(&p.asset_key, p.partition(), &all)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second);

        let by_id = Watermark::new(hour(23), Some(first));
        let latest = instance
            .latest_materialization_event(&p.asset_key, p.partition(), &by_id)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, first);

        let by_time = Watermark::new(hour(2), Some(second));
        let latest = instance
            .latest_materialization_event(&p.asset_key, p.partition(), &by_time)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, first);

        let before = Watermark::new(hour(0), Some(second));
        assert!(instance
            .latest_materialization_event(&p.asset_key, p.partition(), &before)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_kinds_and_partitions_are_separate() {
        let instance = MemoryInstance::new();
        let p1 = AssetPartition::keyed(key("a"), "1");
        let id = instance.report_observation(p1.clone(), hour(1)).unwrap();
        let wm = Watermark::new(hour(5), Some(id));

        assert!(instance
            .latest_materialization_event(&p1.asset_key, p1.partition(), &wm)
            .unwrap()
            .is_none());
        assert!(instance
            .latest_observation_event(&p1.asset_key, p1.partition(), &wm)
            .unwrap()
            .is_some());
        assert!(instance
            .latest_observation_event(&p1.asset_key, Some("2"), &wm)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_from_json_str() {
        let instance = MemoryInstance::from_json_str(
            r#"[{"kind": "materialization", "asset_key": "a", "timestamp": "2024-01-01T01:00:00Z"}]"#,
        )
        .unwrap();
        assert_eq!(instance.events().unwrap()[0].asset_partition, AssetPartition::unpartitioned(key("a")));

        assert!(matches!(
            MemoryInstance::from_json_str("{}"),
            Err(QueryError::Malformed { .. })
        ));
    }
}
