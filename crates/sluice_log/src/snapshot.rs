//! Watermark-bound, memoizing reader over an instance.
//!
//! A plan build reads the event log only through one `SnapshotReader`,
//! so every lookup it makes sees the same watermark. Results are cached
//! per `(asset partition, event kind)` for the reader's lifetime; the
//! cache never changes an answer, it only saves storage round trips.
//! The reader is `Sync`, so builds on several threads may share one.

use crate::event::{EventKind, EventRef};
use crate::query::{InstanceQueryer, QueryError, QueryResult};
use crate::watermark::Watermark;
use sluice_core::AssetPartition;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

type CacheKey = (AssetPartition, EventKind);

/// Single-watermark reader over an instance
pub struct SnapshotReader {
    instance: Arc<dyn InstanceQueryer>,
    watermark: Watermark,
    cache: RwLock<HashMap<CacheKey, Option<EventRef>>>,
}

impl SnapshotReader {
    /// Create a reader pinned to `watermark`
    #[must_use]
    pub fn new(instance: Arc<dyn InstanceQueryer>, watermark: Watermark) -> Self {
        Self {
            instance,
            watermark,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The watermark every lookup uses
    #[must_use]
    pub const fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Latest visible materialization of `partition`
    ///
    /// # Errors
    ///
    /// Returns error if the instance cannot be read
    pub fn latest_materialization(&self, partition: &AssetPartition) -> QueryResult<Option<EventRef>> {
        self.lookup(partition, EventKind::Materialization)
    }

    /// Latest visible observation of `partition`
    ///
    /// # Errors
    ///
    /// Returns error if the instance cannot be read
    pub fn latest_observation(&self, partition: &AssetPartition) -> QueryResult<Option<EventRef>> {
        self.lookup(partition, EventKind::Observation)
    }

    /// Latest visible materialization or observation of `partition`
    ///
    /// # Errors
    ///
    /// Returns error if the instance cannot be read
    pub fn latest_update(&self, partition: &AssetPartition) -> QueryResult<Option<EventRef>> {
        Ok(EventRef::latest(
            self.latest_materialization(partition)?,
            self.latest_observation(partition)?,
        ))
    }

    /// Number of cached lookups
    #[must_use]
    pub fn cached_lookups(&self) -> usize {
        self.cache.read().map_or(0, |cache| cache.len())
    }

    fn poisoned() -> QueryError {
        QueryError::Unavailable {
            reason: "snapshot cache lock poisoned".to_string(),
        }
    }

    fn lookup(&self, partition: &AssetPartition, kind: EventKind) -> QueryResult<Option<EventRef>> {
        let key = (partition.clone(), kind);
        if let Some(hit) = self.cache.read().map_err(|_| Self::poisoned())?.get(&key) {
            return Ok(*hit);
        }
        tracing::trace!(partition = %partition, ?kind, "event log lookup");
        let (asset_key, partition_key) = (&partition.asset_key, partition.partition());
        let event = match kind {
            EventKind::Materialization => {
                self.instance
                    .latest_materialization_event(asset_key, partition_key, &self.watermark)?
            }
            EventKind::Observation => {
                self.instance
                    .latest_observation_event(asset_key, partition_key, &self.watermark)?
            }
        };
        self.cache.write().map_err(|_| Self::poisoned())?.insert(key, event);
        Ok(event)
    }
}

impl fmt::Debug for SnapshotReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("watermark", &self.watermark)
            .field("cached_lookups", &self.cached_lookups())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::MemoryInstance;
    use sluice_core::{AssetKey, EventId, Timestamp};

    fn partition() -> AssetPartition {
        AssetPartition::keyed(AssetKey::from_user_string("a").unwrap(), "1")
    }

    fn hour(h: u32) -> Timestamp {
        Timestamp::from_ymd_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_later_events_are_invisible() {
        let instance = Arc::new(MemoryInstance::new());
        let first = instance.report_materialization(partition(), hour(1)).unwrap();
        let reader = SnapshotReader::new(instance.clone(), Watermark::new(hour(12), Some(first)));

        instance.report_materialization(partition(), hour(2)).unwrap();
        instance.report_observation(partition(), hour(2)).unwrap();

        assert_eq!(reader.latest_materialization(&partition()).unwrap().unwrap().id, first);
        assert_eq!(reader.latest_update(&partition()).unwrap().unwrap().id, first);
    }

    #[test]
    fn test_latest_update_prefers_newer_kind() {
        let instance = Arc::new(MemoryInstance::new());
        instance.report_materialization(partition(), hour(1)).unwrap();
        let observed = instance.report_observation(partition(), hour(2)).unwrap();
        let reader = SnapshotReader::new(instance, Watermark::new(hour(12), Some(observed)));

        assert_eq!(reader.latest_update(&partition()).unwrap().unwrap().id, observed);
    }

    struct CountingInstance {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl InstanceQueryer for CountingInstance {
        fn latest_materialization_event(
            &self,
            _: &AssetKey,
            _: Option<&str>,
            _: &Watermark,
        ) -> QueryResult<Option<EventRef>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(None)
        }

        fn latest_observation_event(
            &self,
            _: &AssetKey,
            _: Option<&str>,
            _: &Watermark,
        ) -> QueryResult<Option<EventRef>> {
            Err(QueryError::Unavailable {
                reason: "offline".to_string(),
            })
        }

        fn latest_event_id(&self) -> QueryResult<Option<EventId>> {
            Ok(None)
        }
    }

    fn assert_sync<T: Send + Sync>() {}

    #[test]
    fn test_reader_shared_across_threads() {
        assert_sync::<SnapshotReader>();

        let instance = Arc::new(MemoryInstance::new());
        let first = instance.report_materialization(partition(), hour(1)).unwrap();
        let reader = SnapshotReader::new(instance, Watermark::new(hour(12), Some(first)));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    assert_eq!(reader.latest_update(&partition()).unwrap().unwrap().id, first);
                });
            }
        });
        assert_eq!(reader.cached_lookups(), 2);
    }

    #[test]
    fn test_lookups_are_memoized_and_errors_propagate() {
        let instance = Arc::new(CountingInstance {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let reader = SnapshotReader::new(instance.clone(), Watermark::new(hour(1), None));

        reader.latest_materialization(&partition()).unwrap();
        reader.latest_materialization(&partition()).unwrap();
        assert_eq!(instance.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(reader.cached_lookups(), 1);

        assert!(matches!(
            reader.latest_update(&partition()),
            Err(QueryError::Unavailable { .. })
        ));
    }
}
