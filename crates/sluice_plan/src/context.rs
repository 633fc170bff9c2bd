//! Per-build scheduling execution context.

use crate::error::PlanResult;
use crate::graph::AssetGraph;
use sluice_core::{EventId, Timestamp};
use sluice_log::{InstanceQueryer, SnapshotReader, Watermark};
use std::sync::Arc;

/// Immutable snapshot a plan build runs against
///
/// Holds the graph and a reader pinned to one `(effective_dt,
/// last_event_id)` watermark. Every instance query of the build goes
/// through that reader, so no two evaluations can see different
/// instance states. The context is `Sync`: plan builds on several
/// threads may run against one context at once.
#[derive(Debug)]
pub struct SchedulingExecutionContext {
    graph: Arc<AssetGraph>,
    reader: SnapshotReader,
}

impl SchedulingExecutionContext {
    /// Pin a context
    ///
    /// A `last_event_id` of `None` means "now": it is resolved to the
    /// instance's newest event id once, here, so later events stay
    /// invisible to this context.
    ///
    /// # Errors
    ///
    /// Returns error if the instance cannot be queried
    pub fn create(
        graph: Arc<AssetGraph>,
        instance: Arc<dyn InstanceQueryer>,
        effective_dt: Timestamp,
        last_event_id: Option<EventId>,
    ) -> PlanResult<Self> {
        let last_event_id = match last_event_id {
            Some(id) => Some(id),
            None => instance.latest_event_id()?,
        };
        let watermark = Watermark::new(effective_dt, last_event_id);
        tracing::debug!(%watermark, assets = graph.len(), "created scheduling context");
        Ok(Self {
            graph,
            reader: SnapshotReader::new(instance, watermark),
        })
    }

    /// The asset graph
    #[must_use]
    pub fn graph(&self) -> &AssetGraph {
        &self.graph
    }

    /// Evaluation time
    #[must_use]
    pub fn effective_dt(&self) -> Timestamp {
        self.reader.watermark().effective_dt
    }

    /// Newest visible event id
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.reader.watermark().last_event_id
    }

    /// The pinned watermark
    #[must_use]
    pub fn watermark(&self) -> &Watermark {
        self.reader.watermark()
    }

    /// Reader every instance query goes through
    #[must_use]
    pub fn reader(&self) -> &SnapshotReader {
        &self.reader
    }
}
