//! Shared fixtures for planner tests.

use chrono::TimeDelta;
use crate::builder::build_reactive_scheduling_plan;
use crate::context::SchedulingExecutionContext;
use crate::error::PlanResult;
use crate::graph::{AssetGraph, AssetNode};
use sluice_core::{AssetKey, AssetPartition, EventId, Timestamp};
use sluice_log::{InstanceQueryer, MemoryInstance};
use sluice_partition::PartitionSpace;
use std::cell::Cell;
use std::sync::Arc;

pub(crate) fn key(name: &str) -> AssetKey {
    AssetKey::from_user_string(name).unwrap()
}

pub(crate) fn asset(name: &str) -> AssetNode {
    AssetNode::new(key(name))
}

pub(crate) fn ts(y: i32, m: u32, d: u32) -> Timestamp {
    Timestamp::from_ymd(y, m, d).unwrap()
}

/// A graph, an in-memory instance, and a clock that advances one minute
/// per reported event
pub(crate) struct Harness {
    graph: Arc<AssetGraph>,
    instance: Arc<MemoryInstance>,
    clock: Cell<Timestamp>,
}

impl Harness {
    pub(crate) fn new(graph: AssetGraph) -> Self {
        Self::starting_at(graph, ts(2024, 6, 1))
    }

    pub(crate) fn starting_at(graph: AssetGraph, start: Timestamp) -> Self {
        Self {
            graph: Arc::new(graph),
            instance: Arc::new(MemoryInstance::new()),
            clock: Cell::new(start),
        }
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.get()
    }

    pub(crate) fn tick(&self) -> Timestamp {
        let now = self.clock.get();
        self.clock.set(now.checked_add(TimeDelta::minutes(1)).unwrap());
        now
    }

    fn partition(name: &str, partition: Option<&str>) -> AssetPartition {
        AssetPartition::new(key(name), partition.map(str::to_string))
    }

    pub(crate) fn materialize(&self, name: &str, partition: Option<&str>) -> EventId {
        let at = self.tick();
        self.instance
            .report_materialization(Self::partition(name, partition), at)
            .unwrap()
    }

    pub(crate) fn observe(&self, name: &str, partition: Option<&str>) -> EventId {
        let at = self.tick();
        self.instance
            .report_observation(Self::partition(name, partition), at)
            .unwrap()
    }

    pub(crate) fn context(&self) -> SchedulingExecutionContext {
        self.context_at(self.now(), None)
    }

    pub(crate) fn context_at(&self, effective_dt: Timestamp, last_event_id: Option<EventId>) -> SchedulingExecutionContext {
        let instance: Arc<dyn InstanceQueryer> = self.instance.clone();
        SchedulingExecutionContext::create(self.graph.clone(), instance, effective_dt, last_event_id).unwrap()
    }

    /// Build a plan from the given starting slices as of now
    pub(crate) fn plan(&self, starting: &[PartitionSpace]) -> PlanResult<crate::subset::AssetGraphSubset> {
        let ctx = self.context();
        build_reactive_scheduling_plan(&ctx, starting).map(|plan| plan.launch_partition_space)
    }
}
