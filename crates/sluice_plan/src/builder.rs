//! Reactive scheduling plan builder.
//!
//! Starting from the slices a caller asks for, the builder expands the
//! upstream closure, then walks it from the starting assets toward the
//! roots. Each asset's candidate is its own starting slice plus what its
//! already-decided children map onto it; the asset's policy narrows the
//! candidate to the slice that is launched.

use crate::context::SchedulingExecutionContext;
use crate::error::PlanResult;
use crate::subset::AssetGraphSubset;
use crate::view::AssetGraphView;
use serde::{Deserialize, Serialize};
use sluice_core::{AssetKey, EventId, Timestamp};
use sluice_partition::PartitionSpace;

/// Plan build options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Also offer launched slices to downstream assets
    #[serde(default)]
    pub include_downstream: bool,
}

impl PlanOptions {
    /// Set downstream propagation
    #[must_use]
    pub const fn with_downstream(mut self, include_downstream: bool) -> Self {
        self.include_downstream = include_downstream;
        self
    }
}

/// Launch plan for one context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactiveSchedulingPlan {
    /// Partitions to launch, per asset; visited assets with nothing to
    /// launch have an empty entry
    pub launch_partition_space: AssetGraphSubset,
    /// Evaluation time the plan was built at
    pub effective_dt: Timestamp,
    /// Newest event the plan saw
    pub last_event_id: Option<EventId>,
}

impl ReactiveSchedulingPlan {
    /// Assets with something to launch
    pub fn launched_assets(&self) -> impl Iterator<Item = &AssetKey> {
        self.launch_partition_space
            .iter()
            .filter(|space| space.is_nonempty())
            .map(PartitionSpace::asset_key)
    }

    /// Whether nothing is launched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.launched_assets().next().is_none()
    }
}

/// Build a launch plan from `starting_slices`
///
/// # Errors
///
/// Returns error if a starting slice names an unknown asset or partition,
/// a mapping fails, the instance cannot be read, or a policy fails. No
/// partial plan is returned.
pub fn build_reactive_scheduling_plan(
    ctx: &SchedulingExecutionContext,
    starting_slices: &[PartitionSpace],
) -> PlanResult<ReactiveSchedulingPlan> {
    build_reactive_scheduling_plan_with_options(ctx, starting_slices, PlanOptions::default())
}

/// Build a launch plan with explicit options
///
/// # Errors
///
/// See [`build_reactive_scheduling_plan`]
#[tracing::instrument(
    name = "build_reactive_scheduling_plan",
    skip_all,
    fields(
        effective_dt = %ctx.effective_dt(),
        last_event_id = ?ctx.last_event_id(),
        starting = starting_slices.len(),
    )
)]
pub fn build_reactive_scheduling_plan_with_options(
    ctx: &SchedulingExecutionContext,
    starting_slices: &[PartitionSpace],
    options: PlanOptions,
) -> PlanResult<ReactiveSchedulingPlan> {
    let view = AssetGraphView::new(ctx);

    for slice in starting_slices {
        view.validate_slice(slice)?;
    }
    let seeds = AssetGraphSubset::from_spaces(starting_slices.iter().cloned());
    let closure = view.create_upstream_partition_space(&seeds)?;
    tracing::debug!(seeds = seeds.len(), closure = closure.len(), "expanded upstream closure");

    let mut launch = AssetGraphSubset::new();
    for level in closure.toposort_asset_levels(ctx.graph()).iter().rev() {
        for key in level {
            let mut candidate = match seeds.get(key) {
                Some(seed) => seed.clone(),
                None => view.empty_asset_slice(key)?,
            };
            for child in ctx.graph().children(key) {
                if let Some(child_slice) = launch.get(child) {
                    candidate = candidate.union(&view.parent_asset_slice(child_slice, key)?);
                }
            }
            let decided = decide(&view, key, &candidate)?;
            launch.insert(decided);
        }
    }

    if options.include_downstream {
        propagate_downstream(&view, &mut launch)?;
    }

    let plan = ReactiveSchedulingPlan {
        launch_partition_space: launch,
        effective_dt: ctx.effective_dt(),
        last_event_id: ctx.last_event_id(),
    };
    tracing::info!(
        visited = plan.launch_partition_space.len(),
        launched = plan.launched_assets().count(),
        partitions = plan.launch_partition_space.asset_partitions().len(),
        "built reactive scheduling plan"
    );
    Ok(plan)
}

/// Offer launched slices to unvisited descendants, parents first
fn propagate_downstream(view: &AssetGraphView<'_>, launch: &mut AssetGraphSubset) -> PlanResult<()> {
    let graph = view.graph();
    for level in graph.toposort_levels() {
        for key in level {
            if launch.contains_asset(key) {
                continue;
            }
            let mut candidate = view.empty_asset_slice(key)?;
            for parent in graph.parents(key) {
                if let Some(parent_slice) = launch.get(parent).filter(|s| s.is_nonempty()) {
                    candidate = candidate.union(&view.child_asset_slice(parent_slice, key)?);
                }
            }
            if candidate.is_nonempty() {
                let decided = decide(view, key, &candidate)?;
                launch.insert(decided);
            }
        }
    }
    Ok(())
}

/// Apply `key`'s policy to its candidate
fn decide(view: &AssetGraphView<'_>, key: &AssetKey, candidate: &PartitionSpace) -> PlanResult<PartitionSpace> {
    let node = view.node(key)?;
    if candidate.is_empty() {
        return Ok(candidate.clone());
    }
    if node.is_observable_source() {
        tracing::debug!(asset = %key, "observable source is not launched");
        return Ok(candidate.empty_like());
    }
    let policy = node.effective_policy();
    let result = policy.evaluate(view, candidate)?;
    tracing::debug!(
        asset = %key,
        policy = policy.name(),
        candidate = candidate.len(),
        launched = result.asset_slice.len(),
        "evaluated policy"
    );
    Ok(result.asset_slice)
}
