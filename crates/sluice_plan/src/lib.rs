//! sluice Planner
//!
//! The static asset graph, the graph view that binds a point-in-time
//! snapshot to partition-space traversal, the scheduling rules and
//! policies evaluated per asset, and the reactive scheduling plan
//! builder that combines them into a multi-asset launch plan.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod context;
pub mod error;
pub mod expr;
pub mod graph;
pub mod manifest;
pub mod policy;
pub mod rules;
pub mod subset;
pub mod validate;
pub mod view;

#[cfg(test)]
mod testing;

pub use builder::{
    PlanOptions, ReactiveSchedulingPlan, build_reactive_scheduling_plan,
    build_reactive_scheduling_plan_with_options,
};
pub use context::SchedulingExecutionContext;
pub use error::{PlanError, PlanResult};
pub use expr::{Expr, ExprParseError, MAX_NESTING};
pub use graph::{AssetDep, AssetGraph, AssetGraphBuilder, AssetKind, AssetNode, GraphError};
pub use manifest::{AssetManifest, AssetSpec, DepSpec, ManifestCache};
pub use policy::{EvaluationResult, SchedulingPolicy};
pub use rules::RulesLogic;
pub use subset::AssetGraphSubset;
pub use validate::Validator;
pub use view::AssetGraphView;
