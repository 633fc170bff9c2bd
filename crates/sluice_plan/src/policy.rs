//! Scheduling policies.
//!
//! A policy decides which partitions of an asset's candidate slice join
//! the launch plan. Every variant is a pure function of the view and the
//! candidate; the expression variant interprets an [`Expr`].

use crate::error::PlanResult;
use crate::expr::Expr;
use crate::rules::RulesLogic;
use crate::view::AssetGraphView;
use serde::{Deserialize, Serialize};
use sluice_partition::PartitionSpace;

const fn default_recent_partitions() -> usize {
    1
}

/// Per-asset scheduling policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Launch the whole candidate
    AlwaysInclude,
    /// Launch nothing
    NeverInclude,
    /// Launch partitions with a parent updated since their last
    /// materialization
    OnAnyNewParentUpdated,
    /// Launch unsynced partitions, limited to the most recent windows
    /// of time-partitioned assets
    Default {
        /// How many recent windows stay eligible
        #[serde(default = "default_recent_partitions")]
        recent_partitions: usize,
    },
    /// Launch what an expression selects
    Expr {
        /// The expression
        expr: Expr,
    },
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self::Default {
            recent_partitions: default_recent_partitions(),
        }
    }
}

/// Outcome of one policy evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    /// Partitions to launch, a subset of the candidate
    pub asset_slice: PartitionSpace,
}

impl SchedulingPolicy {
    /// Expression policy
    #[must_use]
    pub fn for_expr(expr: Expr) -> Self {
        Self::Expr { expr }
    }

    /// Short variant name, for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AlwaysInclude => "always_include",
            Self::NeverInclude => "never_include",
            Self::OnAnyNewParentUpdated => "on_any_new_parent_updated",
            Self::Default { .. } => "default",
            Self::Expr { .. } => "expr",
        }
    }

    /// Select the partitions of `candidate` to launch
    ///
    /// # Errors
    ///
    /// Returns error if a rule fails to evaluate
    pub fn evaluate(&self, view: &AssetGraphView<'_>, candidate: &PartitionSpace) -> PlanResult<EvaluationResult> {
        let asset_slice = match self {
            Self::AlwaysInclude => candidate.clone(),
            Self::NeverInclude => candidate.empty_like(),
            Self::OnAnyNewParentUpdated => RulesLogic::any_parent_updated(view, candidate)?,
            Self::Default { recent_partitions } => {
                let unsynced = RulesLogic::unsynced(view, candidate)?;
                if view.definition(candidate.asset_key())?.as_time_window().is_some() {
                    RulesLogic::latest(view, &unsynced, *recent_partitions)?
                } else {
                    unsynced
                }
            }
            Self::Expr { expr } => expr.evaluate(view, candidate)?,
        };
        Ok(EvaluationResult { asset_slice })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use crate::expr::{latest, missing};
    use crate::graph::AssetGraph;
    use crate::testing::{Harness, asset, key, ts};
    use sluice_partition::PartitionsDefinition;
    use std::collections::BTreeSet;

    #[test]
    fn test_serde_shapes() {
        let policy: SchedulingPolicy = serde_json::from_str(r#"{"type":"default"}"#).unwrap();
        assert_eq!(policy, SchedulingPolicy::default());

        let policy: SchedulingPolicy =
            serde_json::from_str(r#"{"type":"expr","expr":"missing() | latest(2)"}"#).unwrap();
        assert_eq!(policy, SchedulingPolicy::for_expr(missing() | latest(2)));

        let json = serde_json::to_string(&SchedulingPolicy::NeverInclude).unwrap();
        assert_eq!(json, r#"{"type":"never_include"}"#);

        assert!(serde_json::from_str::<SchedulingPolicy>(r#"{"type":"expr","expr":"bogus()"}"#).is_err());
    }

    #[test]
    fn test_always_and_never() {
        let graph = AssetGraph::builder().add_asset(asset("a")).build().unwrap();
        let harness = Harness::new(graph);
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let candidate = view.unpartitioned(&key("a")).unwrap();

        let result = SchedulingPolicy::AlwaysInclude.evaluate(&view, &candidate).unwrap();
        assert_eq!(result.asset_slice, candidate);
        let result = SchedulingPolicy::NeverInclude.evaluate(&view, &candidate).unwrap();
        assert!(result.asset_slice.is_empty());
    }

    #[test]
    fn test_default_limits_recent_windows() {
        let graph = AssetGraph::builder()
            .add_asset(asset("daily").with_partitions(PartitionsDefinition::daily(ts(2024, 1, 1), None).unwrap()))
            .build()
            .unwrap();
        let harness = Harness::starting_at(graph, ts(2024, 1, 6));
        harness.materialize("daily", Some("2024-01-05"));

        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let candidate = view.get_asset_slice(&key("daily")).unwrap();

        let result = SchedulingPolicy::default().evaluate(&view, &candidate).unwrap();
        assert!(result.asset_slice.is_empty());

        let policy = SchedulingPolicy::Default { recent_partitions: 3 };
        let result = policy.evaluate(&view, &candidate).unwrap();
        assert_eq!(
            result.asset_slice.materialize_partition_keys(),
            BTreeSet::from(["2024-01-03".to_string(), "2024-01-04".to_string()])
        );
    }

    #[test]
    fn test_expr_policy_error_names_asset() {
        let graph = AssetGraph::builder().add_asset(asset("plain")).build().unwrap();
        let harness = Harness::new(graph);
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let candidate = view.unpartitioned(&key("plain")).unwrap();

        let err = SchedulingPolicy::for_expr(latest(1)).evaluate(&view, &candidate).unwrap_err();
        assert!(matches!(err, PlanError::Policy { asset_key, .. } if asset_key == key("plain")));

        let result = SchedulingPolicy::default().evaluate(&view, &candidate).unwrap();
        assert_eq!(result.asset_slice, candidate);
    }
}
