//! Rule primitives.
//!
//! Each rule maps a slice of one asset to a subset of that slice. Rules
//! only read through the view, so they are pure with respect to the
//! context they run against.

use crate::error::{PlanError, PlanResult};
use crate::view::AssetGraphView;
use sluice_core::AssetPartition;
use sluice_log::EventRef;
use sluice_partition::PartitionSpace;

/// Rule primitives over single-asset slices
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesLogic;

impl RulesLogic {
    /// Partitions of `slice` that are out of sync with their parents
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown, a mapping fails, or the
    /// instance cannot be read
    pub fn unsynced(view: &AssetGraphView<'_>, slice: &PartitionSpace) -> PlanResult<PartitionSpace> {
        slice.try_filter(|p| view.is_partition_unsynced(p))
    }

    /// Partitions of `slice` that were never materialized
    ///
    /// # Errors
    ///
    /// Returns error if the instance cannot be read
    pub fn missing(view: &AssetGraphView<'_>, slice: &PartitionSpace) -> PlanResult<PartitionSpace> {
        let reader = view.context().reader();
        slice.try_filter(|p| -> PlanResult<bool> { Ok(reader.latest_materialization(p)?.is_none()) })
    }

    /// Partitions of `slice` with at least one mapped parent partition
    /// updated since the partition was last materialized
    ///
    /// Parent edges that map to no partitions contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown, a mapping fails, or the
    /// instance cannot be read
    pub fn any_parent_updated(view: &AssetGraphView<'_>, slice: &PartitionSpace) -> PlanResult<PartitionSpace> {
        slice.try_filter(|partition| -> PlanResult<bool> {
            let since = view.context().reader().latest_materialization(partition)?;
            for parent in view.graph().parents(&partition.asset_key) {
                for parent_partition in view.parent_partitions(partition, parent)? {
                    if updated_since(view, &parent_partition, since.as_ref())? {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        })
    }

    /// Partitions of `slice` whose mapped parent partitions were all
    /// updated since the partition was last materialized
    ///
    /// Assets without parents, and partitions for which some parent edge
    /// maps to no partitions, are excluded.
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown, a mapping fails, or the
    /// instance cannot be read
    pub fn all_parents_updated(view: &AssetGraphView<'_>, slice: &PartitionSpace) -> PlanResult<PartitionSpace> {
        if !view.graph().has_parents(slice.asset_key()) {
            return Ok(slice.empty_like());
        }
        slice.try_filter(|partition| -> PlanResult<bool> {
            let since = view.context().reader().latest_materialization(partition)?;
            for parent in view.graph().parents(&partition.asset_key) {
                let parent_partitions = view.parent_partitions(partition, parent)?;
                if parent_partitions.is_empty() {
                    return Ok(false);
                }
                for parent_partition in &parent_partitions {
                    if !updated_since(view, parent_partition, since.as_ref())? {
                        return Ok(false);
                    }
                }
            }
            Ok(true)
        })
    }

    /// Partitions of `slice` among the `n` most recent time windows
    ///
    /// # Errors
    ///
    /// Returns a policy error if the asset is not time-window partitioned
    pub fn latest(view: &AssetGraphView<'_>, slice: &PartitionSpace, n: usize) -> PlanResult<PartitionSpace> {
        let recent = view
            .latest_time_window_slice(slice.asset_key(), n)
            .map_err(|err| match err {
                PlanError::NotTimePartitioned { asset_key } => PlanError::Policy {
                    reason: format!("latest({n}) needs a time-window partitioned asset, `{asset_key}` is not"),
                    asset_key,
                },
                other => other,
            })?;
        Ok(slice.intersect(&recent))
    }
}

fn updated_since(view: &AssetGraphView<'_>, partition: &AssetPartition, since: Option<&EventRef>) -> PlanResult<bool> {
    Ok(view
        .context()
        .reader()
        .latest_update(partition)?
        .is_some_and(|update| update.is_newer_than(since)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AssetGraph;
    use crate::testing::{Harness, asset, key};
    use sluice_partition::{PartitionMapping, PartitionsDefinition};
    use std::collections::BTreeSet;

    fn keys(slice: &PartitionSpace) -> BTreeSet<String> {
        slice.materialize_partition_keys()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn two_parent_graph() -> AssetGraph {
        let statics = PartitionsDefinition::static_keys(["A", "B"]).unwrap();
        AssetGraph::builder()
            .add_asset(asset("left").with_partitions(statics.clone()))
            .add_asset(asset("right").with_partitions(statics.clone()))
            .add_asset(asset("child").with_partitions(statics))
            .add_dependency(key("child"), key("left"))
            .add_dependency(key("child"), key("right"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_missing() {
        let harness = Harness::new(two_parent_graph());
        harness.materialize("child", Some("A"));
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);

        let slice = view.get_asset_slice(&key("child")).unwrap();
        assert_eq!(keys(&RulesLogic::missing(&view, &slice).unwrap()), set(&["B"]));
    }

    #[test]
    fn test_any_and_all_parents_updated() {
        let harness = Harness::new(two_parent_graph());
        harness.materialize("child", Some("A"));
        harness.materialize("child", Some("B"));
        harness.materialize("left", Some("A"));
        harness.materialize("left", Some("B"));
        harness.materialize("right", Some("B"));

        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let slice = view.get_asset_slice(&key("child")).unwrap();

        assert_eq!(keys(&RulesLogic::any_parent_updated(&view, &slice).unwrap()), set(&["A", "B"]));
        assert_eq!(keys(&RulesLogic::all_parents_updated(&view, &slice).unwrap()), set(&["B"]));
    }

    #[test]
    fn test_parents_updated_on_never_materialized_child() {
        let harness = Harness::new(two_parent_graph());
        harness.materialize("left", Some("A"));

        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let slice = view.get_asset_slice(&key("child")).unwrap();

        assert_eq!(keys(&RulesLogic::any_parent_updated(&view, &slice).unwrap()), set(&["A"]));
        assert!(RulesLogic::all_parents_updated(&view, &slice).unwrap().is_empty());
    }

    #[test]
    fn test_empty_mapping_edge() {
        let graph = AssetGraph::builder()
            .add_asset(asset("up").with_partitions(PartitionsDefinition::static_keys(["A", "B"]).unwrap()))
            .add_asset(asset("down").with_partitions(PartitionsDefinition::static_keys(["1", "2"]).unwrap()))
            .add_mapped_dependency(key("down"), key("up"), PartitionMapping::static_key_map([("A", "1")]))
            .build()
            .unwrap();
        let harness = Harness::new(graph);
        harness.materialize("up", Some("A"));
        harness.materialize("up", Some("B"));

        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let slice = view.get_asset_slice(&key("down")).unwrap();

        assert_eq!(keys(&RulesLogic::any_parent_updated(&view, &slice).unwrap()), set(&["1"]));
        assert_eq!(keys(&RulesLogic::all_parents_updated(&view, &slice).unwrap()), set(&["1"]));
    }

    #[test]
    fn test_parents_updated_across_many_to_one_map() {
        let graph = AssetGraph::builder()
            .add_asset(asset("up").with_partitions(PartitionsDefinition::static_keys(["A1", "A2", "B1", "B2"]).unwrap()))
            .add_asset(asset("down").with_partitions(PartitionsDefinition::static_keys(["A", "B"]).unwrap()))
            .add_asset(asset("downdown").with_partitions(PartitionsDefinition::static_keys(["A", "B"]).unwrap()))
            .add_mapped_dependency(
                key("down"),
                key("up"),
                PartitionMapping::static_key_map([("A1", "A"), ("A2", "A"), ("B1", "B"), ("B2", "B")]),
            )
            .add_dependency(key("downdown"), key("down"))
            .build()
            .unwrap();
        let harness = Harness::new(graph);
        let baseline: [(&str, &[&str]); 3] = [
            ("up", &["A1", "A2", "B1", "B2"]),
            ("down", &["A", "B"]),
            ("downdown", &["A", "B"]),
        ];
        for (name, partitions) in baseline {
            for partition in partitions {
                harness.materialize(name, Some(*partition));
            }
        }

        let check = |any: &[&str], all: &[&str], unsynced: &[&str]| {
            let ctx = harness.context();
            let view = AssetGraphView::new(&ctx);
            let down = view.get_asset_slice(&key("down")).unwrap();
            let downdown = view.get_asset_slice(&key("downdown")).unwrap();
            assert_eq!(keys(&RulesLogic::any_parent_updated(&view, &down).unwrap()), set(any));
            assert_eq!(keys(&RulesLogic::all_parents_updated(&view, &down).unwrap()), set(all));
            assert_eq!(keys(&RulesLogic::unsynced(&view, &downdown).unwrap()), set(unsynced));
            assert!(RulesLogic::any_parent_updated(&view, &downdown).unwrap().is_empty());
        };

        check(&[], &[], &[]);
        harness.materialize("up", Some("A1"));
        check(&["A"], &[], &["A"]);
        harness.materialize("up", Some("A2"));
        check(&["A"], &["A"], &["A"]);
        harness.materialize("up", Some("B1"));
        check(&["A", "B"], &["A"], &["A", "B"]);
    }

    #[test]
    fn test_all_parents_updated_without_parents() {
        let harness = Harness::new(two_parent_graph());
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let slice = view.get_asset_slice(&key("left")).unwrap();
        assert!(RulesLogic::all_parents_updated(&view, &slice).unwrap().is_empty());
    }

    #[test]
    fn test_latest_requires_time_partitions() {
        let harness = Harness::new(two_parent_graph());
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let slice = view.get_asset_slice(&key("left")).unwrap();

        let err = RulesLogic::latest(&view, &slice, 1).unwrap_err();
        assert!(matches!(err, PlanError::Policy { ref asset_key, .. } if *asset_key == key("left")));
    }
}
