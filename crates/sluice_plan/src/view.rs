//! Asset graph view: slices and traversal bound to one context.
//!
//! The view is where partition spaces meet the graph. It builds slices
//! for an asset as of the context's effective time, moves slices across
//! dependency edges through their partition mappings, and answers
//! per-partition sync questions against the context's snapshot.

use crate::context::SchedulingExecutionContext;
use crate::error::{PlanError, PlanResult};
use crate::graph::{AssetGraph, AssetNode};
use crate::subset::AssetGraphSubset;
use sluice_core::{AssetKey, AssetPartition, PartitionKey, Timestamp};
use sluice_partition::{
    MappingContext, PartitionMapping, PartitionSpace, PartitionSubset, PartitionsDefinition, TimeWindow,
    TimeWindowPartitions,
};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Slice algebra and traversal over one context
#[derive(Debug)]
pub struct AssetGraphView<'a> {
    ctx: &'a SchedulingExecutionContext,
    unsynced: RefCell<HashMap<AssetPartition, bool>>,
}

impl<'a> AssetGraphView<'a> {
    /// Create a view
    #[must_use]
    pub fn new(ctx: &'a SchedulingExecutionContext) -> Self {
        Self {
            ctx,
            unsynced: RefCell::new(HashMap::new()),
        }
    }

    /// The bound context
    #[must_use]
    pub fn context(&self) -> &'a SchedulingExecutionContext {
        self.ctx
    }

    /// The asset graph
    #[must_use]
    pub fn graph(&self) -> &'a AssetGraph {
        self.ctx.graph()
    }

    /// Evaluation time
    #[must_use]
    pub fn effective_dt(&self) -> Timestamp {
        self.ctx.effective_dt()
    }

    /// Look up an asset
    ///
    /// # Errors
    ///
    /// Returns error if the asset is not in the graph
    pub fn node(&self, key: &AssetKey) -> PlanResult<&'a AssetNode> {
        self.graph().node(key).ok_or_else(|| PlanError::UnknownAsset {
            asset_key: key.clone(),
        })
    }

    /// Partitions definition of an asset
    ///
    /// # Errors
    ///
    /// Returns error if the asset is not in the graph
    pub fn definition(&self, key: &AssetKey) -> PlanResult<&'a PartitionsDefinition> {
        Ok(&self.node(key)?.partitions)
    }

    /// The slice used when nothing narrows an asset: its whole
    /// currently valid space
    ///
    /// # Errors
    ///
    /// Returns error if the asset is not in the graph
    pub fn get_asset_slice(&self, key: &AssetKey) -> PlanResult<PartitionSpace> {
        self.complete_asset_slice(key)
    }

    /// Every partition valid as of the effective time
    ///
    /// # Errors
    ///
    /// Returns error if the asset is not in the graph
    pub fn complete_asset_slice(&self, key: &AssetKey) -> PlanResult<PartitionSpace> {
        let subset = self.definition(key)?.complete_subset(self.effective_dt());
        Ok(PartitionSpace::new(key.clone(), subset))
    }

    /// The empty slice of an asset
    ///
    /// # Errors
    ///
    /// Returns error if the asset is not in the graph
    pub fn empty_asset_slice(&self, key: &AssetKey) -> PlanResult<PartitionSpace> {
        let subset = self.definition(key)?.empty_subset();
        Ok(PartitionSpace::new(key.clone(), subset))
    }

    /// Slice of the given keys
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown or a key is not one of its
    /// partitions as of the effective time
    pub fn from_partition_keys<I, S>(&self, key: &AssetKey, keys: I) -> PlanResult<PartitionSpace>
    where
        I: IntoIterator<Item = S>,
        S: Into<PartitionKey>,
    {
        let slice = PartitionSpace::from_partition_keys(key.clone(), keys);
        self.validate_slice(&slice)?;
        Ok(slice)
    }

    /// The whole of an unpartitioned asset
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown or partitioned
    pub fn unpartitioned(&self, key: &AssetKey) -> PlanResult<PartitionSpace> {
        let slice = PartitionSpace::unpartitioned(key.clone());
        self.validate_slice(&slice)?;
        Ok(slice)
    }

    /// Existing windows of a time-partitioned asset overlapping `window`
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown or not time-window partitioned
    pub fn from_time_window(&self, key: &AssetKey, window: &TimeWindow) -> PlanResult<PartitionSpace> {
        let tw = self.time_window_definition(key)?;
        let keys = tw.keys_overlapping(window, self.effective_dt());
        Ok(PartitionSpace::from_partition_keys(key.clone(), keys))
    }

    /// The `n` most recent windows of a time-partitioned asset
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown or not time-window partitioned
    pub fn latest_time_window_slice(&self, key: &AssetKey, n: usize) -> PlanResult<PartitionSpace> {
        let tw = self.time_window_definition(key)?;
        let keys = tw.latest_keys(n, self.effective_dt());
        Ok(PartitionSpace::from_partition_keys(key.clone(), keys))
    }

    fn time_window_definition(&self, key: &AssetKey) -> PlanResult<&'a TimeWindowPartitions> {
        self.definition(key)?
            .as_time_window()
            .ok_or_else(|| PlanError::NotTimePartitioned {
                asset_key: key.clone(),
            })
    }

    /// Check a slice only names partitions its asset has
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown, the slice has the wrong
    /// shape, or a key is not valid as of the effective time
    pub fn validate_slice(&self, slice: &PartitionSpace) -> PlanResult<()> {
        let key = slice.asset_key();
        let def = self.definition(key)?;
        match slice.subset() {
            PartitionSubset::Unpartitioned { present } if *present && def.is_partitioned() => {
                Err(PlanError::SliceShape { asset_key: key.clone() })
            }
            PartitionSubset::Unpartitioned { .. } => Ok(()),
            PartitionSubset::Keys(keys) => {
                if !def.is_partitioned() && !keys.is_empty() {
                    return Err(PlanError::SliceShape { asset_key: key.clone() });
                }
                match keys.iter().find(|k| !def.has_partition_key(k, self.effective_dt())) {
                    Some(bad) => Err(PlanError::InvalidPartitionKey {
                        asset_key: key.clone(),
                        partition_key: bad.clone(),
                    }),
                    None => Ok(()),
                }
            }
        }
    }

    /// Translate a child slice into `parent_key`'s partitions
    ///
    /// # Errors
    ///
    /// Returns error if the assets are not connected or the mapping fails
    pub fn parent_asset_slice(&self, child_slice: &PartitionSpace, parent_key: &AssetKey) -> PlanResult<PartitionSpace> {
        let child_key = child_slice.asset_key();
        let (mapping, ctx) = self.edge(child_key, parent_key)?;
        let subset = mapping
            .map_to_parent(child_slice.subset(), &ctx)
            .map_err(|source| PlanError::Mapping {
                child: child_key.clone(),
                parent: parent_key.clone(),
                source,
            })?;
        Ok(PartitionSpace::new(parent_key.clone(), subset))
    }

    /// Translate a parent slice into `child_key`'s partitions
    ///
    /// # Errors
    ///
    /// Returns error if the assets are not connected or the mapping fails
    pub fn child_asset_slice(&self, parent_slice: &PartitionSpace, child_key: &AssetKey) -> PlanResult<PartitionSpace> {
        let parent_key = parent_slice.asset_key();
        let (mapping, ctx) = self.edge(child_key, parent_key)?;
        let subset = mapping
            .map_to_child(parent_slice.subset(), &ctx)
            .map_err(|source| PlanError::Mapping {
                child: child_key.clone(),
                parent: parent_key.clone(),
                source,
            })?;
        Ok(PartitionSpace::new(child_key.clone(), subset))
    }

    fn edge(
        &self,
        child: &AssetKey,
        parent: &AssetKey,
    ) -> PlanResult<(&'a PartitionMapping, MappingContext<'a>)> {
        let mapping = self
            .graph()
            .mapping(child, parent)
            .ok_or_else(|| PlanError::NotADependency {
                child: child.clone(),
                parent: parent.clone(),
            })?;
        let ctx = MappingContext::new(self.definition(child)?, self.definition(parent)?, self.effective_dt());
        Ok((mapping, ctx))
    }

    /// Parent partitions one child partition maps to
    ///
    /// # Errors
    ///
    /// Returns error if the assets are not connected or the mapping fails
    pub fn parent_partitions(&self, partition: &AssetPartition, parent_key: &AssetKey) -> PlanResult<BTreeSet<AssetPartition>> {
        let slice = PartitionSpace::single(partition);
        Ok(self.parent_asset_slice(&slice, parent_key)?.materialize_asset_partitions())
    }

    /// Ancestor closure of `starting`, with the partitions each ancestor
    /// is reached by
    ///
    /// Walks parent edges from a worklist, accumulating one space per
    /// asset. A parent is revisited only when the space it is reached
    /// by grows, so the walk stops at a fixed point.
    ///
    /// # Errors
    ///
    /// Returns error if a starting asset is unknown or a mapping fails
    pub fn create_upstream_partition_space(&self, starting: &AssetGraphSubset) -> PlanResult<AssetGraphSubset> {
        let mut closure = AssetGraphSubset::new();
        let mut queue = VecDeque::new();
        for space in starting.iter() {
            self.node(space.asset_key())?;
            closure.add(space.clone());
            queue.push_back(space.asset_key().clone());
        }

        while let Some(key) = queue.pop_front() {
            let Some(slice) = closure.get(&key).cloned() else {
                continue;
            };
            for parent in self.graph().parents(&key) {
                let parent_slice = self.parent_asset_slice(&slice, parent)?;
                let first_visit = !closure.contains_asset(parent);
                if closure.add(parent_slice) || first_visit {
                    tracing::trace!(asset = %parent, via = %key, "upstream space grew");
                    queue.push_back(parent.clone());
                }
            }
        }
        Ok(closure)
    }

    /// Partitions of `key` that are out of sync with their parents
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown or the instance cannot be read
    pub fn compute_unsynced(&self, key: &AssetKey) -> PlanResult<PartitionSpace> {
        self.complete_asset_slice(key)?
            .try_filter(|p| self.is_partition_unsynced(p))
    }

    /// Whether one asset partition is out of sync
    ///
    /// A partition is unsynced if it was never materialized, if a mapped
    /// parent partition was materialized or observed after it, or if a
    /// mapped parent partition is itself unsynced. Observable sources
    /// are never unsynced.
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown, a mapping fails, or the
    /// instance cannot be read
    pub fn is_partition_unsynced(&self, partition: &AssetPartition) -> PlanResult<bool> {
        let cached = self.unsynced.borrow().get(partition).copied();
        if let Some(unsynced) = cached {
            return Ok(unsynced);
        }

        let key = &partition.asset_key;
        let unsynced = if self.node(key)?.is_observable_source() {
            false
        } else {
            match self.ctx.reader().latest_materialization(partition)? {
                None => true,
                Some(materialized) => {
                    let mut stale = false;
                    'parents: for parent in self.graph().parents(key) {
                        for parent_partition in self.parent_partitions(partition, parent)? {
                            let updated = self
                                .ctx
                                .reader()
                                .latest_update(&parent_partition)?
                                .is_some_and(|u| u.is_newer_than(Some(&materialized)));
                            if updated || self.is_partition_unsynced(&parent_partition)? {
                                stale = true;
                                break 'parents;
                            }
                        }
                    }
                    stale
                }
            }
        };

        self.unsynced.borrow_mut().insert(partition.clone(), unsynced);
        Ok(unsynced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AssetGraph;
    use crate::testing::{Harness, asset, key, ts};

    fn static_map_graph() -> AssetGraph {
        AssetGraph::builder()
            .add_asset(asset("up").with_partitions(PartitionsDefinition::static_keys(["A", "B", "C"]).unwrap()))
            .add_asset(asset("down").with_partitions(PartitionsDefinition::static_keys(["1", "2", "3"]).unwrap()))
            .add_mapped_dependency(
                key("down"),
                key("up"),
                PartitionMapping::static_key_map([("A", "1"), ("B", "2"), ("C", "3")]),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_parent_asset_slice_static_map() {
        let harness = Harness::new(static_map_graph());
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);

        let down = view.from_partition_keys(&key("down"), ["1"]).unwrap();
        let up = view.parent_asset_slice(&down, &key("up")).unwrap();
        assert_eq!(up, view.from_partition_keys(&key("up"), ["A"]).unwrap());

        let back = view.child_asset_slice(&up, &key("down")).unwrap();
        assert_eq!(back, down);
    }

    #[test]
    fn test_slice_validation() {
        let harness = Harness::new(static_map_graph());
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);

        assert!(matches!(
            view.from_partition_keys(&key("down"), ["9"]),
            Err(PlanError::InvalidPartitionKey { .. })
        ));
        assert!(matches!(view.unpartitioned(&key("down")), Err(PlanError::SliceShape { .. })));
        assert!(matches!(view.get_asset_slice(&key("ghost")), Err(PlanError::UnknownAsset { .. })));
        assert!(matches!(
            view.parent_asset_slice(&view.complete_asset_slice(&key("up")).unwrap(), &key("down")),
            Err(PlanError::NotADependency { .. })
        ));
        assert_eq!(view.get_asset_slice(&key("up")).unwrap().len(), 3);
    }

    #[test]
    fn test_time_window_slices() {
        let graph = AssetGraph::builder()
            .add_asset(asset("daily").with_partitions(PartitionsDefinition::daily(ts(2021, 1, 1), None).unwrap()))
            .add_asset(asset("plain"))
            .build()
            .unwrap();
        let harness = Harness::starting_at(graph, ts(2021, 1, 10));
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);

        let window = TimeWindow::new(ts(2021, 1, 2), ts(2021, 1, 4)).unwrap();
        let slice = view.from_time_window(&key("daily"), &window).unwrap();
        assert_eq!(
            slice.materialize_partition_keys(),
            BTreeSet::from(["2021-01-02".to_string(), "2021-01-03".to_string()])
        );
        assert_eq!(view.get_asset_slice(&key("daily")).unwrap().len(), 9);

        let latest = view.latest_time_window_slice(&key("daily"), 2).unwrap();
        assert_eq!(
            latest.materialize_partition_keys(),
            BTreeSet::from(["2021-01-08".to_string(), "2021-01-09".to_string()])
        );
        assert!(matches!(
            view.latest_time_window_slice(&key("plain"), 1),
            Err(PlanError::NotTimePartitioned { .. })
        ));
    }

    #[test]
    fn test_create_upstream_partition_space() {
        let graph = AssetGraph::builder()
            .add_asset(asset("root").with_partitions(PartitionsDefinition::static_keys(["A", "B", "C"]).unwrap()))
            .add_asset(asset("up").with_partitions(PartitionsDefinition::static_keys(["A", "B", "C"]).unwrap()))
            .add_asset(asset("down").with_partitions(PartitionsDefinition::static_keys(["1", "2", "3"]).unwrap()))
            .add_asset(asset("other").with_partitions(PartitionsDefinition::static_keys(["1", "2", "3"]).unwrap()))
            .add_dependency(key("up"), key("root"))
            .add_mapped_dependency(
                key("down"),
                key("up"),
                PartitionMapping::static_key_map([("A", "1"), ("B", "2"), ("C", "3")]),
            )
            .add_mapped_dependency(
                key("other"),
                key("up"),
                PartitionMapping::static_key_map([("A", "1"), ("B", "2"), ("C", "3")]),
            )
            .build()
            .unwrap();
        let harness = Harness::new(graph);
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);

        let starting = AssetGraphSubset::from_spaces([view.from_partition_keys(&key("down"), ["2", "3"]).unwrap()]);
        let closure = view.create_upstream_partition_space(&starting).unwrap();

        assert_eq!(closure.len(), 3);
        assert!(!closure.contains_asset(&key("other")));
        let root = closure.get(&key("root")).unwrap().materialize_partition_keys();
        assert_eq!(root, BTreeSet::from(["B".to_string(), "C".to_string()]));
    }

    #[test]
    fn test_unsynced_is_per_partition_and_transitive() {
        let statics = PartitionsDefinition::static_keys(["A", "B"]).unwrap();
        let graph = AssetGraph::builder()
            .add_asset(asset("root").with_partitions(statics.clone()))
            .add_asset(asset("mid").with_partitions(statics.clone()))
            .add_asset(asset("leaf").with_partitions(statics))
            .add_dependency(key("mid"), key("root"))
            .add_dependency(key("leaf"), key("mid"))
            .build()
            .unwrap();
        let harness = Harness::new(graph);
        for name in ["root", "mid", "leaf"] {
            harness.materialize(name, Some("A"));
            harness.materialize(name, Some("B"));
        }
        harness.materialize("root", Some("A"));

        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        let a = BTreeSet::from(["A".to_string()]);
        assert!(view.compute_unsynced(&key("root")).unwrap().is_empty());
        assert_eq!(view.compute_unsynced(&key("mid")).unwrap().materialize_partition_keys(), a);
        assert_eq!(view.compute_unsynced(&key("leaf")).unwrap().materialize_partition_keys(), a);
    }

    #[test]
    fn test_observable_source_is_never_unsynced() {
        let graph = AssetGraph::builder()
            .add_asset(asset("source").observable_source())
            .add_asset(asset("asset"))
            .add_dependency(key("asset"), key("source"))
            .build()
            .unwrap();
        let harness = Harness::new(graph);
        harness.materialize("asset", None);

        {
            let ctx = harness.context();
            let view = AssetGraphView::new(&ctx);
            assert!(view.compute_unsynced(&key("source")).unwrap().is_empty());
            assert!(view.compute_unsynced(&key("asset")).unwrap().is_empty());
        }

        harness.observe("source", None);
        let ctx = harness.context();
        let view = AssetGraphView::new(&ctx);
        assert!(view.compute_unsynced(&key("source")).unwrap().is_empty());
        assert!(view.compute_unsynced(&key("asset")).unwrap().is_nonempty());
    }
}
