//! Multi-asset partition subsets.

use crate::graph::AssetGraph;
use serde::{Deserialize, Serialize};
use sluice_core::{AssetKey, AssetPartition};
use sluice_partition::PartitionSpace;
use std::collections::{BTreeMap, BTreeSet};

/// One partition space per asset
///
/// Empty spaces may be held explicitly; an asset with an empty entry is
/// part of the subset's key set but contributes no partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetGraphSubset {
    spaces: BTreeMap<AssetKey, PartitionSpace>,
}

impl AssetGraphSubset {
    /// Create an empty subset
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from spaces, unioning spaces of the same asset
    #[must_use]
    pub fn from_spaces<I>(spaces: I) -> Self
    where
        I: IntoIterator<Item = PartitionSpace>,
    {
        let mut subset = Self::new();
        for space in spaces {
            subset.add(space);
        }
        subset
    }

    /// Space of one asset
    #[must_use]
    pub fn get(&self, key: &AssetKey) -> Option<&PartitionSpace> {
        self.spaces.get(key)
    }

    /// Whether the asset has an entry (possibly empty)
    #[must_use]
    pub fn contains_asset(&self, key: &AssetKey) -> bool {
        self.spaces.contains_key(key)
    }

    /// Set an asset's space, replacing any previous one
    pub fn insert(&mut self, space: PartitionSpace) {
        self.spaces.insert(space.asset_key().clone(), space);
    }

    /// Union `space` into its asset's entry; returns whether it grew
    pub fn add(&mut self, space: PartitionSpace) -> bool {
        match self.spaces.get_mut(space.asset_key()) {
            Some(existing) => {
                let merged = existing.union(&space);
                let grew = merged != *existing;
                *existing = merged;
                grew
            }
            None => {
                let grew = space.is_nonempty();
                self.insert(space);
                grew
            }
        }
    }

    /// Union with another subset
    #[must_use]
    pub fn union(&self, other: &AssetGraphSubset) -> Self {
        let mut merged = self.clone();
        for space in other.spaces.values() {
            merged.add(space.clone());
        }
        merged
    }

    /// Assets with an entry, in key order
    pub fn asset_keys(&self) -> impl Iterator<Item = &AssetKey> {
        self.spaces.keys()
    }

    /// Assets with a nonempty space
    #[must_use]
    pub fn nonempty_asset_keys(&self) -> BTreeSet<AssetKey> {
        self.spaces
            .values()
            .filter(|s| s.is_nonempty())
            .map(|s| s.asset_key().clone())
            .collect()
    }

    /// All spaces, in key order
    pub fn iter(&self) -> impl Iterator<Item = &PartitionSpace> {
        self.spaces.values()
    }

    /// Number of asset entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    /// Whether there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Every asset partition across all entries
    #[must_use]
    pub fn asset_partitions(&self) -> BTreeSet<AssetPartition> {
        self.spaces
            .values()
            .flat_map(PartitionSpace::materialize_asset_partitions)
            .collect()
    }

    /// Assets in the subset with no parent also in the subset
    #[must_use]
    pub fn root_asset_keys(&self, graph: &AssetGraph) -> BTreeSet<AssetKey> {
        self.spaces
            .keys()
            .filter(|key| !graph.parents(key).any(|p| self.contains_asset(p)))
            .cloned()
            .collect()
    }

    /// Entries grouped so each level depends only on earlier levels
    ///
    /// Levels follow the graph's own levels; entries unknown to the
    /// graph are left out.
    #[must_use]
    pub fn toposort_asset_levels(&self, graph: &AssetGraph) -> Vec<BTreeSet<AssetKey>> {
        graph
            .toposort_levels()
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter(|key| self.contains_asset(key))
                    .cloned()
                    .collect::<BTreeSet<_>>()
            })
            .filter(|level| !level.is_empty())
            .collect()
    }

    /// Entries in a dependency-respecting order
    #[must_use]
    pub fn toposort_asset_keys(&self, graph: &AssetGraph) -> Vec<AssetKey> {
        self.toposort_asset_levels(graph).into_iter().flatten().collect()
    }
}

impl FromIterator<PartitionSpace> for AssetGraphSubset {
    fn from_iter<I: IntoIterator<Item = PartitionSpace>>(iter: I) -> Self {
        Self::from_spaces(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{asset, key};

    fn chain() -> AssetGraph {
        AssetGraph::builder()
            .add_asset(asset("a"))
            .add_asset(asset("b"))
            .add_asset(asset("c"))
            .add_asset(asset("d"))
            .add_dependency(key("b"), key("a"))
            .add_dependency(key("c"), key("b"))
            .add_dependency(key("d"), key("a"))
            .build()
            .unwrap()
    }

    fn whole(name: &str) -> PartitionSpace {
        PartitionSpace::unpartitioned(key(name))
    }

    #[test]
    fn test_add_unions_same_asset() {
        let mut subset = AssetGraphSubset::new();
        assert!(subset.add(PartitionSpace::from_partition_keys(key("a"), ["1"])));
        assert!(subset.add(PartitionSpace::from_partition_keys(key("a"), ["2"])));
        assert!(!subset.add(PartitionSpace::from_partition_keys(key("a"), ["1"])));
        assert_eq!(subset.get(&key("a")).unwrap().len(), 2);
        assert_eq!(subset.len(), 1);
    }

    #[test]
    fn test_empty_entries_are_kept() {
        let subset = AssetGraphSubset::from_spaces([whole("a"), whole("b").empty_like()]);
        assert!(subset.contains_asset(&key("b")));
        assert_eq!(subset.nonempty_asset_keys(), BTreeSet::from([key("a")]));
        assert_eq!(subset.asset_partitions().len(), 1);
    }

    #[test]
    fn test_root_asset_keys() {
        let graph = chain();
        let subset: AssetGraphSubset = [whole("b"), whole("c"), whole("d")].into_iter().collect();
        assert_eq!(subset.root_asset_keys(&graph), BTreeSet::from([key("b"), key("d")]));
    }

    #[test]
    fn test_toposort() {
        let graph = chain();
        let subset: AssetGraphSubset = [whole("c"), whole("a"), whole("b")].into_iter().collect();
        assert_eq!(
            subset.toposort_asset_levels(&graph),
            vec![
                BTreeSet::from([key("a")]),
                BTreeSet::from([key("b")]),
                BTreeSet::from([key("c")]),
            ]
        );
        assert_eq!(subset.toposort_asset_keys(&graph), vec![key("a"), key("b"), key("c")]);
    }

    #[test]
    fn test_union() {
        let left = AssetGraphSubset::from_spaces([PartitionSpace::from_partition_keys(key("a"), ["1"])]);
        let right = AssetGraphSubset::from_spaces([
            PartitionSpace::from_partition_keys(key("a"), ["2"]),
            whole("b"),
        ]);
        let both = left.union(&right);
        assert_eq!(both.len(), 2);
        assert_eq!(both.get(&key("a")).unwrap().len(), 2);
    }
}
