//! Asset graph validator.

use crate::graph::{AssetGraphBuilder, AssetNode, GraphError};
use indexmap::IndexSet;
use sluice_core::AssetKey;
use sluice_partition::PartitionMapping;
use std::collections::{BTreeMap, BTreeSet};

/// Edges with their resolved mapping, keyed by `(child, parent)`
pub type ResolvedEdges = BTreeMap<(AssetKey, AssetKey), PartitionMapping>;

/// Validator for declared asset graphs
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// Create a new validator
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate the declarations and resolve every edge's mapping
    ///
    /// # Errors
    ///
    /// Returns every problem found, never an empty list
    pub fn validate(&self, builder: &AssetGraphBuilder) -> Result<ResolvedEdges, Vec<GraphError>> {
        let mut errors = Vec::new();

        let mut assets: BTreeMap<&AssetKey, &AssetNode> = BTreeMap::new();
        for node in &builder.nodes {
            if assets.insert(&node.key, node).is_some() {
                errors.push(GraphError::DuplicateAsset {
                    asset_key: node.key.clone(),
                });
            }
            if let Err(e) = node.partitions.validate() {
                errors.push(GraphError::InvalidPartitions {
                    asset_key: node.key.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let mut edges = ResolvedEdges::new();
        let mut adjacency: BTreeMap<&AssetKey, BTreeSet<&AssetKey>> = BTreeMap::new();
        for dep in &builder.deps {
            if dep.child == dep.parent {
                errors.push(GraphError::SelfDependency {
                    asset_key: dep.child.clone(),
                });
                continue;
            }
            let (Some(child), Some(parent)) = (assets.get(&dep.child), assets.get(&dep.parent)) else {
                let missing = if assets.contains_key(&dep.child) { &dep.parent } else { &dep.child };
                errors.push(GraphError::UnknownAsset {
                    asset_key: missing.clone(),
                    referenced_by: dep.child.clone(),
                });
                continue;
            };
            if !adjacency.entry(&dep.child).or_default().insert(&dep.parent) {
                errors.push(GraphError::DuplicateDependency {
                    child: dep.child.clone(),
                    parent: dep.parent.clone(),
                });
                continue;
            }

            let resolved = match &dep.mapping {
                Some(mapping) => mapping
                    .validate(&child.partitions, &parent.partitions)
                    .map(|()| mapping.clone())
                    .map_err(|source| GraphError::InvalidMapping {
                        child: dep.child.clone(),
                        parent: dep.parent.clone(),
                        source,
                    }),
                None => PartitionMapping::default_for(&child.partitions, &parent.partitions).ok_or_else(|| {
                    GraphError::MissingMapping {
                        child: dep.child.clone(),
                        parent: dep.parent.clone(),
                    }
                }),
            };
            match resolved {
                Ok(mapping) => {
                    edges.insert((dep.child.clone(), dep.parent.clone()), mapping);
                }
                Err(e) => errors.push(e),
            }
        }

        if let Err(e) = self.check_cycles(&assets, &adjacency) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(edges)
        } else {
            Err(errors)
        }
    }

    /// Check for cycles along child -> parent edges
    fn check_cycles<'a>(
        &self,
        assets: &BTreeMap<&'a AssetKey, &AssetNode>,
        adjacency: &BTreeMap<&'a AssetKey, BTreeSet<&'a AssetKey>>,
    ) -> Result<(), GraphError> {
        let mut visited = BTreeSet::new();
        let mut rec_stack = IndexSet::new();

        for key in assets.keys() {
            if let Some(path) = self.dfs_cycle(*key, adjacency, &mut visited, &mut rec_stack) {
                return Err(GraphError::Cycle { path });
            }
        }
        Ok(())
    }

    /// DFS cycle detection, returning the cycle's path if one is found
    fn dfs_cycle<'a>(
        &self,
        key: &'a AssetKey,
        adjacency: &BTreeMap<&'a AssetKey, BTreeSet<&'a AssetKey>>,
        visited: &mut BTreeSet<&'a AssetKey>,
        rec_stack: &mut IndexSet<&'a AssetKey>,
    ) -> Option<Vec<AssetKey>> {
        if let Some(start) = rec_stack.get_index_of(key) {
            let mut path: Vec<AssetKey> = rec_stack.iter().skip(start).map(|k| (*k).clone()).collect();
            path.push(key.clone());
            return Some(path);
        }
        if !visited.insert(key) {
            return None;
        }

        rec_stack.insert(key);
        for parent in adjacency.get(key).into_iter().flatten() {
            if let Some(path) = self.dfs_cycle(*parent, adjacency, visited, rec_stack) {
                return Some(path);
            }
        }
        rec_stack.pop();
        None
    }
}
