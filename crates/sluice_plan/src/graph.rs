//! The static asset graph.
//!
//! Nodes are assets with a partitions definition, a kind, and an
//! optional scheduling policy. Edges run from child to parent and always
//! carry a resolved partition mapping. A graph only exists once the
//! `Validator` has accepted it, so every method here may assume an
//! acyclic graph whose edges name known assets.

use crate::policy::SchedulingPolicy;
use crate::validate::Validator;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sluice_core::AssetKey;
use sluice_partition::{MappingError, PartitionMapping, PartitionsDefinition};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Graph construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two assets share a key
    #[error("asset `{asset_key}` is defined more than once")]
    DuplicateAsset {
        /// The key
        asset_key: AssetKey,
    },
    /// An asset depends on itself
    #[error("asset `{asset_key}` depends on itself")]
    SelfDependency {
        /// The key
        asset_key: AssetKey,
    },
    /// The same edge is declared twice
    #[error("dependency `{child}` -> `{parent}` is declared more than once")]
    DuplicateDependency {
        /// Downstream end
        child: AssetKey,
        /// Upstream end
        parent: AssetKey,
    },
    /// An edge names an asset that is not defined
    #[error("`{referenced_by}` depends on undefined asset `{asset_key}`")]
    UnknownAsset {
        /// The missing key
        asset_key: AssetKey,
        /// Asset declaring the edge
        referenced_by: AssetKey,
    },
    /// The dependencies form a cycle
    #[error("dependency cycle: {}", join_keys(.path))]
    Cycle {
        /// Assets on the cycle, first repeated at the end
        path: Vec<AssetKey>,
    },
    /// An asset's partitions definition is unusable
    #[error("asset `{asset_key}` has invalid partitions: {reason}")]
    InvalidPartitions {
        /// The key
        asset_key: AssetKey,
        /// What is wrong
        reason: String,
    },
    /// Differently partitioned assets are connected without a mapping
    #[error("dependency `{child}` -> `{parent}` needs an explicit partition mapping")]
    MissingMapping {
        /// Downstream end
        child: AssetKey,
        /// Upstream end
        parent: AssetKey,
    },
    /// The declared mapping cannot connect the two assets
    #[error("dependency `{child}` -> `{parent}`: {source}")]
    InvalidMapping {
        /// Downstream end
        child: AssetKey,
        /// Upstream end
        parent: AssetKey,
        /// Why
        #[source]
        source: MappingError,
    },
}

fn join_keys(keys: &[AssetKey]) -> String {
    keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}

/// Asset kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Computed by the system
    #[default]
    Materializable,
    /// External data that is observed, never computed
    ObservableSource,
}

/// One asset of the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetNode {
    /// Asset key
    pub key: AssetKey,
    /// Partition key universe
    #[serde(default)]
    pub partitions: PartitionsDefinition,
    /// Asset kind
    #[serde(default)]
    pub kind: AssetKind,
    /// Scheduling policy (`None` behaves as always-include)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<SchedulingPolicy>,
}

impl AssetNode {
    /// Unpartitioned, materializable asset with no policy
    #[must_use]
    pub fn new(key: AssetKey) -> Self {
        Self {
            key,
            partitions: PartitionsDefinition::Unpartitioned,
            kind: AssetKind::Materializable,
            policy: None,
        }
    }

    /// Set the partitions definition
    #[must_use]
    pub fn with_partitions(mut self, partitions: PartitionsDefinition) -> Self {
        self.partitions = partitions;
        self
    }

    /// Set the scheduling policy
    #[must_use]
    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Mark as an observable source
    #[must_use]
    pub fn observable_source(mut self) -> Self {
        self.kind = AssetKind::ObservableSource;
        self
    }

    /// Whether this is an observable source
    #[must_use]
    pub fn is_observable_source(&self) -> bool {
        self.kind == AssetKind::ObservableSource
    }

    /// Policy applied to candidates, always-include if none is attached
    #[must_use]
    pub fn effective_policy(&self) -> &SchedulingPolicy {
        static ALWAYS_INCLUDE: SchedulingPolicy = SchedulingPolicy::AlwaysInclude;
        self.policy.as_ref().unwrap_or(&ALWAYS_INCLUDE)
    }
}

/// A declared dependency edge, mapping not yet resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDep {
    /// Downstream asset
    pub child: AssetKey,
    /// Upstream asset
    pub parent: AssetKey,
    /// Explicit mapping, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<PartitionMapping>,
}

/// Collects assets and dependencies, then validates them into a graph
#[derive(Debug, Clone, Default)]
pub struct AssetGraphBuilder {
    pub(crate) nodes: Vec<AssetNode>,
    pub(crate) deps: Vec<AssetDep>,
}

impl AssetGraphBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset
    #[must_use]
    pub fn add_asset(mut self, node: AssetNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// `child` depends on `parent` with the default mapping
    #[must_use]
    pub fn add_dependency(self, child: AssetKey, parent: AssetKey) -> Self {
        self.add_dep(AssetDep {
            child,
            parent,
            mapping: None,
        })
    }

    /// `child` depends on `parent` through `mapping`
    #[must_use]
    pub fn add_mapped_dependency(self, child: AssetKey, parent: AssetKey, mapping: PartitionMapping) -> Self {
        self.add_dep(AssetDep {
            child,
            parent,
            mapping: Some(mapping),
        })
    }

    /// Add a declared edge
    #[must_use]
    pub fn add_dep(mut self, dep: AssetDep) -> Self {
        self.deps.push(dep);
        self
    }

    /// Every problem with the declared graph
    #[must_use]
    pub fn problems(&self) -> Vec<GraphError> {
        Validator::new().validate(self).err().unwrap_or_default()
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Returns the first problem the validator finds
    pub fn build(self) -> Result<AssetGraph, GraphError> {
        // the validator never fails with an empty list
        self.build_all().map_err(|mut errors| errors.swap_remove(0))
    }

    /// Validate and build, reporting every problem
    ///
    /// # Errors
    ///
    /// Returns all problems the validator finds
    pub fn build_all(self) -> Result<AssetGraph, Vec<GraphError>> {
        let mappings = Validator::new().validate(&self)?;
        Ok(AssetGraph::assemble(self.nodes, mappings))
    }
}

/// Validated asset graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetGraph {
    nodes: IndexMap<AssetKey, AssetNode>,
    /// child -> parent -> mapping
    parents: BTreeMap<AssetKey, BTreeMap<AssetKey, PartitionMapping>>,
    /// parent -> children
    children: BTreeMap<AssetKey, BTreeSet<AssetKey>>,
    levels: Vec<BTreeSet<AssetKey>>,
    level_of: BTreeMap<AssetKey, usize>,
}

impl AssetGraph {
    /// Start building a graph
    #[must_use]
    pub fn builder() -> AssetGraphBuilder {
        AssetGraphBuilder::new()
    }

    /// Resolved edges keyed by `(child, parent)`; the validator has
    /// already proven them acyclic.
    fn assemble(nodes: Vec<AssetNode>, edges: BTreeMap<(AssetKey, AssetKey), PartitionMapping>) -> Self {
        let nodes: IndexMap<AssetKey, AssetNode> = nodes.into_iter().map(|n| (n.key.clone(), n)).collect();
        let mut parents: BTreeMap<AssetKey, BTreeMap<AssetKey, PartitionMapping>> = BTreeMap::new();
        let mut children: BTreeMap<AssetKey, BTreeSet<AssetKey>> = BTreeMap::new();
        for ((child, parent), mapping) in edges {
            children.entry(parent.clone()).or_default().insert(child.clone());
            parents.entry(child).or_default().insert(parent, mapping);
        }

        // Kahn's algorithm, one level at a time
        let mut pending: BTreeMap<&AssetKey, usize> = nodes
            .keys()
            .map(|k| (k, parents.get(k).map_or(0, BTreeMap::len)))
            .collect();
        let mut levels = Vec::new();
        let mut level_of = BTreeMap::new();
        let mut frontier: BTreeSet<AssetKey> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(k, _)| (*k).clone())
            .collect();
        while !frontier.is_empty() {
            let mut next = BTreeSet::new();
            for key in &frontier {
                level_of.insert(key.clone(), levels.len());
                for child in children.get(key).into_iter().flatten() {
                    if let Some(n) = pending.get_mut(child) {
                        *n -= 1;
                        if *n == 0 {
                            next.insert(child.clone());
                        }
                    }
                }
            }
            levels.push(frontier);
            frontier = next;
        }

        Self {
            nodes,
            parents,
            children,
            levels,
            level_of,
        }
    }

    /// Look up an asset
    #[must_use]
    pub fn node(&self, key: &AssetKey) -> Option<&AssetNode> {
        self.nodes.get(key)
    }

    /// Whether the asset is defined
    #[must_use]
    pub fn contains(&self, key: &AssetKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Assets in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &AssetNode> {
        self.nodes.values()
    }

    /// Number of assets
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no assets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct parents of `key`
    pub fn parents<'a>(&'a self, key: &AssetKey) -> impl Iterator<Item = &'a AssetKey> + use<'a> {
        self.parents.get(key).into_iter().flat_map(BTreeMap::keys)
    }

    /// Direct children of `key`
    pub fn children<'a>(&'a self, key: &AssetKey) -> impl Iterator<Item = &'a AssetKey> + use<'a> {
        self.children.get(key).into_iter().flatten()
    }

    /// Whether `key` has any parent
    #[must_use]
    pub fn has_parents(&self, key: &AssetKey) -> bool {
        self.parents.get(key).is_some_and(|p| !p.is_empty())
    }

    /// Resolved mapping of the edge `child -> parent`
    #[must_use]
    pub fn mapping(&self, child: &AssetKey, parent: &AssetKey) -> Option<&PartitionMapping> {
        self.parents.get(child).and_then(|p| p.get(parent))
    }

    /// Every edge as `(child, parent, mapping)`
    pub fn edges(&self) -> impl Iterator<Item = (&AssetKey, &AssetKey, &PartitionMapping)> {
        self.parents
            .iter()
            .flat_map(|(child, ps)| ps.iter().map(move |(parent, m)| (child, parent, m)))
    }

    /// Assets grouped so each level depends only on earlier levels
    #[must_use]
    pub fn toposort_levels(&self) -> &[BTreeSet<AssetKey>] {
        &self.levels
    }

    /// Level index of an asset
    #[must_use]
    pub fn level_of(&self, key: &AssetKey) -> Option<usize> {
        self.level_of.get(key).copied()
    }

    /// Transitive parents of `key`
    #[must_use]
    pub fn ancestors(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        self.walk(key, |k| self.parents(k).cloned().collect())
    }

    /// Transitive children of `key`
    #[must_use]
    pub fn descendants(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        self.walk(key, |k| self.children(k).cloned().collect())
    }

    fn walk<F>(&self, start: &AssetKey, next: F) -> BTreeSet<AssetKey>
    where
        F: Fn(&AssetKey) -> Vec<AssetKey>,
    {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<AssetKey> = next(start).into();
        while let Some(key) = queue.pop_front() {
            if seen.insert(key.clone()) {
                queue.extend(next(&key));
            }
        }
        seen
    }
}
