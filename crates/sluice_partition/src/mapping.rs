//! Partition mappings between a child asset and one of its parents.
//!
//! A mapping is attached to a dependency edge and translates a subset of
//! the child's partitions into the parent's partitions and back. The
//! reverse direction of `TimeWindowOverlap` is an over-approximation:
//! a round trip may grow the subset but never shrinks it.

use crate::definition::PartitionsDefinition;
use crate::space::PartitionSubset;
use serde::{Deserialize, Serialize};
use sluice_core::{CoreError, PartitionKey, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Mapping errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// The mapping cannot connect these two definitions
    #[error("{mapping} mapping cannot connect {child} child to {parent} parent: {reason}")]
    Incompatible {
        /// Mapping kind
        mapping: &'static str,
        /// Child definition kind
        child: &'static str,
        /// Parent definition kind
        parent: &'static str,
        /// What is wrong
        reason: String,
    },
    /// A key named by a static key map is not declared by its definition
    #[error("static key map names undeclared {side} key `{key}`")]
    UndeclaredKey {
        /// Which end of the edge
        side: &'static str,
        /// The key
        key: PartitionKey,
    },
    /// A subset holds a key its definition cannot interpret
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Definitions and effective time needed to translate one edge
#[derive(Debug, Clone, Copy)]
pub struct MappingContext<'a> {
    /// Definition of the downstream asset
    pub child: &'a PartitionsDefinition,
    /// Definition of the upstream asset
    pub parent: &'a PartitionsDefinition,
    /// Time at which the key universes are evaluated
    pub effective_dt: Timestamp,
}

impl<'a> MappingContext<'a> {
    /// Create a context
    #[must_use]
    pub const fn new(
        child: &'a PartitionsDefinition,
        parent: &'a PartitionsDefinition,
        effective_dt: Timestamp,
    ) -> Self {
        Self {
            child,
            parent,
            effective_dt,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToParent,
    ToChild,
}

/// Partition mapping of a dependency edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionMapping {
    /// Same key on both ends
    #[default]
    Identity,
    /// Explicit parent key to child keys table, many-to-many
    StaticKeyMap {
        /// Parent key to the child keys it feeds
        map: BTreeMap<PartitionKey, BTreeSet<PartitionKey>>,
    },
    /// Windows correspond when their intervals intersect
    TimeWindowOverlap,
    /// Any nonempty subset maps to the whole other side
    AllPartitions,
}

impl PartitionMapping {
    /// Static key map from `(parent_key, child_key)` pairs
    #[must_use]
    pub fn static_key_map<I, P, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<PartitionKey>,
        C: Into<PartitionKey>,
    {
        let mut map: BTreeMap<PartitionKey, BTreeSet<PartitionKey>> = BTreeMap::new();
        for (parent, child) in pairs {
            map.entry(parent.into()).or_default().insert(child.into());
        }
        Self::StaticKeyMap { map }
    }

    /// Mapping used when an edge does not name one
    ///
    /// Only identical definitions get a default.
    #[must_use]
    pub fn default_for(child: &PartitionsDefinition, parent: &PartitionsDefinition) -> Option<Self> {
        (child == parent).then_some(Self::Identity)
    }

    /// Short name of the mapping kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::StaticKeyMap { .. } => "static_key_map",
            Self::TimeWindowOverlap => "time_window_overlap",
            Self::AllPartitions => "all_partitions",
        }
    }

    /// Check the mapping can connect the two definitions
    ///
    /// # Errors
    ///
    /// Returns error if the definitions have the wrong shape for this
    /// mapping or a static key map names undeclared keys
    pub fn validate(
        &self,
        child: &PartitionsDefinition,
        parent: &PartitionsDefinition,
    ) -> Result<(), MappingError> {
        let incompatible = |reason: &str| MappingError::Incompatible {
            mapping: self.kind(),
            child: definition_kind(child),
            parent: definition_kind(parent),
            reason: reason.to_string(),
        };
        match self {
            Self::Identity if child != parent => Err(incompatible("definitions differ")),
            Self::Identity | Self::AllPartitions => Ok(()),
            Self::StaticKeyMap { map } => {
                let (Some(child_static), Some(parent_static)) = (child.as_static(), parent.as_static())
                else {
                    return Err(incompatible("both ends must be statically partitioned"));
                };
                for (parent_key, child_keys) in map {
                    if !parent_static.contains(parent_key) {
                        return Err(MappingError::UndeclaredKey {
                            side: "parent",
                            key: parent_key.clone(),
                        });
                    }
                    if let Some(key) = child_keys.iter().find(|k| !child_static.contains(k)) {
                        return Err(MappingError::UndeclaredKey {
                            side: "child",
                            key: key.clone(),
                        });
                    }
                }
                Ok(())
            }
            Self::TimeWindowOverlap => {
                if child.as_time_window().is_none() || parent.as_time_window().is_none() {
                    return Err(incompatible("both ends must be time-window partitioned"));
                }
                Ok(())
            }
        }
    }

    /// Translate a child subset into the parent's partitions
    ///
    /// # Errors
    ///
    /// Returns error if a key in `child_subset` cannot be interpreted by
    /// the child definition
    pub fn map_to_parent(
        &self,
        child_subset: &PartitionSubset,
        ctx: &MappingContext<'_>,
    ) -> Result<PartitionSubset, MappingError> {
        self.translate(child_subset, ctx, Direction::ToParent)
    }

    /// Translate a parent subset into the child's partitions
    ///
    /// # Errors
    ///
    /// Returns error if a key in `parent_subset` cannot be interpreted by
    /// the parent definition
    pub fn map_to_child(
        &self,
        parent_subset: &PartitionSubset,
        ctx: &MappingContext<'_>,
    ) -> Result<PartitionSubset, MappingError> {
        self.translate(parent_subset, ctx, Direction::ToChild)
    }

    fn translate(
        &self,
        subset: &PartitionSubset,
        ctx: &MappingContext<'_>,
        direction: Direction,
    ) -> Result<PartitionSubset, MappingError> {
        let (source, target) = match direction {
            Direction::ToParent => (ctx.child, ctx.parent),
            Direction::ToChild => (ctx.parent, ctx.child),
        };
        let dt = ctx.effective_dt;
        if subset.is_empty() {
            return Ok(target.empty_subset());
        }

        match self {
            Self::AllPartitions => Ok(target.complete_subset(dt)),
            Self::Identity => match subset {
                PartitionSubset::Unpartitioned { .. } if !target.is_partitioned() => Ok(subset.clone()),
                PartitionSubset::Keys(keys) => Ok(PartitionSubset::Keys(
                    keys.iter()
                        .filter(|k| target.has_partition_key(k, dt))
                        .cloned()
                        .collect(),
                )),
                PartitionSubset::Unpartitioned { .. } => Ok(target.empty_subset()),
            },
            Self::StaticKeyMap { map } => {
                let Some(keys) = subset.keys() else {
                    return Ok(target.empty_subset());
                };
                let mapped = match direction {
                    Direction::ToChild => keys
                        .iter()
                        .filter_map(|k| map.get(k))
                        .flatten()
                        .cloned()
                        .collect(),
                    Direction::ToParent => map
                        .iter()
                        .filter(|(_, children)| !children.is_disjoint(keys))
                        .map(|(parent, _)| parent.clone())
                        .collect(),
                };
                Ok(PartitionSubset::Keys(mapped))
            }
            Self::TimeWindowOverlap => {
                let (Some(from), Some(to), Some(keys)) =
                    (source.as_time_window(), target.as_time_window(), subset.keys())
                else {
                    return Ok(target.empty_subset());
                };
                let mut mapped = BTreeSet::new();
                for key in keys {
                    let window = from.time_window_for_key(key)?;
                    mapped.extend(to.keys_overlapping(&window, dt));
                }
                Ok(PartitionSubset::Keys(mapped))
            }
        }
    }
}

impl fmt::Display for PartitionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

fn definition_kind(def: &PartitionsDefinition) -> &'static str {
    match def {
        PartitionsDefinition::Unpartitioned => "unpartitioned",
        PartitionsDefinition::Static(_) => "static",
        PartitionsDefinition::TimeWindow(_) => "time_window",
    }
}
