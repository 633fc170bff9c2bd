//! Partition spaces: subsets of one asset's partitions.
//!
//! Subsets are always explicit key sets (or a present/absent flag for
//! unpartitioned assets). A time-partitioned subset may be any set of
//! windows, contiguous or not; nothing here assumes a single interval.

use serde::{Deserialize, Serialize};
use sluice_core::{AssetKey, AssetPartition, PartitionKey};
use std::collections::BTreeSet;
use std::fmt;

/// A subset of one asset's partition key space
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionSubset {
    /// Unpartitioned asset: either the whole asset or nothing
    Unpartitioned {
        /// Whether the asset is in the subset
        present: bool,
    },
    /// Explicit partition keys
    Keys(BTreeSet<PartitionKey>),
}

impl PartitionSubset {
    /// Empty keyed subset
    #[must_use]
    pub fn empty_keys() -> Self {
        Self::Keys(BTreeSet::new())
    }

    /// Keyed subset from keys
    #[must_use]
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PartitionKey>,
    {
        Self::Keys(keys.into_iter().map(Into::into).collect())
    }

    /// Whether nothing is in the subset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Unpartitioned { present } => !present,
            Self::Keys(keys) => keys.is_empty(),
        }
    }

    /// Number of asset partitions in the subset
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Unpartitioned { present } => usize::from(*present),
            Self::Keys(keys) => keys.len(),
        }
    }

    /// Whether the partition is in the subset
    #[must_use]
    pub fn contains(&self, partition_key: Option<&str>) -> bool {
        match (self, partition_key) {
            (Self::Unpartitioned { present }, None) => *present,
            (Self::Keys(keys), Some(key)) => keys.contains(key),
            _ => false,
        }
    }

    /// Borrow the keys of a keyed subset
    #[must_use]
    pub fn keys(&self) -> Option<&BTreeSet<PartitionKey>> {
        match self {
            Self::Keys(keys) => Some(keys),
            Self::Unpartitioned { .. } => None,
        }
    }

    /// Set union
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a || b, |a, b| a.union(b).cloned().collect())
    }

    /// Set intersection
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a && b, |a, b| a.intersection(b).cloned().collect())
    }

    /// Set difference
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a && !b, |a, b| a.difference(b).cloned().collect())
    }

    /// Whether every member of `self` is in `other`
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }

    /// Mixed shapes only arise from an empty placeholder, so the
    /// unpartitioned side is read as the empty key set.
    fn combine(
        &self,
        other: &Self,
        flag: fn(bool, bool) -> bool,
        keys: fn(&BTreeSet<PartitionKey>, &BTreeSet<PartitionKey>) -> BTreeSet<PartitionKey>,
    ) -> Self {
        let none = BTreeSet::new();
        match (self, other) {
            (Self::Unpartitioned { present: a }, Self::Unpartitioned { present: b }) => {
                Self::Unpartitioned { present: flag(*a, *b) }
            }
            (Self::Keys(a), Self::Keys(b)) => Self::Keys(keys(a, b)),
            (Self::Keys(a), Self::Unpartitioned { .. }) => Self::Keys(keys(a, &none)),
            (Self::Unpartitioned { .. }, Self::Keys(b)) => Self::Keys(keys(&none, b)),
        }
    }
}

/// A subset of one asset's partitions, tagged with the asset
///
/// Also called an asset slice. Values are immutable; every operation
/// returns a new space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionSpace {
    asset_key: AssetKey,
    subset: PartitionSubset,
}

impl PartitionSpace {
    /// Create a space
    #[must_use]
    pub fn new(asset_key: AssetKey, subset: PartitionSubset) -> Self {
        Self { asset_key, subset }
    }

    /// Space of the given partition keys
    #[must_use]
    pub fn from_partition_keys<I, S>(asset_key: AssetKey, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PartitionKey>,
    {
        Self::new(asset_key, PartitionSubset::from_keys(keys))
    }

    /// The whole of an unpartitioned asset
    #[must_use]
    pub fn unpartitioned(asset_key: AssetKey) -> Self {
        Self::new(asset_key, PartitionSubset::Unpartitioned { present: true })
    }

    /// Space holding exactly one asset partition
    #[must_use]
    pub fn single(partition: &AssetPartition) -> Self {
        let subset = match &partition.partition_key {
            Some(key) => PartitionSubset::from_keys([key.clone()]),
            None => PartitionSubset::Unpartitioned { present: true },
        };
        Self::new(partition.asset_key.clone(), subset)
    }

    /// Owning asset
    #[must_use]
    pub fn asset_key(&self) -> &AssetKey {
        &self.asset_key
    }

    /// Underlying subset
    #[must_use]
    pub fn subset(&self) -> &PartitionSubset {
        &self.subset
    }

    /// Whether nothing is in the space
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subset.is_empty()
    }

    /// Whether anything is in the space
    #[must_use]
    pub fn is_nonempty(&self) -> bool {
        !self.subset.is_empty()
    }

    /// Number of asset partitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.subset.len()
    }

    /// Empty space of the same asset and shape
    #[must_use]
    pub fn empty_like(&self) -> Self {
        let subset = match self.subset {
            PartitionSubset::Unpartitioned { .. } => PartitionSubset::Unpartitioned { present: false },
            PartitionSubset::Keys(_) => PartitionSubset::empty_keys(),
        };
        Self::new(self.asset_key.clone(), subset)
    }

    /// Same asset, different subset
    #[must_use]
    pub fn with_subset(&self, subset: PartitionSubset) -> Self {
        Self::new(self.asset_key.clone(), subset)
    }

    /// Set union with a space of the same asset
    #[must_use]
    pub fn union(&self, other: &PartitionSpace) -> Self {
        debug_assert_eq!(self.asset_key, other.asset_key);
        self.with_subset(self.subset.union(&other.subset))
    }

    /// Set intersection with a space of the same asset
    #[must_use]
    pub fn intersect(&self, other: &PartitionSpace) -> Self {
        debug_assert_eq!(self.asset_key, other.asset_key);
        self.with_subset(self.subset.intersect(&other.subset))
    }

    /// Set difference with a space of the same asset
    #[must_use]
    pub fn difference(&self, other: &PartitionSpace) -> Self {
        debug_assert_eq!(self.asset_key, other.asset_key);
        self.with_subset(self.subset.difference(&other.subset))
    }

    /// Whether the asset partition is in the space
    #[must_use]
    pub fn contains(&self, partition: &AssetPartition) -> bool {
        partition.asset_key == self.asset_key && self.subset.contains(partition.partition())
    }

    /// Partition keys in the space (empty for unpartitioned assets)
    #[must_use]
    pub fn materialize_partition_keys(&self) -> BTreeSet<PartitionKey> {
        self.subset.keys().cloned().unwrap_or_default()
    }

    /// Asset partitions in the space
    #[must_use]
    pub fn materialize_asset_partitions(&self) -> BTreeSet<AssetPartition> {
        match &self.subset {
            PartitionSubset::Unpartitioned { present: true } => {
                BTreeSet::from([AssetPartition::unpartitioned(self.asset_key.clone())])
            }
            PartitionSubset::Unpartitioned { present: false } => BTreeSet::new(),
            PartitionSubset::Keys(keys) => keys
                .iter()
                .map(|k| AssetPartition::keyed(self.asset_key.clone(), k.clone()))
                .collect(),
        }
    }

    /// Keep the asset partitions for which `keep` returns true
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `keep`
    pub fn try_filter<E, F>(&self, mut keep: F) -> Result<Self, E>
    where
        F: FnMut(&AssetPartition) -> Result<bool, E>,
    {
        let subset = match &self.subset {
            PartitionSubset::Unpartitioned { present: false } => self.subset.clone(),
            PartitionSubset::Unpartitioned { present: true } => {
                let partition = AssetPartition::unpartitioned(self.asset_key.clone());
                PartitionSubset::Unpartitioned {
                    present: keep(&partition)?,
                }
            }
            PartitionSubset::Keys(keys) => {
                let mut kept = BTreeSet::new();
                for key in keys {
                    let partition = AssetPartition::keyed(self.asset_key.clone(), key.clone());
                    if keep(&partition)? {
                        kept.insert(key.clone());
                    }
                }
                PartitionSubset::Keys(kept)
            }
        };
        Ok(self.with_subset(subset))
    }
}

impl fmt::Display for PartitionSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subset {
            PartitionSubset::Unpartitioned { present: true } => write!(f, "{}", self.asset_key),
            PartitionSubset::Unpartitioned { present: false } => write!(f, "{}(empty)", self.asset_key),
            PartitionSubset::Keys(keys) => {
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                write!(f, "{}[{}]", self.asset_key, keys.join(", "))
            }
        }
    }
}
