//! Identifiers for assets, asset partitions, and stored events.
//!
//! Asset keys are paths of non-empty segments and serialize as their
//! `/`-joined user string, so manifests can write `"raw/orders"`.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of one partition within an asset's partitions definition
pub type PartitionKey = String;

/// Asset key - identifies one node of the asset graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetKey(Vec<String>);

impl AssetKey {
    /// Separator used by the user-facing string form
    pub const SEPARATOR: char = '/';

    /// Create a key from path segments
    ///
    /// # Errors
    ///
    /// Returns error if the path is empty or any segment is empty or
    /// contains the separator
    pub fn new<I, S>(path: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if path.is_empty() {
            return Err(CoreError::InvalidAssetKey {
                reason: "asset key has no segments".to_string(),
            });
        }
        for segment in &path {
            if segment.is_empty() {
                return Err(CoreError::InvalidAssetKey {
                    reason: "asset key segment is empty".to_string(),
                });
            }
            if segment.contains(Self::SEPARATOR) {
                return Err(CoreError::InvalidAssetKey {
                    reason: format!("segment `{}` contains `{}`", segment, Self::SEPARATOR),
                });
            }
        }
        Ok(Self(path))
    }

    /// Parse the `/`-joined user string form
    ///
    /// # Errors
    ///
    /// Returns error if any segment is empty
    pub fn from_user_string(value: &str) -> CoreResult<Self> {
        Self::new(value.split(Self::SEPARATOR))
    }

    /// Get the path segments
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.0
    }

    /// Get the `/`-joined user string form
    #[must_use]
    pub fn to_user_string(&self) -> String {
        self.0.join("/")
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

impl TryFrom<String> for AssetKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_user_string(&value)
    }
}

impl TryFrom<&str> for AssetKey {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_user_string(value)
    }
}

impl From<AssetKey> for String {
    fn from(key: AssetKey) -> Self {
        key.to_user_string()
    }
}

/// One partition of one asset (`partition_key` is `None` for unpartitioned assets)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetPartition {
    /// Owning asset
    pub asset_key: AssetKey,
    /// Partition within the asset
    pub partition_key: Option<PartitionKey>,
}

impl AssetPartition {
    /// Create an asset partition
    #[must_use]
    pub fn new(asset_key: AssetKey, partition_key: Option<PartitionKey>) -> Self {
        Self {
            asset_key,
            partition_key,
        }
    }

    /// The single partition of an unpartitioned asset
    #[must_use]
    pub fn unpartitioned(asset_key: AssetKey) -> Self {
        Self::new(asset_key, None)
    }

    /// A keyed partition
    #[must_use]
    pub fn keyed(asset_key: AssetKey, partition_key: impl Into<PartitionKey>) -> Self {
        Self::new(asset_key, Some(partition_key.into()))
    }

    /// Borrow the partition key
    #[must_use]
    pub fn partition(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }
}

impl fmt::Display for AssetPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition_key {
            Some(key) => write!(f, "{}[{}]", self.asset_key, key),
            None => write!(f, "{}", self.asset_key),
        }
    }
}

/// Storage id of an event in the instance event log
///
/// Ids are assigned in append order, so a larger id is a later event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    /// Create from raw storage id
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw storage id
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The id that follows this one
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt_{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_key_from_user_string() {
        let key = AssetKey::from_user_string("raw/orders").unwrap();
        assert_eq!(key.path(), &["raw".to_string(), "orders".to_string()]);
        assert_eq!(key.to_string(), "raw/orders");
    }

    #[test]
    fn test_asset_key_rejects_empty_segments() {
        assert!(AssetKey::from_user_string("").is_err());
        assert!(AssetKey::from_user_string("raw//orders").is_err());
        assert!(AssetKey::new(Vec::<String>::new()).is_err());
        assert!(AssetKey::new(["a/b"]).is_err());
    }

    #[test]
    fn test_asset_key_serde_as_string() {
        let key = AssetKey::new(["warehouse", "daily"]).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"warehouse/daily\"");

        let back: AssetKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        let bad: Result<AssetKey, _> = serde_json::from_str("\"a//b\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_asset_key_ordering() {
        let a = AssetKey::from_user_string("a").unwrap();
        let b = AssetKey::from_user_string("b").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_asset_partition_display() {
        let key = AssetKey::from_user_string("up").unwrap();
        assert_eq!(AssetPartition::unpartitioned(key.clone()).to_string(), "up");
        assert_eq!(AssetPartition::keyed(key, "A").to_string(), "up[A]");
    }

    #[test]
    fn test_event_id_order() {
        let first = EventId::from_raw(1);
        assert!(first < first.next());
        assert_eq!(first.next().as_u64(), 2);
        assert_eq!(first.to_string(), "evt_1");
    }
}
