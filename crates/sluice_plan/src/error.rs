//! Plan build errors.
//!
//! A plan build either returns a complete plan or one of these; there is
//! no partial result.

use crate::graph::GraphError;
use sluice_core::{AssetKey, PartitionKey};
use sluice_log::QueryError;
use sluice_partition::MappingError;

/// Plan build error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The asset graph is malformed
    #[error("invalid asset graph: {0}")]
    Graph(#[from] GraphError),

    /// A starting slice or lookup names an asset not in the graph
    #[error("unknown asset `{asset_key}`")]
    UnknownAsset {
        /// The asset
        asset_key: AssetKey,
    },

    /// A partition key is not valid for its asset
    #[error("`{partition_key}` is not a partition of `{asset_key}`")]
    InvalidPartitionKey {
        /// The asset
        asset_key: AssetKey,
        /// The key
        partition_key: PartitionKey,
    },

    /// A time-window operation was applied to another kind of asset
    #[error("asset `{asset_key}` is not time-window partitioned")]
    NotTimePartitioned {
        /// The asset
        asset_key: AssetKey,
    },

    /// A slice does not match its asset's partitioning
    #[error("slice does not match the partitioning of `{asset_key}`")]
    SliceShape {
        /// The asset
        asset_key: AssetKey,
    },

    /// Two assets are not connected by a dependency edge
    #[error("`{child}` does not depend on `{parent}`")]
    NotADependency {
        /// Supposed downstream asset
        child: AssetKey,
        /// Supposed upstream asset
        parent: AssetKey,
    },

    /// A partition mapping could not translate a slice
    #[error("mapping `{child}` -> `{parent}` failed: {source}")]
    Mapping {
        /// Downstream end of the edge
        child: AssetKey,
        /// Upstream end of the edge
        parent: AssetKey,
        /// Mapping failure
        #[source]
        source: MappingError,
    },

    /// The instance could not be queried
    #[error("instance query failed: {0}")]
    Query(#[from] QueryError),

    /// An asset's scheduling policy failed to evaluate
    #[error("policy of `{asset_key}` failed: {reason}")]
    Policy {
        /// The asset whose policy failed
        asset_key: AssetKey,
        /// What went wrong
        reason: String,
    },

    /// A manifest could not be read or decoded
    #[error("manifest error: {reason}")]
    Manifest {
        /// What went wrong
        reason: String,
    },
}

/// Result type for plan operations
pub type PlanResult<T> = Result<T, PlanError>;

impl PlanError {
    /// Whether the error is a configuration problem (as opposed to a
    /// query or policy failure)
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Graph(_)
                | Self::UnknownAsset { .. }
                | Self::InvalidPartitionKey { .. }
                | Self::NotTimePartitioned { .. }
                | Self::SliceShape { .. }
                | Self::NotADependency { .. }
                | Self::Manifest { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> AssetKey {
        AssetKey::from_user_string(name).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = PlanError::InvalidPartitionKey {
            asset_key: key("down"),
            partition_key: "9".to_string(),
        };
        assert_eq!(err.to_string(), "`9` is not a partition of `down`");

        let err = PlanError::Policy {
            asset_key: key("up"),
            reason: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "policy of `up` failed: boom");
    }

    #[test]
    fn test_error_classification() {
        assert!(PlanError::UnknownAsset { asset_key: key("x") }.is_configuration());
        let query: PlanError = QueryError::Unavailable {
            reason: "down".to_string(),
        }
        .into();
        assert!(!query.is_configuration());
    }
}
