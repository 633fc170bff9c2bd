//! Asset manifests and the caller-owned manifest cache.
//!
//! A manifest is the JSON description of an asset graph:
//!
//! ```json
//! {
//!   "assets": [
//!     { "key": "raw/events", "partitions": { "type": "time_window", "cadence": "daily", "start": "2024-01-01T00:00:00Z" } },
//!     { "key": "daily_summary", "policy": { "type": "default" }, "deps": [{ "asset": "raw/events" }] }
//!   ]
//! }
//! ```

use crate::error::{PlanError, PlanResult};
use crate::graph::{AssetDep, AssetGraph, AssetGraphBuilder, AssetKind, AssetNode, GraphError};
use crate::policy::SchedulingPolicy;
use serde::{Deserialize, Serialize};
use sluice_core::{AssetKey, ContentHash};
use sluice_partition::{PartitionMapping, PartitionsDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A dependency as written in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepSpec {
    /// Upstream asset
    pub asset: AssetKey,
    /// Explicit mapping; the default is resolved from the definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<PartitionMapping>,
}

/// One asset as written in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Asset key, `/`-separated
    pub key: AssetKey,
    /// Partitions definition, unpartitioned if absent
    #[serde(default)]
    pub partitions: PartitionsDefinition,
    /// Asset kind
    #[serde(default)]
    pub kind: AssetKind,
    /// Scheduling policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<SchedulingPolicy>,
    /// Upstream dependencies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<DepSpec>,
}

/// Asset graph description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// Assets in declaration order
    pub assets: Vec<AssetSpec>,
}

impl AssetManifest {
    /// Decode a manifest
    ///
    /// # Errors
    ///
    /// Returns error if `json` is not a valid manifest
    pub fn from_json_str(json: &str) -> PlanResult<Self> {
        serde_json::from_str(json).map_err(|e| PlanError::Manifest {
            reason: e.to_string(),
        })
    }

    /// Read and decode a manifest file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or decoded
    pub fn from_path(path: impl AsRef<Path>) -> PlanResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PlanError::Manifest {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    /// Encode as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn to_json_pretty(&self) -> PlanResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PlanError::Manifest {
            reason: e.to_string(),
        })
    }

    /// Graph builder holding the manifest's assets and edges
    #[must_use]
    pub fn into_builder(self) -> AssetGraphBuilder {
        let mut builder = AssetGraph::builder();
        for spec in self.assets {
            for dep in spec.deps {
                builder = builder.add_dep(AssetDep {
                    child: spec.key.clone(),
                    parent: dep.asset,
                    mapping: dep.mapping,
                });
            }
            builder = builder.add_asset(AssetNode {
                key: spec.key,
                partitions: spec.partitions,
                kind: spec.kind,
                policy: spec.policy,
            });
        }
        builder
    }

    /// Every problem with the described graph
    #[must_use]
    pub fn problems(&self) -> Vec<GraphError> {
        self.clone().into_builder().problems()
    }

    /// Validate and build the described graph
    ///
    /// # Errors
    ///
    /// Returns the first graph problem found
    pub fn build_graph(self) -> PlanResult<AssetGraph> {
        Ok(self.into_builder().build()?)
    }
}

/// Parsed graphs keyed by manifest content hash
///
/// Owned by the caller; identical manifest bytes are parsed and validated
/// once per cache.
#[derive(Debug, Default)]
pub struct ManifestCache {
    graphs: HashMap<ContentHash, Arc<AssetGraph>>,
    hits: u64,
    misses: u64,
}

impl ManifestCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph for a manifest source, parsing it on first sight
    ///
    /// # Errors
    ///
    /// Returns error if the manifest is malformed or describes an invalid
    /// graph; failures are not cached
    pub fn load(&mut self, source: &str) -> PlanResult<Arc<AssetGraph>> {
        let hash = ContentHash::compute(source.as_bytes());
        if let Some(graph) = self.graphs.get(&hash) {
            self.hits += 1;
            tracing::trace!(%hash, "manifest cache hit");
            return Ok(Arc::clone(graph));
        }
        self.misses += 1;
        let graph = Arc::new(AssetManifest::from_json_str(source)?.build_graph()?);
        tracing::debug!(%hash, assets = graph.len(), "parsed manifest");
        self.graphs.insert(hash, Arc::clone(&graph));
        Ok(graph)
    }

    /// Graph for a manifest file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or [`Self::load`] fails
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> PlanResult<Arc<AssetGraph>> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| PlanError::Manifest {
            reason: format!("{}: {e}", path.display()),
        })?;
        self.load(&source)
    }

    /// Number of cached graphs
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// `(hits, misses)` so far
    #[must_use]
    pub const fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Drop every cached graph
    pub fn clear(&mut self) {
        self.graphs.clear();
    }
}
