//! Instance query interface.

use crate::event::EventRef;
use crate::watermark::Watermark;
use sluice_core::{AssetKey, EventId};

/// Query errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Storage could not be read
    #[error("instance unavailable: {reason}")]
    Unavailable {
        /// What failed
        reason: String,
    },
    /// Stored or loaded events are not usable
    #[error("malformed event log: {reason}")]
    Malformed {
        /// What is wrong
        reason: String,
    },
}

/// Result type for instance queries
pub type QueryResult<T> = Result<T, QueryError>;

/// Read-only view of an instance's event log
///
/// Every lookup takes the watermark it must respect; implementations
/// never return an event the watermark does not admit.
pub trait InstanceQueryer: Send + Sync {
    /// Latest visible materialization of one asset partition
    ///
    /// # Errors
    ///
    /// Returns error if storage cannot be read
    fn latest_materialization_event(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        watermark: &Watermark,
    ) -> QueryResult<Option<EventRef>>;

    /// Latest visible observation of one asset partition
    ///
    /// # Errors
    ///
    /// Returns error if storage cannot be read
    fn latest_observation_event(
        &self,
        asset_key: &AssetKey,
        partition_key: Option<&str>,
        watermark: &Watermark,
    ) -> QueryResult<Option<EventRef>>;

    /// Id of the newest stored event, if any
    ///
    /// # Errors
    ///
    /// Returns error if storage cannot be read
    fn latest_event_id(&self) -> QueryResult<Option<EventId>>;
}
