//! sluice Core Types
//!
//! Pure value types shared by every sluice crate: asset keys, asset
//! partitions, storage event ids, UTC timestamps, and content hashes.
//! Nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod key;
pub mod time;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use hash::ContentHash;
pub use key::{AssetKey, AssetPartition, EventId, PartitionKey};
pub use time::Timestamp;
