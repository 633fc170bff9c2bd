//! sluice Partitions
//!
//! Partitions definitions (static keys and fixed-cadence time windows),
//! the per-asset partition space value type with its set algebra, and
//! the partition mappings that translate spaces across dependency edges.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod definition;
pub mod mapping;
pub mod space;
pub mod window;

pub use definition::{Cadence, PartitionsDefinition, StaticPartitions, TimeWindowPartitions};
pub use mapping::{MappingContext, MappingError, PartitionMapping};
pub use space::{PartitionSpace, PartitionSubset};
pub use window::TimeWindow;
