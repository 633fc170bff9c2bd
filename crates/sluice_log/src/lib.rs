//! sluice Event Log
//!
//! Append-only materialization and observation events, the instance
//! query interface the scheduler reads through, and the snapshot reader
//! that pins every query of one plan build to a single watermark.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod instance;
pub mod query;
pub mod snapshot;
pub mod watermark;

pub use event::{AssetEvent, EventKind, EventRef, ReportedEvent};
pub use instance::MemoryInstance;
pub use query::{InstanceQueryer, QueryError, QueryResult};
pub use snapshot::SnapshotReader;
pub use watermark::Watermark;
