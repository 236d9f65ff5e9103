//! # cqindex-offset
//!
//! Offset-tracking index for a broker's per-topic-queue consume queues,
//! persisted in an embedded ordered key-value store.
//!
//! For every (topic, queue) pair the table maintains two logical pointers,
//! the minimum and maximum consume-queue offsets still present, each bound
//! to the physical commit-log offset that produced it. This crate provides:
//! - A dense, order-preserving binary key/value codec
//! - A heap cache mirroring the latest known min/max offsets
//! - A global checkpoint of the highest dispatched physical offset
//! - A crash-recovery correction protocol reconciling logical offsets
//!   against the commit log's verified-durable boundary
//! - A full-table scan for offset entries orphaned by topic deletion

mod cache;
pub mod codec;
mod correct;
pub mod error;
mod scan;
pub mod table;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::OffsetError;
pub use table::{OffsetTable, OffsetTableConfig};
pub use types::{
    CommitLog, ConsumeQueueTable, DispatchEntry, OffsetEntry, OffsetKind, PhyAndCqOffset,
    SearchBound,
};
