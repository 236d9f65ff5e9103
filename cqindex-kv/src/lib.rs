//! # cqindex-kv
//!
//! Ordered key-value store contract for cqindex.
//!
//! This crate provides:
//! - The [`OrderedStore`] trait: point get, atomic multi-key batch writes,
//!   and point-in-time forward iteration over opaque byte keys and values
//! - A scoped open guard ([`StoreGuard`]) that blocks store shutdown while
//!   writes are in flight
//! - [`MemStore`], an in-memory ordered reference implementation

pub mod batch;
pub mod error;
pub mod mem;
pub mod store;

pub use batch::{BatchOp, WriteBatch};
pub use error::StoreError;
pub use mem::MemStore;
pub use store::{OrderedStore, StoreGuard};
