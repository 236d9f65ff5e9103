//! Offset table error types.

use cqindex_kv::StoreError;
use thiserror::Error;

/// Errors from the offset index.
#[derive(Debug, Error)]
pub enum OffsetError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("malformed offset record: {reason}")]
    BadFrame { reason: String },

    #[error(
        "offset consistency violation for consume queue [topic={topic}, queue-id={queue_id}]: {detail}"
    )]
    Consistency {
        topic: String,
        queue_id: i32,
        detail: String,
    },
}
