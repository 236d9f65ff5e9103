//! Atomic multi-key write batches.

use bytes::Bytes;

/// A single operation within a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Inserts or overwrites `key` with `value`.
    Put { key: Bytes, value: Bytes },
    /// Removes `key`. Deleting an absent key is a no-op.
    Delete { key: Bytes },
}

/// An ordered set of operations applied atomically by the store.
///
/// Operations apply in insertion order, so a later put to the same key
/// overrides an earlier one within the same batch.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put operation.
    pub fn put(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Appends a delete operation.
    pub fn delete(&mut self, key: impl Into<Bytes>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes the batch, yielding its operations in insertion order.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}
