//! Ordered store contract.

use crate::batch::WriteBatch;
use crate::error::StoreError;
use bytes::Bytes;

/// Embedded ordered key-value store consumed by the offset table.
///
/// Keys and values are opaque byte sequences. Implementations must apply
/// batches atomically and must serve [`OrderedStore::iter`] from a
/// point-in-time snapshot: writes issued after the iterator is created may
/// or may not be observed, but never corrupt the scan.
pub trait OrderedStore: Send + Sync {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError>;

    /// Applies every operation in `batch` atomically.
    fn write(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Forward iteration over the full table in key order, starting from the
    /// first key, with snapshot semantics.
    fn iter(&self) -> Result<Box<dyn Iterator<Item = (Bytes, Bytes)> + '_>, StoreError>;

    /// Registers an outstanding holder. Returns false once the store has
    /// begun closing; a false return means the caller must not write.
    fn try_hold(&self) -> bool;

    /// Releases one holder registered by [`OrderedStore::try_hold`].
    fn release(&self);

    /// Acquires a scoped holder that is released on drop, on every exit path.
    fn hold(&self) -> Option<StoreGuard<'_, Self>>
    where
        Self: Sized,
    {
        if self.try_hold() {
            Some(StoreGuard { store: self })
        } else {
            None
        }
    }
}

/// RAII holder keeping the store open for the duration of a write.
pub struct StoreGuard<'a, S: OrderedStore> {
    store: &'a S,
}

impl<S: OrderedStore> Drop for StoreGuard<'_, S> {
    fn drop(&mut self) {
        self.store.release();
    }
}
