//! In-memory ordered store.
//!
//! Backed by a `BTreeMap` under a read-write lock, so iteration order is
//! the lexicographic key order a persistent engine would provide. Used by
//! tests and by embedders that have not wired a native engine yet.

use crate::batch::{BatchOp, WriteBatch};
use crate::error::StoreError;
use crate::store::OrderedStore;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct HoldState {
    holders: u64,
    closing: bool,
}

/// In-memory implementation of [`OrderedStore`].
#[derive(Default)]
pub struct MemStore {
    table: RwLock<BTreeMap<Vec<u8>, Bytes>>,
    hold_state: Mutex<HoldState>,
    drained: Condvar,
    /// Point-lookup counter, exposed so callers can observe cache hit rates.
    get_count: AtomicU64,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the store as closing and blocks until every outstanding holder
    /// has released. New holds are refused as soon as closing begins.
    pub fn close(&self) {
        let mut state = self.hold_state.lock();
        state.closing = true;
        while state.holders > 0 {
            self.drained.wait(&mut state);
        }
        tracing::info!("MemStore closed ({} keys)", self.table.read().len());
    }

    /// Returns the number of point lookups served so far.
    pub fn get_count(&self) -> u64 {
        self.get_count.load(Ordering::Relaxed)
    }

    /// Returns the number of keys currently stored.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl OrderedStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.table.read().get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut table = self.table.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    table.insert(key.to_vec(), value);
                }
                BatchOp::Delete { key } => {
                    table.remove(key.as_ref());
                }
            }
        }
        Ok(())
    }

    fn iter(&self) -> Result<Box<dyn Iterator<Item = (Bytes, Bytes)> + '_>, StoreError> {
        // Materializes the table under the read lock; the returned iterator
        // is a snapshot unaffected by later writes.
        let snapshot: Vec<(Bytes, Bytes)> = self
            .table
            .read()
            .iter()
            .map(|(k, v)| (Bytes::copy_from_slice(k), v.clone()))
            .collect();
        Ok(Box::new(snapshot.into_iter()))
    }

    fn try_hold(&self) -> bool {
        let mut state = self.hold_state.lock();
        if state.closing {
            return false;
        }
        state.holders += 1;
        true
    }

    fn release(&self) {
        let mut state = self.hold_state.lock();
        state.holders = state.holders.saturating_sub(1);
        if state.holders == 0 && state.closing {
            self.drained.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn put_batch(pairs: &[(&[u8], &[u8])]) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (k, v) in pairs {
            batch.put(Bytes::copy_from_slice(k), Bytes::copy_from_slice(v));
        }
        batch
    }

    #[test]
    fn test_batch_write_and_get() {
        let store = MemStore::new();
        store
            .write(put_batch(&[(b"a", b"1"), (b"b", b"2")]))
            .unwrap();

        assert_eq!(store.get(b"a").unwrap().unwrap().as_ref(), b"1");
        assert_eq!(store.get(b"b").unwrap().unwrap().as_ref(), b"2");
        assert!(store.get(b"c").unwrap().is_none());
        assert_eq!(store.get_count(), 3);
    }

    #[test]
    fn test_batch_later_put_wins() {
        let store = MemStore::new();
        let mut batch = WriteBatch::new();
        batch.put(&b"k"[..], &b"old"[..]);
        batch.put(&b"k"[..], &b"new"[..]);
        store.write(batch).unwrap();

        assert_eq!(store.get(b"k").unwrap().unwrap().as_ref(), b"new");
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let store = MemStore::new();
        let mut batch = WriteBatch::new();
        batch.delete(&b"missing"[..]);
        store.write(batch).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_iter_is_ordered_snapshot() {
        let store = MemStore::new();
        store
            .write(put_batch(&[(b"b", b"2"), (b"a", b"1")]))
            .unwrap();

        let iter = store.iter().unwrap();
        // Write after the iterator was created; the snapshot must not see it.
        store.write(put_batch(&[(b"c", b"3")])).unwrap();

        let keys: Vec<Bytes> = iter.map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Bytes::from("a"), Bytes::from("b")]);
    }

    #[test]
    fn test_hold_released_on_guard_drop() {
        let store = MemStore::new();
        {
            let _guard = store.hold().unwrap();
        }
        // All holders released, close returns immediately.
        store.close();
        assert!(store.hold().is_none());
    }

    #[test]
    fn test_close_blocks_until_holders_drain() {
        let store = Arc::new(MemStore::new());
        assert!(store.try_hold());

        let closer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.close())
        };

        // Give the closer a moment to block on the outstanding holder.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!closer.is_finished());
        assert!(!store.try_hold(), "no new holds once closing");

        store.release();
        closer.join().unwrap();
    }
}
