//! Offset table - public read, write and destroy operations.

use crate::cache::OffsetCache;
use crate::codec::{
    checkpoint_key, decode_checkpoint_value, decode_offset_key, decode_offset_value,
    encode_checkpoint_value, encode_offset_key, encode_offset_value, OFFSET_VALUE_LEN,
};
use crate::error::OffsetError;
use crate::types::{
    CommitLog, ConsumeQueueTable, DispatchEntry, OffsetEntry, OffsetKind, PhyAndCqOffset,
};
use cqindex_kv::{OrderedStore, StoreError, WriteBatch};
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for the offset table.
#[derive(Debug, Clone, Default)]
pub struct OffsetTableConfig {
    /// Emit verbose per-operation diagnostics at warn level.
    pub diag_log: bool,
}

/// Offset-tracking index for per-topic-queue consume queues.
///
/// Dispatch writes land through [`OffsetTable::put_max_phy_and_cq_offset`]
/// into an atomic store batch; reads consult the heap cache first and fall
/// back to the store, repopulating the cache. Startup invokes
/// [`OffsetTable::load`] and the truncation protocol in the `correct`
/// module; maintenance invokes the dirty-topic scan.
pub struct OffsetTable<S, C, Q> {
    pub(crate) store: Arc<S>,
    pub(crate) commit_log: Arc<C>,
    pub(crate) cq_table: Arc<Q>,
    pub(crate) cache: OffsetCache,
    pub(crate) config: OffsetTableConfig,
}

impl<S: OrderedStore, C: CommitLog, Q: ConsumeQueueTable> OffsetTable<S, C, Q> {
    pub fn new(
        store: Arc<S>,
        commit_log: Arc<C>,
        cq_table: Arc<Q>,
        config: OffsetTableConfig,
    ) -> Self {
        Self {
            store,
            commit_log,
            cq_table,
            cache: OffsetCache::new(),
            config,
        }
    }

    /// Seeds the heap max-offset cache from every persisted maximum entry.
    /// Store errors are logged rather than failing startup.
    pub fn load(&self) {
        let result = self.for_each(
            |entry| entry.kind == OffsetKind::Maximum,
            |entry| {
                if self
                    .cache
                    .put_max_cq_offset_if_absent(&entry.topic, entry.queue_id, entry.cq_offset)
                {
                    tracing::info!(
                        "Loaded max offset {}:{} -> {}|{}",
                        entry.topic,
                        entry.queue_id,
                        entry.cq_offset,
                        entry.commit_log_offset
                    );
                }
            },
        );
        if let Err(e) = result {
            tracing::error!("Failed to load maximum consume queue offsets: {}", e);
        }
    }

    /// Iterates every well-formed persisted offset entry, invoking `f` for
    /// those matching `predicate`. Checkpoint records (8-byte values) are
    /// skipped; malformed frames are logged and skipped so corruption never
    /// halts startup.
    pub fn for_each<P, F>(&self, mut predicate: P, mut f: F) -> Result<(), OffsetError>
    where
        P: FnMut(&OffsetEntry) -> bool,
        F: FnMut(&OffsetEntry),
    {
        for (key, value) in self.store.iter()? {
            if value.len() != OFFSET_VALUE_LEN {
                continue;
            }
            let (topic, queue_id, kind) = match decode_offset_key(&key) {
                Ok(parts) => parts,
                Err(e) => {
                    tracing::warn!("Skipping malformed offset key: {}", e);
                    continue;
                }
            };
            let pair = match decode_offset_value(&value) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("Skipping malformed offset value: {}", e);
                    continue;
                }
            };
            let entry = OffsetEntry {
                topic,
                queue_id,
                kind,
                cq_offset: pair.cq_offset,
                commit_log_offset: pair.phy_offset,
            };
            if predicate(&entry) {
                f(&entry);
            }
        }
        Ok(())
    }

    /// Returns the maximum logical offset of a topic-queue, `-1` if it has
    /// never dispatched. The resolved value (including the `-1` sentinel)
    /// is cached so repeated misses do not hit the store.
    pub fn max_cq_offset(&self, topic: &str, queue_id: i32) -> Result<i64, OffsetError> {
        if let Some(cached) = self.cache.max_cq_offset(topic, queue_id) {
            return Ok(cached);
        }

        let offset = self
            .kv_offset(topic, queue_id, OffsetKind::Maximum)?
            .map(|pair| pair.cq_offset)
            .unwrap_or(-1);
        if self.cache.put_max_cq_offset_if_absent(topic, queue_id, offset) {
            tracing::info!(
                "Max offset of {}-{} initialized to {} from the store",
                topic,
                queue_id,
                offset
            );
        }
        if self.config.diag_log {
            tracing::warn!("update max offset in queue. {}-{}, {}", topic, queue_id, offset);
        }
        Ok(offset)
    }

    /// Returns the currently valid minimum logical offset, correcting it
    /// first if its physical offset fell below the commit log's retained
    /// minimum.
    pub fn min_cq_offset(&self, topic: &str, queue_id: i32) -> Result<i64, OffsetError> {
        let min_phy_offset = self.commit_log.min_phy_offset();
        let (ok, cq_offset) = self.is_min_offset_ok(topic, queue_id, min_phy_offset)?;
        if !ok && self.correct_min_cq_offset(topic, queue_id, cq_offset, min_phy_offset)? {
            if let Some(corrected) = self.cache.min_offset(topic, queue_id) {
                if self.config.diag_log {
                    tracing::warn!(
                        "min offset corrected. topic: {}, queueId: {}, old: {}, new: {}",
                        topic,
                        queue_id,
                        cq_offset,
                        corrected
                    );
                }
                return Ok(corrected.cq_offset);
            }
        }
        Ok(cq_offset)
    }

    /// Returns the physical component of the persisted maximum entry, or
    /// `None` if the entry is absent. Failures are logged and absorbed.
    pub fn max_phy_offset(&self, topic: &str, queue_id: i32) -> Option<i64> {
        match self.kv_offset(topic, queue_id, OffsetKind::Maximum) {
            Ok(pair) => pair.map(|p| p.phy_offset),
            Err(e) => {
                tracing::error!(
                    "Failed to read max physical offset of {}-{}: {}",
                    topic,
                    queue_id,
                    e
                );
                None
            }
        }
    }

    /// Reads the global checkpoint: the highest physical offset ever
    /// included in a dispatch batch. Defaults to 0 when never initialized.
    pub fn global_max_phy_offset(&self) -> Result<i64, OffsetError> {
        match self.store.get(&checkpoint_key())? {
            Some(value) => decode_checkpoint_value(&value),
            None => Ok(0),
        }
    }

    /// Persists one maximum entry per topic-queue (the last dispatch entry
    /// per queue wins) plus the checkpoint update, folded into a single
    /// atomic batch under the store guard.
    pub fn put_max_phy_and_cq_offset(
        &self,
        entries: &[DispatchEntry],
        max_phy_offset: i64,
    ) -> Result<(), OffsetError> {
        let _guard = self
            .store
            .hold()
            .ok_or(OffsetError::Store(StoreError::Closed))?;

        let mut latest: HashMap<(&str, i32), &DispatchEntry> = HashMap::new();
        for entry in entries {
            latest.insert((entry.topic.as_str(), entry.queue_id), entry);
        }

        let mut batch = WriteBatch::new();
        for entry in latest.into_values() {
            batch.put(
                encode_offset_key(&entry.topic, entry.queue_id, OffsetKind::Maximum),
                encode_offset_value(entry.commit_log_offset, entry.cq_offset),
            );
        }
        self.append_global_max_phy_offset(&mut batch, max_phy_offset);
        self.store.write(batch)?;
        Ok(())
    }

    /// Updates the heap cache from a dispatch batch. Decoupled from the
    /// persisted write so cache visibility never blocks dispatch latency.
    pub fn put_heap_max_cq_offset(&self, entries: &[DispatchEntry]) {
        for entry in entries {
            self.cache
                .put_max_cq_offset(&entry.topic, entry.queue_id, entry.cq_offset);
        }
    }

    /// Deletes both persisted entries of a topic-queue atomically and purges
    /// its heap-cache entries. Idempotent: destroying an absent topic-queue
    /// is a no-op.
    pub fn destroy_offset(&self, topic: &str, queue_id: i32) -> Result<(), OffsetError> {
        let min_key = encode_offset_key(topic, queue_id, OffsetKind::Minimum);
        let max_key = encode_offset_key(topic, queue_id, OffsetKind::Maximum);

        // Current values, read for the audit log only.
        let start = self
            .store
            .get(&min_key)?
            .and_then(|v| decode_offset_value(&v).ok())
            .map(|p| p.cq_offset);
        let end = self
            .store
            .get(&max_key)?
            .and_then(|v| decode_offset_value(&v).ok())
            .map(|p| p.cq_offset);

        {
            let _guard = self
                .store
                .hold()
                .ok_or(OffsetError::Store(StoreError::Closed))?;
            let mut batch = WriteBatch::new();
            batch.delete(min_key);
            batch.delete(max_key);
            self.store.write(batch)?;
        }

        self.cache.remove(topic, queue_id);
        tracing::info!(
            "Destroyed offset entries. topic: {}, queueId: {}, minOffset: {:?}, maxOffset: {:?}",
            topic,
            queue_id,
            start,
            end
        );
        Ok(())
    }

    pub(crate) fn kv_offset(
        &self,
        topic: &str,
        queue_id: i32,
        kind: OffsetKind,
    ) -> Result<Option<PhyAndCqOffset>, OffsetError> {
        let key = encode_offset_key(topic, queue_id, kind);
        match self.store.get(&key)? {
            Some(value) => Ok(Some(decode_offset_value(&value)?)),
            None => Ok(None),
        }
    }

    /// Persists and caches one corrected offset entry. Quietly returns when
    /// the store has begun closing; recovery retries on the next read.
    pub(crate) fn update_cq_offset(
        &self,
        topic: &str,
        queue_id: i32,
        phy_offset: i64,
        cq_offset: i64,
        kind: OffsetKind,
    ) -> Result<(), OffsetError> {
        {
            let Some(_guard) = self.store.hold() else {
                return Ok(());
            };
            let mut batch = WriteBatch::new();
            batch.put(
                encode_offset_key(topic, queue_id, kind),
                encode_offset_value(phy_offset, cq_offset),
            );
            if let Err(e) = self.store.write(batch) {
                tracing::error!(
                    "update {} offset of {}-{} failed: {}",
                    kind.name(),
                    topic,
                    queue_id,
                    e
                );
                return Err(e.into());
            }
        }

        match kind {
            OffsetKind::Maximum => self.cache.put_max_cq_offset(topic, queue_id, cq_offset),
            OffsetKind::Minimum => {
                self.cache
                    .put_min_offset(topic, queue_id, PhyAndCqOffset::new(phy_offset, cq_offset))
            }
        }
        if self.config.diag_log {
            tracing::warn!(
                "update {} offset. topic: {}, queueId: {}, phyOffset: {}, cqOffset: {}",
                kind.name(),
                topic,
                queue_id,
                phy_offset,
                cq_offset
            );
        }
        Ok(())
    }

    pub(crate) fn append_global_max_phy_offset(&self, batch: &mut WriteBatch, max_phy_offset: i64) {
        batch.put(checkpoint_key(), encode_checkpoint_value(max_phy_offset));
    }
}
