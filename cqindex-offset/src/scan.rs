//! Full-table scan for orphaned topic-queue offset entries.

use crate::codec::{
    decode_offset_key, decode_offset_value, is_fanout_topic, is_system_topic,
    OFFSET_KEY_FIXED_LEN, OFFSET_VALUE_LEN,
};
use crate::types::{CommitLog, ConsumeQueueTable};
use crate::OffsetTable;
use cqindex_kv::OrderedStore;
use std::collections::{HashMap, HashSet};

impl<S: OrderedStore, C: CommitLog, Q: ConsumeQueueTable> OffsetTable<S, C, Q> {
    /// Scans every persisted offset entry and collects the (topic, queueId)
    /// pairs whose topic no longer exists, for later purging. Reserved
    /// system topics and fan-out-class topics are never reported; malformed
    /// records are skipped. Supports the periodic garbage collection that
    /// follows topic deletion.
    pub fn scan_dirty_topics(
        &self,
        existing_topics: &HashSet<String>,
    ) -> HashMap<String, HashSet<i32>> {
        let mut to_delete: HashMap<String, HashSet<i32>> = HashMap::new();

        let iter = match self.store.iter() {
            Ok(iter) => iter,
            Err(e) => {
                tracing::error!("Dirty topic scan failed to open iterator: {}", e);
                return to_delete;
            }
        };

        for (key, value) in iter {
            if key.len() <= OFFSET_KEY_FIXED_LEN || value.len() != OFFSET_VALUE_LEN {
                continue;
            }
            let Ok((topic, queue_id, _)) = decode_offset_key(&key) else {
                tracing::warn!("Skipping malformed offset key during dirty scan");
                continue;
            };
            if is_system_topic(&topic) || is_fanout_topic(&topic) {
                continue;
            }
            if existing_topics.contains(&topic) {
                continue;
            }
            let Ok(pair) = decode_offset_value(&value) else {
                continue;
            };
            tracing::info!(
                "Found dirty offset entry. topic: {}, queueId: {}, cqOffset: {}",
                topic,
                queue_id,
                pair.cq_offset
            );
            to_delete.entry(topic).or_default().insert(queue_id);
        }

        to_delete
    }
}
