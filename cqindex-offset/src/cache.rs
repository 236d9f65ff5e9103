//! Heap cache for the latest known min/max offsets.
//!
//! Both maps are best-effort accelerators in front of the persisted store:
//! absence means "unknown", never zero, and the store stays authoritative.
//! Entries are evicted only by explicit destroy; there is no capacity bound.

use crate::types::PhyAndCqOffset;
use dashmap::DashMap;

pub(crate) struct OffsetCache {
    /// topic-queueId -> minimum (physical, logical) pair.
    min: DashMap<String, PhyAndCqOffset>,
    /// topic-queueId -> maximum logical offset. The physical component of a
    /// maximum is always re-derived from the store when needed.
    max: DashMap<String, i64>,
}

impl OffsetCache {
    pub(crate) fn new() -> Self {
        Self {
            min: DashMap::new(),
            max: DashMap::new(),
        }
    }

    fn key(topic: &str, queue_id: i32) -> String {
        format!("{}-{}", topic, queue_id)
    }

    pub(crate) fn max_cq_offset(&self, topic: &str, queue_id: i32) -> Option<i64> {
        self.max.get(&Self::key(topic, queue_id)).map(|v| *v)
    }

    pub(crate) fn min_offset(&self, topic: &str, queue_id: i32) -> Option<PhyAndCqOffset> {
        self.min.get(&Self::key(topic, queue_id)).map(|v| *v)
    }

    /// Last writer wins. A decreasing maximum is permitted but flagged;
    /// ordering correctness is enforced upstream by the dispatch pipeline.
    pub(crate) fn put_max_cq_offset(&self, topic: &str, queue_id: i32, cq_offset: i64) {
        if let Some(prev) = self.max.insert(Self::key(topic, queue_id), cq_offset) {
            if prev > cq_offset {
                tracing::error!(
                    "Max offset of consume queue [topic={}, queue-id={}] regressed: prev-max={}, current-max={}",
                    topic,
                    queue_id,
                    prev,
                    cq_offset
                );
            }
        }
    }

    /// Returns true if the value was inserted (no prior entry).
    pub(crate) fn put_max_cq_offset_if_absent(
        &self,
        topic: &str,
        queue_id: i32,
        cq_offset: i64,
    ) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.max.entry(Self::key(topic, queue_id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(cq_offset);
                true
            }
        }
    }

    pub(crate) fn put_min_offset(&self, topic: &str, queue_id: i32, offset: PhyAndCqOffset) {
        self.min.insert(Self::key(topic, queue_id), offset);
    }

    pub(crate) fn put_min_offset_if_absent(
        &self,
        topic: &str,
        queue_id: i32,
        offset: PhyAndCqOffset,
    ) {
        use dashmap::mapref::entry::Entry;
        if let Entry::Vacant(slot) = self.min.entry(Self::key(topic, queue_id)) {
            slot.insert(offset);
        }
    }

    /// Purges both entries for a destroyed topic-queue.
    pub(crate) fn remove(&self, topic: &str, queue_id: i32) {
        let key = Self::key(topic, queue_id);
        self.min.remove(&key);
        self.max.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_means_unknown() {
        let cache = OffsetCache::new();
        assert_eq!(cache.max_cq_offset("t", 0), None);
        assert_eq!(cache.min_offset("t", 0), None);
    }

    #[test]
    fn test_max_last_writer_wins() {
        let cache = OffsetCache::new();
        cache.put_max_cq_offset("t", 0, 10);
        // Regression is flagged at error severity but not rejected.
        cache.put_max_cq_offset("t", 0, 5);
        assert_eq!(cache.max_cq_offset("t", 0), Some(5));
    }

    #[test]
    fn test_put_if_absent() {
        let cache = OffsetCache::new();
        assert!(cache.put_max_cq_offset_if_absent("t", 0, 3));
        assert!(!cache.put_max_cq_offset_if_absent("t", 0, 9));
        assert_eq!(cache.max_cq_offset("t", 0), Some(3));

        cache.put_min_offset_if_absent("t", 0, PhyAndCqOffset::new(100, 1));
        cache.put_min_offset_if_absent("t", 0, PhyAndCqOffset::new(200, 2));
        assert_eq!(cache.min_offset("t", 0), Some(PhyAndCqOffset::new(100, 1)));
    }

    #[test]
    fn test_remove_purges_both_maps() {
        let cache = OffsetCache::new();
        cache.put_max_cq_offset("t", 1, 42);
        cache.put_min_offset("t", 1, PhyAndCqOffset::new(7, 2));
        cache.remove("t", 1);
        assert_eq!(cache.max_cq_offset("t", 1), None);
        assert_eq!(cache.min_offset("t", 1), None);

        // Queue ids are independent.
        cache.put_max_cq_offset("t", 2, 1);
        cache.remove("t", 1);
        assert_eq!(cache.max_cq_offset("t", 2), Some(1));
    }
}
