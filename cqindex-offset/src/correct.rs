//! Crash-recovery correction and truncation.
//!
//! Under async flush the commit log's durable tail may trail what was
//! dispatched into the index before a crash; conversely the minimum pointer
//! may reference commit-log records already reclaimed by retention. Both
//! directions are repaired against the commit log's authoritative physical
//! boundaries, delegating range bisection to the sibling consume-queue
//! data table.
//!
//! Correction may run concurrently with dispatch, so every attempt re-reads
//! current heap and store state instead of trusting earlier observations.

use crate::error::OffsetError;
use crate::types::{CommitLog, ConsumeQueueTable, OffsetKind, SearchBound};
use crate::OffsetTable;
use cqindex_kv::{OrderedStore, WriteBatch};

impl<S: OrderedStore, C: CommitLog, Q: ConsumeQueueTable> OffsetTable<S, C, Q> {
    /// Truncates dirty maximum entries after unclean shutdown.
    /// `offset_to_truncate` is the commit log's verified-durable physical
    /// boundary: the checkpoint is corrected downward first, then every
    /// maximum entry referencing bytes at or beyond the boundary is
    /// re-derived. Per-queue failures are logged and do not abort the pass,
    /// leaving those queues for the next read-triggered correction.
    pub fn truncate_dirty(&self, offset_to_truncate: i64) -> Result<(), OffsetError> {
        self.correct_global_max_phy_offset(offset_to_truncate)?;

        self.for_each(
            // Minimum entries are never truncated here. A clean maximum
            // entry references only commit-log bytes below the boundary;
            // anything at or beyond it points at records lost in the crash.
            |entry| {
                entry.kind == OffsetKind::Maximum
                    && entry.commit_log_offset >= offset_to_truncate
            },
            |entry| {
                if let Err(e) = self.truncate_dirty_offset(&entry.topic, entry.queue_id) {
                    tracing::error!(
                        "Failed to truncate max offset of consume queue [topic={}, queue-id={}]: {}",
                        entry.topic,
                        entry.queue_id,
                        e
                    );
                }
            },
        )
    }

    /// Re-derives the maximum of one topic-queue against the current
    /// (possibly just-corrected) checkpoint.
    fn truncate_dirty_offset(&self, topic: &str, queue_id: i32) -> Result<(), OffsetError> {
        let Some(max) = self.kv_offset(topic, queue_id, OffsetKind::Maximum)? else {
            return Ok(());
        };
        let checkpoint = self.global_max_phy_offset()?;
        if max.phy_offset >= checkpoint {
            self.correct_max_cq_offset(topic, queue_id, max.cq_offset, checkpoint)?;
            let corrected = self.cache.max_cq_offset(topic, queue_id);
            tracing::warn!(
                "Truncated dirty max offset. topic: {}, queueId: {}, phyOffset: {}, new max: {:?}",
                topic,
                queue_id,
                max.phy_offset,
                corrected
            );
        }
        Ok(())
    }

    /// Lowers the checkpoint to `max_phy_offset` if it currently exceeds it.
    fn correct_global_max_phy_offset(&self, max_phy_offset: i64) -> Result<(), OffsetError> {
        let Some(_guard) = self.store.hold() else {
            return Ok(());
        };
        let stored = self.global_max_phy_offset()?;
        if stored <= max_phy_offset {
            return Ok(());
        }
        tracing::info!(
            "Correcting global max physical offset: {} -> {}",
            stored,
            max_phy_offset
        );
        let mut batch = WriteBatch::new();
        self.append_global_max_phy_offset(&mut batch, max_phy_offset);
        self.store.write(batch)?;
        Ok(())
    }

    /// Checks whether the known minimum still references retained commit-log
    /// bytes. Returns `(valid, cq_offset)`; a store-resolved minimum that
    /// passes the check is promoted into the heap cache.
    pub(crate) fn is_min_offset_ok(
        &self,
        topic: &str,
        queue_id: i32,
        min_phy_offset: i64,
    ) -> Result<(bool, i64), OffsetError> {
        if let Some(min) = self.cache.min_offset(topic, queue_id) {
            return Ok((min.phy_offset >= min_phy_offset, min.cq_offset));
        }

        let Some(min) = self.kv_offset(topic, queue_id, OffsetKind::Minimum)? else {
            return Ok((false, 0));
        };
        if min.phy_offset >= min_phy_offset {
            self.cache.put_min_offset_if_absent(topic, queue_id, min);
            if self.config.diag_log {
                tracing::warn!("update min offset in queue. {}-{}, {}", topic, queue_id, min);
            }
            Ok((true, min.cq_offset))
        } else {
            Ok((false, min.cq_offset))
        }
    }

    /// Corrects a stale maximum entry back within `max_phy_offset_in_cq`,
    /// the verified physical boundary. Returns true when a replacement
    /// maximum was persisted.
    pub(crate) fn correct_max_cq_offset(
        &self,
        topic: &str,
        queue_id: i32,
        max_cq_offset: i64,
        max_phy_offset_in_cq: i64,
    ) -> Result<bool, OffsetError> {
        // Resolving the minimum may itself correct it and seed the heap.
        let min_cq_offset = self.min_cq_offset(topic, queue_id)?;
        let heap_min = self.cache.min_offset(topic, queue_id);
        let min = match heap_min {
            Some(min)
                if min.cq_offset == min_cq_offset && min.phy_offset <= max_phy_offset_in_cq =>
            {
                min
            }
            other => {
                // Not recoverable corruption: the index and the commit log
                // disagree about the lower bound, which could silently lose
                // or duplicate messages if papered over.
                tracing::error!(
                    "Max offset correction failed. topic: {}, queueId: {}, maxPhyOffsetInCQ: {}, minCqOffset: {}, heap min: {:?}",
                    topic,
                    queue_id,
                    max_phy_offset_in_cq,
                    min_cq_offset,
                    other
                );
                return Err(OffsetError::Consistency {
                    topic: topic.to_string(),
                    queue_id,
                    detail: format!(
                        "resolved minimum {:?} disagrees with min cq offset {} or exceeds physical boundary {}",
                        other, min_cq_offset, max_phy_offset_in_cq
                    ),
                });
            }
        };

        match self.cq_table.bisection_search(
            topic,
            queue_id,
            max_cq_offset,
            min_cq_offset,
            max_phy_offset_in_cq,
            SearchBound::Floor,
        ) {
            Some(target) => {
                self.update_cq_offset(
                    topic,
                    queue_id,
                    target.phy_offset,
                    target.cq_offset,
                    OffsetKind::Maximum,
                )?;
                Ok(true)
            }
            None => {
                // No valid entry above the minimum survived truncation;
                // collapse the maximum onto the minimum when they differ.
                if max_cq_offset != min_cq_offset {
                    self.update_cq_offset(
                        topic,
                        queue_id,
                        min.phy_offset,
                        min_cq_offset,
                        OffsetKind::Maximum,
                    )?;
                }
                if self.config.diag_log {
                    tracing::warn!(
                        "max correction found no valid entry. {}, {}, {}, {}, {}",
                        topic,
                        queue_id,
                        min_cq_offset,
                        max_cq_offset,
                        min.phy_offset
                    );
                }
                Ok(false)
            }
        }
    }

    /// Corrects a stale minimum entry up to `min_phy_offset`, the commit
    /// log's retained lower boundary. Returns true when a replacement
    /// minimum was persisted.
    pub(crate) fn correct_min_cq_offset(
        &self,
        topic: &str,
        queue_id: i32,
        min_cq_offset: i64,
        min_phy_offset: i64,
    ) -> Result<bool, OffsetError> {
        let Some(max) = self.kv_offset(topic, queue_id, OffsetKind::Maximum)? else {
            // Queue is empty post-truncation.
            self.update_cq_offset(topic, queue_id, min_phy_offset, 0, OffsetKind::Minimum)?;
            return Ok(true);
        };

        if max.phy_offset < min_phy_offset {
            // Entire queue content predates the retained commit-log range;
            // the minimum becomes an empty past-the-end marker.
            self.update_cq_offset(
                topic,
                queue_id,
                min_phy_offset,
                max.cq_offset + 1,
                OffsetKind::Minimum,
            )?;
            return Ok(true);
        }

        match self.cq_table.bisection_search(
            topic,
            queue_id,
            max.cq_offset,
            min_cq_offset,
            min_phy_offset,
            SearchBound::Ceiling,
        ) {
            Some(target) => {
                self.update_cq_offset(
                    topic,
                    queue_id,
                    target.phy_offset,
                    target.cq_offset,
                    OffsetKind::Minimum,
                )?;
                Ok(true)
            }
            None => {
                if max.cq_offset != min_cq_offset {
                    self.update_cq_offset(
                        topic,
                        queue_id,
                        max.phy_offset,
                        max.cq_offset,
                        OffsetKind::Minimum,
                    )?;
                }
                if self.config.diag_log {
                    tracing::warn!(
                        "min correction found no valid entry. {}, {}, {}, {}, {}",
                        topic,
                        queue_id,
                        min_cq_offset,
                        max.cq_offset,
                        min_phy_offset
                    );
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::OffsetError;
    use crate::testutil::{dispatch, direct_put_min, new_table};
    use crate::types::{PhyAndCqOffset, SearchBound};

    #[test]
    fn test_truncate_lowers_checkpoint() {
        let table = new_table(0, None);
        table.put_max_phy_and_cq_offset(&[], 100).unwrap();
        table.put_max_phy_and_cq_offset(&[], 200).unwrap();
        assert_eq!(table.global_max_phy_offset().unwrap(), 200);

        table.truncate_dirty(150).unwrap();
        assert_eq!(table.global_max_phy_offset().unwrap(), 150);

        // Raising it back is a correction no-op; only dispatch raises it.
        table.truncate_dirty(400).unwrap();
        assert_eq!(table.global_max_phy_offset().unwrap(), 150);
    }

    #[test]
    fn test_truncate_rewrites_max_to_min_when_search_misses() {
        // Max entry (phy=1000, cq=50); min entry (phy=100, cq=40) is still
        // valid against a commit log starting at 50.
        let table = new_table(50, None);
        table
            .put_max_phy_and_cq_offset(&[dispatch("T", 0, 1000, 50)], 1000)
            .unwrap();
        direct_put_min(&table.store, "T", 0, 100, 40);

        table.truncate_dirty(900).unwrap();

        // 1000 >= 900 marked the entry dirty; the bisection search returned
        // NOT_FOUND, so the maximum collapsed onto the minimum.
        assert_eq!(table.global_max_phy_offset().unwrap(), 900);
        assert_eq!(table.max_cq_offset("T", 0).unwrap(), 40);
        assert_eq!(table.max_phy_offset("T", 0), Some(100));

        let calls = table.cq_table.calls.lock();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(
            (call.0.as_str(), call.1, call.2, call.3, call.4, call.5),
            ("T", 0, 50, 40, 900, SearchBound::Floor)
        );
    }

    #[test]
    fn test_truncate_uses_bisection_hit() {
        let table = new_table(50, Some(PhyAndCqOffset::new(800, 45)));
        table
            .put_max_phy_and_cq_offset(&[dispatch("T", 0, 1000, 50)], 1000)
            .unwrap();
        direct_put_min(&table.store, "T", 0, 100, 40);

        table.truncate_dirty(900).unwrap();

        assert_eq!(table.max_cq_offset("T", 0).unwrap(), 45);
        assert_eq!(table.max_phy_offset("T", 0), Some(800));
    }

    #[test]
    fn test_truncate_leaves_clean_entries_alone() {
        let table = new_table(0, None);
        table
            .put_max_phy_and_cq_offset(&[dispatch("T", 0, 500, 10)], 500)
            .unwrap();
        direct_put_min(&table.store, "T", 0, 100, 2);

        table.truncate_dirty(900).unwrap();

        assert_eq!(table.max_cq_offset("T", 0).unwrap(), 10);
        assert!(table.cq_table.calls.lock().is_empty());
    }

    #[test]
    fn test_min_correction_empty_queue() {
        // No maximum entry at all: the queue is empty post-truncation and
        // the minimum resets to (commit log minimum, 0).
        let table = new_table(500, None);
        assert_eq!(table.min_cq_offset("T", 0).unwrap(), 0);

        let min = table.kv_offset("T", 0, crate::types::OffsetKind::Minimum).unwrap();
        assert_eq!(min, Some(PhyAndCqOffset::new(500, 0)));
    }

    #[test]
    fn test_min_correction_whole_queue_stale() {
        // Max entry sits below the retained commit-log range: the minimum
        // becomes the past-the-end marker max+1.
        let table = new_table(500, None);
        table
            .put_max_phy_and_cq_offset(&[dispatch("T", 0, 400, 7)], 400)
            .unwrap();

        assert_eq!(table.min_cq_offset("T", 0).unwrap(), 8);
        let min = table.kv_offset("T", 0, crate::types::OffsetKind::Minimum).unwrap();
        assert_eq!(min, Some(PhyAndCqOffset::new(500, 8)));
    }

    #[test]
    fn test_min_correction_via_bisection() {
        let table = new_table(300, Some(PhyAndCqOffset::new(350, 5)));
        table
            .put_max_phy_and_cq_offset(&[dispatch("T", 0, 800, 9)], 800)
            .unwrap();
        // Stale minimum below the retained range.
        direct_put_min(&table.store, "T", 0, 100, 3);

        assert_eq!(table.min_cq_offset("T", 0).unwrap(), 5);

        let calls = table.cq_table.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].5, SearchBound::Ceiling);
        assert_eq!(calls[0].4, 300);
    }

    #[test]
    fn test_min_valid_entry_not_corrected() {
        let table = new_table(50, None);
        direct_put_min(&table.store, "T", 0, 100, 4);

        assert_eq!(table.min_cq_offset("T", 0).unwrap(), 4);
        assert!(table.cq_table.calls.lock().is_empty());

        // Second read is a heap hit.
        let gets = table.store.get_count();
        assert_eq!(table.min_cq_offset("T", 0).unwrap(), 4);
        assert_eq!(table.store.get_count(), gets);
    }

    #[test]
    fn test_max_correction_consistency_violation() {
        // The resolved minimum's physical offset exceeds the verified
        // boundary: a hard failure, not a silent skip.
        let table = new_table(50, None);
        direct_put_min(&table.store, "T", 0, 100, 40);

        let result = table.correct_max_cq_offset("T", 0, 50, 80);
        assert!(matches!(result, Err(OffsetError::Consistency { .. })));
    }
}
