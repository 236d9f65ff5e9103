//! Shared fixtures for offset table tests.

use crate::codec::{encode_offset_key, encode_offset_value};
use crate::table::{OffsetTable, OffsetTableConfig};
use crate::types::{
    CommitLog, ConsumeQueueTable, DispatchEntry, OffsetKind, PhyAndCqOffset, SearchBound,
};
use cqindex_kv::{MemStore, OrderedStore, WriteBatch};
use parking_lot::Mutex;
use std::sync::Arc;

/// Commit log stub reporting a fixed minimum physical offset.
pub(crate) struct FixedCommitLog {
    min: i64,
}

impl CommitLog for FixedCommitLog {
    fn min_phy_offset(&self) -> i64 {
        self.min
    }
}

/// Consume-queue table stub returning a scripted bisection result and
/// recording every search it is asked to run.
pub(crate) struct ScriptedCqTable {
    result: Option<PhyAndCqOffset>,
    pub(crate) calls: Mutex<Vec<(String, i32, i64, i64, i64, SearchBound)>>,
}

impl ConsumeQueueTable for ScriptedCqTable {
    fn bisection_search(
        &self,
        topic: &str,
        queue_id: i32,
        max_cq_offset: i64,
        min_cq_offset: i64,
        phy_target: i64,
        bound: SearchBound,
    ) -> Option<PhyAndCqOffset> {
        self.calls.lock().push((
            topic.to_string(),
            queue_id,
            max_cq_offset,
            min_cq_offset,
            phy_target,
            bound,
        ));
        self.result
    }
}

pub(crate) type TestTable = OffsetTable<MemStore, FixedCommitLog, ScriptedCqTable>;

/// Builds a table over a fresh in-memory store, a commit log whose minimum
/// physical offset is `min_phy_offset`, and a bisection stub scripted to
/// return `search_result`.
pub(crate) fn new_table(min_phy_offset: i64, search_result: Option<PhyAndCqOffset>) -> TestTable {
    OffsetTable::new(
        Arc::new(MemStore::new()),
        Arc::new(FixedCommitLog {
            min: min_phy_offset,
        }),
        Arc::new(ScriptedCqTable {
            result: search_result,
            calls: Mutex::new(Vec::new()),
        }),
        OffsetTableConfig::default(),
    )
}

pub(crate) fn dispatch(topic: &str, queue_id: i32, commit_log_offset: i64, cq_offset: i64) -> DispatchEntry {
    DispatchEntry {
        topic: topic.to_string(),
        queue_id,
        commit_log_offset,
        cq_offset,
    }
}

/// Writes a maximum entry straight into the store, bypassing the table and
/// its heap cache.
pub(crate) fn direct_put_max(store: &MemStore, topic: &str, queue_id: i32, phy: i64, cq: i64) {
    direct_put(store, topic, queue_id, OffsetKind::Maximum, phy, cq);
}

/// Writes a minimum entry straight into the store.
pub(crate) fn direct_put_min(store: &MemStore, topic: &str, queue_id: i32, phy: i64, cq: i64) {
    direct_put(store, topic, queue_id, OffsetKind::Minimum, phy, cq);
}

fn direct_put(store: &MemStore, topic: &str, queue_id: i32, kind: OffsetKind, phy: i64, cq: i64) {
    let mut batch = WriteBatch::new();
    batch.put(
        encode_offset_key(topic, queue_id, kind),
        encode_offset_value(phy, cq),
    );
    store.write(batch).unwrap();
}
