//! Core types and collaborator contracts.

use std::fmt;

/// An immutable (physical, logical) offset pair.
///
/// Serves both as the persisted value payload of an offset entry and as the
/// heap-cache value for minimum offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyAndCqOffset {
    /// Byte position of the message record within the commit log.
    pub phy_offset: i64,
    /// Sequential position within the topic-queue's consume queue.
    pub cq_offset: i64,
}

impl PhyAndCqOffset {
    pub fn new(phy_offset: i64, cq_offset: i64) -> Self {
        Self {
            phy_offset,
            cq_offset,
        }
    }
}

impl fmt::Display for PhyAndCqOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[cq_offset={}, phy_offset={}]",
            self.cq_offset, self.phy_offset
        )
    }
}

/// Whether an offset entry tracks the minimum or maximum logical offset of
/// its topic-queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetKind {
    Minimum,
    Maximum,
}

impl OffsetKind {
    /// The 3-byte class marker embedded in the persisted key.
    pub(crate) fn marker(self) -> &'static [u8; 3] {
        match self {
            OffsetKind::Minimum => b"min",
            OffsetKind::Maximum => b"max",
        }
    }

    /// Short name for diagnostics.
    pub(crate) fn name(self) -> &'static str {
        match self {
            OffsetKind::Minimum => "min",
            OffsetKind::Maximum => "max",
        }
    }
}

/// Parsed view of one persisted offset record, produced during iteration.
#[derive(Debug, Clone)]
pub struct OffsetEntry {
    pub topic: String,
    pub queue_id: i32,
    pub kind: OffsetKind,
    /// Logical consume-queue offset.
    pub cq_offset: i64,
    /// Physical commit-log offset bound to `cq_offset`.
    pub commit_log_offset: i64,
}

/// One dispatched message pointer, the unit handed over by the dispatch
/// pipeline.
#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub topic: String,
    pub queue_id: i32,
    /// Physical commit-log offset of the dispatched record.
    pub commit_log_offset: i64,
    /// Logical consume-queue offset assigned to the record.
    pub cq_offset: i64,
}

/// Direction flag for the sibling table's bisection search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBound {
    /// Greatest logical offset whose physical offset does not exceed the
    /// target. Used when correcting a maximum entry.
    Floor,
    /// Smallest logical offset whose physical offset is at least the target.
    /// Used when correcting a minimum entry.
    Ceiling,
}

/// The append-only commit log collaborator, source of truth for physical
/// offsets.
pub trait CommitLog: Send + Sync {
    /// Current global minimum physical offset still retained by the log.
    fn min_phy_offset(&self) -> i64;
}

/// The sibling consume-queue data table, holding the per-record
/// physical-offset index of every dispatched message.
pub trait ConsumeQueueTable: Send + Sync {
    /// Searches `[min_cq_offset, max_cq_offset]` of the given topic-queue
    /// for the boundary entry relative to `phy_target`, exploiting the fact
    /// that logical offsets increase strictly with physical offsets within
    /// one queue. Returns `None` when no entry in the range qualifies.
    /// Complexity is logarithmic in the size of the range.
    fn bisection_search(
        &self,
        topic: &str,
        queue_id: i32,
        max_cq_offset: i64,
        min_cq_offset: i64,
        phy_target: i64,
        bound: SearchBound,
    ) -> Option<PhyAndCqOffset>;
}
