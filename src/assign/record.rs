//! Outbound assignment records.

use serde::{Deserialize, Serialize};

use crate::scheduler::{ItemId, SlotId, WorkerId};

/// Result of placing one item, pushed to the outbound channel.
///
/// Serializes with the keys `station`, `core` and `added`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// Item identifier.
    pub station: ItemId,
    /// Worker that received the item.
    pub core: WorkerId,
    /// True when the item was bound to a slot.
    pub added: bool,
}

impl AssignmentRecord {
    pub fn added(station: impl Into<ItemId>, core: impl Into<WorkerId>) -> Self {
        Self {
            station: station.into(),
            core: core.into(),
            added: true,
        }
    }
}

/// Summary of one assignator cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Items taken from the inbound queue.
    pub drained: usize,
    /// Items placed, with their slot.
    pub assigned: Vec<(ItemId, WorkerId, SlotId)>,
    /// Items not in the known set.
    pub unknown: usize,
    /// Items already bound to a slot.
    pub already_assigned: usize,
    /// Items rejected by the group filter.
    pub filtered: usize,
    /// Items that found no free slot.
    pub no_capacity: usize,
    /// Items put back on the inbound queue.
    pub requeued: usize,
}

impl CycleReport {
    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }
}
