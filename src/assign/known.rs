//! Set of recognized work items (`enqueued`).
//!
//! Only ids registered here are ever placed; anything else drained from the
//! inbound queue is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::scheduler::ItemId;

/// A recognized work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: ItemId,
    /// Group code consulted under group distribution.
    pub group: Option<String>,
}

impl WorkItem {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            group: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Shared registry of known items. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct KnownItems {
    items: Arc<RwLock<HashMap<ItemId, WorkItem>>>,
}

impl KnownItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) an item. Returns the previous entry.
    pub async fn insert(&self, item: WorkItem) -> Option<WorkItem> {
        self.items.write().await.insert(item.id.clone(), item)
    }

    pub async fn remove(&self, id: &str) -> Option<WorkItem> {
        self.items.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<WorkItem> {
        self.items.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.items.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

impl FromIterator<WorkItem> for KnownItems {
    fn from_iter<I: IntoIterator<Item = WorkItem>>(items: I) -> Self {
        let map = items.into_iter().map(|i| (i.id.clone(), i)).collect();
        Self {
            items: Arc::new(RwLock::new(map)),
        }
    }
}
