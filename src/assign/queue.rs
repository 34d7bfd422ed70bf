//! Inbound work queue with `task_done`/`join` accounting.
//!
//! Items are delivered through an unbounded tokio channel. A separate counter
//! tracks items that were `put` but not yet marked done, so producers can
//! wait for every item they pushed to be handled.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio::sync::mpsc;

use crate::scheduler::ItemId;

#[derive(Debug)]
struct Shared {
    unfinished: AtomicUsize,
    done: Notify,
}

/// Consumer side of the inbound queue; owned by the assignator.
#[derive(Debug)]
pub struct WorkQueue {
    rx: Mutex<mpsc::UnboundedReceiver<ItemId>>,
    tx: mpsc::UnboundedSender<ItemId>,
    shared: Arc<Shared>,
}

/// Producer side of the inbound queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<ItemId>,
    shared: Arc<Shared>,
}

impl WorkQueue {
    /// Creates the queue and its first producer handle.
    pub fn new() -> (Self, QueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            unfinished: AtomicUsize::new(0),
            done: Notify::new(),
        });
        let handle = QueueHandle {
            tx: tx.clone(),
            shared: Arc::clone(&shared),
        };
        (
            Self {
                rx: Mutex::new(rx),
                tx,
                shared,
            },
            handle,
        )
    }

    /// Returns a new producer handle.
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Items waiting to be taken.
    pub fn qsize(&self) -> usize {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Takes one item without waiting.
    pub fn try_get(&self) -> Option<ItemId> {
        self.rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }

    /// Puts an item back (e.g. for the next cycle).
    pub fn put(&self, item: impl Into<ItemId>) {
        put(&self.tx, &self.shared, item.into());
    }

    /// Marks one taken item as handled.
    pub fn task_done(&self) {
        task_done(&self.shared);
    }

    /// Items put but not yet marked done.
    pub fn unfinished(&self) -> usize {
        self.shared.unfinished.load(Ordering::Acquire)
    }

    /// Waits until every item put so far is marked done.
    pub async fn join(&self) {
        join(&self.shared).await;
    }
}

impl QueueHandle {
    /// Pushes an item id.
    pub fn put(&self, item: impl Into<ItemId>) {
        put(&self.tx, &self.shared, item.into());
    }

    /// Items put but not yet marked done.
    pub fn unfinished(&self) -> usize {
        self.shared.unfinished.load(Ordering::Acquire)
    }

    /// Waits until every item put so far is marked done.
    pub async fn join(&self) {
        join(&self.shared).await;
    }
}

fn put(tx: &mpsc::UnboundedSender<ItemId>, shared: &Shared, item: ItemId) {
    shared.unfinished.fetch_add(1, Ordering::AcqRel);
    // The receiver lives in WorkQueue, which also holds a sender: a send
    // only fails once the queue itself is gone.
    if tx.send(item).is_err() {
        task_done(shared);
    }
}

fn task_done(shared: &Shared) {
    let prev = shared
        .unfinished
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    match prev {
        Ok(1) => shared.done.notify_waiters(),
        Ok(_) => {}
        Err(_) => tracing::warn!("task_done called more times than items were put"),
    }
}

async fn join(shared: &Shared) {
    loop {
        let notified = shared.done.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if shared.unfinished.load(Ordering::Acquire) == 0 {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn qsize_tracks_pending_items() {
        let (queue, producer) = WorkQueue::new();
        producer.put("s1");
        producer.put("s2");
        assert_eq!(queue.qsize(), 2);
        assert_eq!(queue.try_get().as_deref(), Some("s1"));
        assert_eq!(queue.qsize(), 1);
        assert_eq!(queue.unfinished(), 2);
    }

    #[tokio::test]
    async fn join_waits_for_task_done() {
        let (queue, producer) = WorkQueue::new();
        producer.put("s1");
        let queue = Arc::new(queue);

        let waiter = {
            let producer = producer.clone();
            tokio::spawn(async move { producer.join().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        assert!(queue.try_get().is_some());
        queue.task_done();
        waiter.await.unwrap();
        assert_eq!(queue.unfinished(), 0);
    }

    #[tokio::test]
    async fn join_on_empty_queue_returns() {
        let (queue, _producer) = WorkQueue::new();
        queue.join().await;
    }

    #[test]
    fn extra_task_done_is_ignored() {
        let (queue, _producer) = WorkQueue::new();
        queue.task_done();
        assert_eq!(queue.unfinished(), 0);
    }
}
