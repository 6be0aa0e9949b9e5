//! Processing queue — unbounded FIFO between discovery and the consumer.
//!
//! The poller appends without blocking; the single consumer suspends on
//! [`FaxQueueReceiver::dequeue`] until work arrives. Draining closes the
//! receiver side: buffered records are still served, new enqueues are
//! refused, and `dequeue` returns `None` once the queue is empty.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::FaxRecord;

/// Create a connected queue handle / receiver pair.
pub fn fax_queue() -> (FaxQueue, FaxQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        FaxQueue { tx, depth: Arc::clone(&depth) },
        FaxQueueReceiver { rx, depth },
    )
}

/// Producer handle. Cheap to clone; shared by the poller.
#[derive(Clone)]
pub struct FaxQueue {
    tx: mpsc::UnboundedSender<FaxRecord>,
    depth: Arc<AtomicUsize>,
}

impl FaxQueue {
    /// Append a record. Never blocks. Returns `false` when the queue is
    /// draining and the record was refused.
    pub fn enqueue(&self, record: FaxRecord) -> bool {
        let fax_id = record.id.clone();
        match self.tx.send(record) {
            Ok(()) => {
                let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::info!(fax_id, depth, "Fax added to processing queue");
                true
            }
            Err(_) => {
                tracing::warn!(fax_id, "Queue is draining, fax refused");
                false
            }
        }
    }

    /// Current number of queued, not-yet-dequeued records.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Consumer side. Owned by the single pipeline worker.
pub struct FaxQueueReceiver {
    rx: mpsc::UnboundedReceiver<FaxRecord>,
    depth: Arc<AtomicUsize>,
}

impl FaxQueueReceiver {
    /// Wait for the next record. `None` means the queue was closed and has
    /// fully drained — the worker should exit.
    pub async fn dequeue(&mut self) -> Option<FaxRecord> {
        let record = self.rx.recv().await;
        if record.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        record
    }

    /// Begin draining: refuse new enqueues, keep serving buffered records.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> FaxRecord {
        serde_json::from_str(&format!(r#"{{"id": "{id}", "time": 1}}"#)).unwrap()
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let (queue, mut receiver) = fax_queue();
        for id in ["a", "b", "c"] {
            assert!(queue.enqueue(record(id)));
        }
        assert_eq!(receiver.dequeue().await.unwrap().id, "a");
        assert_eq!(receiver.dequeue().await.unwrap().id, "b");
        assert_eq!(receiver.dequeue().await.unwrap().id, "c");
    }

    #[tokio::test]
    async fn depth_tracks_enqueue_and_dequeue() {
        let (queue, mut receiver) = fax_queue();
        queue.enqueue(record("a"));
        queue.enqueue(record("b"));
        assert_eq!(queue.depth(), 2);
        receiver.dequeue().await;
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn dequeue_suspends_until_enqueue() {
        let (queue, mut receiver) = fax_queue();
        let handle = tokio::spawn(async move { receiver.dequeue().await });
        tokio::task::yield_now().await;
        queue.enqueue(record("late"));
        assert_eq!(handle.await.unwrap().unwrap().id, "late");
    }

    #[tokio::test]
    async fn close_drains_buffered_then_ends() {
        let (queue, mut receiver) = fax_queue();
        queue.enqueue(record("a"));
        queue.enqueue(record("b"));
        receiver.close();

        assert!(!queue.enqueue(record("refused")));
        assert_eq!(receiver.dequeue().await.unwrap().id, "a");
        assert_eq!(receiver.dequeue().await.unwrap().id, "b");
        assert!(receiver.dequeue().await.is_none());
    }
}
