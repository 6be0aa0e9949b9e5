//! Pipeline consumer — the single sequential worker draining the fax queue.
//!
//! One record is processed fully to completion before the next dequeue, so
//! external OCR/LLM calls never fan out unbounded. A drain request closes
//! the queue: buffered records are still served, the in-flight record
//! finishes its whole stage sequence (notification and cleanup included),
//! and only then does the worker exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::processor::FaxPipeline;
use super::queue::FaxQueueReceiver;

/// Handle to the running worker. Owns lifecycle transitions explicitly:
/// `drain()` to stop accepting work, `join()` to wait for exit.
pub struct PipelineHandle {
    drain_tx: watch::Sender<bool>,
    running: Arc<AtomicBool>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl PipelineHandle {
    /// Is the consumer loop still alive? Reported by the health endpoint.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Shared running flag for the health surface.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Request graceful shutdown: no new enqueues, buffered records drain,
    /// the in-flight record completes.
    pub fn drain(&self) {
        tracing::info!("Pipeline drain requested");
        let _ = self.drain_tx.send(true);
    }

    /// Wait for the worker task to exit.
    pub async fn join(mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.await;
        }
    }
}

/// Start the consumer task over the given queue receiver.
pub fn spawn_worker(pipeline: Arc<FaxPipeline>, mut receiver: FaxQueueReceiver) -> PipelineHandle {
    let (drain_tx, mut drain_rx) = watch::channel(false);
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);

    let handle = tokio::spawn(async move {
        tracing::info!("Pipeline worker started");
        loop {
            tokio::select! {
                // Fires on drain request, or with an error if the handle was
                // dropped — either way, close and serve out the remainder.
                _ = drain_rx.changed() => {
                    receiver.close();
                    while let Some(record) = receiver.dequeue().await {
                        pipeline.process(&record).await;
                    }
                    break;
                }
                record = receiver.dequeue() => match record {
                    Some(record) => {
                        pipeline.process(&record).await;
                    }
                    None => break,
                }
            }
        }
        flag.store(false, Ordering::Relaxed);
        tracing::info!("Pipeline worker stopped");
    });

    PipelineHandle { drain_tx, running, join: Some(handle) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::classify::{Classifier, ClassifyError};
    use crate::fetch::{FaxFetcher, FaxFormat, FetchError};
    use crate::models::FaxRecord;
    use crate::notify::{NotificationRouter, NotifyError};
    use crate::ocr::{ExtractError, TextExtractor};
    use crate::pipeline::queue::fax_queue;
    use crate::pipeline::sender_map::SenderMap;
    use crate::pipeline::staging::StagingArea;

    struct OkFetcher;

    #[async_trait]
    impl FaxFetcher for OkFetcher {
        async fn fetch(&self, _: &str, _: FaxFormat) -> Result<Vec<u8>, FetchError> {
            Ok(b"%PDF".to_vec())
        }
    }

    struct UnusedExtractor;

    #[async_trait]
    impl TextExtractor for UnusedExtractor {
        async fn extract(&self, _: &[u8]) -> Result<String, ExtractError> {
            Ok(String::new())
        }
    }

    struct UnusedClassifier;

    #[async_trait]
    impl Classifier for UnusedClassifier {
        async fn classify(&self, _: &str) -> Result<String, ClassifyError> {
            Ok("Uncategorized".into())
        }
    }

    /// Records processed fax ids, optionally slowing each send down.
    struct RecordingNotifier {
        ids: Mutex<Vec<String>>,
        delay_ms: u64,
    }

    #[async_trait]
    impl NotificationRouter for RecordingNotifier {
        async fn send(
            &self,
            _category: &str,
            _attachment: Option<&Path>,
            record: &FaxRecord,
        ) -> Result<bool, NotifyError> {
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            self.ids.lock().unwrap().push(record.id.clone());
            Ok(true)
        }
    }

    fn test_pipeline(
        dir: &tempfile::TempDir,
        notifier: Arc<RecordingNotifier>,
    ) -> Arc<FaxPipeline> {
        let sender_map =
            SenderMap::new(vec![("ClinicA".to_string(), "LabResult".to_string())]).unwrap();
        Arc::new(FaxPipeline::new(
            Arc::new(sender_map),
            StagingArea::new(dir.path().to_path_buf()),
            Arc::new(OkFetcher),
            Arc::new(UnusedExtractor),
            None,
            Arc::new(UnusedClassifier),
            notifier,
            "Uncategorized".to_string(),
        ))
    }

    fn record(id: &str) -> FaxRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "fromNameAddressBook": "ClinicA",
            "time": 1722945600,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn processes_in_fifo_order_then_exits_on_drain() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier { ids: Mutex::new(Vec::new()), delay_ms: 0 });
        let (queue, receiver) = fax_queue();
        let handle = spawn_worker(test_pipeline(&dir, Arc::clone(&notifier)), receiver);

        for id in ["1", "2", "3"] {
            queue.enqueue(record(id));
        }
        handle.drain();
        handle.join().await;

        assert_eq!(*notifier.ids.lock().unwrap(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn running_flag_flips_after_drain() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier { ids: Mutex::new(Vec::new()), delay_ms: 0 });
        let (_queue, receiver) = fax_queue();
        let handle = spawn_worker(test_pipeline(&dir, notifier), receiver);

        assert!(handle.is_running());
        let flag = handle.running_flag();
        handle.drain();
        handle.join().await;
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn in_flight_record_completes_before_exit() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier { ids: Mutex::new(Vec::new()), delay_ms: 50 });
        let (queue, receiver) = fax_queue();
        let handle = spawn_worker(test_pipeline(&dir, Arc::clone(&notifier)), receiver);

        queue.enqueue(record("slow"));
        // Give the worker a moment to dequeue, then drain mid-processing.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        handle.drain();
        handle.join().await;

        assert_eq!(*notifier.ids.lock().unwrap(), vec!["slow"]);
    }

    #[tokio::test]
    async fn drain_refuses_new_work_but_serves_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier { ids: Mutex::new(Vec::new()), delay_ms: 20 });
        let (queue, receiver) = fax_queue();
        let handle = spawn_worker(test_pipeline(&dir, Arc::clone(&notifier)), receiver);

        queue.enqueue(record("a"));
        queue.enqueue(record("b"));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        handle.drain();
        // The worker closes the queue on the drain signal; by the time it
        // has exited, late enqueues must have been refused.
        handle.join().await;
        assert!(!queue.enqueue(record("late")));

        assert_eq!(*notifier.ids.lock().unwrap(), vec!["a", "b"]);
    }
}
