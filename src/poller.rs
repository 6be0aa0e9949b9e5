//! Inbox discovery — periodically asks the provider for new faxes and feeds
//! the processing queue.
//!
//! The poller owns discovery cadence and duplicate suppression (one enqueue
//! per record per discovery cycle); the pipeline never sees the provider's
//! listing API. Discovery errors are logged and retried next cycle, never
//! fatal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::fetch::FaxSource;
use crate::pipeline::FaxQueue;

/// One discovery pass over the window ending now. Returns the number of
/// records actually enqueued.
pub async fn poll_once(source: &dyn FaxSource, queue: &FaxQueue, window: Duration) -> usize {
    let now = Utc::now().timestamp();
    let time_from = now - window.as_secs() as i64;
    tracing::info!(time_from, time_to = now, "Polling for new faxes");

    let faxes = match source.list_incoming(time_from, now).await {
        Ok(faxes) => faxes,
        Err(e) => {
            tracing::error!(error = %e, "Fax discovery failed");
            return 0;
        }
    };

    if faxes.is_empty() {
        tracing::info!("No new faxes found");
        return 0;
    }

    tracing::info!(count = faxes.len(), "Found new faxes");
    let mut enqueued = 0;
    for fax in faxes {
        if queue.enqueue(fax) {
            enqueued += 1;
        }
    }
    enqueued
}

/// Run discovery forever: one immediate pass at startup, then one per
/// interval. Aborted by the owner on shutdown.
pub fn spawn_poller(
    source: Arc<dyn FaxSource>,
    queue: FaxQueue,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Fax poller started");
        poll_once(source.as_ref(), &queue, interval).await;
        loop {
            tokio::time::sleep(interval).await;
            poll_once(source.as_ref(), &queue, interval).await;
        }
    })
}
