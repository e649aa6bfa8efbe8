// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One flush cycle: snapshot the queue, send it, remove what was accepted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::delivery::DeliveryClient;
use crate::error::DeliveryError;
use crate::queue::QueueHandle;
use crate::record::RecordId;

#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was pending; no request was made.
    Empty,
    /// Another cycle was still running.
    Skipped,
    /// The collector answered 202 and the batch was removed from the queue.
    Delivered { sent: usize, removed: usize },
    /// The batch stays pending and is retried next cycle.
    Failed(DeliveryError),
    /// The queue service is gone.
    QueueUnavailable(String),
}

#[derive(Clone, Debug)]
pub struct Flusher {
    queue: QueueHandle,
    client: DeliveryClient,
    in_flight: Arc<AtomicBool>,
}

// Clears the in-flight flag even if the cycle future is dropped midway.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Flusher {
    #[must_use]
    pub fn new(queue: QueueHandle, client: DeliveryClient) -> Self {
        Self {
            queue,
            client,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs one cycle unless one is already running.
    pub async fn flush(&self) -> FlushOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Log flush already in progress, skipping");
            return FlushOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);
        self.flush_cycle().await
    }

    async fn flush_cycle(&self) -> FlushOutcome {
        let batch = match self.queue.flush().await {
            Ok(batch) => batch,
            Err(e) => {
                error!("Failed to read pending logs: {e}");
                return FlushOutcome::QueueUnavailable(e);
            }
        };
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let sent = batch.len();
        debug!("Flushing {sent} log records");

        if let Err(e) = self.client.send(batch.iter().map(|entry| &entry.record)).await {
            return FlushOutcome::Failed(e);
        }

        let ids: Vec<RecordId> = batch.iter().map(|entry| entry.id).collect();
        match self.queue.acknowledge(ids).await {
            Ok(removed) => {
                debug!("Successfully flushed {sent} log records");
                FlushOutcome::Delivered { sent, removed }
            }
            Err(e) => {
                // Delivered but still pending: the batch will be sent again.
                warn!("Failed to remove {sent} delivered log records: {e}");
                FlushOutcome::QueueUnavailable(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShipperConfig;
    use crate::queue::QueueService;
    use crate::record::LogRecord;
    use crate::store::{MemoryKeyValueStore, PendingStore};

    fn flusher_for(url: &str) -> (Flusher, QueueHandle) {
        let (service, handle) =
            QueueService::new(PendingStore::new(MemoryKeyValueStore::new()), None);
        tokio::spawn(service.run());
        let config = ShipperConfig::new(url.parse().unwrap());
        let client = DeliveryClient::new(&config).unwrap();
        (Flusher::new(handle.clone(), client), handle)
    }

    #[tokio::test]
    async fn test_empty_queue_skips_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gelf")
            .expect(0)
            .create_async()
            .await;

        let (flusher, handle) = flusher_for(&format!("{}/gelf", server.url()));
        assert!(matches!(flusher.flush().await, FlushOutcome::Empty));

        mock.assert_async().await;
        handle.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_flush_is_skipped() {
        let (flusher, handle) = flusher_for("http://127.0.0.1:9/gelf");
        flusher.in_flight.store(true, Ordering::Release);

        assert!(matches!(flusher.flush().await, FlushOutcome::Skipped));

        flusher.in_flight.store(false, Ordering::Release);
        assert!(matches!(flusher.flush().await, FlushOutcome::Empty));
        handle.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_delivered_batch_is_removed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/gelf")
            .with_status(202)
            .create_async()
            .await;

        let (flusher, handle) = flusher_for(&format!("{}/gelf", server.url()));
        handle.enqueue(LogRecord::new("h", "one")).unwrap();
        handle.enqueue(LogRecord::new("h", "two")).unwrap();

        let outcome = flusher.flush().await;
        assert!(matches!(
            outcome,
            FlushOutcome::Delivered { sent: 2, removed: 2 }
        ));
        assert_eq!(handle.len().await.unwrap(), 0);
        assert!(!flusher.in_flight.load(Ordering::Acquire));
        handle.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_queue_unavailable() {
        let (service, handle) =
            QueueService::new(PendingStore::new(MemoryKeyValueStore::new()), None);
        drop(service);
        let config = ShipperConfig::new("http://127.0.0.1:9/gelf".parse().unwrap());
        let flusher = Flusher::new(handle, DeliveryClient::new(&config).unwrap());

        assert!(matches!(
            flusher.flush().await,
            FlushOutcome::QueueUnavailable(_)
        ));
    }
}
