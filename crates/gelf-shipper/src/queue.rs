// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Actor that owns the pending queue.
//!
//! Every mutation of the durable collection goes through one task:
//!
//! ```text
//!    ┌──────────────┐
//!    │ QueueHandles │ (log() callers, flusher)
//!    └──────┬───────┘
//!           │ QueueCommand over mpsc
//!           v
//!    ┌──────────────┐
//!    │ QueueService │ (single consumer, FIFO)
//!    └──────┬───────┘
//!           │ full read-modify-write
//!           v
//!    ┌──────────────┐
//!    │ PendingStore │
//!    └──────────────┘
//! ```
//!
//! Because commands are handled one at a time, an `Enqueue` sent before a
//! `Flush` from the same handle is always visible in that flush's snapshot,
//! and an `Acknowledge` can only remove ids that existed when the snapshot was
//! taken.

use std::collections::HashSet;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::codec::encode_record;
use crate::record::{LogRecord, PendingEntry, RecordId};
use crate::store::PendingStore;

#[derive(Debug)]
pub enum QueueCommand {
    Enqueue(LogRecord),
    Flush(oneshot::Sender<Vec<PendingEntry>>),
    Acknowledge {
        ids: Vec<RecordId>,
        response_tx: oneshot::Sender<usize>,
    },
    Len(oneshot::Sender<usize>),
    Shutdown,
}

/// Cloneable sender side of the queue.
#[derive(Clone, Debug)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<QueueCommand>,
}

impl QueueHandle {
    /// Hands a record to the queue without waiting.
    ///
    /// The record is durable once the service has processed the command.
    pub fn enqueue(&self, record: LogRecord) -> Result<(), mpsc::error::SendError<QueueCommand>> {
        self.tx.send(QueueCommand::Enqueue(record))
    }

    /// Returns a copy of the pending entries, oldest first. Storage is not touched.
    pub async fn flush(&self) -> Result<Vec<PendingEntry>, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Flush(response_tx))
            .map_err(|e| format!("Failed to send flush command: {e}"))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {e}"))
    }

    /// Removes the entries with the given ids and returns how many were removed.
    pub async fn acknowledge(&self, ids: Vec<RecordId>) -> Result<usize, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Acknowledge { ids, response_tx })
            .map_err(|e| format!("Failed to send acknowledge command: {e}"))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive acknowledge response: {e}"))
    }

    /// Number of pending entries.
    pub async fn len(&self) -> Result<usize, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(QueueCommand::Len(response_tx))
            .map_err(|e| format!("Failed to send len command: {e}"))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive len response: {e}"))
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<QueueCommand>> {
        self.tx.send(QueueCommand::Shutdown)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct QueueService {
    store: PendingStore,
    entries: Vec<PendingEntry>,
    next_id: RecordId,
    max_batch_entries: Option<usize>,
    rx: mpsc::UnboundedReceiver<QueueCommand>,
}

impl QueueService {
    /// Loads the persisted queue and returns the service with its handle.
    ///
    /// `max_batch_entries` caps how many of the oldest entries one flush returns.
    #[must_use]
    pub fn new(store: PendingStore, max_batch_entries: Option<usize>) -> (Self, QueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let entries = store.load();
        let next_id = entries
            .iter()
            .map(|entry| entry.id)
            .max()
            .map_or(RecordId(1), RecordId::next);

        let service = Self {
            store,
            entries,
            next_id,
            max_batch_entries,
            rx,
        };
        let handle = QueueHandle { tx };

        (service, handle)
    }

    pub async fn run(mut self) {
        debug!("Shipper queue service started with {} pending entries", self.entries.len());

        while let Some(command) = self.rx.recv().await {
            match command {
                QueueCommand::Enqueue(record) => {
                    self.enqueue(record);
                }
                QueueCommand::Flush(response_tx) => {
                    if response_tx.send(self.snapshot()).is_err() {
                        error!("Failed to send flush response - receiver dropped");
                    }
                }
                QueueCommand::Acknowledge { ids, response_tx } => {
                    let removed = self.acknowledge(&ids);
                    if response_tx.send(removed).is_err() {
                        error!("Failed to send acknowledge response - receiver dropped");
                    }
                }
                QueueCommand::Len(response_tx) => {
                    if response_tx.send(self.entries.len()).is_err() {
                        error!("Failed to send len response - receiver dropped");
                    }
                }
                QueueCommand::Shutdown => {
                    debug!("Shipper queue service shutting down");
                    break;
                }
            }
        }

        debug!("Shipper queue service stopped");
    }

    fn enqueue(&mut self, record: LogRecord) -> Option<RecordId> {
        // A record that cannot be encoded would make every later save fail.
        if let Err(e) = encode_record(&record) {
            error!("Dropping log record that cannot be encoded: {e}");
            return None;
        }

        let id = self.next_id;
        self.next_id = id.next();
        self.entries.push(PendingEntry { id, record });
        self.persist();
        Some(id)
    }

    fn snapshot(&self) -> Vec<PendingEntry> {
        let take = self
            .max_batch_entries
            .map_or(self.entries.len(), |max| max.min(self.entries.len()));
        self.entries[..take].to_vec()
    }

    fn acknowledge(&mut self, ids: &[RecordId]) -> usize {
        let ids: HashSet<RecordId> = ids.iter().copied().collect();
        let before = self.entries.len();
        self.entries.retain(|entry| !ids.contains(&entry.id));
        let removed = before - self.entries.len();

        if removed < ids.len() {
            warn!(
                "Acknowledged {} ids but only {} were pending",
                ids.len(),
                removed
            );
        }
        if removed > 0 {
            self.persist();
        }
        removed
    }

    fn persist(&self) {
        // The in-memory view stays authoritative; the next successful save catches up.
        if let Err(e) = blocking(|| self.store.save(&self.entries)) {
            error!(
                "Failed to persist {} pending log entries: {e}",
                self.entries.len()
            );
        }
    }
}

/// Runs a store write without stalling other tasks on this worker.
///
/// `block_in_place` needs the multi-threaded scheduler; on a current-thread
/// runtime the write runs inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}
