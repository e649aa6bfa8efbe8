// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The agent wires the queue actor, the delivery client and the scheduler
//! together and exposes the caller-facing `log()`.

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::codec::encode_record;
use crate::config::ShipperConfig;
use crate::delivery::DeliveryClient;
use crate::error::ShipperError;
use crate::flusher::{FlushOutcome, Flusher};
use crate::queue::{QueueHandle, QueueService};
use crate::record::{Extensions, LogRecord};
use crate::scheduler::Scheduler;
use crate::store::{KeyValueStore, PendingStore};

pub struct ShipperAgent {
    config: ShipperConfig,
    queue: QueueHandle,
    flusher: Flusher,
    cancel: CancellationToken,
    scheduler: JoinHandle<()>,
    service: JoinHandle<()>,
}

impl ShipperAgent {
    /// Starts the agent on the current tokio runtime.
    ///
    /// Records left in `kv_store` by a previous run are loaded and shipped on
    /// the first tick, one `batch_interval` from now.
    pub fn start(
        config: ShipperConfig,
        kv_store: impl KeyValueStore + 'static,
    ) -> Result<Self, ShipperError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| ShipperError::Runtime(e.to_string()))?;
        let client = DeliveryClient::new(&config)?;

        let (service, queue) =
            QueueService::new(PendingStore::new(kv_store), config.max_batch_entries);
        let service = runtime.spawn(service.run());

        let flusher = Flusher::new(queue.clone(), client);
        let cancel = CancellationToken::new();
        let scheduler = {
            let _guard = runtime.enter();
            Scheduler::spawn(flusher.clone(), config.batch_interval, cancel.clone())
        };

        debug!(
            "GELF shipper started, sending to {} every {:?}",
            config.endpoint, config.batch_interval
        );

        Ok(Self {
            config,
            queue,
            flusher,
            cancel,
            scheduler,
            service,
        })
    }

    /// Queues one record stamped with the configured host and the current time.
    ///
    /// Returns once the record is handed to the queue. Delivery problems are
    /// never reported here.
    pub fn log(
        &self,
        short_message: impl Into<String>,
        full_message: Option<String>,
        level: i64,
        extensions: Extensions,
    ) -> Result<(), ShipperError> {
        let mut record = LogRecord::new(self.config.host.clone(), short_message)
            .with_level(level)
            .with_extensions(extensions);
        if let Some(full_message) = full_message {
            record = record.with_full_message(full_message);
        }
        self.log_record(record)
    }

    /// Queues a record built by the caller.
    pub fn log_record(&self, record: LogRecord) -> Result<(), ShipperError> {
        if record.short_message().is_empty() {
            return Err(ShipperError::EmptyShortMessage);
        }
        encode_record(&record)?;

        self.queue.enqueue(record).map_err(|e| {
            error!("Failed to enqueue log record: {e}");
            ShipperError::QueueClosed
        })
    }

    /// Runs one flush cycle now instead of waiting for the next tick.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.flusher.flush().await
    }

    #[must_use]
    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    #[must_use]
    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    /// Stops the scheduler, then the queue actor once it has persisted every
    /// record enqueued before this call. Pending records are not flushed.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.scheduler.await {
            error!("Log flush scheduler task failed: {e}");
        }

        if self.queue.shutdown().is_err() {
            debug!("Shipper queue service already stopped");
        }
        if let Err(e) = self.service.await {
            error!("Shipper queue service task failed: {e}");
        }
        debug!("GELF shipper stopped");
    }
}
