// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::flusher::{FlushOutcome, Flusher};

/// Periodic driver of [`Flusher::flush`].
pub struct Scheduler;

impl Scheduler {
    /// Spawns the flush loop. The first flush happens one full `period` after
    /// the call; the loop ends when `cancel` is cancelled.
    ///
    /// Ticks that come due while a cycle is still running are dropped, not
    /// queued, so cycles never overlap.
    pub fn spawn(flusher: Flusher, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut flush_interval = interval(period);
            flush_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            flush_interval.tick().await; // discard first tick, which is instantaneous

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Log flush scheduler stopped");
                        break;
                    }
                    _ = flush_interval.tick() => {
                        debug!("Flushing pending logs");
                        match flusher.flush().await {
                            FlushOutcome::Delivered { sent, .. } => {
                                debug!("Scheduled flush delivered {sent} log records");
                            }
                            FlushOutcome::Failed(e) => {
                                debug!("Scheduled flush failed, will retry next tick: {e}");
                            }
                            FlushOutcome::QueueUnavailable(_) => {
                                debug!("Shipper queue closed, stopping scheduler");
                                break;
                            }
                            FlushOutcome::Empty | FlushOutcome::Skipped => {}
                        }
                    }
                }
            }
        })
    }
}
