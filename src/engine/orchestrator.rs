//! The polling loop.
//!
//! Sleeps for the backoff's current delay, polls the source, then either
//! escalates the backoff (empty), leaves it alone (error), or resets it and
//! pushes the batch to the workers. The push blocks while the channel is
//! full, which throttles polling to the pool's pace.
//!
//! The orchestrator owns the only sender. When it returns the sender is
//! dropped and the channel closes, so nothing can be sent after close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry::KeyValue;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::pool::Batch;
use super::stats::Stats;
use crate::backoff::Backoff;
use crate::item::WorkSource;
use crate::telemetry::metrics;

pub(crate) struct Orchestrator<S: WorkSource> {
    pub(crate) source: Arc<S>,
    pub(crate) backoff: Arc<dyn Backoff>,
    pub(crate) tx: mpsc::Sender<Batch<S::Item>>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) stats: Arc<Stats>,
}

impl<S: WorkSource> Orchestrator<S> {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) async fn run(mut self) {
        info!("orchestrator started");

        while self.is_running() {
            let delay = self.backoff.current();
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                debug!(delay_ms = delay.as_millis() as u64, "sleeping");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.shutdown.wait_for(|stop| *stop) => break,
                }
            }
            if !self.is_running() {
                break;
            }

            self.stats.poll();
            metrics::polls().add(1, &[]);
            let batch = match self.source.retrieve().await {
                Ok(batch) => batch,
                Err(e) => {
                    self.stats.retrieve_error();
                    metrics::retrieve_errors().add(1, &[]);
                    // Backoff stays put on errors.
                    warn!(error = %e, "failed to retrieve from work source");
                    continue;
                }
            };

            if batch.is_empty() {
                self.stats.empty_poll();
                self.backoff.next();
                debug!("work source is empty");
                continue;
            }

            self.backoff.reset();
            let batch_size = batch.len();
            debug!(batch_size, "dispatching batch");
            if self.tx.send(batch).await.is_err() {
                // Every worker is gone; nobody is left to drain the channel.
                error!(batch_size, "worker pool is gone, dropping batch");
                metrics::batches_dropped().add(1, &[KeyValue::new("reason", "no_workers")]);
                break;
            }
            self.stats.batch_dispatched();
        }

        info!("orchestrator stopping");
    }
}
