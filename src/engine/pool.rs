//! Worker pool: N tasks draining the batch channel.
//!
//! Each worker takes one batch at a time and walks it in order. For every
//! item it runs the handler and, only if that succeeded, retires the item
//! at the source. Failures are logged and counted, never retried. Workers
//! exit once the channel is closed and empty.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use super::stats::Stats;
use crate::item::{Handler, WorkItem, WorkSource};
use crate::telemetry::metrics;
use crate::telemetry::work::{ItemOutcome, record_outcome, start_item_span};

pub(crate) type Batch<I> = Vec<I>;

/// Shared end of the batch channel. The lock is held only while waiting
/// for the next batch, so each batch goes to exactly one worker.
type SharedReceiver<I> = Arc<Mutex<mpsc::Receiver<Batch<I>>>>;

pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks consuming from `rx`.
    pub(crate) fn spawn<S, H>(
        name: &str,
        workers: usize,
        rx: mpsc::Receiver<Batch<S::Item>>,
        source: Arc<S>,
        handler: Arc<H>,
        stats: Arc<Stats>,
    ) -> Self
    where
        S: WorkSource,
        H: Handler<S::Item>,
    {
        let rx: SharedReceiver<S::Item> = Arc::new(Mutex::new(rx));

        info!(digester = name, workers, "starting workers");
        let handles = (1..=workers)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    rx: Arc::clone(&rx),
                    source: Arc::clone(&source),
                    handler: Arc::clone(&handler),
                    stats: Arc::clone(&stats),
                };
                let span = tracing::info_span!("worker", digester = name, worker = worker_id);
                tokio::spawn(worker.run().instrument(span))
            })
            .collect();

        Self { handles }
    }

    pub(crate) fn into_handles(self) -> Vec<JoinHandle<()>> {
        self.handles
    }
}

struct Worker<S: WorkSource, H> {
    id: usize,
    rx: SharedReceiver<S::Item>,
    source: Arc<S>,
    handler: Arc<H>,
    stats: Arc<Stats>,
}

impl<S, H> Worker<S, H>
where
    S: WorkSource,
    H: Handler<S::Item>,
{
    async fn run(self) {
        debug!("worker started");
        loop {
            let batch = { self.rx.lock().await.recv().await };
            let Some(batch) = batch else {
                break;
            };

            debug!(batch_size = batch.len(), "handling batch");
            for item in batch {
                self.digest(item).await;
            }
            self.stats.batch_completed();
        }
        debug!("worker stopping");
    }

    /// Handle a single item, retiring it on success.
    async fn digest(&self, item: S::Item) {
        let span = start_item_span(self.id, item.id());
        async {
            let started = Instant::now();
            let (item, result) = self.invoke(item).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            metrics::handler_duration_ms().record(elapsed_ms, &[]);

            let Some(item) = item else {
                // Panicked inside the handler; the item went down with it.
                self.stats.handler_failure();
                metrics::items_failed().add(1, &[KeyValue::new("reason", "panic")]);
                record_outcome(&span, ItemOutcome::Failed);
                return;
            };

            if let Err(e) = result {
                self.stats.handler_failure();
                metrics::items_failed().add(1, &[KeyValue::new("reason", "error")]);
                record_outcome(&span, ItemOutcome::Failed);
                error!(item.id = item.id(), error = %e, "could not digest item");
                return;
            }

            self.stats.item_handled();
            metrics::items_handled().add(1, &[]);

            debug!(item.id = item.id(), "retiring item");
            match self.source.retire(&item).await {
                Ok(()) => {
                    self.stats.item_retired();
                    metrics::items_retired().add(1, &[]);
                    record_outcome(&span, ItemOutcome::Retired);
                }
                Err(e) => {
                    self.stats.retire_failure();
                    metrics::retire_failures().add(1, &[]);
                    record_outcome(&span, ItemOutcome::Unretired);
                    warn!(item.id = item.id(), error = %e, "could not retire item");
                }
            }
        }
        .instrument(span.clone())
        .await
    }

    /// Run the handler on its own task so a panic only costs this item.
    ///
    /// Returns the item back alongside the handler result, or `None` for
    /// the item if the handler panicked.
    async fn invoke(
        &self,
        item: S::Item,
    ) -> (Option<S::Item>, Result<(), crate::error::BoxError>) {
        let handler = Arc::clone(&self.handler);
        let task = tokio::spawn(
            async move {
                let result = handler.handle(&item).await;
                (item, result)
            }
            .in_current_span(),
        );

        match task.await {
            Ok((item, result)) => (Some(item), result),
            Err(e) => {
                error!(error = %e, "handler panicked");
                (None, Err(e.into()))
            }
        }
    }
}
