//! The digester: worker pool + orchestrator behind a start/stop lifecycle.
//!
//! `Idle -> Running -> Stopped`. A digester runs at most once; starting it
//! again is rejected rather than resumed.
//!
//! Shutdown order matters. `stop` clears the running flag, wakes the
//! orchestrator, waits for it to exit (which drops the only sender and
//! closes the channel), and only then waits for the workers, which finish
//! every batch already dispatched before they exit.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info};

use super::orchestrator::Orchestrator;
use super::pool::WorkerPool;
use super::signal;
use super::stats::{Stats, StatsSnapshot};
use crate::backoff::Backoff;
use crate::config::{DigesterConfig, RunMode};
use crate::error::{Error, Result};
use crate::item::{Handler, WorkSource};

/// Where a digester is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Built, never started.
    Idle,
    /// Workers and orchestrator are live.
    Running,
    /// Shut down. Terminal.
    Stopped,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Idle => "idle",
            State::Running => "running",
            State::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

enum Lifecycle {
    Idle,
    Running(Tasks),
    Stopped,
}

struct Tasks {
    shutdown: watch::Sender<bool>,
    orchestrator: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

/// Polls a [`WorkSource`] and feeds its items through a [`Handler`] on a
/// fixed pool of workers.
///
/// ```no_run
/// # use digester::{Digester, DigesterConfig, source::memory::MemorySource};
/// # async fn demo() -> digester::Result<()> {
/// let source = MemorySource::<String>::new();
/// let digester = Digester::new(source, DigesterConfig::default().with_workers(4))?;
/// digester
///     .start(|item: &digester::source::memory::MemoryItem<String>| {
///         let body = item.body().clone();
///         async move {
///             println!("{body}");
///             Ok::<_, digester::BoxError>(())
///         }
///     })
///     .await?;
/// digester.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Digester<S: WorkSource> {
    source: Arc<S>,
    config: DigesterConfig,
    workers: usize,
    backoff: Arc<dyn Backoff>,
    custom_backoff: bool,
    running: Arc<AtomicBool>,
    stats: Arc<Stats>,
    lifecycle: Mutex<Lifecycle>,
}

impl<S: WorkSource> Digester<S> {
    /// Build a digester, applying defaults for anything left unset.
    pub fn new(source: S, config: DigesterConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.effective_workers();
        let backoff: Arc<dyn Backoff> = Arc::new(config.effective_backoff().build());

        info!(digester = %config.name, workers, "digester configured");

        Ok(Self {
            source: Arc::new(source),
            config,
            workers,
            backoff,
            custom_backoff: false,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Stats::default()),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Replace the backoff with a custom implementation.
    ///
    /// The configured strategy is then ignored; [`Digester::config`] still
    /// reports it, [`Digester::backoff`] returns what actually runs.
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self.custom_backoff = true;
        self
    }

    /// The configuration as given. `backoff` does not reflect a schedule
    /// installed with [`Digester::with_backoff`].
    pub fn config(&self) -> &DigesterConfig {
        &self.config
    }

    /// Number of workers the pool runs with.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn backoff(&self) -> &dyn Backoff {
        self.backoff.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Lock-free check of the running flag.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn state(&self) -> State {
        match *self.lifecycle.lock().await {
            Lifecycle::Idle => State::Idle,
            Lifecycle::Running(_) => State::Running,
            Lifecycle::Stopped => State::Stopped,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Launch the worker pool and orchestrator with `handler`.
    ///
    /// In [`RunMode::Detached`] this returns as soon as everything is
    /// running. In [`RunMode::UntilSignal`] it waits for a stop signal and
    /// stops the digester before returning.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] if the digester is running, [`Error::Stopped`]
    /// if it already ran. Neither mutates any state.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: Handler<S::Item>,
    {
        self.launch(handler).await?;

        if self.config.run_mode == RunMode::UntilSignal {
            info!(
                digester = %self.config.name,
                signals = ?self.config.stop_signals,
                "waiting for stop signal"
            );
            let waited = signal::wait_for_any(&self.config.stop_signals).await;
            match &waited {
                Ok(sig) => info!(digester = %self.config.name, signal = %sig, "stop signal received"),
                Err(e) => error!(digester = %self.config.name, error = %e, "cannot wait for stop signals"),
            }
            self.stop().await?;
            waited?;
        }

        Ok(())
    }

    /// Start detached, wait for `shutdown` to complete, then stop.
    pub async fn run_until<H, F>(&self, handler: H, shutdown: F) -> Result<()>
    where
        H: Handler<S::Item>,
        F: Future<Output = ()>,
    {
        self.launch(handler).await?;
        shutdown.await;
        self.stop().await
    }

    async fn launch<H>(&self, handler: H) -> Result<()>
    where
        H: Handler<S::Item>,
    {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(Error::AlreadyRunning),
            Lifecycle::Stopped => return Err(Error::Stopped),
        }

        let name = self.config.name.as_str();
        if self.custom_backoff {
            info!(digester = name, backoff = "custom", "starting digester");
        } else {
            info!(
                digester = name,
                backoff = ?self.config.effective_backoff(),
                "starting digester"
            );
        }
        self.running.store(true, Ordering::Release);

        let (tx, rx) = mpsc::channel(self.workers);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pool = WorkerPool::spawn(
            name,
            self.workers,
            rx,
            Arc::clone(&self.source),
            Arc::new(handler),
            Arc::clone(&self.stats),
        );

        let orchestrator = Orchestrator {
            source: Arc::clone(&self.source),
            backoff: Arc::clone(&self.backoff),
            tx,
            running: Arc::clone(&self.running),
            shutdown: shutdown_rx,
            stats: Arc::clone(&self.stats),
        };
        let span = tracing::info_span!("orchestrator", digester = name);
        let orchestrator = tokio::spawn(orchestrator.run().instrument(span));

        *lifecycle = Lifecycle::Running(Tasks {
            shutdown: shutdown_tx,
            orchestrator,
            workers: pool.into_handles(),
        });
        Ok(())
    }

    /// Stop polling, let the workers drain, and wait for every task.
    ///
    /// A no-op unless the digester is running. Concurrent callers serialize;
    /// all of them return after shutdown has completed.
    ///
    /// # Errors
    ///
    /// [`Error::TaskPanicked`] if the orchestrator or a worker panicked
    /// outside of a handler. All tasks are still joined first.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let tasks = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(tasks) => tasks,
            other => {
                *lifecycle = other;
                return Ok(());
            }
        };

        let name = self.config.name.as_str();
        info!(digester = name, "stopping digester");
        self.running.store(false, Ordering::Release);
        tasks.shutdown.send_replace(true);

        let mut panicked = Vec::new();
        if let Err(e) = tasks.orchestrator.await {
            panicked.push(format!("orchestrator: {e}"));
        }
        // Sender is gone now; workers see a closed channel once it is empty.
        for (i, worker) in tasks.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                panicked.push(format!("worker {}: {e}", i + 1));
            }
        }

        if panicked.is_empty() {
            info!(digester = name, "digester stopped");
            Ok(())
        } else {
            let detail = panicked.join("; ");
            error!(digester = name, detail = %detail, "digester stopped with panicked tasks");
            Err(Error::TaskPanicked(detail))
        }
    }
}
