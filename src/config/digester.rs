//! Engine configuration: worker count, backoff, run mode, stop signals.
//!
//! Plain data with serde derives so it can come from code, a TOML file, or
//! the environment (see [`super::Config::digester_config`]).

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::IntervalBackoff;
use crate::engine::StopSignal;
use crate::error::{Error, Result};

/// Delay applied after an empty poll when no backoff is configured.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// How a digester should space out polls of an empty source.
///
/// Delays are kept in whole milliseconds. The `Duration` constructors round
/// a non-zero sub-millisecond delay up to 1 ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `[0, delay]`.
    Constant { delay_ms: u64 },
    /// `[0, d, 2d, .., d * 2^(steps-1)]`.
    Exponential { steps: usize, initial_ms: u64 },
}

impl BackoffStrategy {
    pub fn constant(delay: Duration) -> Self {
        BackoffStrategy::Constant {
            delay_ms: whole_millis(delay),
        }
    }

    pub fn exponential(steps: usize, initial: Duration) -> Self {
        BackoffStrategy::Exponential {
            steps,
            initial_ms: whole_millis(initial),
        }
    }

    /// Replace the delay and/or depth, keeping whatever is not given.
    ///
    /// A depth of 0 selects a constant schedule.
    pub fn with_overrides(&self, delay_ms: Option<u64>, steps: Option<usize>) -> Self {
        let (base_ms, base_steps) = match *self {
            BackoffStrategy::Constant { delay_ms } => (delay_ms, 0),
            BackoffStrategy::Exponential { steps, initial_ms } => (initial_ms, steps),
        };
        let delay_ms = delay_ms.unwrap_or(base_ms);
        match steps.unwrap_or(base_steps) {
            0 => BackoffStrategy::Constant { delay_ms },
            steps => BackoffStrategy::Exponential {
                steps,
                initial_ms: delay_ms,
            },
        }
    }

    /// Materialize the schedule.
    pub fn build(&self) -> IntervalBackoff {
        match *self {
            BackoffStrategy::Constant { delay_ms } => {
                IntervalBackoff::constant(Duration::from_millis(delay_ms))
            }
            BackoffStrategy::Exponential { steps, initial_ms } => {
                IntervalBackoff::exponential(steps, Duration::from_millis(initial_ms))
            }
        }
    }
}

fn whole_millis(d: Duration) -> u64 {
    match u64::try_from(d.as_millis()) {
        Ok(0) if !d.is_zero() => 1,
        Ok(ms) => ms,
        Err(_) => u64::MAX,
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::constant(DEFAULT_BACKOFF)
    }
}

/// What `Digester::start` does after launching the pool and orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Return immediately; the caller stops the digester later.
    #[default]
    Detached,
    /// Block until one of the stop signals arrives, then stop.
    UntilSignal,
}

/// Configuration for a digester. Frozen once the digester is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DigesterConfig {
    /// Name used in logs and spans.
    pub name: String,
    /// Worker count. `None` means the host's available parallelism.
    pub workers: Option<NonZeroUsize>,
    /// Polling backoff. `None` means a constant [`DEFAULT_BACKOFF`].
    pub backoff: Option<BackoffStrategy>,
    pub run_mode: RunMode,
    /// Signals that end a [`RunMode::UntilSignal`] run.
    pub stop_signals: Vec<StopSignal>,
}

impl Default for DigesterConfig {
    fn default() -> Self {
        Self {
            name: "digester".to_string(),
            workers: None,
            backoff: None,
            run_mode: RunMode::Detached,
            stop_signals: StopSignal::defaults(),
        }
    }
}

impl DigesterConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the worker count. Zero falls back to the default.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = NonZeroUsize::new(workers);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    pub fn with_stop_signals(mut self, signals: impl IntoIterator<Item = StopSignal>) -> Self {
        self.stop_signals = signals.into_iter().collect();
        self
    }

    /// Parse from a TOML document.
    ///
    /// ```toml
    /// workers = 4
    /// run_mode = "until_signal"
    /// stop_signals = ["interrupt", "terminate"]
    ///
    /// [backoff]
    /// kind = "exponential"
    /// steps = 5
    /// initial_ms = 500
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| Error::Config(format!("bad digester config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read digester config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.run_mode == RunMode::UntilSignal && self.stop_signals.is_empty() {
            return Err(Error::InvalidConfig(
                "run mode until_signal needs at least one stop signal".into(),
            ));
        }
        if let Some(BackoffStrategy::Exponential { steps: 0, .. }) = self.backoff {
            return Err(Error::InvalidConfig(
                "exponential backoff needs at least one step".into(),
            ));
        }
        Ok(())
    }

    /// Worker count with the default applied.
    pub fn effective_workers(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok())
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }

    /// Backoff strategy with the default applied.
    pub fn effective_backoff(&self) -> BackoffStrategy {
        self.backoff.clone().unwrap_or_default()
    }
}
