//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString to keep
//! it out of logs.

pub mod digester;
pub mod secrets;

pub use digester::{BackoffStrategy, DEFAULT_BACKOFF, DigesterConfig, RunMode};

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::StopSignal;
use crate::error::{Error, Result};
use secrecy::SecretString;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// pgmq queue to poll.
    pub queue: String,
    pub workers: Option<NonZeroUsize>,
    pub backoff: BackoffStrategy,
    /// Seconds a retrieved message stays invisible to other readers.
    pub visibility_timeout: i32,
    /// Maximum messages per poll.
    pub batch_size: i32,
    pub stop_signals: Vec<StopSignal>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | required |
    /// | `DIGESTER_QUEUE` | `work` |
    /// | `DIGESTER_WORKERS` | available parallelism |
    /// | `DIGESTER_BACKOFF_MS` | `10000` |
    /// | `DIGESTER_BACKOFF_STEPS` | `0` (constant) |
    /// | `DIGESTER_VISIBILITY_TIMEOUT` | `30` |
    /// | `DIGESTER_BATCH_SIZE` | `10` |
    /// | `DIGESTER_STOP_SIGNALS` | `interrupt,terminate` |
    /// | `OTEL_ENDPOINT` | unset |
    /// | `LOG_LEVEL` | `info` |
    pub fn from_env() -> Result<Self> {
        let backoff_ms: u64 =
            parsed_var("DIGESTER_BACKOFF_MS")?.unwrap_or(DEFAULT_BACKOFF.as_millis() as u64);
        let backoff_steps: usize = parsed_var("DIGESTER_BACKOFF_STEPS")?.unwrap_or(0);
        let backoff = if backoff_steps == 0 {
            BackoffStrategy::constant(Duration::from_millis(backoff_ms))
        } else {
            BackoffStrategy::exponential(backoff_steps, Duration::from_millis(backoff_ms))
        };

        let workers = match parsed_var::<usize>("DIGESTER_WORKERS")? {
            Some(n) => Some(NonZeroUsize::new(n).ok_or_else(|| {
                Error::Config("DIGESTER_WORKERS must be a positive integer".to_string())
            })?),
            None => None,
        };

        let stop_signals = match std::env::var("DIGESTER_STOP_SIGNALS") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(StopSignal::from_str)
                .collect::<Result<Vec<_>>>()?,
            Err(_) => StopSignal::defaults(),
        };

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            queue: std::env::var("DIGESTER_QUEUE").unwrap_or_else(|_| "work".to_string()),
            workers,
            backoff,
            visibility_timeout: parsed_var("DIGESTER_VISIBILITY_TIMEOUT")?.unwrap_or(30),
            batch_size: parsed_var("DIGESTER_BATCH_SIZE")?.unwrap_or(10),
            stop_signals,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Engine configuration derived from the environment settings.
    pub fn digester_config(&self) -> DigesterConfig {
        DigesterConfig {
            name: self.queue.clone(),
            workers: self.workers,
            backoff: Some(self.backoff.clone()),
            run_mode: RunMode::UntilSignal,
            stop_signals: self.stop_signals.clone(),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}
