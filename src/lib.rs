//! # digester
//!
//! A polling work dispatcher. A [`Digester`] repeatedly pulls batches of
//! items from a [`WorkSource`], hands them to a fixed pool of workers that
//! run a [`Handler`] on each item, and retires every item the handler
//! accepted. Empty polls back off according to a [`Backoff`] schedule;
//! a full worker channel throttles polling.
//!
//! Sources and handlers are supplied by the caller. The crate ships an
//! in-memory source, a Postgres pgmq source and a command-running handler.

pub mod backoff;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod item;
pub mod source;
pub mod telemetry;

pub use backoff::{Backoff, IntervalBackoff};
pub use config::{BackoffStrategy, DigesterConfig, RunMode};
pub use engine::{Digester, State, StatsSnapshot, StopSignal};
pub use error::{BoxError, Error, Result};
pub use item::{Handler, WorkItem, WorkSource};
