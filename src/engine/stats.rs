//! In-process counters for a single digester.
//!
//! These mirror the OTel instruments in [`crate::telemetry::metrics`] but
//! are scoped to one engine instance, so callers and tests can read them
//! without an exporter.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Stats {
    polls: AtomicU64,
    empty_polls: AtomicU64,
    retrieve_errors: AtomicU64,
    batches_dispatched: AtomicU64,
    batches_completed: AtomicU64,
    items_handled: AtomicU64,
    handler_failures: AtomicU64,
    items_retired: AtomicU64,
    retire_failures: AtomicU64,
}

macro_rules! bump {
    ($($name:ident => $field:ident),* $(,)?) => {
        impl Stats {
            $(
                pub(crate) fn $name(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

bump! {
    poll => polls,
    empty_poll => empty_polls,
    retrieve_error => retrieve_errors,
    batch_dispatched => batches_dispatched,
    batch_completed => batches_completed,
    item_handled => items_handled,
    handler_failure => handler_failures,
    item_retired => items_retired,
    retire_failure => retire_failures,
}

impl Stats {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            retrieve_errors: self.retrieve_errors.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            items_handled: self.items_handled.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            items_retired: self.items_retired.load(Ordering::Relaxed),
            retire_failures: self.retire_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a digester's counters. All values only grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls to `WorkSource::retrieve`.
    pub polls: u64,
    /// Polls that came back with no items.
    pub empty_polls: u64,
    /// Polls that returned an error.
    pub retrieve_errors: u64,
    /// Batches pushed to the worker channel.
    pub batches_dispatched: u64,
    /// Batches a worker finished walking.
    pub batches_completed: u64,
    /// Handler invocations that returned `Ok`.
    pub items_handled: u64,
    /// Handler invocations that returned `Err` or panicked.
    pub handler_failures: u64,
    /// Successful `WorkSource::retire` calls.
    pub items_retired: u64,
    /// Failed `WorkSource::retire` calls.
    pub retire_failures: u64,
}
