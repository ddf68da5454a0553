//! Metric instrument factories for digester.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without one (no OTLP endpoint) every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("digester")
}

/// Counter: calls to `WorkSource::retrieve`.
pub fn polls() -> Counter<u64> {
    meter()
        .u64_counter("digester.polls")
        .with_description("Number of work source polls")
        .build()
}

/// Counter: failed polls.
pub fn retrieve_errors() -> Counter<u64> {
    meter()
        .u64_counter("digester.retrieve.errors")
        .with_description("Number of failed work source polls")
        .build()
}

/// Counter: batches discarded because no worker was left to take them.
/// Labels: `reason`.
pub fn batches_dropped() -> Counter<u64> {
    meter()
        .u64_counter("digester.batches.dropped")
        .with_description("Batches that could not be dispatched")
        .build()
}

/// Counter: items whose handler returned `Ok`.
pub fn items_handled() -> Counter<u64> {
    meter()
        .u64_counter("digester.items.handled")
        .with_description("Items handled successfully")
        .build()
}

/// Counter: items whose handler failed.
/// Labels: `reason` ("error" | "panic").
pub fn items_failed() -> Counter<u64> {
    meter()
        .u64_counter("digester.items.failed")
        .with_description("Items whose handler failed")
        .build()
}

/// Counter: items acknowledged at the source.
pub fn items_retired() -> Counter<u64> {
    meter()
        .u64_counter("digester.items.retired")
        .with_description("Items retired at the work source")
        .build()
}

/// Counter: handled items the source refused to retire.
pub fn retire_failures() -> Counter<u64> {
    meter()
        .u64_counter("digester.retire.failures")
        .with_description("Handled items that could not be retired")
        .build()
}

/// Histogram: handler duration in milliseconds.
pub fn handler_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("digester.handler.duration_ms")
        .with_description("Handler duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: queue-level operations (create, send, read, archive, delete).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("digester.queue.operations")
        .with_description("Number of queue operations")
        .build()
}
