//! Integration tests for telemetry initialization and span helpers.

use digester::telemetry::work::{ItemOutcome, record_outcome, start_item_span};
use digester::telemetry::{TelemetryConfig, init_telemetry};

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process; another test
    // may have won the race, which is fine.
    let config = TelemetryConfig::new("digester-test").with_log_level("debug");
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn item_span_records_each_outcome() {
    for outcome in [
        ItemOutcome::Retired,
        ItemOutcome::Unretired,
        ItemOutcome::Failed,
    ] {
        let span = start_item_span(1, "item-42");
        record_outcome(&span, outcome);
    }
}

#[test]
fn outcome_labels_are_stable() {
    assert_eq!(ItemOutcome::Retired.as_str(), "retired");
    assert_eq!(ItemOutcome::Unretired.as_str(), "unretired");
    assert_eq!(ItemOutcome::Failed.as_str(), "failed");
}

#[test]
fn metric_instruments_are_noops_without_provider() {
    digester::telemetry::metrics::polls().add(1, &[]);
    digester::telemetry::metrics::handler_duration_ms().record(1.5, &[]);
}
