//! Per-item span helpers.

use tracing::Span;

/// How a single item left the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Handled and acknowledged at the source.
    Retired,
    /// Handled, but the source refused the acknowledgment.
    Unretired,
    /// Handler returned an error or panicked.
    Failed,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Retired => "retired",
            ItemOutcome::Unretired => "unretired",
            ItemOutcome::Failed => "failed",
        }
    }
}

/// Start a span covering one handler invocation and its retirement.
///
/// `item.outcome` is declared empty and filled by [`record_outcome`].
pub fn start_item_span(worker: usize, item_id: &str) -> Span {
    tracing::info_span!(
        "item.digest",
        "worker" = worker,
        "item.id" = item_id,
        "item.outcome" = tracing::field::Empty,
    )
}

/// Record the outcome on the span and emit an event inside it.
pub fn record_outcome(span: &Span, outcome: ItemOutcome) {
    span.record("item.outcome", outcome.as_str());
    span.in_scope(|| {
        tracing::debug!(outcome = outcome.as_str(), "item finished");
    });
}
