//! The collaborator seams: what a unit of work looks like, where it comes
//! from, and what consumes it.
//!
//! The engine never interprets item content. It hands each item to the
//! [`Handler`] and, when the handler succeeds, tells the [`WorkSource`] to
//! retire it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, Result};

/// One discrete unit of work, owned by its source.
pub trait WorkItem: Send + Sync + 'static {
    /// Payload type handed to handlers.
    type Content;

    /// Identifier used for logging and correlation.
    fn id(&self) -> &str;

    /// Access the payload. May fail, e.g. when it has to be decoded.
    fn content(&self) -> Result<Self::Content>;

    /// Optional string metadata attached by the source.
    fn metadata(&self) -> Option<&HashMap<String, String>> {
        None
    }
}

/// Provider of work items.
///
/// `retrieve` is a best-effort, non-blocking fetch: an empty vector means
/// "nothing right now" and is not an error. `retire` acknowledges that an
/// item was fully processed and must be idempotent.
#[async_trait]
pub trait WorkSource: Send + Sync + 'static {
    type Item: WorkItem;

    async fn retrieve(&self) -> Result<Vec<Self::Item>>;

    async fn retire(&self, item: &Self::Item) -> Result<()>;
}

#[async_trait]
impl<S: WorkSource> WorkSource for Arc<S> {
    type Item = S::Item;

    async fn retrieve(&self) -> Result<Vec<Self::Item>> {
        (**self).retrieve().await
    }

    async fn retire(&self, item: &Self::Item) -> Result<()> {
        (**self).retire(item).await
    }
}

/// Caller-supplied processing for a single item.
///
/// Invoked once per dispatched item by exactly one worker. An `Err` leaves
/// the item un-retired; the engine does not retry.
#[async_trait]
pub trait Handler<I>: Send + Sync + 'static {
    async fn handle(&self, item: &I) -> std::result::Result<(), BoxError>;
}

#[async_trait]
impl<I, F, Fut> Handler<I> for F
where
    I: Sync + 'static,
    F: Fn(&I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send,
{
    async fn handle(&self, item: &I) -> std::result::Result<(), BoxError> {
        (self)(item).await
    }
}
