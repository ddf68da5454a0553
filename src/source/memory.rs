//! In-process work source with lease semantics.
//!
//! Retrieved items are leased, not removed: they stay invisible for the
//! visibility timeout and go back on the queue unless retired first. This
//! gives the same redelivery behaviour as a real queue, which makes it
//! useful for tests and for embedding the digester in a single process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::Result;
use crate::item::{WorkItem, WorkSource};

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BATCH_SIZE: usize = 10;

/// An item handed out by [`MemorySource`].
#[derive(Debug, Clone)]
pub struct MemoryItem<T> {
    id: String,
    body: T,
    metadata: HashMap<String, String>,
    deliveries: u32,
}

impl<T> MemoryItem<T> {
    pub fn body(&self) -> &T {
        &self.body
    }

    /// How many times this item has been handed out, this time included.
    pub fn deliveries(&self) -> u32 {
        self.deliveries
    }
}

impl<T: Clone + Send + Sync + 'static> WorkItem for MemoryItem<T> {
    type Content = T;

    fn id(&self) -> &str {
        &self.id
    }

    fn content(&self) -> Result<T> {
        Ok(self.body.clone())
    }

    fn metadata(&self) -> Option<&HashMap<String, String>> {
        Some(&self.metadata)
    }
}

#[derive(Debug)]
struct Entry<T> {
    id: String,
    body: T,
    metadata: HashMap<String, String>,
    deliveries: u32,
}

#[derive(Debug)]
struct Inner<T> {
    ready: VecDeque<Entry<T>>,
    leased: HashMap<String, (Entry<T>, Instant)>,
    retired: u64,
}

/// A FIFO queue living in memory.
#[derive(Debug)]
pub struct MemorySource<T> {
    inner: Mutex<Inner<T>>,
    visibility_timeout: Duration,
    batch_size: usize,
}

impl<T: Clone + Send + Sync + 'static> Default for MemorySource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> MemorySource<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                leased: HashMap::new(),
                retired: 0,
            }),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// How long a retrieved item stays hidden before it is redelivered.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Maximum items per `retrieve`. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a body under a fresh id. Returns the id.
    pub fn push(&self, body: T) -> String {
        let id = Uuid::new_v4().to_string();
        self.push_with(id.clone(), body, HashMap::new());
        id
    }

    /// Enqueue a body with an explicit id and metadata.
    pub fn push_with(&self, id: impl Into<String>, body: T, metadata: HashMap<String, String>) {
        self.lock().ready.push_back(Entry {
            id: id.into(),
            body,
            metadata,
            deliveries: 0,
        });
    }

    /// Items waiting to be retrieved, expired leases included.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.lock();
        inner.ready.len() + inner.leased.values().filter(|(_, d)| *d <= now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items currently leased and not yet expired.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.lock().leased.values().filter(|(_, d)| *d > now).count()
    }

    /// Number of distinct items retired so far.
    pub fn retired_count(&self) -> u64 {
        self.lock().retired
    }
}

impl<T> Inner<T> {
    /// Put expired leases back at the front of the queue, oldest first.
    fn requeue_expired(&mut self, now: Instant) {
        let mut expired: Vec<_> = self
            .leased
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(id, (_, deadline))| (id.clone(), *deadline))
            .collect();
        expired.sort_by_key(|(_, deadline)| *deadline);

        for (id, _) in expired.into_iter().rev() {
            if let Some((entry, _)) = self.leased.remove(&id) {
                self.ready.push_front(entry);
            }
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> WorkSource for MemorySource<T> {
    type Item = MemoryItem<T>;

    async fn retrieve(&self) -> Result<Vec<MemoryItem<T>>> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.requeue_expired(now);

        let deadline = now + self.visibility_timeout;
        let take = inner.ready.len().min(self.batch_size);
        let mut batch = Vec::with_capacity(take);
        for mut entry in inner.ready.drain(..take).collect::<Vec<_>>() {
            entry.deliveries += 1;
            batch.push(MemoryItem {
                id: entry.id.clone(),
                body: entry.body.clone(),
                metadata: entry.metadata.clone(),
                deliveries: entry.deliveries,
            });
            inner.leased.insert(entry.id.clone(), (entry, deadline));
        }
        Ok(batch)
    }

    async fn retire(&self, item: &MemoryItem<T>) -> Result<()> {
        let mut inner = self.lock();
        let removed = inner.leased.remove(&item.id).is_some() || {
            let before = inner.ready.len();
            inner.ready.retain(|e| e.id != item.id);
            inner.ready.len() != before
        };
        if removed {
            inner.retired += 1;
        }
        Ok(())
    }
}
