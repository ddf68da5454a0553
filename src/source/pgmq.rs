//! pgmq-backed work source via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.archive, pgmq.delete. A read hides messages for the visibility
//! timeout, so anything the digester fails to retire comes back on its own.

use std::collections::HashMap;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;
use crate::item::{WorkItem, WorkSource};
use crate::telemetry::metrics;

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub vt: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
    id: String,
    metadata: HashMap<String, String>,
}

impl PgmqMessage {
    fn new(
        msg_id: i64,
        read_ct: i32,
        enqueued_at: chrono::DateTime<chrono::Utc>,
        vt: chrono::DateTime<chrono::Utc>,
        message: serde_json::Value,
    ) -> Self {
        let metadata = HashMap::from([
            ("read_ct".to_string(), read_ct.to_string()),
            ("enqueued_at".to_string(), enqueued_at.to_rfc3339()),
            ("vt".to_string(), vt.to_rfc3339()),
        ]);
        Self {
            msg_id,
            read_ct,
            enqueued_at,
            vt,
            message,
            id: msg_id.to_string(),
            metadata,
        }
    }
}

impl WorkItem for PgmqMessage {
    type Content = serde_json::Value;

    fn id(&self) -> &str {
        &self.id
    }

    fn content(&self) -> Result<serde_json::Value> {
        Ok(self.message.clone())
    }

    fn metadata(&self) -> Option<&HashMap<String, String>> {
        Some(&self.metadata)
    }
}

/// A single pgmq queue used as a [`WorkSource`].
#[derive(Debug, Clone)]
pub struct PgmqSource {
    pool: PgPool,
    queue: String,
    visibility_timeout: i32,
    batch_size: i32,
}

impl PgmqSource {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str, queue: impl Into<String>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::with_pool(pool, queue))
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: PgPool, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
            visibility_timeout: 30,
            batch_size: 10,
        }
    }

    /// Seconds a read message stays hidden from other readers.
    pub fn with_visibility_timeout(mut self, seconds: i32) -> Self {
        self.visibility_timeout = seconds;
        self
    }

    /// Maximum messages per read.
    pub fn with_batch_size(mut self, batch_size: i32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    fn record(&self, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue.clone()),
                KeyValue::new("operation", operation),
            ],
        );
    }

    /// Simple health check — run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the queue (idempotent).
    pub async fn create_queue(&self) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(&self.queue)
            .execute(&self.pool)
            .await?;
        self.record("create");
        Ok(())
    }

    /// Send a message. Returns the message ID.
    /// delay_seconds: 0 for immediate, >0 for delayed delivery.
    pub async fn send(&self, payload: &serde_json::Value, delay_seconds: i32) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(&self.queue)
            .bind(payload)
            .bind(delay_seconds)
            .fetch_one(&self.pool)
            .await?;
        self.record("send");
        Ok(row.0)
    }

    /// Read up to `batch_size` messages, hiding them for the visibility timeout.
    pub async fn read(&self) -> Result<Vec<PgmqMessage>> {
        let rows = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, vt, message FROM pgmq.read($1, $2, $3)")
        .bind(&self.queue)
        .bind(self.visibility_timeout)
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;

        self.record(if rows.is_empty() { "read_empty" } else { "read" });

        Ok(rows
            .into_iter()
            .map(|(msg_id, read_ct, enqueued_at, vt, message)| {
                PgmqMessage::new(msg_id, read_ct, enqueued_at, vt, message)
            })
            .collect())
    }

    /// Archive a message (moves to archive table, preserves for audit).
    pub async fn archive(&self, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(&self.queue)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        self.record("archive");
        Ok(())
    }

    /// Delete a message permanently.
    pub async fn delete(&self, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(&self.queue)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        self.record("delete");
        Ok(())
    }
}

#[async_trait]
impl WorkSource for PgmqSource {
    type Item = PgmqMessage;

    async fn retrieve(&self) -> Result<Vec<PgmqMessage>> {
        self.read().await
    }

    /// Archiving an already archived message is a no-op in pgmq.
    async fn retire(&self, item: &PgmqMessage) -> Result<()> {
        self.archive(item.msg_id).await
    }
}
