//! Error types for digester.

use thiserror::Error;

/// A boxed error that can be sent across threads.
///
/// Handlers return this so any `std::error::Error` converts with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("digester is already running")]
    AlreadyRunning,

    #[error("digester has been stopped and cannot be restarted")]
    Stopped,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("work source error: {0}")]
    Source(String),

    #[error("content unavailable: {0}")]
    Content(String),

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
