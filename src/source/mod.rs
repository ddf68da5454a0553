//! Bundled [`WorkSource`](crate::item::WorkSource) implementations.

pub mod memory;
pub mod pgmq;

pub use memory::{MemoryItem, MemorySource};
pub use pgmq::{PgmqMessage, PgmqSource};
