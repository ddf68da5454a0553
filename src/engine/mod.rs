//! Dispatch engine: polling loop, worker pool, and the lifecycle that
//! ties them together.

pub mod digester;
mod orchestrator;
mod pool;
pub mod signal;
mod stats;

pub use digester::{Digester, State};
pub use signal::StopSignal;
pub use stats::StatsSnapshot;
