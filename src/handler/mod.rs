//! Bundled [`Handler`](crate::item::Handler) implementations.

pub mod command;

pub use command::CommandHandler;
