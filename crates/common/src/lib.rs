//! Shared error types and small utilities used across all `relaychat` crates.

pub mod error;
pub mod notifier;
pub mod time;

pub use error::{Error, FromMessage, RelaychatError, Result};
pub use notifier::Notifier;
pub use time::now_ms;
