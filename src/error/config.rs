//! Configuration error types.
//!
//! These errors surface during engine initialization when the supplied
//! [`SyncConfig`](crate::config::SyncConfig) contains values the engine
//! cannot operate with. They are always fatal: the engine refuses to start
//! rather than run with a broken schedule.

use thiserror::Error;

/// Configuration validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting is empty.
    #[error("configuration value {0} must not be empty")]
    Empty(&'static str),

    /// A duration or count setting is zero where the engine requires a
    /// positive value (e.g. `sync_timeout`, `history_limit`).
    #[error("configuration value {0} must be greater than zero")]
    NonPositive(&'static str),
}
