//! Error types for the muninn sync engine.
//!
//! A single unified [`Error`] aggregates the domain-specific error types and
//! external library errors, using `thiserror`'s `#[from]` attribute so the
//! `?` operator converts automatically. Engine-level failure kinds (network
//! unavailable, timeout, cancelled) are distinct variants because the engine
//! folds them into `SyncResult`s rather than propagating them.

pub mod config;

use thiserror::Error;

use crate::adapter::transport::TransportError;
use crate::error::config::ConfigError;
use crate::model::operation::OperationType;

/// Main error type for the sync engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (invalid engine settings).
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    /// Database error (query failures, connection issues, constraint violations).
    #[error(transparent)]
    DbErr(#[from] sea_orm::DbErr),
    /// Transport error (network, timeout, or other request failure).
    #[error(transparent)]
    TransportError(#[from] TransportError),
    /// Payload or metadata (de)serialization failure.
    #[error("failed to serialize operation data: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The engine was initialized twice without an intervening shutdown.
    ///
    /// Re-initialization is a programmer error: initialization ordering
    /// (store open, adapters subscribed, handlers registered) must happen
    /// exactly once per engine lifetime.
    #[error("sync engine is already initialized")]
    AlreadyInitialized,
    /// An engine method was called before `initialize` or after `shutdown`.
    #[error("sync engine is not initialized")]
    NotInitialized,
    /// The device is offline at call time.
    #[error("network is unavailable")]
    NetworkUnavailable,
    /// A whole-sync run exceeded its timeout.
    #[error("sync timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// The sync run was cancelled by the caller.
    #[error("sync was cancelled")]
    Cancelled,
    /// No handler is registered for an operation type.
    ///
    /// Unrecoverable; indicates a programming error in engine setup.
    #[error("no handler registered for operation type {}", .0.as_str())]
    NoHandler(OperationType),
    /// The referenced operation does not exist in the queue.
    #[error("operation {0} not found")]
    OperationNotFound(String),
    /// `retry` was requested on an operation that is not in the failed state.
    #[error("operation {0} is not in a failed state")]
    InvalidRetry(String),
    /// Internal error indicating a bug in muninn's code.
    #[error("internal sync engine error, this indicates a bug: {0:?}")]
    InternalError(String),
}
