//! Error type for test setup failures.

use thiserror::Error;

/// Aggregates everything a test harness call can fail with.
#[derive(Error, Debug)]
pub enum TestError {
    /// Engine error (initialization, queue, transport).
    #[error(transparent)]
    Engine(#[from] muninn::Error),
    /// Database error from direct store access in a test.
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
    /// Fixture serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
