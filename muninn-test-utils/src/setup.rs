//! Database and configuration setup for tests.

use std::time::Duration;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};

use muninn::config::SyncConfig;
use muninn::queue::config::SyncQueueConfig;

use crate::error::TestError;

/// Fresh in-memory SQLite database with the engine schema, for tests that
/// exercise the queue without a full engine.
pub async fn test_db() -> Result<DatabaseConnection, TestError> {
    let db = Database::connect("sqlite::memory:").await?;

    let schema = Schema::new(DbBackend::Sqlite);
    let stmts = vec![
        schema.create_table_from_entity(entity::prelude::SyncOperation),
        schema.create_table_from_entity(entity::prelude::SyncKv),
    ];

    for stmt in stmts {
        db.execute(&stmt).await?;
    }

    Ok(db)
}

/// Engine configuration with test-friendly timing.
///
/// Auto-sync triggers are off so tests drive the engine explicitly; flip the
/// flags on to exercise the reactive paths. The throttle window stays at its
/// production width because throttle tests depend on it.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        database_url: "sqlite::memory:".to_string(),
        min_sync_interval: Duration::from_secs(30),
        sync_timeout: Duration::from_secs(5),
        max_retry_attempts: 1,
        retry_delay: Duration::from_millis(50),
        auto_sync_on_online: false,
        auto_sync_on_foreground: false,
        online_debounce: Duration::from_millis(200),
        history_limit: 10,
        conflict_log_limit: 100,
        product_ttl: Duration::from_secs(5 * 60),
        stand_ttl: Duration::from_secs(10 * 60),
        queue: SyncQueueConfig {
            batch_size: 20,
            // Long poll keeps the background loop out of the way so tests
            // drive processing through explicit sync runs.
            poll_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
            completed_max_age: Duration::from_secs(60 * 60),
        },
    }
}
