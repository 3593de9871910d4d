//! Engine configuration.
//!
//! The engine is embedded in a mobile client, so configuration is
//! programmatic: construct a [`SyncConfig`], adjust fields, and hand it to
//! [`SyncEngine::initialize`](crate::engine::SyncEngine::initialize). The
//! defaults match production behavior; tests shrink the intervals.

use std::time::Duration;

use crate::error::config::ConfigError;
use crate::queue::config::SyncQueueConfig;

/// Top-level engine configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// SQLite connection string for the persistent queue,
    /// e.g. `sqlite:///data/user/0/app/muninn.db?mode=rwc`.
    pub database_url: String,

    /// Minimum interval between two sync runs. A `sync()` call inside this
    /// window returns a throttled success-shaped result without doing work.
    pub min_sync_interval: Duration,

    /// Timeout for a whole sync run (overridable per call).
    pub sync_timeout: Duration,

    /// How many times a failed whole-sync run is retried by the engine.
    /// Distinct from per-operation retries, which the queue owns.
    pub max_retry_attempts: u32,

    /// Spacing between whole-sync retry attempts.
    pub retry_delay: Duration,

    /// Trigger a sync shortly after the device comes back online.
    pub auto_sync_on_online: bool,

    /// Trigger a sync when the app returns to the foreground (still subject
    /// to `min_sync_interval`).
    pub auto_sync_on_foreground: bool,

    /// Debounce between the online signal and the auto-sync it triggers.
    pub online_debounce: Duration,

    /// How many `SyncResult`s to retain in memory.
    pub history_limit: usize,

    /// How many conflict resolutions to retain in the diagnostic log.
    pub conflict_log_limit: usize,

    /// Staleness threshold before the product catalog is re-fetched.
    pub product_ttl: Duration,

    /// Staleness threshold before the stand list is re-fetched.
    pub stand_ttl: Duration,

    /// Persistent queue settings.
    pub queue: SyncQueueConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_sync_interval: Duration::from_secs(30),
            sync_timeout: Duration::from_secs(60),
            max_retry_attempts: 3,
            retry_delay: Duration::from_secs(5),
            auto_sync_on_online: true,
            auto_sync_on_foreground: true,
            online_debounce: Duration::from_secs(1),
            history_limit: 10,
            conflict_log_limit: 100,
            product_ttl: Duration::from_secs(5 * 60),
            stand_ttl: Duration::from_secs(10 * 60),
            queue: SyncQueueConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Validates the configuration, returning the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::Empty("database_url"));
        }
        if self.sync_timeout.is_zero() {
            return Err(ConfigError::NonPositive("sync_timeout"));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::NonPositive("history_limit"));
        }
        if self.conflict_log_limit == 0 {
            return Err(ConfigError::NonPositive("conflict_log_limit"));
        }
        if self.queue.batch_size == 0 {
            return Err(ConfigError::NonPositive("queue.batch_size"));
        }
        if self.queue.poll_interval.is_zero() {
            return Err(ConfigError::NonPositive("queue.poll_interval"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Expect default configuration to validate
    #[test]
    fn default_config_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    /// Expect empty database url to be rejected
    #[test]
    fn rejects_empty_database_url() {
        let mut config = SyncConfig::default();
        config.database_url = String::new();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Empty("database_url"))
        ));
    }

    /// Expect zero sync timeout to be rejected
    #[test]
    fn rejects_zero_timeout() {
        let mut config = SyncConfig::default();
        config.sync_timeout = Duration::ZERO;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive("sync_timeout"))
        ));
    }

    /// Expect zero history limit to be rejected
    #[test]
    fn rejects_zero_history_limit() {
        let mut config = SyncConfig::default();
        config.history_limit = 0;

        assert!(config.validate().is_err());
    }
}
