//! Persistent queue configuration.

use std::time::Duration;

/// How many ready operations one dequeue round takes.
const DEFAULT_BATCH_SIZE: usize = 20;

/// Wait between processing iterations when the queue is empty.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How often the background GC pass runs.
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Completed rows older than this are garbage-collected.
const DEFAULT_COMPLETED_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings for the queue's processing loop and garbage collection.
#[derive(Debug, Clone)]
pub struct SyncQueueConfig {
    /// Maximum ready operations dequeued per processing round.
    pub batch_size: usize,
    /// Sleep between rounds when no operation is ready.
    pub poll_interval: Duration,
    /// Interval of the background completed-row GC task.
    pub cleanup_interval: Duration,
    /// Retention for completed rows before GC removes them.
    pub completed_max_age: Duration,
}

impl Default for SyncQueueConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            completed_max_age: DEFAULT_COMPLETED_MAX_AGE,
        }
    }
}
