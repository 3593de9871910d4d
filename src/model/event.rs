//! Events emitted on the engine's event bus.
//!
//! Events are a tagged enum with an optional data payload; listeners are
//! explicit subscriptions with unsubscribe guards rather than inherited
//! observer types.

use crate::model::conflict::ConflictRecord;
use crate::model::operation::Operation;
use crate::model::result::{SyncProgress, SyncResult};

/// Everything observable about the engine from the outside.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    SyncStarted,
    SyncCompleted(SyncResult),
    SyncFailed { code: String, message: String },
    SyncCancelled,
    /// Strategy-boundary progress, for driving a progress indicator.
    SyncProgress(SyncProgress),
    NetworkOnline,
    NetworkOffline,
    ConflictDetected(ConflictRecord),
    ConflictResolved(ConflictRecord),
    /// A new operation was persisted to the queue.
    OperationAdded(Operation),
}

impl SyncEvent {
    /// Stable event name, matching what the host UI switches on.
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::SyncStarted => "sync_started",
            SyncEvent::SyncCompleted(_) => "sync_completed",
            SyncEvent::SyncFailed { .. } => "sync_failed",
            SyncEvent::SyncCancelled => "sync_cancelled",
            SyncEvent::SyncProgress(_) => "sync_progress",
            SyncEvent::NetworkOnline => "network_online",
            SyncEvent::NetworkOffline => "network_offline",
            SyncEvent::ConflictDetected(_) => "conflict_detected",
            SyncEvent::ConflictResolved(_) => "conflict_resolved",
            SyncEvent::OperationAdded(_) => "operation_added",
        }
    }
}
