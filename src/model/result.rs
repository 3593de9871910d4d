//! Sync run results, progress snapshots, and queue statistics.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::conflict::ConflictRecord;

/// Per-entity synced counters aggregated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncedCounts {
    pub transactions: u32,
    pub wallets: u32,
    pub products: u32,
    pub stands: u32,
}

impl SyncedCounts {
    pub fn total(&self) -> u32 {
        self.transactions + self.wallets + self.products + self.stands
    }
}

/// One captured error from a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncErrorEntry {
    /// Strategy that produced the error, if any (engine-level errors have none).
    pub strategy: Option<String>,
    pub code: String,
    pub message: String,
}

impl SyncErrorEntry {
    pub fn engine(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            strategy: None,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn strategy(
        strategy: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            strategy: Some(strategy.into()),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Aggregated outcome of one sync run.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub success: bool,
    /// True when the run was short-circuited by the minimum-interval throttle;
    /// such results are success-shaped with zero counts and zero duration.
    pub throttled: bool,
    pub synced: SyncedCounts,
    pub duration: Duration,
    pub errors: Vec<SyncErrorEntry>,
    pub conflicts: Vec<ConflictRecord>,
    pub finished_at: DateTime<Utc>,
}

impl SyncResult {
    /// The cached "no work" result returned inside the throttle window.
    pub fn throttled() -> Self {
        Self {
            success: true,
            throttled: true,
            synced: SyncedCounts::default(),
            duration: Duration::ZERO,
            errors: Vec::new(),
            conflicts: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// A failed run carrying a single engine-level error.
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            throttled: false,
            synced: SyncedCounts::default(),
            duration: Duration::ZERO,
            errors: vec![SyncErrorEntry::engine(code, message)],
            conflicts: Vec::new(),
            finished_at: Utc::now(),
        }
    }
}

/// Phase of a strategy within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Progress snapshot emitted at strategy boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub current_strategy: String,
    pub current_index: usize,
    pub total_strategies: usize,
    /// 0-100, completed strategies over total.
    pub percent: u8,
    pub status: ProgressStatus,
}

/// Aggregated queue counters for UI badges and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub total: u64,
    /// Row counts keyed by status name.
    pub by_status: HashMap<String, u64>,
    /// Pending row counts keyed by priority name.
    pub pending_by_priority: HashMap<String, u64>,
    /// Row counts keyed by operation type name.
    pub by_type: HashMap<String, u64>,
    pub oldest_pending_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl QueueStats {
    pub fn pending_count(&self) -> u64 {
        self.by_status.get("pending").copied().unwrap_or(0)
    }

    pub fn in_progress_count(&self) -> u64 {
        self.by_status.get("in_progress").copied().unwrap_or(0)
    }

    pub fn failed_count(&self) -> u64 {
        self.by_status.get("failed").copied().unwrap_or(0)
    }
}
