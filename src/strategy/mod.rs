//! Per-entity sync pipelines.
//!
//! Each strategy syncs one entity class: transactions push local mutations,
//! wallet/product/stand pull authoritative state. The manager runs them
//! sorted by [`SyncStrategy::priority`], push before pull, so the pulls
//! observe the server's post-push state.

pub mod product;
pub mod stand;
pub mod transaction;
pub mod wallet;

use async_trait::async_trait;

use crate::model::conflict::ConflictRecord;
use crate::model::result::SyncErrorEntry;
use crate::util::cancel::CancelToken;

pub use product::ProductSync;
pub use stand::StandSync;
pub use transaction::TransactionSync;
pub use wallet::WalletSync;

/// Outcome of one strategy's run.
#[derive(Debug, Clone, Default)]
pub struct StrategyResult {
    pub synced_count: u32,
    pub errors: Vec<SyncErrorEntry>,
    pub conflicts: Vec<ConflictRecord>,
}

/// One stage of the sync pipeline.
#[async_trait]
pub trait SyncStrategy: Send + Sync {
    /// Stable strategy name; keys the per-entity counters.
    fn name(&self) -> &'static str;

    /// Execution order; lower runs first.
    fn priority(&self) -> u8;

    /// Runs the strategy. Strategy-level failures are folded into the
    /// result's errors, never propagated; the cancel token is honored at
    /// operation boundaries.
    async fn execute(&self, cancel: &CancelToken) -> StrategyResult;

    /// Whether local mutations are waiting to be pushed.
    async fn has_pending_changes(&self) -> bool;

    /// How many local mutations are waiting.
    async fn pending_count(&self) -> u64;
}
