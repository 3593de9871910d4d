//! Strategy composition and sequential execution.
//!
//! The manager runs strategies sorted by priority (push before pull),
//! aggregates their errors and conflicts into one [`SyncResult`], emits
//! progress events at strategy boundaries, and checks the cancellation token
//! between strategies. Cancellation is cooperative: the current strategy
//! finishes, subsequent ones are skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::engine::events::EventBus;
use crate::model::event::SyncEvent;
use crate::model::result::{ProgressStatus, SyncProgress, SyncResult, SyncedCounts};
use crate::strategy::SyncStrategy;
use crate::util::cancel::CancelToken;

pub struct SyncManager {
    strategies: Vec<Arc<dyn SyncStrategy>>,
    events: Arc<EventBus>,
}

impl SyncManager {
    /// Creates a manager; strategies are sorted by priority at construction.
    pub fn new(mut strategies: Vec<Arc<dyn SyncStrategy>>, events: Arc<EventBus>) -> Self {
        strategies.sort_by_key(|s| s.priority());
        Self { strategies, events }
    }

    pub fn strategies(&self) -> &[Arc<dyn SyncStrategy>] {
        &self.strategies
    }

    /// Runs every strategy in priority order.
    pub async fn sync_all(&self, cancel: &CancelToken) -> SyncResult {
        let started = Instant::now();
        let total = self.strategies.len();

        let mut synced = SyncedCounts::default();
        let mut errors = Vec::new();
        let mut conflicts = Vec::new();

        for (index, strategy) in self.strategies.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(
                    completed = index,
                    total,
                    "sync cancelled between strategies"
                );
                break;
            }

            self.emit_progress(strategy.name(), index, total, ProgressStatus::Running);

            let result = strategy.execute(cancel).await;
            let failed = !result.errors.is_empty();

            apply_counts(&mut synced, strategy.name(), result.synced_count);
            errors.extend(result.errors);
            conflicts.extend(result.conflicts);

            self.emit_progress(
                strategy.name(),
                index + 1,
                total,
                if failed {
                    ProgressStatus::Failed
                } else {
                    ProgressStatus::Completed
                },
            );
        }

        SyncResult {
            success: errors.is_empty(),
            throttled: false,
            synced,
            duration: started.elapsed(),
            errors,
            conflicts,
            finished_at: Utc::now(),
        }
    }

    /// Runs a single strategy by name; unknown names yield an empty success.
    pub async fn sync_named(&self, name: &str, cancel: &CancelToken) -> SyncResult {
        let started = Instant::now();

        let mut synced = SyncedCounts::default();
        let mut errors = Vec::new();
        let mut conflicts = Vec::new();

        if let Some(strategy) = self.strategies.iter().find(|s| s.name() == name) {
            let result = strategy.execute(cancel).await;
            apply_counts(&mut synced, strategy.name(), result.synced_count);
            errors.extend(result.errors);
            conflicts.extend(result.conflicts);
        } else {
            tracing::warn!(strategy = name, "unknown sync strategy requested");
        }

        SyncResult {
            success: errors.is_empty(),
            throttled: false,
            synced,
            duration: started.elapsed(),
            errors,
            conflicts,
            finished_at: Utc::now(),
        }
    }

    /// Pending push counts keyed by strategy name.
    pub async fn pending_counts(&self) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for strategy in &self.strategies {
            counts.insert(strategy.name().to_string(), strategy.pending_count().await);
        }
        counts
    }

    pub async fn has_pending_changes(&self) -> bool {
        for strategy in &self.strategies {
            if strategy.has_pending_changes().await {
                return true;
            }
        }
        false
    }

    fn emit_progress(&self, name: &str, position: usize, total: usize, status: ProgressStatus) {
        let percent = if total == 0 {
            100
        } else {
            ((position * 100) / total).min(100) as u8
        };

        self.events.emit(&SyncEvent::SyncProgress(SyncProgress {
            current_strategy: name.to_string(),
            current_index: position.min(total.saturating_sub(1)),
            total_strategies: total,
            percent,
            status,
        }));
    }
}

fn apply_counts(synced: &mut SyncedCounts, strategy: &str, count: u32) {
    match strategy {
        "transactions" => synced.transactions += count,
        "wallet" => synced.wallets += count,
        "products" => synced.products += count,
        "stands" => synced.stands += count,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::model::result::SyncErrorEntry;
    use crate::strategy::StrategyResult;

    /// Scripted strategy: fixed name/priority, counts its runs, optionally
    /// cancels the token mid-run or fails.
    struct FakeStrategy {
        name: &'static str,
        priority: u8,
        runs: Arc<AtomicUsize>,
        fail: bool,
        cancel_after: bool,
        order_log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl FakeStrategy {
        fn new(
            name: &'static str,
            priority: u8,
            order_log: Arc<Mutex<Vec<&'static str>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority,
                runs: Arc::new(AtomicUsize::new(0)),
                fail: false,
                cancel_after: false,
                order_log,
            })
        }
    }

    #[async_trait]
    impl SyncStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        async fn execute(&self, cancel: &CancelToken) -> StrategyResult {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.order_log.lock().unwrap().push(self.name);

            if self.cancel_after {
                cancel.cancel();
            }

            let mut result = StrategyResult {
                synced_count: 1,
                ..Default::default()
            };
            if self.fail {
                result.errors.push(SyncErrorEntry::strategy(
                    self.name,
                    "FETCH_FAILED",
                    "scripted failure",
                ));
            }
            result
        }

        async fn has_pending_changes(&self) -> bool {
            false
        }

        async fn pending_count(&self) -> u64 {
            0
        }
    }

    /// Expect strategies to run in ascending priority order
    #[tokio::test]
    async fn runs_in_priority_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(EventBus::new());

        let manager = SyncManager::new(
            vec![
                FakeStrategy::new("stands", 4, Arc::clone(&order)),
                FakeStrategy::new("transactions", 1, Arc::clone(&order)),
                FakeStrategy::new("products", 3, Arc::clone(&order)),
                FakeStrategy::new("wallet", 2, Arc::clone(&order)),
            ],
            events,
        );

        let result = manager.sync_all(&CancelToken::new()).await;

        assert!(result.success);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["transactions", "wallet", "products", "stands"]
        );
        assert_eq!(result.synced.transactions, 1);
        assert_eq!(result.synced.wallets, 1);
        assert_eq!(result.synced.products, 1);
        assert_eq!(result.synced.stands, 1);
    }

    /// Expect strategy errors to aggregate without aborting siblings
    #[tokio::test]
    async fn errors_aggregate_without_aborting() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(EventBus::new());

        let failing = Arc::new(FakeStrategy {
            name: "wallet",
            priority: 2,
            runs: Arc::new(AtomicUsize::new(0)),
            fail: true,
            cancel_after: false,
            order_log: Arc::clone(&order),
        });
        let trailing = FakeStrategy::new("products", 3, Arc::clone(&order));

        let manager = SyncManager::new(
            vec![
                failing as Arc<dyn SyncStrategy>,
                Arc::clone(&trailing) as Arc<dyn SyncStrategy>,
            ],
            events,
        );
        let result = manager.sync_all(&CancelToken::new()).await;

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(trailing.runs.load(Ordering::SeqCst), 1);
    }

    /// Expect cancellation to stop before the next strategy
    #[tokio::test]
    async fn cancellation_stops_between_strategies() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(EventBus::new());

        let first = Arc::new(FakeStrategy {
            name: "transactions",
            priority: 1,
            runs: Arc::new(AtomicUsize::new(0)),
            fail: false,
            cancel_after: true,
            order_log: Arc::clone(&order),
        });
        let second = FakeStrategy::new("wallet", 2, Arc::clone(&order));

        let manager = SyncManager::new(
            vec![
                first as Arc<dyn SyncStrategy>,
                Arc::clone(&second) as Arc<dyn SyncStrategy>,
            ],
            events,
        );
        let result = manager.sync_all(&CancelToken::new()).await;

        // The first strategy's counts are kept; the second never ran.
        assert_eq!(result.synced.transactions, 1);
        assert_eq!(result.synced.wallets, 0);
        assert_eq!(second.runs.load(Ordering::SeqCst), 0);
    }

    /// Expect progress events at strategy boundaries with rising percent
    #[tokio::test]
    async fn progress_reaches_one_hundred_percent() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _subscription = events.subscribe(move |event| {
            if let SyncEvent::SyncProgress(progress) = event {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((progress.percent, progress.status));
            }
        });

        let manager = SyncManager::new(
            vec![
                FakeStrategy::new("transactions", 1, Arc::clone(&order)),
                FakeStrategy::new("wallet", 2, Arc::clone(&order)),
            ],
            Arc::clone(&events),
        );

        manager.sync_all(&CancelToken::new()).await;

        let snapshots = seen.lock().unwrap();
        assert_eq!(snapshots.len(), 4);
        assert_eq!(snapshots[0], (0, ProgressStatus::Running));
        assert_eq!(snapshots[1], (50, ProgressStatus::Completed));
        assert_eq!(snapshots[2], (50, ProgressStatus::Running));
        assert_eq!(snapshots[3], (100, ProgressStatus::Completed));
    }

    /// Expect sync_named to run exactly the requested strategy
    #[tokio::test]
    async fn sync_named_runs_single_strategy() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(EventBus::new());

        let transactions = FakeStrategy::new("transactions", 1, Arc::clone(&order));
        let wallet = FakeStrategy::new("wallet", 2, Arc::clone(&order));

        let manager = SyncManager::new(
            vec![
                Arc::clone(&transactions) as Arc<dyn SyncStrategy>,
                Arc::clone(&wallet) as Arc<dyn SyncStrategy>,
            ],
            events,
        );
        let result = manager.sync_named("wallet", &CancelToken::new()).await;

        assert!(result.success);
        assert_eq!(result.synced.wallets, 1);
        assert_eq!(transactions.runs.load(Ordering::SeqCst), 0);
        assert_eq!(wallet.runs.load(Ordering::SeqCst), 1);
    }
}
