//! Push strategy for offline-created transactions.
//!
//! Drains ready transaction-entity operations through the queue's handler
//! step, oldest first within priority. Pushed rows are removed outright
//! (audit retention applies only to loop-processed rows); conflict rows run
//! the transaction idempotency rule and, when the server already processed
//! the request, count as synced. Transient failures stay pending with their
//! scheduled retry.

use std::sync::Arc;

use async_trait::async_trait;

use crate::conflict::{ConflictResolver, TransactionResolution};
use crate::engine::events::EventBus;
use crate::model::event::SyncEvent;
use crate::model::operation::{OperationStatus, OperationUpdate};
use crate::model::result::SyncErrorEntry;
use crate::queue::{ProcessOutcome, SyncQueue};
use crate::store::TransactionCache;
use crate::strategy::{StrategyResult, SyncStrategy};
use crate::util::cancel::CancelToken;

const DRAIN_BATCH: usize = 50;

/// Upper bound on drain rounds per run. Distinct-key conflict rows go back
/// to pending and would otherwise let a pathological backlog spin forever.
const MAX_ROUNDS: usize = 16;

pub struct TransactionSync {
    queue: Arc<SyncQueue>,
    resolver: Arc<ConflictResolver>,
    cache: Arc<TransactionCache>,
    events: Arc<EventBus>,
}

impl TransactionSync {
    pub fn new(
        queue: Arc<SyncQueue>,
        resolver: Arc<ConflictResolver>,
        cache: Arc<TransactionCache>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            queue,
            resolver,
            cache,
            events,
        }
    }
}

#[async_trait]
impl SyncStrategy for TransactionSync {
    fn name(&self) -> &'static str {
        "transactions"
    }

    fn priority(&self) -> u8 {
        1
    }

    async fn execute(&self, cancel: &CancelToken) -> StrategyResult {
        let mut result = StrategyResult::default();

        for round in 0.. {
            if cancel.is_cancelled() {
                break;
            }
            if round >= MAX_ROUNDS {
                tracing::warn!("transaction push stopped after {MAX_ROUNDS} rounds");
                break;
            }

            let batch = match self
                .queue
                .process_scoped(Some("transaction"), DRAIN_BATCH, cancel)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!("transaction push round failed: {e:?}");
                    result.errors.push(SyncErrorEntry::strategy(
                        self.name(),
                        "QUEUE_ERROR",
                        e.to_string(),
                    ));
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }

            for processed in &batch {
                let operation = &processed.operation;

                match &processed.outcome {
                    ProcessOutcome::Completed => {
                        if let Err(e) = self.queue.remove(&operation.id).await {
                            tracing::warn!(operation = %operation, "failed to remove pushed row: {e:?}");
                        }
                        self.cache.mark_synced(&operation.entity_id);
                        result.synced_count += 1;
                    }

                    ProcessOutcome::Conflict { server_version, .. } => {
                        let resolution = self.resolver.resolve_transaction(
                            &operation.entity_id,
                            &operation.payload,
                            server_version.as_ref(),
                        );

                        match resolution {
                            TransactionResolution::ServerProcessed(record) => {
                                // The server already holds this request; the
                                // push is effectively complete.
                                self.events.emit(&SyncEvent::ConflictDetected(record.clone()));
                                self.events.emit(&SyncEvent::ConflictResolved(record.clone()));
                                if let Err(e) = self.queue.remove(&operation.id).await {
                                    tracing::warn!(
                                        operation = %operation,
                                        "failed to remove conflicted row: {e:?}"
                                    );
                                }
                                self.cache.mark_synced(&operation.entity_id);
                                result.synced_count += 1;
                                result.conflicts.push(record);
                            }
                            TransactionResolution::KeepLocalAndPush
                            | TransactionResolution::DistinctTransactions => {
                                // A different transaction on the server side:
                                // the local one goes back to pending and is
                                // pushed again on the next run.
                                let reset = OperationUpdate {
                                    status: Some(OperationStatus::Pending),
                                    error: Some(None),
                                    error_code: Some(None),
                                    ..Default::default()
                                };
                                if let Err(e) = self.queue.update(&operation.id, reset).await {
                                    tracing::warn!(
                                        operation = %operation,
                                        "failed to requeue distinct transaction: {e:?}"
                                    );
                                }
                            }
                        }
                    }

                    ProcessOutcome::Retrying { .. } => {
                        self.cache.note_failure(
                            &operation.entity_id,
                            operation.error.clone().unwrap_or_default(),
                        );
                    }

                    ProcessOutcome::Failed { code } => {
                        self.cache.note_failure(
                            &operation.entity_id,
                            operation.error.clone().unwrap_or_default(),
                        );
                        result.errors.push(SyncErrorEntry::strategy(
                            self.name(),
                            code.clone(),
                            operation
                                .error
                                .clone()
                                .unwrap_or_else(|| "operation failed".to_string()),
                        ));
                    }
                }
            }

            // Retrying rows stay pending but are no longer ready, so a
            // shorter-than-batch round means the ready set is drained.
            if batch.len() < DRAIN_BATCH {
                break;
            }
        }

        tracing::debug!(
            synced = result.synced_count,
            errors = result.errors.len(),
            conflicts = result.conflicts.len(),
            "transaction push finished"
        );

        result
    }

    async fn has_pending_changes(&self) -> bool {
        self.pending_count().await > 0
    }

    async fn pending_count(&self) -> u64 {
        self.queue
            .count_pending_for_entity("transaction")
            .await
            .unwrap_or(0)
    }
}
