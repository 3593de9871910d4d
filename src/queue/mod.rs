//! Persistent, priority-ordered operation queue.
//!
//! Operations survive restarts in a SQLite table owned by this module. A
//! single cooperative processing loop dequeues ready rows in
//! `(priority, created_at)` order and dispatches each to the handler
//! registered for its type; handler outcomes either complete the row,
//! reschedule it with a backoff delay, or fail it. Batch processing is also
//! exposed directly for tests and for manual-trigger runs.
//!
//! Concurrency: processing is single-flight per queue instance. The loop and
//! any manual batch share one async mutex, so at most one operation executes
//! at a time; readers (`stats`, `list`, `get`) and `add` may run alongside.

pub mod config;
pub mod data;
pub mod handler;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::conflict::ConflictResolver;
use crate::engine::events::EventBus;
use crate::error::Error;
use crate::model::conflict::ConflictStrategy;
use crate::model::event::SyncEvent;
use crate::model::operation::{
    NewOperation, Operation, OperationStatus, OperationType, OperationUpdate,
};
use crate::model::result::QueueStats;
use crate::util::cancel::CancelToken;

use config::SyncQueueConfig;
use data::{KvRepository, OperationFilter, OperationRepository};
use handler::{HandlerOutcome, HandlerRegistry, OperationHandler};

/// Error code written when no handler is registered for a type.
pub const CODE_NO_HANDLER: &str = "NO_HANDLER";
/// Error code written when the retry budget is exhausted.
pub const CODE_MAX_RETRIES_EXCEEDED: &str = "MAX_RETRIES_EXCEEDED";
/// Error code written when the server reported a conflict.
pub const CODE_CONFLICT: &str = "CONFLICT";

/// How one processed operation ended up.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Completed,
    /// The server reported a conflict; the row is failed with code
    /// `CONFLICT` and the entity's strategy name, and the domain resolver
    /// handles the real merge elsewhere.
    Conflict {
        strategy: ConflictStrategy,
        server_version: Option<Value>,
    },
    /// Transient failure; the row went back to pending with a scheduled
    /// retry.
    Retrying { delay: Duration },
    Failed { code: String },
}

/// One operation's trip through the processing step.
#[derive(Debug, Clone)]
pub struct ProcessedOperation {
    /// The row as stored after the step.
    pub operation: Operation,
    pub outcome: ProcessOutcome,
}

/// The persistent queue facade.
pub struct SyncQueue {
    db: DatabaseConnection,
    config: SyncQueueConfig,
    registry: HandlerRegistry,
    resolver: Arc<ConflictResolver>,
    events: Arc<EventBus>,
    process_lock: Mutex<()>,
    loop_handle: RwLock<Option<JoinHandle<()>>>,
    cleanup_handle: RwLock<Option<JoinHandle<()>>>,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    /// Cancelled on stop so the loop's batch ends after the current
    /// operation rather than draining the whole round.
    loop_cancel: CancelToken,
}

impl SyncQueue {
    pub fn new(
        db: DatabaseConnection,
        config: SyncQueueConfig,
        resolver: Arc<ConflictResolver>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            config,
            registry: HandlerRegistry::new(),
            resolver,
            events,
            process_lock: Mutex::new(()),
            loop_handle: RwLock::new(None),
            cleanup_handle: RwLock::new(None),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            loop_cancel: CancelToken::new(),
        }
    }

    pub fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Registers the handler executing one operation type.
    pub fn register_handler(&self, op_type: OperationType, handler: OperationHandler) {
        self.registry.register_handler(op_type, handler);
    }

    /// Registers a retry policy for one operation type.
    pub fn register_retry_policy(&self, op_type: OperationType, policy: crate::retry::RetryPolicy) {
        self.registry.register_policy(op_type, policy);
    }

    /// Registers the transport push handler for every operation type.
    pub fn register_default_handlers(&self, transport: Arc<dyn crate::adapter::Transport>) {
        let push = handler::transport_push_handler(transport);
        for op_type in OperationType::ALL {
            self.registry.register_handler(op_type, Arc::clone(&push));
        }
    }

    /// Persists a new operation, filling type-derived defaults.
    ///
    /// Inserting a second operation with the same idempotency key is a
    /// no-op: the stored row is returned unchanged.
    pub async fn add(&self, input: NewOperation) -> Result<Operation, Error> {
        let repo = OperationRepository::new(&self.db);
        let operation = input.into_operation(Utc::now());

        if let Some(existing) = repo
            .find_by_idempotency_key(&operation.idempotency_key)
            .await?
        {
            tracing::debug!(
                idempotency_key = %operation.idempotency_key,
                existing = %existing.id,
                "duplicate idempotency key, returning stored operation"
            );
            return Ok(existing);
        }

        let inserted = repo.insert(&operation).await?;
        tracing::debug!(operation = %inserted, "operation added to sync queue");
        self.events.emit(&SyncEvent::OperationAdded(inserted.clone()));

        Ok(inserted)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Operation>, Error> {
        OperationRepository::new(&self.db).get(id).await
    }

    pub async fn list(&self, filter: OperationFilter) -> Result<Vec<Operation>, Error> {
        OperationRepository::new(&self.db).list(filter).await
    }

    /// Ready operations in dequeue order; see
    /// [`OperationRepository::pending_ready`].
    pub async fn pending_ready(&self, limit: Option<u64>) -> Result<Vec<Operation>, Error> {
        OperationRepository::new(&self.db)
            .pending_ready(Utc::now(), None, limit)
            .await
    }

    pub async fn update(
        &self,
        id: &str,
        update: OperationUpdate,
    ) -> Result<Option<Operation>, Error> {
        OperationRepository::new(&self.db).update(id, update).await
    }

    pub async fn remove(&self, id: &str) -> Result<bool, Error> {
        OperationRepository::new(&self.db).delete(id).await
    }

    pub async fn clear_all(&self) -> Result<u64, Error> {
        OperationRepository::new(&self.db).clear().await
    }

    /// Garbage-collects completed rows older than `max_age`.
    pub async fn cleanup_completed(&self, max_age: Duration) -> Result<u64, Error> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::zero());
        OperationRepository::new(&self.db).cleanup_completed(cutoff).await
    }

    /// Returns rows stranded in `in_progress` to pending.
    ///
    /// Called when the processing loop starts and by the engine after an
    /// aborted (timed-out) run, so a dropped handler future never leaves a
    /// row stuck mid-flight.
    pub async fn requeue_in_progress(&self) -> Result<u64, Error> {
        OperationRepository::new(&self.db).requeue_in_progress().await
    }

    /// Resets one failed operation back to pending for another attempt.
    ///
    /// Only valid on failed rows; clears the retry bookkeeping.
    pub async fn retry(&self, id: &str) -> Result<Operation, Error> {
        OperationRepository::new(&self.db).retry(id).await
    }

    /// Resets every failed operation back to pending.
    pub async fn retry_all_failed(&self) -> Result<u64, Error> {
        OperationRepository::new(&self.db).retry_all_failed().await
    }

    pub async fn stats(&self) -> Result<QueueStats, Error> {
        OperationRepository::new(&self.db).stats().await
    }

    pub async fn count_pending_for_entity(&self, entity_type: &str) -> Result<u64, Error> {
        OperationRepository::new(&self.db)
            .count_pending_for_entity(entity_type)
            .await
    }

    /// The stable device id from the `@sync_queue_device_id` slot.
    pub async fn device_id(&self) -> Result<String, Error> {
        KvRepository::new(&self.db).device_id().await
    }

    /// Performs one dequeue round over every ready operation type.
    pub async fn process_batch(&self, limit: usize) -> Result<Vec<ProcessedOperation>, Error> {
        self.process_scoped(None, limit, &CancelToken::new()).await
    }

    /// Performs one dequeue round, optionally scoped to an entity type and
    /// gated by a cancellation token checked between operations.
    pub async fn process_scoped(
        &self,
        entity_type: Option<&str>,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<ProcessedOperation>, Error> {
        // Single-flight: the loop and manual batches never interleave.
        let _guard = self.process_lock.lock().await;

        let repo = OperationRepository::new(&self.db);
        let ready = repo
            .pending_ready(Utc::now(), entity_type, Some(limit as u64))
            .await?;

        let mut results = Vec::with_capacity(ready.len());
        for operation in ready {
            if cancel.is_cancelled() {
                tracing::debug!("batch processing stopped by cancellation");
                break;
            }

            let processed = self.process_one(&repo, operation, cancel).await?;
            results.push(processed);
        }

        Ok(results)
    }

    /// Runs one operation through its handler and records the outcome.
    async fn process_one(
        &self,
        repo: &OperationRepository<'_>,
        operation: Operation,
        cancel: &CancelToken,
    ) -> Result<ProcessedOperation, Error> {
        repo.update(&operation.id, OperationUpdate::status(OperationStatus::InProgress))
            .await?;

        let Some(handler) = self.registry.handler_for(operation.op_type) else {
            tracing::error!(operation = %operation, "no handler registered");
            let updated = repo
                .update(
                    &operation.id,
                    OperationUpdate {
                        status: Some(OperationStatus::Failed),
                        error: Some(Some(format!(
                            "no handler registered for {}",
                            operation.op_type
                        ))),
                        error_code: Some(Some(CODE_NO_HANDLER.to_string())),
                        ..Default::default()
                    },
                )
                .await?
                .ok_or_else(|| Error::OperationNotFound(operation.id.clone()))?;

            return Ok(ProcessedOperation {
                operation: updated,
                outcome: ProcessOutcome::Failed {
                    code: CODE_NO_HANDLER.to_string(),
                },
            });
        };

        match handler(operation.clone(), cancel.clone()).await {
            Ok(HandlerOutcome::Success) => {
                let updated = repo
                    .update(
                        &operation.id,
                        OperationUpdate {
                            status: Some(OperationStatus::Completed),
                            error: Some(None),
                            error_code: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?
                    .ok_or_else(|| Error::OperationNotFound(operation.id.clone()))?;

                tracing::debug!(operation = %updated, "operation completed");
                Ok(ProcessedOperation {
                    operation: updated,
                    outcome: ProcessOutcome::Completed,
                })
            }

            Ok(HandlerOutcome::Conflict { server_version }) => {
                let strategy = self.resolver.strategy_for(&operation.entity_type);
                let updated = repo
                    .update(
                        &operation.id,
                        OperationUpdate {
                            status: Some(OperationStatus::Failed),
                            error: Some(Some(strategy.as_str().to_string())),
                            error_code: Some(Some(CODE_CONFLICT.to_string())),
                            ..Default::default()
                        },
                    )
                    .await?
                    .ok_or_else(|| Error::OperationNotFound(operation.id.clone()))?;

                tracing::debug!(
                    operation = %updated,
                    strategy = strategy.as_str(),
                    "operation hit a server conflict"
                );
                Ok(ProcessedOperation {
                    operation: updated,
                    outcome: ProcessOutcome::Conflict {
                        strategy,
                        server_version,
                    },
                })
            }

            Err(failure) => {
                let policy = self
                    .registry
                    .policy_for(operation.op_type, operation.priority);
                let decision = policy.evaluate(&failure, operation.retry_count as u32);
                let within_budget = operation.retry_count < operation.max_retries;

                if decision.retry && within_budget {
                    let delay = decision.delay.unwrap_or(Duration::ZERO);
                    let now = Utc::now();
                    let next_retry_at = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::zero());

                    let updated = repo
                        .update(
                            &operation.id,
                            OperationUpdate {
                                status: Some(OperationStatus::Pending),
                                retry_count: Some(operation.retry_count + 1),
                                last_retry_at: Some(Some(now)),
                                next_retry_at: Some(Some(next_retry_at)),
                                error: Some(Some(failure.message.clone())),
                                error_code: Some(Some(failure.code().to_string())),
                            },
                        )
                        .await?
                        .ok_or_else(|| Error::OperationNotFound(operation.id.clone()))?;

                    tracing::debug!(
                        operation = %updated,
                        retry_count = updated.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "operation scheduled for retry"
                    );
                    Ok(ProcessedOperation {
                        operation: updated,
                        outcome: ProcessOutcome::Retrying { delay },
                    })
                } else {
                    let exhausted =
                        !within_budget || decision.reason == crate::retry::REASON_RETRY_LIMIT;
                    let code = if exhausted {
                        CODE_MAX_RETRIES_EXCEEDED.to_string()
                    } else {
                        failure.code().to_string()
                    };

                    let updated = repo
                        .update(
                            &operation.id,
                            OperationUpdate {
                                status: Some(OperationStatus::Failed),
                                error: Some(Some(failure.message.clone())),
                                error_code: Some(Some(code.clone())),
                                ..Default::default()
                            },
                        )
                        .await?
                        .ok_or_else(|| Error::OperationNotFound(operation.id.clone()))?;

                    tracing::warn!(
                        operation = %updated,
                        code = %code,
                        reason = decision.reason,
                        "operation failed permanently"
                    );
                    Ok(ProcessedOperation {
                        operation: updated,
                        outcome: ProcessOutcome::Failed { code },
                    })
                }
            }
        }
    }

    /// Starts the processing loop and the completed-row GC task.
    ///
    /// Idempotent: calling it while running logs and returns.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.loop_handle.write().await;
        if handle.is_some() {
            tracing::debug!("sync queue processing loop is already running");
            return;
        }

        self.shutdown_flag.store(false, Ordering::Relaxed);
        self.loop_cancel.reset();

        // Crash recovery: rows a previous process left mid-flight get
        // another attempt.
        match self.requeue_in_progress().await {
            Ok(0) => {}
            Ok(requeued) => {
                tracing::info!("requeued {requeued} operations left in progress");
            }
            Err(e) => {
                tracing::warn!("failed to requeue in-progress operations: {e:?}");
            }
        }

        let queue = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            tracing::info!("sync queue processing loop started");

            loop {
                if queue.shutdown_flag.load(Ordering::Relaxed) {
                    break;
                }

                let round = queue
                    .process_scoped(None, queue.config.batch_size, &queue.loop_cancel)
                    .await;
                let processed = match round {
                    Ok(processed) => processed.len(),
                    Err(e) => {
                        tracing::error!("queue processing round failed: {e:?}");
                        0
                    }
                };

                if processed == 0 {
                    tokio::select! {
                        biased;

                        _ = queue.shutdown_notify.notified() => break,
                        _ = tokio::time::sleep(queue.config.poll_interval) => {}
                    }
                }
            }

            tracing::info!("sync queue processing loop stopped");
        }));
        drop(handle);

        let mut cleanup = self.cleanup_handle.write().await;
        if cleanup.is_none() {
            let queue = Arc::clone(self);
            *cleanup = Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(queue.config.cleanup_interval);
                interval.tick().await;

                loop {
                    tokio::select! {
                        biased;

                        _ = queue.shutdown_notify.notified() => break,

                        _ = interval.tick() => {
                            if queue.shutdown_flag.load(Ordering::Relaxed) {
                                break;
                            }
                            match queue.cleanup_completed(queue.config.completed_max_age).await {
                                Ok(0) => {}
                                Ok(removed) => {
                                    tracing::info!("garbage-collected {removed} completed operations");
                                }
                                Err(e) => {
                                    tracing::warn!("completed-operation cleanup failed: {e:?}");
                                }
                            }
                        }
                    }
                }
            }));
        }
    }

    /// Signals the loop to exit after the current operation and waits for it.
    pub async fn stop(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        self.loop_cancel.cancel();
        self.shutdown_notify.notify_waiters();

        for slot in [&self.loop_handle, &self.cleanup_handle] {
            let mut handle = slot.write().await;
            if let Some(task) = handle.take() {
                match task.await {
                    Ok(()) => {}
                    Err(e) if e.is_panic() => {
                        tracing::error!("sync queue task panicked: {e:?}");
                    }
                    Err(e) => {
                        tracing::warn!("sync queue task did not stop cleanly: {e:?}");
                    }
                }
            }
        }

        self.shutdown_flag.store(false, Ordering::Relaxed);
    }

    pub async fn is_running(&self) -> bool {
        self.loop_handle.read().await.is_some()
    }
}
