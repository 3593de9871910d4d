//! Engine lifecycle facade.
//!
//! The engine composes the queue, the strategy manager, the conflict
//! resolver, and the host adapters behind explicit `initialize`/`shutdown`.
//! It reacts to network and foreground signals with debounced auto-syncs,
//! throttles back-to-back sync calls, retries failed whole-sync runs, and
//! keeps a bounded in-memory history of results.
//!
//! The engine is a process-wide singleton: initialization ordering (store
//! open, adapters subscribed, handlers registered) happens exactly once, and
//! a second `initialize` without an intervening `shutdown` is an error.

pub mod events;

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use migration::{Migrator, MigratorTrait};
use sea_orm::Database;

use crate::adapter::app_state::{AppLifecycleState, AppStateAdapter};
use crate::adapter::network::NetworkAdapter;
use crate::adapter::transport::Transport;
use crate::adapter::AdapterSubscription;
use crate::config::SyncConfig;
use crate::conflict::ConflictResolver;
use crate::error::Error;
use crate::manager::SyncManager;
use crate::model::conflict::ConflictRecord;
use crate::model::event::SyncEvent;
use crate::model::operation::{NewOperation, Operation};
use crate::model::result::{QueueStats, SyncResult, SyncedCounts};
use crate::queue::SyncQueue;
use crate::store::{ProductCache, StandCache, TransactionCache, WalletCache};
use crate::strategy::{ProductSync, StandSync, SyncStrategy, TransactionSync, WalletSync};
use crate::util::cancel::CancelToken;

use events::{EventBus, EventSubscription};

/// One engine per process; guards against double initialization.
static ENGINE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Observable engine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Syncing,
    Error,
    Offline,
}

/// Per-call sync options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Bypass the minimum-interval throttle.
    pub force: bool,
    /// Overrides the configured whole-sync timeout.
    pub timeout: Option<Duration>,
}

/// The domain caches the engine owns and the host reads.
pub struct EngineStores {
    pub transactions: Arc<TransactionCache>,
    pub wallet: Arc<WalletCache>,
    pub products: Arc<ProductCache>,
    pub stands: Arc<StandCache>,
}

struct EngineInner {
    config: SyncConfig,
    queue: Arc<SyncQueue>,
    manager: SyncManager,
    resolver: Arc<ConflictResolver>,
    events: Arc<EventBus>,
    network: Arc<dyn NetworkAdapter>,
    stores: EngineStores,
    state: RwLock<EngineState>,
    cancel: CancelToken,
    run_lock: tokio::sync::Mutex<()>,
    last_result: RwLock<Option<SyncResult>>,
    history: Mutex<VecDeque<SyncResult>>,
    last_sync_at: Mutex<Option<Instant>>,
    subscriptions: Mutex<Vec<AdapterSubscription>>,
    runtime: tokio::runtime::Handle,
    initialized: AtomicBool,
}

/// Cheaply cloneable handle to the engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Opens the store, runs migrations, registers handlers, subscribes the
    /// adapters, and starts the queue's processing loop.
    ///
    /// Errors with [`Error::AlreadyInitialized`] if an engine is already
    /// active in this process.
    pub async fn initialize(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        network: Arc<dyn NetworkAdapter>,
        app_state: Arc<dyn AppStateAdapter>,
    ) -> Result<SyncEngine, Error> {
        config.validate()?;

        if ENGINE_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyInitialized);
        }

        let setup = async {
            let db = Database::connect(&config.database_url).await?;
            Migrator::up(&db, None).await?;

            let resolver = Arc::new(ConflictResolver::new(config.conflict_log_limit));
            let events = Arc::new(EventBus::new());
            let queue = Arc::new(SyncQueue::new(
                db,
                config.queue.clone(),
                Arc::clone(&resolver),
                Arc::clone(&events),
            ));
            queue.register_default_handlers(Arc::clone(&transport));

            let stores = EngineStores {
                transactions: Arc::new(TransactionCache::new()),
                wallet: Arc::new(WalletCache::new()),
                products: Arc::new(ProductCache::new()),
                stands: Arc::new(StandCache::new()),
            };

            let strategies: Vec<Arc<dyn SyncStrategy>> = vec![
                Arc::new(TransactionSync::new(
                    Arc::clone(&queue),
                    Arc::clone(&resolver),
                    Arc::clone(&stores.transactions),
                    Arc::clone(&events),
                )),
                Arc::new(WalletSync::new(
                    Arc::clone(&transport),
                    Arc::clone(&resolver),
                    Arc::clone(&stores.wallet),
                    Arc::clone(&events),
                )),
                Arc::new(ProductSync::new(
                    Arc::clone(&transport),
                    Arc::clone(&stores.products),
                    config.product_ttl,
                )),
                Arc::new(StandSync::new(
                    Arc::clone(&transport),
                    Arc::clone(&stores.stands),
                    config.stand_ttl,
                )),
            ];
            let manager = SyncManager::new(strategies, Arc::clone(&events));

            let online = network.fetch().await;
            let initial_state = if online {
                EngineState::Idle
            } else {
                EngineState::Offline
            };

            let inner = Arc::new(EngineInner {
                config,
                queue: Arc::clone(&queue),
                manager,
                resolver,
                events,
                network: Arc::clone(&network),
                stores,
                state: RwLock::new(initial_state),
                cancel: CancelToken::new(),
                run_lock: tokio::sync::Mutex::new(()),
                last_result: RwLock::new(None),
                history: Mutex::new(VecDeque::new()),
                last_sync_at: Mutex::new(None),
                subscriptions: Mutex::new(Vec::new()),
                runtime: tokio::runtime::Handle::current(),
                initialized: AtomicBool::new(true),
            });

            // Adapter callbacks hold only weak references; a shut-down engine
            // silently drops late signals.
            let weak = Arc::downgrade(&inner);
            let network_subscription = network.subscribe(Arc::new(move |online: bool| {
                if let Some(engine) = upgrade(&weak) {
                    let runtime = engine.inner.runtime.clone();
                    runtime.spawn(async move {
                        engine.handle_network_change(online).await;
                    });
                }
            }));

            let weak = Arc::downgrade(&inner);
            let app_subscription = app_state.subscribe(Arc::new(move |state| {
                if let Some(engine) = upgrade(&weak) {
                    let runtime = engine.inner.runtime.clone();
                    runtime.spawn(async move {
                        engine.handle_app_state(state).await;
                    });
                }
            }));

            {
                let mut subscriptions = inner
                    .subscriptions
                    .lock()
                    .expect("subscription lock poisoned");
                subscriptions.push(network_subscription);
                subscriptions.push(app_subscription);
            }

            // The loop only runs while the device is online; pushing against
            // a dead network would burn retry budgets for nothing.
            if online {
                queue.start().await;
            }

            tracing::info!(state = ?initial_state, "sync engine initialized");
            Ok(SyncEngine { inner })
        }
        .await;

        if setup.is_err() {
            ENGINE_ACTIVE.store(false, Ordering::SeqCst);
        }
        setup
    }

    /// Stops the queue, detaches the adapters, and releases the singleton
    /// slot. A second shutdown is an error.
    pub async fn shutdown(&self) -> Result<(), Error> {
        if !self.inner.initialized.swap(false, Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }

        self.inner.cancel.cancel();
        self.inner.queue.stop().await;
        self.inner
            .subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .clear();

        ENGINE_ACTIVE.store(false, Ordering::SeqCst);
        tracing::info!("sync engine shut down");
        Ok(())
    }

    /// Runs a full sync with default options.
    pub async fn sync(&self) -> Result<SyncResult, Error> {
        self.sync_with(SyncOptions::default()).await
    }

    /// Runs a full sync.
    ///
    /// Offline devices get a single-error result without queue mutation;
    /// calls inside the throttle window get a success-shaped "no work"
    /// result; a call while a run is in flight awaits that run and returns
    /// its result.
    pub async fn sync_with(&self, options: SyncOptions) -> Result<SyncResult, Error> {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }

        if !self.inner.network.fetch().await {
            self.set_state(EngineState::Offline);
            tracing::debug!("sync skipped, device is offline");
            return Ok(SyncResult::failure(
                "NETWORK_UNAVAILABLE",
                "device is offline",
            ));
        }

        if !options.force {
            let last = *self
                .inner
                .last_sync_at
                .lock()
                .expect("last-sync lock poisoned");
            if let Some(last) = last {
                if last.elapsed() < self.inner.config.min_sync_interval {
                    tracing::debug!("sync throttled by minimum interval");
                    return Ok(SyncResult::throttled());
                }
            }
        }

        let _run = match self.inner.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                // A run is in flight: await it, then share its result.
                let _wait = self.inner.run_lock.lock().await;
                let shared = self
                    .inner
                    .last_result
                    .read()
                    .expect("last-result lock poisoned")
                    .clone();
                return Ok(shared.unwrap_or_else(|| SyncResult {
                    success: true,
                    throttled: false,
                    synced: SyncedCounts::default(),
                    duration: Duration::ZERO,
                    errors: Vec::new(),
                    conflicts: Vec::new(),
                    finished_at: chrono::Utc::now(),
                }));
            }
        };

        self.inner.cancel.reset();
        self.set_state(EngineState::Syncing);
        self.inner.events.emit(&SyncEvent::SyncStarted);

        let timeout = options.timeout.unwrap_or(self.inner.config.sync_timeout);
        let mut attempt: u32 = 0;
        let mut timed_out;

        let result = loop {
            let run = tokio::time::timeout(timeout, self.inner.manager.sync_all(&self.inner.cancel))
                .await;

            let result = match run {
                Ok(result) => {
                    timed_out = false;
                    result
                }
                Err(_) => {
                    timed_out = true;
                    tracing::warn!(?timeout, "sync run timed out");

                    // The run's future was dropped mid-operation. Cancel the
                    // token so anything still holding it aborts its transport
                    // I/O, and return rows stranded in in_progress to
                    // pending so the aborted operation is not orphaned.
                    self.inner.cancel.cancel();
                    if let Err(e) = self.inner.queue.requeue_in_progress().await {
                        tracing::warn!("failed to requeue operations after timeout: {e:?}");
                    }

                    SyncResult::failure("TIMEOUT", format!("sync timed out after {timeout:?}"))
                }
            };

            // A cancelled token on a completed run means the caller asked;
            // after a timeout the cancellation is our own doing and the
            // whole-sync retry below still applies.
            if !timed_out && self.inner.cancel.is_cancelled() {
                break result;
            }
            if result.success {
                break result;
            }

            attempt += 1;
            if attempt > self.inner.config.max_retry_attempts {
                break result;
            }

            tracing::warn!(
                attempt,
                max = self.inner.config.max_retry_attempts,
                "sync failed, retrying whole run"
            );

            // Clear a timeout-induced cancellation before the next attempt;
            // a caller's cancel arriving during the pause still sticks and
            // halts the next run at its first strategy boundary.
            self.inner.cancel.reset();
            tokio::time::sleep(self.inner.config.retry_delay).await;
        };

        let cancelled = !timed_out && self.inner.cancel.is_cancelled();
        self.finish_run(result.clone(), cancelled);

        Ok(result)
    }

    /// Cancels the in-flight sync; the manager halts between strategies.
    pub fn cancel_sync(&self) {
        tracing::info!("sync cancellation requested");
        self.inner.cancel.cancel();
    }

    /// Pushes pending transactions only.
    pub async fn sync_transactions(&self) -> Result<SyncResult, Error> {
        self.sync_single("transactions").await
    }

    /// Pulls the wallet only.
    pub async fn sync_wallets(&self) -> Result<SyncResult, Error> {
        self.sync_single("wallet").await
    }

    /// Pulls the product catalog only.
    pub async fn sync_products(&self) -> Result<SyncResult, Error> {
        self.sync_single("products").await
    }

    /// Pulls the stand list only.
    pub async fn sync_stands(&self) -> Result<SyncResult, Error> {
        self.sync_single("stands").await
    }

    async fn sync_single(&self, strategy: &str) -> Result<SyncResult, Error> {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }

        let _run = self.inner.run_lock.lock().await;
        self.inner.cancel.reset();

        let result = self
            .inner
            .manager
            .sync_named(strategy, &self.inner.cancel)
            .await;

        Ok(result)
    }

    /// Enqueues a mutation intent for eventual push.
    pub async fn enqueue(&self, input: NewOperation) -> Result<Operation, Error> {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }
        self.inner.queue.add(input).await
    }

    /// Subscribes a listener to the engine's event bus.
    pub fn on(
        &self,
        listener: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.inner.events.subscribe(listener)
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.read().expect("state lock poisoned")
    }

    /// The most recent sync results, newest first.
    pub fn history(&self) -> Vec<SyncResult> {
        self.inner
            .history
            .lock()
            .expect("history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn last_result(&self) -> Option<SyncResult> {
        self.inner
            .last_result
            .read()
            .expect("last-result lock poisoned")
            .clone()
    }

    /// The bounded conflict-resolution log, newest first.
    pub fn conflict_log(&self) -> Vec<ConflictRecord> {
        self.inner.resolver.log()
    }

    pub async fn stats(&self) -> Result<QueueStats, Error> {
        self.inner.queue.stats().await
    }

    /// Pending push counts keyed by strategy name.
    pub async fn pending_counts(&self) -> HashMap<String, u64> {
        self.inner.manager.pending_counts().await
    }

    pub async fn has_pending_changes(&self) -> bool {
        self.inner.manager.has_pending_changes().await
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.inner.queue
    }

    pub fn stores(&self) -> &EngineStores {
        &self.inner.stores
    }

    pub fn resolver(&self) -> &Arc<ConflictResolver> {
        &self.inner.resolver
    }

    async fn handle_network_change(&self, online: bool) {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return;
        }

        if online {
            let transitioned = {
                let mut state = self.inner.state.write().expect("state lock poisoned");
                if *state == EngineState::Offline {
                    *state = EngineState::Idle;
                    true
                } else {
                    false
                }
            };

            if transitioned {
                tracing::info!("network is back online");
                self.inner.events.emit(&SyncEvent::NetworkOnline);

                // Short debounce lets the connection settle before the queue
                // loop resumes and any auto-sync fires.
                tokio::time::sleep(self.inner.config.online_debounce).await;
                self.inner.queue.start().await;

                if self.inner.config.auto_sync_on_online {
                    if let Err(e) = self.sync().await {
                        tracing::warn!("auto-sync after reconnect failed: {e}");
                    }
                }
            }
        } else {
            let transitioned = {
                let mut state = self.inner.state.write().expect("state lock poisoned");
                if *state != EngineState::Offline {
                    *state = EngineState::Offline;
                    true
                } else {
                    false
                }
            };

            if transitioned {
                tracing::info!("network went offline");
                self.inner.events.emit(&SyncEvent::NetworkOffline);
                self.inner.queue.stop().await;
            }
        }
    }

    async fn handle_app_state(&self, state: AppLifecycleState) {
        if !self.inner.initialized.load(Ordering::SeqCst) {
            return;
        }
        if state != AppLifecycleState::Active || !self.inner.config.auto_sync_on_foreground {
            return;
        }
        if self.state() != EngineState::Idle {
            return;
        }

        let due = {
            let last = *self
                .inner
                .last_sync_at
                .lock()
                .expect("last-sync lock poisoned");
            last.map_or(true, |at| at.elapsed() >= self.inner.config.min_sync_interval)
        };

        if due {
            tracing::debug!("foreground transition triggered auto-sync");
            if let Err(e) = self.sync().await {
                tracing::warn!("foreground auto-sync failed: {e}");
            }
        }
    }

    fn finish_run(&self, result: SyncResult, cancelled: bool) {
        *self
            .inner
            .last_sync_at
            .lock()
            .expect("last-sync lock poisoned") = Some(Instant::now());

        {
            let mut history = self.inner.history.lock().expect("history lock poisoned");
            history.push_front(result.clone());
            while history.len() > self.inner.config.history_limit {
                history.pop_back();
            }
        }
        *self
            .inner
            .last_result
            .write()
            .expect("last-result lock poisoned") = Some(result.clone());

        if cancelled {
            self.set_state(EngineState::Idle);
            self.inner.events.emit(&SyncEvent::SyncCancelled);
        } else if result.success {
            self.set_state(EngineState::Idle);
            self.inner.events.emit(&SyncEvent::SyncCompleted(result));
        } else {
            self.set_state(EngineState::Error);
            let code = result
                .errors
                .first()
                .map(|e| e.code.clone())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            let message = result
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_default();
            self.inner
                .events
                .emit(&SyncEvent::SyncFailed { code, message });
        }
    }

    fn set_state(&self, next: EngineState) {
        let mut state = self.inner.state.write().expect("state lock poisoned");
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "engine state transition");
            *state = next;
        }
    }
}

fn upgrade(weak: &Weak<EngineInner>) -> Option<SyncEngine> {
    weak.upgrade().map(|inner| SyncEngine { inner })
}
