//! In-memory domain caches the pull strategies reconcile.
//!
//! These mirrors hold the client's last known view of the domain: pending
//! transactions awaiting push, the wallet snapshot, the product catalog, and
//! the stand list. All state sits behind short-held `std::sync::Mutex`es;
//! the host application reads them for rendering while the sync pipeline
//! updates them.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A locally created transaction waiting to reach the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: String,
    pub idempotency_key: String,
    pub amount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stand_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Default)]
struct TransactionState {
    pending: Vec<PendingTransaction>,
    synced_ids: HashSet<String>,
}

/// Pending-transaction mirror.
#[derive(Default)]
pub struct TransactionCache {
    inner: Mutex<TransactionState>,
}

impl TransactionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pending(&self, transaction: PendingTransaction) {
        let mut state = self.inner.lock().expect("transaction cache lock poisoned");
        state.pending.push(transaction);
    }

    /// Pending transactions, oldest first.
    pub fn pending(&self) -> Vec<PendingTransaction> {
        let state = self.inner.lock().expect("transaction cache lock poisoned");
        let mut pending = state.pending.clone();
        pending.sort_by_key(|t| t.created_at);
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .expect("transaction cache lock poisoned")
            .pending
            .len()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_count() > 0
    }

    /// Removes the transaction from pending and remembers it as synced.
    pub fn mark_synced(&self, id: &str) {
        let mut state = self.inner.lock().expect("transaction cache lock poisoned");
        state.pending.retain(|t| t.id != id);
        state.synced_ids.insert(id.to_string());
    }

    pub fn is_synced(&self, id: &str) -> bool {
        self.inner
            .lock()
            .expect("transaction cache lock poisoned")
            .synced_ids
            .contains(id)
    }

    /// Bumps the retry counter and records the latest error.
    pub fn note_failure(&self, id: &str, error: impl Into<String>) {
        let mut state = self.inner.lock().expect("transaction cache lock poisoned");
        if let Some(transaction) = state.pending.iter_mut().find(|t| t.id == id) {
            transaction.retry_count += 1;
            transaction.last_error = Some(error.into());
        }
    }

    pub fn remove(&self, id: &str) {
        let mut state = self.inner.lock().expect("transaction cache lock poisoned");
        state.pending.retain(|t| t.id != id);
    }
}

/// The client's view of the wallet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalletSnapshot {
    pub balance_cents: i64,
    /// Rotating payment QR payload, refreshed on every wallet pull.
    pub qr_payload: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct WalletState {
    snapshot: WalletSnapshot,
    last_synced_at: Option<DateTime<Utc>>,
}

/// Wallet mirror; the balance is only ever written from server state.
#[derive(Default)]
pub struct WalletCache {
    inner: Mutex<WalletState>,
}

impl WalletCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        self.inner
            .lock()
            .expect("wallet cache lock poisoned")
            .snapshot
            .clone()
    }

    pub fn balance_cents(&self) -> i64 {
        self.inner
            .lock()
            .expect("wallet cache lock poisoned")
            .snapshot
            .balance_cents
    }

    pub fn set_balance(&self, balance_cents: i64) {
        let mut state = self.inner.lock().expect("wallet cache lock poisoned");
        state.snapshot.balance_cents = balance_cents;
        state.snapshot.updated_at = Some(Utc::now());
    }

    pub fn set_qr_payload(&self, qr_payload: Option<String>) {
        let mut state = self.inner.lock().expect("wallet cache lock poisoned");
        state.snapshot.qr_payload = qr_payload;
    }

    pub fn stamp_synced(&self) {
        let mut state = self.inner.lock().expect("wallet cache lock poisoned");
        state.last_synced_at = Some(Utc::now());
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .expect("wallet cache lock poisoned")
            .last_synced_at
    }
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Default)]
struct ProductState {
    products: Vec<Product>,
    fetched_at: Option<DateTime<Utc>>,
}

/// Product catalog mirror with TTL-based staleness.
#[derive(Default)]
pub struct ProductCache {
    inner: Mutex<ProductState>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn products(&self) -> Vec<Product> {
        self.inner
            .lock()
            .expect("product cache lock poisoned")
            .products
            .clone()
    }

    pub fn replace(&self, products: Vec<Product>) {
        let mut state = self.inner.lock().expect("product cache lock poisoned");
        state.products = products;
        state.fetched_at = Some(Utc::now());
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .expect("product cache lock poisoned")
            .fetched_at
    }

    /// True when the catalog has never been fetched or the TTL elapsed.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.fetched_at() {
            Some(fetched_at) => {
                Utc::now() - fetched_at
                    > chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
            }
            None => true,
        }
    }
}

/// One stand (bar, food truck, merch booth) on the festival grounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stand {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default = "default_true")]
    pub open: bool,
}

#[derive(Default)]
struct StandState {
    stands: Vec<Stand>,
    current_id: Option<String>,
    fetched_at: Option<DateTime<Utc>>,
}

/// Stand-list mirror; tracks the stand the operator is working at.
#[derive(Default)]
pub struct StandCache {
    inner: Mutex<StandState>,
}

impl StandCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stands(&self) -> Vec<Stand> {
        self.inner
            .lock()
            .expect("stand cache lock poisoned")
            .stands
            .clone()
    }

    pub fn replace(&self, stands: Vec<Stand>) {
        let mut state = self.inner.lock().expect("stand cache lock poisoned");
        state.stands = stands;
        state.fetched_at = Some(Utc::now());
    }

    pub fn set_current(&self, stand_id: Option<String>) {
        let mut state = self.inner.lock().expect("stand cache lock poisoned");
        state.current_id = stand_id;
    }

    /// The current stand, refreshed against the latest list.
    pub fn current(&self) -> Option<Stand> {
        let state = self.inner.lock().expect("stand cache lock poisoned");
        let current_id = state.current_id.as_ref()?;
        state.stands.iter().find(|s| &s.id == current_id).cloned()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .expect("stand cache lock poisoned")
            .fetched_at
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.fetched_at() {
            Some(fetched_at) => {
                Utc::now() - fetched_at
                    > chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
            }
            None => true,
        }
    }
}
