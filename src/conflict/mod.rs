//! Conflict detection and resolution.
//!
//! Conflicts are detected between the local cache and the server's
//! authoritative state, resolved by a per-entity-type strategy, and logged to
//! a bounded in-memory ring for diagnostics. Resolution is decoupled from
//! push/pull: strategies produce [`ConflictRecord`]s first and apply the
//! resolved values in a second pass, which keeps the strategy code small.

pub mod merge;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::model::conflict::{ConflictRecord, ConflictStrategy};
use merge::deep_merge;

/// Default cap on the retained resolution log.
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Outcome of the transaction-specific idempotency rule.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionResolution {
    /// The server already processed this request (same idempotency key);
    /// the server version is authoritative and the local push is complete.
    ServerProcessed(ConflictRecord),
    /// No server record exists; keep the local transaction and push it.
    KeepLocalAndPush,
    /// The server record has a different idempotency key: a distinct
    /// transaction. The local row stays pending and is pushed again.
    DistinctTransactions,
}

/// Detects conflicts and applies resolution strategies.
pub struct ConflictResolver {
    strategies: HashMap<String, ConflictStrategy>,
    log: Mutex<VecDeque<ConflictRecord>>,
    log_limit: usize,
}

impl ConflictResolver {
    /// Creates a resolver with the default per-entity strategy table.
    pub fn new(log_limit: usize) -> Self {
        let mut strategies = HashMap::new();
        strategies.insert("wallet".to_string(), ConflictStrategy::ServerWins);
        strategies.insert("transaction".to_string(), ConflictStrategy::Merge);
        strategies.insert("product".to_string(), ConflictStrategy::ServerWins);
        strategies.insert("stand".to_string(), ConflictStrategy::ServerWins);
        strategies.insert("user_preferences".to_string(), ConflictStrategy::ClientWins);
        strategies.insert("favorite".to_string(), ConflictStrategy::Merge);

        Self {
            strategies,
            log: Mutex::new(VecDeque::new()),
            log_limit: log_limit.max(1),
        }
    }

    /// Overrides the strategy for an entity type.
    pub fn set_strategy(&mut self, entity_type: impl Into<String>, strategy: ConflictStrategy) {
        self.strategies.insert(entity_type.into(), strategy);
    }

    /// Strategy for an entity type; unknown types fall back to server-wins.
    pub fn strategy_for(&self, entity_type: &str) -> ConflictStrategy {
        self.strategies
            .get(entity_type)
            .copied()
            .unwrap_or(ConflictStrategy::ServerWins)
    }

    /// Reports whether local and server state are in conflict.
    ///
    /// No conflict when either side is absent, when the values are
    /// structurally equal, or when timestamps show the server strictly newer
    /// than local by more than one second (a plain update, not a conflict).
    pub fn detect(
        &self,
        local: Option<&Value>,
        server: Option<&Value>,
        local_ts: Option<DateTime<Utc>>,
        server_ts: Option<DateTime<Utc>>,
    ) -> bool {
        let (Some(local), Some(server)) = (local, server) else {
            return false;
        };

        if local == server {
            return false;
        }

        if let (Some(local_ts), Some(server_ts)) = (local_ts, server_ts) {
            if server_ts - local_ts > Duration::seconds(1) {
                return false;
            }
        }

        true
    }

    /// Resolves a conflict with the entity type's configured strategy.
    pub fn resolve(
        &self,
        entity_type: &str,
        entity_id: &str,
        local: &Value,
        server: &Value,
        local_ts: Option<DateTime<Utc>>,
        server_ts: Option<DateTime<Utc>>,
    ) -> ConflictRecord {
        let strategy = self.strategy_for(entity_type);
        self.resolve_with(strategy, entity_type, entity_id, local, server, local_ts, server_ts)
    }

    /// Resolves a conflict with an explicit strategy.
    pub fn resolve_with(
        &self,
        strategy: ConflictStrategy,
        entity_type: &str,
        entity_id: &str,
        local: &Value,
        server: &Value,
        local_ts: Option<DateTime<Utc>>,
        server_ts: Option<DateTime<Utc>>,
    ) -> ConflictRecord {
        let (resolved_value, automatic) = match strategy {
            ConflictStrategy::ServerWins => (server.clone(), true),
            ConflictStrategy::ClientWins => (local.clone(), true),
            ConflictStrategy::Merge => (deep_merge(local, server), true),
            ConflictStrategy::NewestWins => {
                // Missing timestamps count as 0 for local and "now" for the
                // server, biasing toward the authoritative side.
                let local_at = local_ts.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                let server_at = server_ts.unwrap_or_else(Utc::now);
                if server_at >= local_at {
                    (server.clone(), true)
                } else {
                    (local.clone(), true)
                }
            }
            ConflictStrategy::Manual => (server.clone(), false),
        };

        let record = ConflictRecord {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            local_version: local.clone(),
            server_version: server.clone(),
            local_ts,
            server_ts,
            strategy,
            resolved_value,
            resolved_at: Utc::now(),
            automatic,
        };

        tracing::debug!(
            entity_type,
            entity_id,
            strategy = strategy.as_str(),
            automatic,
            "resolved conflict"
        );

        self.record(record.clone());
        record
    }

    /// Applies the transaction idempotency rule.
    ///
    /// The server's stored idempotency key decides: a matching key means the
    /// request was already processed and the server version is authoritative;
    /// no server record means the local transaction still needs pushing; a
    /// different key is a distinct transaction entirely.
    pub fn resolve_transaction(
        &self,
        entity_id: &str,
        local: &Value,
        server: Option<&Value>,
    ) -> TransactionResolution {
        let Some(server) = server else {
            return TransactionResolution::KeepLocalAndPush;
        };

        let local_key = local.get("idempotency_key").and_then(Value::as_str);
        let server_key = server.get("idempotency_key").and_then(Value::as_str);

        match (local_key, server_key) {
            (Some(local_key), Some(server_key)) if local_key == server_key => {
                // Same logical request: the server copy is the truth.
                let record = ConflictRecord {
                    entity_type: "transaction".to_string(),
                    entity_id: entity_id.to_string(),
                    local_version: local.clone(),
                    server_version: server.clone(),
                    local_ts: None,
                    server_ts: None,
                    strategy: ConflictStrategy::Merge,
                    resolved_value: server.clone(),
                    resolved_at: Utc::now(),
                    automatic: true,
                };
                self.record(record.clone());
                TransactionResolution::ServerProcessed(record)
            }
            (_, None) => TransactionResolution::KeepLocalAndPush,
            _ => TransactionResolution::DistinctTransactions,
        }
    }

    /// Applies the wallet rule: the balance is always server-authoritative.
    ///
    /// Always records a conflict so the caller can surface that the local
    /// balance was corrected.
    pub fn resolve_wallet(
        &self,
        entity_id: &str,
        local_balance: i64,
        server_balance: i64,
    ) -> ConflictRecord {
        self.resolve_with(
            ConflictStrategy::ServerWins,
            "wallet",
            entity_id,
            &Value::from(local_balance),
            &Value::from(server_balance),
            None,
            None,
        )
    }

    /// Most recent resolutions, newest first.
    pub fn log(&self) -> Vec<ConflictRecord> {
        self.log
            .lock()
            .expect("conflict log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_log(&self) {
        self.log
            .lock()
            .expect("conflict log lock poisoned")
            .clear();
    }

    fn record(&self, record: ConflictRecord) {
        let mut log = self.log.lock().expect("conflict log lock poisoned");
        log.push_front(record);
        while log.len() > self.log_limit {
            log.pop_back();
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LIMIT)
    }
}
