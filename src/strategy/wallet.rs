//! Pull strategy for the wallet.
//!
//! Fetches the authoritative balance; a divergence from the local snapshot
//! is a conflict resolved server-wins (the balance is always
//! server-authoritative). Also refreshes the rotating payment QR and stamps
//! the last-sync time.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::transport::{Transport, TransportRequest, OP_WALLET_FETCH};
use crate::conflict::ConflictResolver;
use crate::engine::events::EventBus;
use crate::model::event::SyncEvent;
use crate::model::result::SyncErrorEntry;
use crate::retry::classify::SyncFailure;
use crate::store::WalletCache;
use crate::strategy::{StrategyResult, SyncStrategy};
use crate::util::cancel::CancelToken;

pub struct WalletSync {
    transport: Arc<dyn Transport>,
    resolver: Arc<ConflictResolver>,
    cache: Arc<WalletCache>,
    events: Arc<EventBus>,
}

impl WalletSync {
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Arc<ConflictResolver>,
        cache: Arc<WalletCache>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            transport,
            resolver,
            cache,
            events,
        }
    }
}

#[async_trait]
impl SyncStrategy for WalletSync {
    fn name(&self) -> &'static str {
        "wallet"
    }

    fn priority(&self) -> u8 {
        2
    }

    async fn execute(&self, cancel: &CancelToken) -> StrategyResult {
        let mut result = StrategyResult::default();

        if cancel.is_cancelled() {
            return result;
        }

        let response = match self.transport.send(TransportRequest::pull(OP_WALLET_FETCH)).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                let failure = SyncFailure::from_response(&response)
                    .expect("non-success response classifies as failure");
                result.errors.push(SyncErrorEntry::strategy(
                    self.name(),
                    failure.code(),
                    failure.message,
                ));
                return result;
            }
            Err(error) => {
                let failure = SyncFailure::from_transport(&error);
                result.errors.push(SyncErrorEntry::strategy(
                    self.name(),
                    failure.code(),
                    failure.message,
                ));
                return result;
            }
        };

        let body = response.body.unwrap_or(Value::Null);
        let Some(server_balance) = body.get("balance").and_then(Value::as_i64) else {
            result.errors.push(SyncErrorEntry::strategy(
                self.name(),
                "MALFORMED_RESPONSE",
                "wallet fetch response carries no balance",
            ));
            return result;
        };

        let local_balance = self.cache.balance_cents();
        if server_balance != local_balance {
            let record = self
                .resolver
                .resolve_wallet("wallet", local_balance, server_balance);

            tracing::info!(
                local = local_balance,
                server = server_balance,
                "wallet balance corrected from server"
            );
            self.events.emit(&SyncEvent::ConflictDetected(record.clone()));
            self.cache.set_balance(server_balance);
            self.events.emit(&SyncEvent::ConflictResolved(record.clone()));
            result.conflicts.push(record);
        }

        if let Some(qr) = body.get("qr").and_then(Value::as_str) {
            self.cache.set_qr_payload(Some(qr.to_string()));
        }

        self.cache.stamp_synced();
        result.synced_count = 1;

        result
    }

    async fn has_pending_changes(&self) -> bool {
        false
    }

    async fn pending_count(&self) -> u64 {
        0
    }
}
