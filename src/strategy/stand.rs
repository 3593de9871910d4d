//! Pull strategy for the stand list.
//!
//! Refreshes the stand list when it is older than the TTL; the current stand
//! selection re-resolves against the fresh list. Failures are non-fatal.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::transport::{Transport, TransportRequest, OP_STAND_LIST_FETCH};
use crate::model::result::SyncErrorEntry;
use crate::store::{Stand, StandCache};
use crate::strategy::{StrategyResult, SyncStrategy};
use crate::util::cancel::CancelToken;

pub struct StandSync {
    transport: Arc<dyn Transport>,
    cache: Arc<StandCache>,
    ttl: Duration,
}

impl StandSync {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<StandCache>, ttl: Duration) -> Self {
        Self {
            transport,
            cache,
            ttl,
        }
    }
}

#[async_trait]
impl SyncStrategy for StandSync {
    fn name(&self) -> &'static str {
        "stands"
    }

    fn priority(&self) -> u8 {
        4
    }

    async fn execute(&self, cancel: &CancelToken) -> StrategyResult {
        let mut result = StrategyResult::default();

        if cancel.is_cancelled() || !self.cache.is_stale(self.ttl) {
            return result;
        }

        let fetched = self
            .transport
            .send(TransportRequest::pull(OP_STAND_LIST_FETCH))
            .await;

        let body = match fetched {
            Ok(response) if response.is_success() => response.body.unwrap_or(Value::Null),
            Ok(response) => {
                tracing::warn!(status = response.status, "stand list fetch failed");
                result.errors.push(SyncErrorEntry::strategy(
                    self.name(),
                    "FETCH_FAILED",
                    format!("stand list fetch returned status {}", response.status),
                ));
                return result;
            }
            Err(error) => {
                tracing::warn!("stand list fetch failed: {error}");
                result.errors.push(SyncErrorEntry::strategy(
                    self.name(),
                    "FETCH_FAILED",
                    error.to_string(),
                ));
                return result;
            }
        };

        let stands: Vec<Stand> = match body.get("stands") {
            Some(list) => match serde_json::from_value(list.clone()) {
                Ok(stands) => stands,
                Err(e) => {
                    result.errors.push(SyncErrorEntry::strategy(
                        self.name(),
                        "MALFORMED_RESPONSE",
                        format!("stand list payload did not parse: {e}"),
                    ));
                    return result;
                }
            },
            None => Vec::new(),
        };

        result.synced_count = stands.len() as u32;
        self.cache.replace(stands);
        tracing::debug!(count = result.synced_count, "stand list replaced");

        result
    }

    async fn has_pending_changes(&self) -> bool {
        false
    }

    async fn pending_count(&self) -> u64 {
        0
    }
}
