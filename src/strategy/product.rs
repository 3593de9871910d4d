//! Pull strategy for the product catalog.
//!
//! Refreshes the catalog when it is older than the TTL. A failed fetch keeps
//! the cached catalog and is non-fatal: the error is recorded for the sync
//! result but never aborts the run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::transport::{Transport, TransportRequest, OP_PRODUCT_CATALOG_FETCH};
use crate::model::result::SyncErrorEntry;
use crate::store::{Product, ProductCache};
use crate::strategy::{StrategyResult, SyncStrategy};
use crate::util::cancel::CancelToken;

pub struct ProductSync {
    transport: Arc<dyn Transport>,
    cache: Arc<ProductCache>,
    ttl: Duration,
}

impl ProductSync {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<ProductCache>, ttl: Duration) -> Self {
        Self {
            transport,
            cache,
            ttl,
        }
    }
}

#[async_trait]
impl SyncStrategy for ProductSync {
    fn name(&self) -> &'static str {
        "products"
    }

    fn priority(&self) -> u8 {
        3
    }

    async fn execute(&self, cancel: &CancelToken) -> StrategyResult {
        let mut result = StrategyResult::default();

        if cancel.is_cancelled() || !self.cache.is_stale(self.ttl) {
            return result;
        }

        let fetched = self
            .transport
            .send(TransportRequest::pull(OP_PRODUCT_CATALOG_FETCH))
            .await;

        let body = match fetched {
            Ok(response) if response.is_success() => response.body.unwrap_or(Value::Null),
            Ok(response) => {
                tracing::warn!(
                    status = response.status,
                    "product catalog fetch failed, keeping cached catalog"
                );
                result.errors.push(SyncErrorEntry::strategy(
                    self.name(),
                    "FETCH_FAILED",
                    format!("catalog fetch returned status {}", response.status),
                ));
                return result;
            }
            Err(error) => {
                tracing::warn!("product catalog fetch failed, keeping cached catalog: {error}");
                result.errors.push(SyncErrorEntry::strategy(
                    self.name(),
                    "FETCH_FAILED",
                    error.to_string(),
                ));
                return result;
            }
        };

        let products: Vec<Product> = match body.get("products") {
            Some(list) => match serde_json::from_value(list.clone()) {
                Ok(products) => products,
                Err(e) => {
                    result.errors.push(SyncErrorEntry::strategy(
                        self.name(),
                        "MALFORMED_RESPONSE",
                        format!("catalog payload did not parse: {e}"),
                    ));
                    return result;
                }
            },
            None => Vec::new(),
        };

        result.synced_count = products.len() as u32;
        self.cache.replace(products);
        tracing::debug!(count = result.synced_count, "product catalog replaced");

        result
    }

    async fn has_pending_changes(&self) -> bool {
        false
    }

    async fn pending_count(&self) -> u64 {
        0
    }
}
