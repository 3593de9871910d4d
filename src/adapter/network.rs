//! Network-state adapter contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::AdapterSubscription;

/// Callback invoked with `true` when the device goes online, `false` when it
/// goes offline.
pub type NetworkListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Wraps the platform's connectivity surface.
///
/// The engine subscribes once at initialize and drops the subscription at
/// shutdown; `fetch` answers the current state for sync-time checks.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    fn subscribe(&self, listener: NetworkListener) -> AdapterSubscription;

    /// Current connectivity, queried on demand.
    async fn fetch(&self) -> bool;
}
