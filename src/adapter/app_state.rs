//! App-lifecycle adapter contract.

use std::sync::Arc;

use crate::adapter::AdapterSubscription;

/// Coarse app lifecycle states as the mobile platforms report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleState {
    Active,
    Background,
    Inactive,
}

/// Callback invoked on every lifecycle transition.
pub type AppStateListener = Arc<dyn Fn(AppLifecycleState) + Send + Sync>;

/// Wraps the platform's foreground/background events.
pub trait AppStateAdapter: Send + Sync {
    fn subscribe(&self, listener: AppStateListener) -> AdapterSubscription;
}
