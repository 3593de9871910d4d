//! Interfaces the host application implements.
//!
//! The engine never talks to the OS or the network directly. The host hands
//! it a [`Transport`](transport::Transport) that performs signed requests, a
//! [`NetworkAdapter`](network::NetworkAdapter) wrapping connectivity state,
//! and an [`AppStateAdapter`](app_state::AppStateAdapter) wrapping
//! foreground/background transitions. Subscriptions are guards: dropping one
//! (or calling `unsubscribe`) detaches the listener, so the engine cannot
//! leak callbacks past shutdown.

pub mod app_state;
pub mod network;
pub mod transport;

pub use app_state::{AppLifecycleState, AppStateAdapter};
pub use network::NetworkAdapter;
pub use transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// Detach guard returned by adapter `subscribe` calls.
///
/// The wrapped closure runs exactly once, either on explicit
/// [`AdapterSubscription::unsubscribe`] or on drop.
pub struct AdapterSubscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl AdapterSubscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A subscription that detaches nothing; useful for static test adapters.
    pub fn noop() -> Self {
        Self { detach: None }
    }

    /// Detaches the listener now instead of at drop time.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for AdapterSubscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for AdapterSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSubscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
