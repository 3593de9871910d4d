//! Manually driven network and app-state adapter doubles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use muninn::adapter::app_state::{AppLifecycleState, AppStateAdapter, AppStateListener};
use muninn::adapter::network::{NetworkAdapter, NetworkListener};
use muninn::adapter::AdapterSubscription;

/// Network adapter whose connectivity is flipped from the test body.
pub struct MockNetwork {
    online: AtomicBool,
    listeners: Arc<Mutex<HashMap<u64, NetworkListener>>>,
    next_id: AtomicU64,
}

impl MockNetwork {
    /// Creates the adapter with an initial connectivity state.
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        })
    }

    /// Flips connectivity and fires every subscribed listener.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        let listeners: Vec<NetworkListener> =
            self.listeners.lock().unwrap().values().cloned().collect();
        for listener in listeners {
            listener(online);
        }
    }

    /// Number of attached listeners; for unsubscribe assertions.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

#[async_trait]
impl NetworkAdapter for MockNetwork {
    fn subscribe(&self, listener: NetworkListener) -> AdapterSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().insert(id, listener);

        let listeners = Arc::clone(&self.listeners);
        AdapterSubscription::new(move || {
            listeners.lock().unwrap().remove(&id);
        })
    }

    async fn fetch(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// App-state adapter whose transitions are fired from the test body.
#[derive(Default)]
pub struct MockAppState {
    listeners: Arc<Mutex<HashMap<u64, AppStateListener>>>,
    next_id: AtomicU64,
}

impl MockAppState {
    /// Creates the adapter with no listeners.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fires a lifecycle transition at every subscribed listener.
    pub fn set_state(&self, state: AppLifecycleState) {
        let listeners: Vec<AppStateListener> =
            self.listeners.lock().unwrap().values().cloned().collect();
        for listener in listeners {
            listener(state);
        }
    }

    /// Number of attached listeners; for unsubscribe assertions.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

impl AppStateAdapter for MockAppState {
    fn subscribe(&self, listener: AppStateListener) -> AdapterSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().insert(id, listener);

        let listeners = Arc::clone(&self.listeners);
        AdapterSubscription::new(move || {
            listeners.lock().unwrap().remove(&id);
        })
    }
}
