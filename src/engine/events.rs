//! Event bus with explicit subscriptions.
//!
//! Listeners are plain closures registered on the bus; `subscribe` returns a
//! guard whose drop (or explicit `unsubscribe`) detaches the listener. The
//! guard holds only a weak reference to the bus, so a forgotten guard never
//! keeps the engine alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::model::event::SyncEvent;

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Process-local pub/sub for [`SyncEvent`]s.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<u64, Listener>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener; the returned guard detaches it.
    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> EventSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .expect("event bus lock poisoned")
            .insert(id, Arc::new(listener));

        EventSubscription {
            id,
            bus: Arc::downgrade(self),
        }
    }

    /// Delivers the event to every current listener.
    ///
    /// Listeners are invoked outside the registry lock so they may subscribe
    /// or unsubscribe re-entrantly.
    pub fn emit(&self, event: &SyncEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .expect("event bus lock poisoned")
            .values()
            .cloned()
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .expect("event bus lock poisoned")
            .len()
    }

    fn detach(&self, id: u64) {
        self.listeners
            .lock()
            .expect("event bus lock poisoned")
            .remove(&id);
    }
}

/// Detach guard for one listener.
pub struct EventSubscription {
    id: u64,
    bus: Weak<EventBus>,
}

impl EventSubscription {
    /// Detaches the listener now instead of at drop time.
    pub fn unsubscribe(self) {
        // Drop impl does the work.
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(self.id);
        }
    }
}
