//! Cooperative cancellation token.
//!
//! A `CancelToken` is cloned into operation handlers and checked by the
//! manager between strategies. Cancellation is cooperative: the current
//! operation runs to completion and subsequent work is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cloneable cancellation flag with async wakeup.
///
/// All clones share the same underlying flag; cancelling any clone cancels
/// them all. Waiters blocked in [`CancelToken::cancelled`] are woken when the
/// flag flips.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the flag and wakes all waiters.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns `true` once [`CancelToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }

    /// Resets the flag so the token can gate another run.
    ///
    /// Only the owner (the engine) resets; handlers never see a reset
    /// mid-flight because resets happen between sync runs.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
