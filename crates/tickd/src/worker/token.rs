//! Idempotent cancellation token shared between the controller and a worker.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// A cancellation flag paired with a wait-handle.
///
/// Cloning yields another handle to the same token. Cancelling is
/// idempotent: only the first call flips the flag and wakes waiters, every
/// later call is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancellationToken {
    /// Creates a live token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token if it is still live.
    ///
    /// Returns `true` when this call performed the cancellation and `false`
    /// when the token had already been cancelled.
    #[must_use]
    pub fn cancel(&self) -> bool {
        let mut cancelled = self.lock();
        if *cancelled {
            return false;
        }
        *cancelled = true;
        self.inner.signal.notify_all();
        true
    }

    /// Reports whether the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Blocks until the token is cancelled or `deadline` passes.
    ///
    /// Returns `true` when cancellation was observed.
    #[must_use]
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut cancelled = self.lock();
        loop {
            if *cancelled {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .signal
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
    }

    /// Blocks until the token is cancelled.
    pub fn wait(&self) {
        let cancelled = self.lock();
        let _released = self
            .inner
            .signal
            .wait_while(cancelled, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
