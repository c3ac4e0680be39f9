// src/sync.rs

//! The lock primitive used for every piece of shared mutable state.
//!
//! [`Guarded`] is a cloneable handle around one `tokio::sync::Mutex`. Each
//! manager owns exactly one per protected map and takes it for the whole of a
//! read-modify-write sequence. The same lock can be taken from async tasks
//! (`lock().await`) and from plain OS threads outside the runtime
//! (`blocking_lock()`), so callers do not need to share an event loop.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

pub struct Guarded<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Wait for exclusive access.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().await
    }

    /// Exclusive access from a thread that is not driving an async runtime.
    ///
    /// Panics if called from within an async execution context (tokio's
    /// rule for `blocking_lock`).
    pub fn blocking_lock(&self) -> MutexGuard<'_, T> {
        self.inner.blocking_lock()
    }

    /// Non-waiting attempt, mostly for diagnostics.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.inner.try_lock().ok()
    }

    /// Run `f` with the lock held and return its result.
    pub async fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }

    /// Whether two handles guard the same value.
    pub fn same_lock(&self, other: &Guarded<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Guarded<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for Guarded<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("locked", &self.inner.try_lock().is_err())
            .finish()
    }
}
