#![forbid(unsafe_code)]

//! Observer registries.
//!
//! An [`ObserverRegistry`] holds an ordered set of shared observers and
//! fans notifications out to them. One registry exists per notification
//! channel (data changes, loading, availability, errors).
//!
//! # Invariants
//!
//! 1. An observer (by `Arc` identity) appears at most once.
//! 2. `notify` visits observers in reverse registration order.
//! 3. `notify` iterates a snapshot, so an observer may register or
//!    unregister observers (including itself) from inside its callback
//!    without skipping or double-visiting anyone in the current pass.
//!
//! # Failure Modes
//!
//! A panicking observer is logged at `ERROR` and skipped; the remaining
//! observers still receive the notification.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::event::{Available, ChangeEvent};
use crate::panic;

/// Registry misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ObserverError {
    /// The observer is already in the registry.
    #[error("observer is already registered")]
    AlreadyRegistered,
    /// The observer is not in the registry.
    #[error("observer was not registered")]
    NotRegistered,
}

/// Receives content change notifications.
pub trait DataObserver: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> DataObserver for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event);
    }
}

/// Receives loading flag transitions.
pub trait LoadingObserver: Send + Sync {
    fn on_loading_changed(&self, loading: bool);
}

impl<F> LoadingObserver for F
where
    F: Fn(bool) + Send + Sync,
{
    fn on_loading_changed(&self, loading: bool) {
        self(loading);
    }
}

/// Receives availability transitions.
pub trait AvailableObserver: Send + Sync {
    fn on_available_changed(&self, available: Available);
}

impl<F> AvailableObserver for F
where
    F: Fn(Available) + Send + Sync,
{
    fn on_available_changed(&self, available: Available) {
        self(available);
    }
}

/// Receives load failures.
pub trait ErrorObserver<E>: Send + Sync {
    fn on_error(&self, error: &E);
}

impl<E, F> ErrorObserver<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_error(&self, error: &E) {
        self(error);
    }
}

/// Ordered set of observers for one notification channel.
pub struct ObserverRegistry<O: ?Sized> {
    channel: &'static str,
    observers: Mutex<Vec<Arc<O>>>,
}

impl<O: ?Sized> ObserverRegistry<O> {
    /// Create an empty registry. `channel` labels log output.
    #[must_use]
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            observers: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<O>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an observer. Returns the new observer count.
    pub fn register(&self, observer: Arc<O>) -> Result<usize, ObserverError> {
        let mut observers = self.lock();
        if observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return Err(ObserverError::AlreadyRegistered);
        }
        observers.push(observer);
        Ok(observers.len())
    }

    /// Remove an observer. Returns the new observer count.
    pub fn unregister(&self, observer: &Arc<O>) -> Result<usize, ObserverError> {
        let mut observers = self.lock();
        let index = observers
            .iter()
            .position(|o| Arc::ptr_eq(o, observer))
            .ok_or(ObserverError::NotRegistered)?;
        observers.remove(index);
        Ok(observers.len())
    }

    #[must_use]
    pub fn contains(&self, observer: &Arc<O>) -> bool {
        self.lock().iter().any(|o| Arc::ptr_eq(o, observer))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every observer. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut observers = self.lock();
        let n = observers.len();
        observers.clear();
        n
    }

    /// Invoke `f` on a snapshot of the observers, newest first.
    pub fn notify(&self, mut f: impl FnMut(&O)) {
        let snapshot: Vec<Arc<O>> = self.lock().clone();
        for observer in snapshot.iter().rev() {
            if let Err(message) = panic::contain(|| f(observer.as_ref())) {
                error!(
                    channel = self.channel,
                    panic = %message,
                    "observer panicked during notification"
                );
            }
        }
    }
}

impl<O: ?Sized> std::fmt::Debug for ObserverRegistry<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("channel", &self.channel)
            .field("len", &self.len())
            .finish()
    }
}

impl ObserverRegistry<dyn DataObserver> {
    /// Deliver a change event. Zero-length events are dropped.
    pub fn notify_change(&self, event: &ChangeEvent) {
        if event.count() == 0 {
            return;
        }
        self.notify(|o| o.on_change(event));
    }
}

impl ObserverRegistry<dyn LoadingObserver> {
    pub fn notify_loading(&self, loading: bool) {
        self.notify(|o| o.on_loading_changed(loading));
    }
}

impl ObserverRegistry<dyn AvailableObserver> {
    pub fn notify_available(&self, available: Available) {
        self.notify(|o| o.on_available_changed(available));
    }
}

impl<E> ObserverRegistry<dyn ErrorObserver<E>> {
    pub fn notify_error(&self, error: &E) {
        self.notify(|o| o.on_error(error));
    }
}
