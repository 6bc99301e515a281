#![forbid(unsafe_code)]

//! Notifying list store.
//!
//! [`ListStore`] owns the backing sequence of a data instance and announces
//! every mutation to its data observers.
//!
//! # Invariants
//!
//! 1. Observers are notified after the mutation is visible, and never while
//!    the store's lock is held, so they may read the store re-entrantly.
//! 2. Replaying the delivered events over a shadow of the previous content
//!    reproduces the current length.
//! 3. Readers get cheap snapshots (`Arc<Vec<T>>`); mutation copies on write
//!    only while a snapshot is still alive.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use datalist_core::{ChangeEvent, DataObserver, ObserverRegistry};
use datalist_diff::EditScript;
use tracing::trace;

/// Ordered item sequence with change notification.
pub struct ListStore<T> {
    items: Mutex<Arc<Vec<T>>>,
    observers: ObserverRegistry<dyn DataObserver>,
}

impl<T: Clone> ListStore<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    #[must_use]
    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(Arc::new(items)),
            observers: ObserverRegistry::new("data"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<T>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Data observers of this store.
    #[must_use]
    pub fn observers(&self) -> &ObserverRegistry<dyn DataObserver> {
        &self.observers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Item at `position`, or `None` past the end.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<T> {
        self.lock().get(position).cloned()
    }

    /// Current content without copying it.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.lock())
    }

    fn emit(&self, events: &[ChangeEvent]) {
        for event in events {
            self.observers.notify_change(event);
        }
    }

    /// Add `items` at the end.
    pub fn append(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let count = items.len();
        let position = {
            let mut guard = self.lock();
            let position = guard.len();
            Arc::make_mut(&mut guard).extend(items);
            position
        };
        trace!(position, count, "store append");
        self.emit(&[ChangeEvent::inserted(position, count)]);
    }

    /// Add `items` at the front.
    pub fn prepend(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let count = items.len();
        {
            let mut guard = self.lock();
            Arc::make_mut(&mut guard).splice(0..0, items);
        }
        trace!(count, "store prepend");
        self.emit(&[ChangeEvent::inserted(0, count)]);
    }

    /// Remove everything. Returns how many items were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut guard = self.lock();
            let removed = guard.len();
            *guard = Arc::new(Vec::new());
            removed
        };
        if removed > 0 {
            trace!(removed, "store clear");
            self.emit(&[ChangeEvent::removed(0, removed)]);
        }
        removed
    }

    /// Replace the content without identity information.
    ///
    /// The tail is inserted or removed first, then the common prefix is
    /// reported as changed.
    pub fn overwrite_positional(&self, items: Vec<T>) {
        let script = {
            let mut guard = self.lock();
            let script = EditScript::positional(guard.len(), items.len());
            *guard = Arc::new(items);
            script
        };
        trace!(
            old_len = script.old_len(),
            new_len = script.new_len(),
            "store positional overwrite"
        );
        self.emit(script.events());
    }

    /// Replace the content with `items`, announcing `script`.
    ///
    /// `script` must have been computed against the current content.
    pub fn apply_script(&self, items: Vec<T>, script: &EditScript) {
        {
            let mut guard = self.lock();
            debug_assert_eq!(guard.len(), script.old_len(), "stale edit script");
            debug_assert_eq!(items.len(), script.new_len(), "edit script length mismatch");
            *guard = Arc::new(items);
        }
        trace!(
            old_len = script.old_len(),
            new_len = script.new_len(),
            edits = script.len(),
            "store applied diff"
        );
        self.emit(script.events());
    }
}

impl<T: Clone> Default for ListStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ListStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.items.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("ListStore")
            .field("len", &len)
            .field("observers", &self.observers.len())
            .finish()
    }
}
