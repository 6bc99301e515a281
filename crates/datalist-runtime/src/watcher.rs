#![forbid(unsafe_code)]

//! Observer registration across a changing set of data instances.
//!
//! A [`DataWatcher`] is assigned a set of data instances and an enabled
//! flag. Its observers are registered with an instance exactly while the
//! watcher is enabled and the instance is in the current set.
//!
//! # Invariants
//!
//! 1. Registration calls against an instance happen only when
//!    `enabled && in set` flips; repeating `set_datas` with the same set
//!    or `set_enabled` with the same flag makes no calls.
//! 2. An instance dropped from the set is unregistered (if registered) and
//!    forgotten.
//!
//! # Failure Modes
//!
//! - A registration the instance refuses (for example after `dispose`) is
//!   logged and the entry stays unregistered until it is dropped from the
//!   set and assigned again.
//! - Panicking callbacks are contained by the observer registries of the
//!   watched instances.

use std::sync::Arc;

use ahash::AHashMap;
use datalist_core::{ChangeEvent, DataObserver, ErrorObserver, LoadingObserver};
use tracing::{debug, warn};

use crate::data::{Data, DataId};
use crate::error::{LoadError, Result};
use crate::immutable::ImmutableData;
use crate::incremental::IncrementalData;

/// Type-erased registration surface of a data instance.
pub trait WatchedData: Send + Sync {
    fn data_id(&self) -> DataId;

    fn register_data_observer(&self, observer: Arc<dyn DataObserver>) -> Result<()>;
    fn unregister_data_observer(&self, observer: &Arc<dyn DataObserver>) -> Result<()>;

    fn register_loading_observer(&self, observer: Arc<dyn LoadingObserver>) -> Result<()>;
    fn unregister_loading_observer(&self, observer: &Arc<dyn LoadingObserver>) -> Result<()>;

    fn register_error_observer(&self, observer: Arc<dyn ErrorObserver<LoadError>>)
    -> Result<()>;
    fn unregister_error_observer(
        &self,
        observer: &Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()>;
}

macro_rules! impl_watched_data {
    ($ty:ident) => {
        impl<T> WatchedData for $ty<T>
        where
            T: Clone + Send + Sync + 'static,
        {
            fn data_id(&self) -> DataId {
                $ty::id(self)
            }

            fn register_data_observer(&self, observer: Arc<dyn DataObserver>) -> Result<()> {
                $ty::register_data_observer(self, observer)
            }

            fn unregister_data_observer(&self, observer: &Arc<dyn DataObserver>) -> Result<()> {
                $ty::unregister_data_observer(self, observer)
            }

            fn register_loading_observer(
                &self,
                observer: Arc<dyn LoadingObserver>,
            ) -> Result<()> {
                $ty::register_loading_observer(self, observer)
            }

            fn unregister_loading_observer(
                &self,
                observer: &Arc<dyn LoadingObserver>,
            ) -> Result<()> {
                $ty::unregister_loading_observer(self, observer)
            }

            fn register_error_observer(
                &self,
                observer: Arc<dyn ErrorObserver<LoadError>>,
            ) -> Result<()> {
                $ty::register_error_observer(self, observer)
            }

            fn unregister_error_observer(
                &self,
                observer: &Arc<dyn ErrorObserver<LoadError>>,
            ) -> Result<()> {
                $ty::unregister_error_observer(self, observer)
            }
        }
    };
}

impl_watched_data!(Data);
impl_watched_data!(ImmutableData);

impl<T> WatchedData for IncrementalData<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn data_id(&self) -> DataId {
        self.data().data_id()
    }

    fn register_data_observer(&self, observer: Arc<dyn DataObserver>) -> Result<()> {
        WatchedData::register_data_observer(self.data(), observer)
    }

    fn unregister_data_observer(&self, observer: &Arc<dyn DataObserver>) -> Result<()> {
        WatchedData::unregister_data_observer(self.data(), observer)
    }

    fn register_loading_observer(&self, observer: Arc<dyn LoadingObserver>) -> Result<()> {
        WatchedData::register_loading_observer(self.data(), observer)
    }

    fn unregister_loading_observer(&self, observer: &Arc<dyn LoadingObserver>) -> Result<()> {
        WatchedData::unregister_loading_observer(self.data(), observer)
    }

    fn register_error_observer(
        &self,
        observer: Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()> {
        WatchedData::register_error_observer(self.data(), observer)
    }

    fn unregister_error_observer(
        &self,
        observer: &Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()> {
        WatchedData::unregister_error_observer(self.data(), observer)
    }
}

/// Callbacks a [`DataWatcher`] forwards, tagged with the source instance.
pub trait WatcherCallbacks: Send + Sync + 'static {
    fn on_data_change(&self, data: DataId, event: &ChangeEvent) {
        let _ = (data, event);
    }

    fn on_loading_change(&self, data: DataId, loading: bool) {
        let _ = (data, loading);
    }

    fn on_error(&self, data: DataId, error: &LoadError) {
        let _ = (data, error);
    }
}

struct Observers {
    data: Arc<dyn DataObserver>,
    loading: Arc<dyn LoadingObserver>,
    error: Arc<dyn ErrorObserver<LoadError>>,
}

struct Entry {
    data: Arc<dyn WatchedData>,
    /// Present while registered.
    observers: Option<Observers>,
    /// The instance refused registration; not asked again while assigned.
    refused: bool,
}

/// Keeps observers registered with the instances it is assigned, exactly
/// while enabled.
pub struct DataWatcher {
    callbacks: Arc<dyn WatcherCallbacks>,
    entries: AHashMap<DataId, Entry>,
    enabled: bool,
}

impl DataWatcher {
    /// A disabled watcher with no instances.
    pub fn new(callbacks: Arc<dyn WatcherCallbacks>) -> Self {
        Self {
            callbacks,
            entries: AHashMap::new(),
            enabled: false,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of assigned instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_registered(&self, id: DataId) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.observers.is_some())
    }

    /// Replace the assigned set. Instances already assigned keep their
    /// registration untouched.
    pub fn set_datas<I>(&mut self, datas: I)
    where
        I: IntoIterator<Item = Arc<dyn WatchedData>>,
    {
        let mut next: AHashMap<DataId, Arc<dyn WatchedData>> = AHashMap::new();
        for data in datas {
            next.insert(data.data_id(), data);
        }

        let dropped: Vec<DataId> = self
            .entries
            .keys()
            .filter(|id| !next.contains_key(id))
            .copied()
            .collect();
        for id in dropped {
            if let Some(mut entry) = self.entries.remove(&id) {
                Self::unregister(id, &mut entry);
            }
        }

        for (id, data) in next {
            self.entries.entry(id).or_insert(Entry {
                data,
                observers: None,
                refused: false,
            });
        }
        self.update_registration();
    }

    /// Enable or disable the watcher. Repeating the current value does
    /// nothing.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.update_registration();
        }
    }

    /// Unregister from every instance and forget them.
    pub fn dispose(&mut self) {
        self.enabled = false;
        for (id, mut entry) in self.entries.drain() {
            Self::unregister(id, &mut entry);
        }
    }

    fn update_registration(&mut self) {
        let enabled = self.enabled;
        for (&id, entry) in &mut self.entries {
            match (entry.observers.is_some(), enabled) {
                (true, false) => Self::unregister(id, entry),
                (false, true) if !entry.refused => {
                    entry.observers = Self::register(id, &entry.data, &self.callbacks);
                    entry.refused = entry.observers.is_none();
                }
                _ => {}
            }
        }
    }

    fn register(
        id: DataId,
        data: &Arc<dyn WatchedData>,
        callbacks: &Arc<dyn WatcherCallbacks>,
    ) -> Option<Observers> {
        let observers = {
            let (on_data, on_loading, on_error) =
                (Arc::clone(callbacks), Arc::clone(callbacks), Arc::clone(callbacks));
            Observers {
                data: Arc::new(move |event: &ChangeEvent| on_data.on_data_change(id, event)),
                loading: Arc::new(move |loading: bool| on_loading.on_loading_change(id, loading)),
                error: Arc::new(move |error: &LoadError| on_error.on_error(id, error)),
            }
        };
        let result = data
            .register_loading_observer(Arc::clone(&observers.loading))
            .and_then(|()| data.register_error_observer(Arc::clone(&observers.error)))
            .and_then(|()| data.register_data_observer(Arc::clone(&observers.data)));
        match result {
            Ok(()) => {
                debug!(data_id = %id, "watcher registered");
                Some(observers)
            }
            Err(error) => {
                warn!(data_id = %id, error = %error, "watcher registration refused");
                let _ = data.unregister_loading_observer(&observers.loading);
                let _ = data.unregister_error_observer(&observers.error);
                None
            }
        }
    }

    fn unregister(id: DataId, entry: &mut Entry) {
        let Some(observers) = entry.observers.take() else {
            return;
        };
        let data = &entry.data;
        let results = [
            data.unregister_data_observer(&observers.data),
            data.unregister_loading_observer(&observers.loading),
            data.unregister_error_observer(&observers.error),
        ];
        if let Some(Err(error)) = results.into_iter().find(std::result::Result::is_err) {
            warn!(data_id = %id, error = %error, "watcher unregistration failed");
        } else {
            debug!(data_id = %id, "watcher unregistered");
        }
    }
}

impl Drop for DataWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DataWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataWatcher")
            .field("entries", &self.entries.len())
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
