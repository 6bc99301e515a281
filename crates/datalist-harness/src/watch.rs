#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use datalist_core::{
    ChangeEvent, DataObserver, ErrorObserver, LoadingObserver, ObserverError, ObserverRegistry,
};
use datalist_runtime::{DataError, DataId, LoadError, Result, WatchedData};

/// A watch target that counts registration calls per channel.
///
/// Registrations go into real registries, so duplicate registration and
/// unknown unregistration fail exactly as they would on a data instance.
/// A refusing target answers every register call like a disposed one.
pub struct CountingData {
    id: DataId,
    data: ObserverRegistry<dyn DataObserver>,
    loading: ObserverRegistry<dyn LoadingObserver>,
    error: ObserverRegistry<dyn ErrorObserver<LoadError>>,
    registers: AtomicUsize,
    unregisters: AtomicUsize,
    attempts: AtomicUsize,
    refusing: AtomicBool,
}

impl CountingData {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: DataId::fresh(),
            data: ObserverRegistry::new("data"),
            loading: ObserverRegistry::new("loading"),
            error: ObserverRegistry::new("error"),
            registers: AtomicUsize::new(0),
            unregisters: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            refusing: AtomicBool::new(false),
        })
    }

    /// A target that refuses every registration.
    #[must_use]
    pub fn refusing() -> Arc<Self> {
        let data = Self::new();
        data.refusing.store(true, Ordering::SeqCst);
        data
    }

    /// The same instance as a type-erased watch target.
    #[must_use]
    pub fn watched(self: &Arc<Self>) -> Arc<dyn WatchedData> {
        Arc::clone(self) as Arc<dyn WatchedData>
    }

    /// Successful register calls over all channels.
    #[must_use]
    pub fn registers(&self) -> usize {
        self.registers.load(Ordering::SeqCst)
    }

    /// Register calls over all channels, refused ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful unregister calls over all channels.
    #[must_use]
    pub fn unregisters(&self) -> usize {
        self.unregisters.load(Ordering::SeqCst)
    }

    /// Whether a data observer is currently registered.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        !self.data.is_empty()
    }

    /// Deliver a change to the registered data observers.
    pub fn emit(&self, event: &ChangeEvent) {
        self.data.notify_change(event);
    }

    pub fn emit_loading(&self, loading: bool) {
        self.loading.notify_loading(loading);
    }

    pub fn emit_error(&self, error: &LoadError) {
        self.error.notify_error(error);
    }

    fn admit(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(DataError::Disposed);
        }
        Ok(())
    }
}

fn counted(counter: &AtomicUsize, result: std::result::Result<usize, ObserverError>) -> Result<()> {
    result?;
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

impl WatchedData for CountingData {
    fn data_id(&self) -> DataId {
        self.id
    }

    fn register_data_observer(&self, observer: Arc<dyn DataObserver>) -> Result<()> {
        self.admit()?;
        counted(&self.registers, self.data.register(observer))
    }

    fn unregister_data_observer(&self, observer: &Arc<dyn DataObserver>) -> Result<()> {
        counted(&self.unregisters, self.data.unregister(observer))
    }

    fn register_loading_observer(&self, observer: Arc<dyn LoadingObserver>) -> Result<()> {
        self.admit()?;
        counted(&self.registers, self.loading.register(observer))
    }

    fn unregister_loading_observer(&self, observer: &Arc<dyn LoadingObserver>) -> Result<()> {
        counted(&self.unregisters, self.loading.unregister(observer))
    }

    fn register_error_observer(
        &self,
        observer: Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()> {
        self.admit()?;
        counted(&self.registers, self.error.register(observer))
    }

    fn unregister_error_observer(
        &self,
        observer: &Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()> {
        counted(&self.unregisters, self.error.unregister(observer))
    }
}

impl std::fmt::Debug for CountingData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingData")
            .field("id", &self.id)
            .field("registers", &self.registers())
            .field("unregisters", &self.unregisters())
            .finish()
    }
}
