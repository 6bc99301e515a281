#![forbid(unsafe_code)]

//! The data state machine.
//!
//! A [`Data`] is an observable, lazily loaded sequence bound to one
//! [`Scheduler`]. It loads through a [`Loader`] on an [`Executor`] only
//! while at least one data observer is registered, diffs new content
//! against the current content off the scheduler thread, and announces the
//! result as fine-grained change events.
//!
//! # Design
//!
//! `Data` is a cheap handle (`Arc` inside). All mutating operations must be
//! called on the scheduler thread; background jobs hold only weak
//! references and hand results back through a [`CoalescingPoster`]. Every
//! job carries a ticket; a result whose ticket is no longer current is
//! discarded.
//!
//! # Invariants
//!
//! 1. The loader is never invoked while no data observer is registered.
//! 2. At most one load and at most one diff are in flight.
//! 3. Content mutations are applied in submission order, each against the
//!    content its events describe.
//! 4. `is_loading()` is true exactly while a load is running or its result
//!    has not been applied yet.
//! 5. A failed load reports one error and leaves the content untouched.
//!
//! # Failure Modes
//!
//! - Loader, equality, and observer panics are contained and logged; a
//!   loader panic is reported as [`LoadError::LoaderPanicked`].
//! - Work posted back after `dispose` (or after the last handle dropped)
//!   is ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use datalist_core::{
    Available, AvailableObserver, CoalescingPoster, Cx, CxController, DataObserver, ErrorObserver,
    Executor, LoadingObserver, ObserverRegistry, Scheduler, panic,
};
use datalist_diff::{DiffError, Equality, calculate_diff};
use tracing::{debug, error, trace, warn};
use web_time::{Duration, Instant};

use crate::config::DataConfig;
use crate::error::{DataError, LoadError, Result};
use crate::loader::{Loaded, Loader};
use crate::mutation::{Mutation, MutationQueue, Origin, Queued};
use crate::store::ListStore;

static NEXT_DATA_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a data instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(u64);

impl DataId {
    /// Allocate an id no other instance in this process has.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_DATA_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DataId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "data#{}", self.0)
    }
}

/// Coarse lifecycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing loaded yet, or the last load was abandoned.
    Idle,
    Loading,
    Loaded,
    /// The last load failed.
    Error,
}

struct LoadJob {
    ticket: u64,
    reset: bool,
    ctrl: CxController,
}

struct State<T> {
    phase: Phase,
    loading: bool,
    available: Available,
    error: Option<LoadError>,
    /// A load is owed on the next opportunity.
    dirty: bool,
    /// Content must be cleared before the next subscription sees it.
    clear_pending: bool,
    /// The next delivered page replaces the content.
    first_page: bool,
    /// A failed load to retry on resubscription (`true` = reset load).
    retry: Option<bool>,
    epoch: u64,
    next_ticket: u64,
    load: Option<LoadJob>,
    mutations: MutationQueue<T>,
    shown_since: Option<Instant>,
    hidden_since: Instant,
    disposed: bool,
}

struct DataInner<T> {
    id: DataId,
    config: DataConfig,
    equality: Equality<T>,
    loader: Arc<dyn Loader<T>>,
    scheduler: Arc<dyn Scheduler>,
    executor: Arc<dyn Executor>,
    poster: CoalescingPoster,
    store: ListStore<T>,
    loading_observers: ObserverRegistry<dyn LoadingObserver>,
    available_observers: ObserverRegistry<dyn AvailableObserver>,
    error_observers: ObserverRegistry<dyn ErrorObserver<LoadError>>,
    root: Cx,
    root_ctrl: CxController,
    state: Mutex<State<T>>,
}

impl<T> Drop for DataInner<T> {
    fn drop(&mut self) {
        // Running jobs only hold weak references; stop them early.
        self.root_ctrl.cancel();
        trace!(data_id = %self.id, "data dropped");
    }
}

/// Builder for [`Data`].
pub struct DataBuilder<T> {
    loader: Arc<dyn Loader<T>>,
    scheduler: Arc<dyn Scheduler>,
    executor: Arc<dyn Executor>,
    config: DataConfig,
    equality: Equality<T>,
}

impl<T> DataBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn config(mut self, config: DataConfig) -> Self {
        self.config = config;
        self
    }

    /// Identity/content functions. Without both, overwrites fall back to
    /// positional change events.
    #[must_use]
    pub fn equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }

    #[must_use]
    pub fn build(self) -> Data<T> {
        let (root, root_ctrl) = Cx::background();
        let id = DataId::fresh();
        debug!(
            data_id = %id,
            incremental = self.config.incremental,
            diff = self.equality.is_complete(),
            "data created"
        );
        Data {
            inner: Arc::new(DataInner {
                id,
                poster: CoalescingPoster::new(Arc::clone(&self.scheduler)),
                config: self.config,
                equality: self.equality,
                loader: self.loader,
                scheduler: self.scheduler,
                executor: self.executor,
                store: ListStore::new(),
                loading_observers: ObserverRegistry::new("loading"),
                available_observers: ObserverRegistry::new("available"),
                error_observers: ObserverRegistry::new("error"),
                root,
                root_ctrl,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    loading: false,
                    available: Available::Unbounded,
                    error: None,
                    dirty: true,
                    clear_pending: false,
                    first_page: true,
                    retry: None,
                    epoch: 0,
                    next_ticket: 1,
                    load: None,
                    mutations: MutationQueue::new(),
                    shown_since: None,
                    hidden_since: Instant::now(),
                    disposed: false,
                }),
            }),
        }
    }
}

/// Observable, lazily loaded sequence.
pub struct Data<T> {
    inner: Arc<DataInner<T>>,
}

impl<T> Clone for Data<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Data<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("id", &self.inner.id)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

impl<T> Data<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start building a data instance.
    pub fn builder(
        loader: impl Loader<T>,
        scheduler: Arc<dyn Scheduler>,
        executor: Arc<dyn Executor>,
    ) -> DataBuilder<T> {
        DataBuilder {
            loader: Arc::new(loader),
            scheduler,
            executor,
            config: DataConfig::default(),
            equality: Equality::none(),
        }
    }

    /// A whole-content data instance with default configuration.
    pub fn new(
        loader: impl Loader<T>,
        scheduler: Arc<dyn Scheduler>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self::builder(loader, scheduler, executor).build()
    }

    fn from_weak(weak: &Weak<DataInner<T>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn assert_scheduler(&self, op: &'static str) {
        debug_assert!(
            self.inner.scheduler.is_current(),
            "Data::{op} called off the scheduler thread"
        );
    }

    /// Run a loader hook on the scheduler thread, containing panics.
    fn loader_hook(&self, hook: &'static str, f: impl FnOnce(&dyn Loader<T>)) {
        if let Err(message) = panic::contain(|| f(self.inner.loader.as_ref())) {
            error!(data_id = %self.inner.id, hook, panic = %message, "loader hook panicked");
        }
    }

    /// Run `f` now if on the scheduler thread, otherwise post it there.
    fn dispatch(&self, f: impl FnOnce(&Self) + Send + 'static) {
        if self.inner.scheduler.is_current() {
            f(self);
        } else {
            let weak = Arc::downgrade(&self.inner);
            self.inner.poster.post(move || {
                if let Some(data) = Self::from_weak(&weak) {
                    f(&data);
                }
            });
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    #[must_use]
    pub fn id(&self) -> DataId {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &DataConfig {
        &self.inner.config
    }

    /// Item at `position`, or `None` past the end.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<T> {
        self.inner.store.get(position)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Current content without copying it.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.inner.store.snapshot()
    }

    /// Iterate over a snapshot of the current content.
    #[must_use]
    pub fn iter(&self) -> SnapshotIter<T> {
        SnapshotIter {
            items: self.snapshot(),
            next: 0,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    #[must_use]
    pub fn available(&self) -> Available {
        self.state().available
    }

    /// The most recent load failure, cleared when the next load starts.
    #[must_use]
    pub fn error(&self) -> Option<LoadError> {
        self.state().error.clone()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Whether at least one data observer is registered.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        !self.inner.store.observers().is_empty()
    }

    #[must_use]
    pub fn data_observer_count(&self) -> usize {
        self.inner.store.observers().len()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state().disposed
    }

    #[must_use]
    pub fn is_shown(&self) -> bool {
        self.state().shown_since.is_some()
    }

    // ── Observers ────────────────────────────────────────────────────

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(DataError::Disposed);
        }
        Ok(())
    }

    /// Register a data observer. The first one starts loading if needed.
    pub fn register_data_observer(&self, observer: Arc<dyn DataObserver>) -> Result<()> {
        self.ensure_live()?;
        self.assert_scheduler("register_data_observer");
        if self.inner.store.observers().register(observer)? == 1 {
            self.on_first_observer();
        }
        Ok(())
    }

    /// Unregister a data observer. The last one cancels outstanding work.
    pub fn unregister_data_observer(&self, observer: &Arc<dyn DataObserver>) -> Result<()> {
        self.assert_scheduler("unregister_data_observer");
        if self.inner.store.observers().unregister(observer)? == 0 && !self.is_disposed() {
            self.on_last_observer();
        }
        Ok(())
    }

    pub fn register_loading_observer(&self, observer: Arc<dyn LoadingObserver>) -> Result<()> {
        self.ensure_live()?;
        self.inner.loading_observers.register(observer)?;
        Ok(())
    }

    pub fn unregister_loading_observer(&self, observer: &Arc<dyn LoadingObserver>) -> Result<()> {
        self.inner.loading_observers.unregister(observer)?;
        Ok(())
    }

    pub fn register_available_observer(
        &self,
        observer: Arc<dyn AvailableObserver>,
    ) -> Result<()> {
        self.ensure_live()?;
        self.inner.available_observers.register(observer)?;
        Ok(())
    }

    pub fn unregister_available_observer(
        &self,
        observer: &Arc<dyn AvailableObserver>,
    ) -> Result<()> {
        self.inner.available_observers.unregister(observer)?;
        Ok(())
    }

    pub fn register_error_observer(
        &self,
        observer: Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()> {
        self.ensure_live()?;
        self.inner.error_observers.register(observer)?;
        Ok(())
    }

    pub fn unregister_error_observer(
        &self,
        observer: &Arc<dyn ErrorObserver<LoadError>>,
    ) -> Result<()> {
        self.inner.error_observers.unregister(observer)?;
        Ok(())
    }

    fn on_first_observer(&self) {
        let (clear, dirty, retry) = {
            let mut st = self.state();
            (
                std::mem::take(&mut st.clear_pending),
                st.dirty,
                st.retry.take(),
            )
        };
        debug!(data_id = %self.inner.id, dirty, clear, retry = retry.is_some(), "subscribed");
        if clear {
            self.enqueue(Mutation::Clear, Origin::Caller);
        }
        if dirty {
            self.start_load(true);
        } else if let Some(reset) = retry {
            self.start_load(reset);
        }
    }

    fn on_last_observer(&self) {
        let lost = self.cancel_work("unsubscribed");
        if lost {
            self.state().dirty = true;
        }
        debug!(data_id = %self.inner.id, lost, "unsubscribed");
        self.update_loading();
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Cancel outstanding work and load again (if subscribed).
    pub fn refresh(&self) {
        if self.is_disposed() {
            return;
        }
        self.assert_scheduler("refresh");
        self.cancel_work("refresh");
        self.state().dirty = true;
        self.load_if_appropriate();
        self.update_loading();
    }

    /// Clear the content, then refresh.
    pub fn reload(&self) {
        if self.is_disposed() {
            return;
        }
        self.assert_scheduler("reload");
        self.cancel_work("reload");
        self.enqueue(Mutation::Clear, Origin::Caller);
        {
            let mut st = self.state();
            st.dirty = true;
            st.clear_pending = false;
        }
        self.load_if_appropriate();
        self.update_loading();
    }

    /// Cancel outstanding work and owe a fresh load to the next
    /// subscription, which also clears the stale content first.
    pub fn invalidate(&self) {
        if self.is_disposed() {
            return;
        }
        self.assert_scheduler("invalidate");
        self.cancel_work("invalidate");
        self.loader_hook("on_invalidate", |l| l.on_invalidate());
        {
            let mut st = self.state();
            st.dirty = true;
            st.clear_pending = true;
            st.retry = None;
        }
        self.update_loading();
    }

    /// Cancel everything, clear the content, and refuse further use.
    ///
    /// Observers stay registered until their owners unregister them.
    pub fn dispose(&self) {
        {
            let mut st = self.state();
            if st.disposed {
                return;
            }
            st.disposed = true;
        }
        self.assert_scheduler("dispose");
        self.cancel_work("dispose");
        self.inner.root_ctrl.cancel();
        let dropped = self.inner.poster.clear();
        self.loader_hook("on_clear", |l| l.on_clear());
        self.inner.store.clear();
        self.update_loading();
        debug!(data_id = %self.inner.id, dropped, "data disposed");
    }

    /// Returns whether abandoned work included load results.
    fn cancel_work(&self, reason: &'static str) -> bool {
        let (job, dropped, lost_mutations, epoch) = {
            let mut st = self.state();
            st.epoch += 1;
            let job = st.load.take();
            let (dropped, lost) = st.mutations.cancel();
            (job, dropped, lost, st.epoch)
        };
        let had_job = job.is_some();
        if let Some(job) = job {
            job.ctrl.cancel();
        }
        if had_job || dropped > 0 {
            debug!(
                data_id = %self.inner.id,
                epoch,
                reason,
                load = had_job,
                dropped,
                "outstanding work cancelled"
            );
        }
        had_job || lost_mutations
    }

    fn load_if_appropriate(&self) {
        let wanted = {
            let st = self.state();
            !st.disposed && st.dirty && st.load.is_none()
        };
        if wanted && self.is_subscribed() {
            self.start_load(true);
        }
    }

    // ── Loading ──────────────────────────────────────────────────────

    fn start_load(&self, reset: bool) {
        let (cx, ctrl) = self.inner.root.child();
        let ticket = {
            let mut st = self.state();
            if st.disposed || st.load.is_some() {
                return;
            }
            st.dirty = false;
            st.retry = None;
            if reset {
                st.first_page = true;
            }
            let ticket = st.next_ticket;
            st.next_ticket += 1;
            st.load = Some(LoadJob {
                ticket,
                reset,
                ctrl,
            });
            ticket
        };
        let data_id = self.inner.id;
        debug!(data_id = %data_id, ticket, reset, "load started");
        if reset {
            self.loader_hook("on_load_begin", |l| l.on_load_begin());
        }
        self.update_loading();

        let loader = Arc::clone(&self.inner.loader);
        let weak = Arc::downgrade(&self.inner);
        self.inner.executor.execute(Box::new(move || {
            if cx.is_cancelled() {
                trace!(data_id = %data_id, ticket, "load skipped; cancelled before start");
                return;
            }
            let started = Instant::now();
            let outcome = match panic::contain(|| loader.load(&cx)) {
                Ok(result) => result,
                Err(message) => Err(LoadError::LoaderPanicked(message)),
            };
            if cx.is_cancelled() {
                debug!(data_id = %data_id, ticket, "load result dropped; cancelled");
                return;
            }
            trace!(
                data_id = %data_id,
                ticket,
                elapsed_us = started.elapsed().as_micros() as u64,
                "load returned"
            );
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let poster = inner.poster.clone();
            drop(inner);
            poster.post(move || {
                if let Some(data) = Self::from_weak(&weak) {
                    data.finish_load(ticket, outcome);
                }
            });
        }));
    }

    fn finish_load(&self, ticket: u64, outcome: std::result::Result<Loaded<T>, LoadError>) {
        let job = {
            let mut st = self.state();
            match &st.load {
                Some(job) if job.ticket == ticket => st.load.take(),
                _ => None,
            }
        };
        let Some(job) = job else {
            debug!(data_id = %self.inner.id, ticket, "stale load result discarded");
            return;
        };
        if job.reset && outcome.is_ok() {
            // Fresh content replaces whatever a pending clear would remove.
            self.state().clear_pending = false;
        }

        match outcome {
            Ok(Loaded::Page(page)) => {
                let overwrite = self.take_first_page() || !self.inner.config.incremental;
                debug!(
                    data_id = %self.inner.id,
                    ticket,
                    items = page.items.len(),
                    available = %page.available,
                    overwrite,
                    "load finished"
                );
                let mutation = if overwrite {
                    Mutation::Overwrite(page.items)
                } else {
                    Mutation::Append(page.items)
                };
                self.enqueue(mutation, Origin::Load);
                self.set_available(page.available);
            }
            Ok(Loaded::NoMoreData) => {
                let first = self.take_first_page();
                debug!(data_id = %self.inner.id, ticket, first, "source exhausted");
                if first {
                    self.enqueue(Mutation::Overwrite(Vec::new()), Origin::Load);
                }
                self.set_available(Available::Count(0));
            }
            Err(error) => {
                warn!(data_id = %self.inner.id, ticket, error = %error, "load failed");
                {
                    let mut st = self.state();
                    st.retry = Some(job.reset);
                    st.error = Some(error.clone());
                    st.phase = Phase::Error;
                }
                self.update_loading();
                self.inner.error_observers.notify_error(&error);
                return;
            }
        }
        self.update_loading();
    }

    fn take_first_page(&self) -> bool {
        std::mem::replace(&mut self.state().first_page, false)
    }

    /// Start the next page load (incremental mode).
    pub(crate) fn load_next(&self) {
        if self.is_disposed() {
            return;
        }
        self.assert_scheduler("load_next");
        if !self.is_subscribed() {
            trace!(data_id = %self.inner.id, "load_next ignored; no observers");
            return;
        }
        let reset = {
            let st = self.state();
            if st.loading || st.load.is_some() || st.mutations.has_load_work() {
                return;
            }
            if st.available.is_exhausted() {
                trace!(data_id = %self.inner.id, "load_next ignored; exhausted");
                return;
            }
            st.dirty
        };
        self.start_load(reset);
    }

    /// Item at `position`, requesting the next page when it is close to
    /// the end.
    pub(crate) fn get_presented(&self, position: usize) -> Option<T> {
        let item = self.get(position);
        if self.inner.config.wants_more(position, self.size()) {
            self.load_next();
        }
        item
    }

    fn set_available(&self, available: Available) {
        let changed = {
            let mut st = self.state();
            let changed = st.available != available;
            st.available = available;
            changed
        };
        if changed {
            trace!(data_id = %self.inner.id, available = %available, "available changed");
            self.dispatch(move |data| data.inner.available_observers.notify_available(available));
        }
    }

    fn update_loading(&self) {
        let change = {
            let mut st = self.state();
            let loading = !st.disposed && (st.load.is_some() || st.mutations.has_load_work());
            if st.loading == loading {
                None
            } else {
                st.loading = loading;
                if loading {
                    st.error = None;
                    st.phase = Phase::Loading;
                } else if st.phase == Phase::Loading {
                    st.phase = if st.error.is_some() {
                        Phase::Error
                    } else if st.dirty {
                        Phase::Idle
                    } else {
                        Phase::Loaded
                    };
                }
                Some(loading)
            }
        };
        if let Some(loading) = change {
            debug!(data_id = %self.inner.id, loading, "loading changed");
            self.dispatch(move |data| data.inner.loading_observers.notify_loading(loading));
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Replace the content, diffing when equality functions are set.
    pub fn overwrite(&self, items: Vec<T>) {
        self.submit("overwrite", Mutation::Overwrite(items));
    }

    pub fn append(&self, items: Vec<T>) {
        self.submit("append", Mutation::Append(items));
    }

    pub fn prepend(&self, items: Vec<T>) {
        self.submit("prepend", Mutation::Prepend(items));
    }

    pub fn clear(&self) {
        self.submit("clear", Mutation::Clear);
    }

    fn submit(&self, op: &'static str, mutation: Mutation<T>) {
        if self.is_disposed() {
            debug!(data_id = %self.inner.id, op, "mutation ignored; disposed");
            return;
        }
        self.assert_scheduler(op);
        self.enqueue(mutation, Origin::Caller);
    }

    fn enqueue(&self, mutation: Mutation<T>, origin: Origin) {
        let label = mutation.label();
        let superseded = self.state().mutations.push(
            Queued { mutation, origin },
            self.inner.config.coalesce_overwrites,
        );
        if superseded > 0 {
            debug!(data_id = %self.inner.id, superseded, "queued mutations superseded by {label}");
        }
        self.drain_mutations();
    }

    fn drain_mutations(&self) {
        loop {
            let Some(queued) = self.state().mutations.pop_ready() else {
                break;
            };
            let store = &self.inner.store;
            match queued.mutation {
                Mutation::Overwrite(items) => {
                    let trivial = store.is_empty() || items.is_empty();
                    if self.inner.equality.is_complete() && !trivial {
                        self.start_diff(items, queued.origin);
                        continue;
                    }
                    store.overwrite_positional(items);
                }
                Mutation::Append(items) => store.append(items),
                Mutation::Prepend(items) => store.prepend(items),
                Mutation::Clear => {
                    self.loader_hook("on_clear", |l| l.on_clear());
                    store.clear();
                    if queued.origin == Origin::Caller {
                        self.set_available(Available::Unbounded);
                    }
                }
            }
        }
        self.update_loading();
    }

    fn start_diff(&self, items: Vec<T>, origin: Origin) {
        let snapshot = self.inner.store.snapshot();
        let (cx, ctrl) = self.inner.root.child();
        let ticket = self.state().mutations.begin_diff(origin, ctrl);
        let data_id = self.inner.id;
        debug!(
            data_id = %data_id,
            ticket,
            old_len = snapshot.len(),
            new_len = items.len(),
            "diff started"
        );

        let equality = self.inner.equality.clone();
        let detect_moves = self.inner.config.detect_moves;
        let weak = Arc::downgrade(&self.inner);
        self.inner.executor.execute(Box::new(move || {
            if cx.is_cancelled() {
                return;
            }
            let started = Instant::now();
            let result = calculate_diff(&snapshot, &items, &equality, detect_moves, &cx);
            if matches!(result, Err(DiffError::Cancelled)) || cx.is_cancelled() {
                trace!(data_id = %data_id, ticket, "diff abandoned");
                return;
            }
            trace!(
                data_id = %data_id,
                ticket,
                elapsed_us = started.elapsed().as_micros() as u64,
                "diff computed"
            );
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let poster = inner.poster.clone();
            drop(inner);
            poster.post(move || {
                if let Some(data) = Self::from_weak(&weak) {
                    data.finish_diff(ticket, items, result);
                }
            });
        }));
    }

    fn finish_diff(
        &self,
        ticket: u64,
        items: Vec<T>,
        result: std::result::Result<datalist_diff::EditScript, DiffError>,
    ) {
        if self.state().mutations.finish_diff(ticket).is_none() {
            debug!(data_id = %self.inner.id, ticket, "stale diff result discarded");
            return;
        }
        match result {
            Ok(script) => {
                debug!(
                    data_id = %self.inner.id,
                    ticket,
                    edits = script.len(),
                    "diff applied"
                );
                self.inner.store.apply_script(items, &script);
            }
            Err(error) => {
                let error = LoadError::from(error);
                warn!(data_id = %self.inner.id, ticket, error = %error, "diff failed");
                self.state().error = Some(error.clone());
                self.inner.error_observers.notify_error(&error);
            }
        }
        self.drain_mutations();
    }

    // ── Visibility ───────────────────────────────────────────────────

    /// Mark the instance visible. Repeated calls are ignored.
    pub fn notify_shown(&self) {
        let hidden_for = {
            let mut st = self.state();
            if st.shown_since.is_some() {
                return;
            }
            let now = Instant::now();
            st.shown_since = Some(now);
            now.checked_duration_since(st.hidden_since)
                .unwrap_or(Duration::ZERO)
        };
        trace!(data_id = %self.inner.id, hidden_ms = hidden_for.as_millis() as u64, "shown");
        self.loader_hook("on_shown", |l| l.on_shown(hidden_for));
    }

    /// Mark the instance hidden. Repeated calls are ignored.
    pub fn notify_hidden(&self) {
        let shown_for = {
            let mut st = self.state();
            let Some(since) = st.shown_since.take() else {
                return;
            };
            let now = Instant::now();
            st.hidden_since = now;
            now.checked_duration_since(since).unwrap_or(Duration::ZERO)
        };
        trace!(data_id = %self.inner.id, shown_ms = shown_for.as_millis() as u64, "hidden");
        self.loader_hook("on_hidden", |l| l.on_hidden(shown_for));
    }
}

/// Iterator over a content snapshot.
pub struct SnapshotIter<T> {
    items: Arc<Vec<T>>,
    next: usize,
}

impl<T: Clone> Iterator for SnapshotIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.items.get(self.next).cloned();
        if item.is_some() {
            self.next += 1;
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.items.len() - self.next;
        (n, Some(n))
    }
}

impl<T: Clone> ExactSizeIterator for SnapshotIter<T> {}
