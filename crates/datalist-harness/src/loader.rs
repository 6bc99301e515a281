#![forbid(unsafe_code)]

//! Loaders for tests.
//!
//! [`ScriptedLoader`] answers each `load` call with the next scripted step
//! and counts every hook it receives. A [`Gate`] can hold `load` calls
//! until the test opens it, which lets threaded tests keep a load in
//! flight deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use datalist_core::{Available, Cx};
use datalist_runtime::{LoadError, Loaded, Loader, Page};
use tracing::trace;
use web_time::Duration;

/// A latch that blocks `load` calls until opened.
#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    waiters: AtomicUsize,
    cond: Condvar,
}

impl Gate {
    #[must_use]
    pub fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    pub fn close(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Number of callers currently blocked.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    /// Block until open or `cx` is cancelled. Returns whether it opened.
    pub fn wait(&self, cx: &Cx) -> bool {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open && !cx.is_cancelled() {
            open = self
                .cond
                .wait_timeout(open, Duration::from_millis(5))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        let opened = *open;
        drop(open);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        opened
    }
}

enum Step<T> {
    Respond(Result<Loaded<T>, LoadError>),
    Panic(&'static str),
}

#[derive(Debug, Default)]
struct Hooks {
    loads: AtomicUsize,
    load_begins: AtomicUsize,
    invalidates: AtomicUsize,
    clears: AtomicUsize,
    shown: AtomicUsize,
    hidden: AtomicUsize,
}

/// Answers `load` calls from a script; an exhausted script answers
/// [`Loaded::NoMoreData`].
pub struct ScriptedLoader<T> {
    steps: Mutex<VecDeque<Step<T>>>,
    hooks: Hooks,
    gate: Option<Arc<Gate>>,
}

impl<T: Send + 'static> ScriptedLoader<T> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            hooks: Hooks::default(),
            gate: None,
        })
    }

    /// A loader whose `load` calls wait for `gate`.
    #[must_use]
    pub fn gated(gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            hooks: Hooks::default(),
            gate: Some(gate),
        })
    }

    fn push(&self, step: Step<T>) {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
    }

    /// Script a final page holding `items`.
    pub fn push_items(&self, items: Vec<T>) {
        self.push(Step::Respond(Ok(Loaded::Page(Page::last(items)))));
    }

    pub fn push_page(&self, items: Vec<T>, available: Available) {
        self.push(Step::Respond(Ok(Loaded::Page(Page::with_available(items, available)))));
    }

    pub fn push_no_more(&self) {
        self.push(Step::Respond(Ok(Loaded::NoMoreData)));
    }

    pub fn push_error(&self, message: &str) {
        self.push(Step::Respond(Err(LoadError::message(message))));
    }

    pub fn push_panic(&self, message: &'static str) {
        self.push(Step::Panic(message));
    }

    /// Scripted steps not consumed yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `load` calls that reached the script.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.hooks.loads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn load_begins(&self) -> usize {
        self.hooks.load_begins.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn invalidates(&self) -> usize {
        self.hooks.invalidates.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn clears(&self) -> usize {
        self.hooks.clears.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn shown(&self) -> usize {
        self.hooks.shown.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn hidden(&self) -> usize {
        self.hooks.hidden.load(Ordering::SeqCst)
    }
}

impl<T: Send + 'static> Loader<T> for ScriptedLoader<T> {
    fn load(&self, cx: &Cx) -> Result<Loaded<T>, LoadError> {
        if let Some(gate) = &self.gate
            && !gate.wait(cx)
        {
            return Err(LoadError::message("cancelled while gated"));
        }
        let call = self.hooks.loads.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        trace!(call, scripted = step.is_some(), "scripted load");
        match step {
            Some(Step::Respond(result)) => result,
            Some(Step::Panic(message)) => panic!("{message}"),
            None => Ok(Loaded::NoMoreData),
        }
    }

    fn on_load_begin(&self) {
        self.hooks.load_begins.fetch_add(1, Ordering::SeqCst);
    }

    fn on_invalidate(&self) {
        self.hooks.invalidates.fetch_add(1, Ordering::SeqCst);
    }

    fn on_clear(&self) {
        self.hooks.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn on_shown(&self, _hidden_for: Duration) {
        self.hooks.shown.fetch_add(1, Ordering::SeqCst);
    }

    fn on_hidden(&self, _shown_for: Duration) {
        self.hooks.hidden.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns the same content on every call and counts the calls.
pub struct CountingLoader<T> {
    items: Vec<T>,
    calls: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> CountingLoader<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Arc<Self> {
        Arc::new(Self {
            items,
            calls: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<T: Clone + Send + Sync + 'static> Loader<T> for CountingLoader<T> {
    fn load(&self, _cx: &Cx) -> Result<Loaded<T>, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Loaded::Page(Page::last(self.items.clone())))
    }
}
