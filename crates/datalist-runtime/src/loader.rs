#![forbid(unsafe_code)]

//! The loader contract.
//!
//! A [`Loader`] produces content for a data instance. `load` runs on an
//! executor thread and must poll its [`Cx`] at natural yield points; the
//! lifecycle hooks run synchronously on the scheduler thread.

use std::sync::Arc;

use datalist_core::{Available, Cx};
use web_time::Duration;

use crate::error::LoadError;

/// One delivery of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// What the source can still deliver after this page.
    pub available: Available,
}

impl<T> Page<T> {
    /// A page after which nothing more can be loaded.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            available: Available::Count(0),
        }
    }

    #[must_use]
    pub fn with_available(items: Vec<T>, available: Available) -> Self {
        Self { items, available }
    }
}

/// Result of a successful `load` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    Page(Page<T>),
    /// The source is exhausted; no items were produced.
    NoMoreData,
}

/// Produces content for a data instance.
pub trait Loader<T>: Send + Sync + 'static {
    /// Produce the next delivery. Runs off the scheduler thread.
    fn load(&self, cx: &Cx) -> Result<Loaded<T>, LoadError>;

    /// A fresh load sequence is starting (first page of a reset).
    fn on_load_begin(&self) {}

    /// The instance was invalidated; pagination state should reset.
    fn on_invalidate(&self) {}

    /// Content is about to be cleared.
    fn on_clear(&self) {}

    /// The instance became visible after being hidden for `hidden_for`.
    fn on_shown(&self, hidden_for: Duration) {
        let _ = hidden_for;
    }

    /// The instance became hidden after being visible for `shown_for`.
    fn on_hidden(&self, shown_for: Duration) {
        let _ = shown_for;
    }
}

impl<T, L> Loader<T> for Arc<L>
where
    L: Loader<T> + ?Sized,
{
    fn load(&self, cx: &Cx) -> Result<Loaded<T>, LoadError> {
        (**self).load(cx)
    }

    fn on_load_begin(&self) {
        (**self).on_load_begin();
    }

    fn on_invalidate(&self) {
        (**self).on_invalidate();
    }

    fn on_clear(&self) {
        (**self).on_clear();
    }

    fn on_shown(&self, hidden_for: Duration) {
        (**self).on_shown(hidden_for);
    }

    fn on_hidden(&self, shown_for: Duration) {
        (**self).on_hidden(shown_for);
    }
}

/// Adapts a closure returning the whole content into a [`Loader`].
pub struct FnLoader<F> {
    f: F,
}

impl<F> FnLoader<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<T, F> Loader<T> for FnLoader<F>
where
    F: Fn(&Cx) -> Result<Vec<T>, LoadError> + Send + Sync + 'static,
{
    fn load(&self, cx: &Cx) -> Result<Loaded<T>, LoadError> {
        (self.f)(cx).map(|items| Loaded::Page(Page::last(items)))
    }
}

/// Whole-content loader from a closure.
pub fn from_fn<T, F>(f: F) -> FnLoader<F>
where
    F: Fn(&Cx) -> Result<Vec<T>, LoadError> + Send + Sync + 'static,
{
    FnLoader::new(f)
}
