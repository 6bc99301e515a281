#![forbid(unsafe_code)]

//! Incremental (paged) loading.
//!
//! [`IncrementalData`] is a [`Data`] whose loader is asked for one page at a
//! time: the first page after a reset replaces the content, later pages are
//! appended. The next page is requested explicitly with
//! [`IncrementalData::load_next`] or implicitly when an item close to the
//! end is presented.
//!
//! [`OffsetLoader`] adapts an offset/limit [`PageSource`] into a paged
//! [`Loader`].
//!
//! # Invariants
//!
//! 1. `load_next` does nothing while a load is running or once the source
//!    reported that nothing remains.
//! 2. A reset (first subscription, refresh, reload, invalidate) restarts the
//!    offset at zero before the first page is requested.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use datalist_core::{Available, Cx, CxError, Executor, Scheduler};
use datalist_diff::Equality;
use tracing::trace;

use crate::config::{DataConfig, PagingConfig};
use crate::data::Data;
use crate::error::{BoxError, LoadError, Result};
use crate::loader::{Loaded, Loader, Page};

/// Paged data instance.
pub struct IncrementalData<T> {
    data: Data<T>,
}

impl<T> Clone for IncrementalData<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl<T> std::fmt::Debug for IncrementalData<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("IncrementalData").field(&self.data).finish()
    }
}

impl<T> IncrementalData<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Build a paged instance. `config.incremental` is forced on.
    pub fn new(
        loader: impl Loader<T>,
        scheduler: Arc<dyn Scheduler>,
        executor: Arc<dyn Executor>,
        config: DataConfig,
        equality: Equality<T>,
    ) -> Self {
        let config = DataConfig {
            incremental: true,
            ..config
        };
        Self {
            data: Data::builder(loader, scheduler, executor)
                .config(config)
                .equality(equality)
                .build(),
        }
    }

    /// Request the next page.
    ///
    /// Ignored while loading, once exhausted, without observers, or after
    /// dispose. A pending reset loads the first page instead.
    pub fn load_next(&self) {
        self.data.load_next();
    }

    /// Item at `position` for presentation; requests the next page when
    /// `position` is within the look-ahead window of the end.
    #[must_use]
    pub fn get_presented(&self, position: usize) -> Option<T> {
        self.data.get_presented(position)
    }

    /// The underlying data handle.
    #[must_use]
    pub fn data(&self) -> &Data<T> {
        &self.data
    }
}

impl<T> Deref for IncrementalData<T> {
    type Target = Data<T>;

    fn deref(&self) -> &Data<T> {
        &self.data
    }
}

// ─── Offset paging ─────────────────────────────────────────────────────────

/// One page returned by a [`PageSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage<T> {
    pub items: Vec<T>,
    /// Total size of the source, if known.
    pub total: Option<usize>,
}

/// Offset/limit access to a remote or local collection.
pub trait PageSource<T>: Send + Sync + 'static {
    fn fetch(&self, offset: usize, limit: usize, cx: &Cx) -> FetchResult<T>;
}

pub type FetchResult<T> = std::result::Result<FetchedPage<T>, BoxError>;

impl<T, F> PageSource<T> for F
where
    F: Fn(usize, usize, &Cx) -> FetchResult<T> + Send + Sync + 'static,
{
    fn fetch(&self, offset: usize, limit: usize, cx: &Cx) -> FetchResult<T> {
        self(offset, limit, cx)
    }
}

/// Paged [`Loader`] over a [`PageSource`].
///
/// Tracks the offset of the next page. The offset returns to zero when a
/// fresh load sequence begins or the data instance is invalidated; a fetch
/// that straddles such a reset, or whose context was cancelled, leaves the
/// cursor untouched.
pub struct OffsetLoader<S> {
    source: S,
    page_size: usize,
    cursor: Mutex<Cursor>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    offset: usize,
    /// Source size reported by the last page.
    total: Option<usize>,
    /// Bumped on every reset.
    generation: u64,
}

impl<S> OffsetLoader<S> {
    pub fn new(source: S, paging: &PagingConfig) -> Result<Self> {
        paging.validate()?;
        Ok(Self {
            source,
            page_size: paging.page_size,
            cursor: Mutex::new(Cursor::default()),
        })
    }

    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offset of the next page.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.cursor().offset
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn reset(&self) {
        let mut cursor = self.cursor();
        *cursor = Cursor {
            generation: cursor.generation + 1,
            ..Cursor::default()
        };
    }
}

impl<T, S> Loader<T> for OffsetLoader<S>
where
    T: Send + 'static,
    S: PageSource<T>,
{
    fn load(&self, cx: &Cx) -> std::result::Result<Loaded<T>, LoadError> {
        let start = *self.cursor();
        if start.total.is_some_and(|total| start.offset >= total) {
            return Ok(Loaded::NoMoreData);
        }
        let page = self
            .source
            .fetch(start.offset, self.page_size, cx)
            .map_err(LoadError::loader)?;

        let mut cursor = self.cursor();
        if cx.is_cancelled() || cursor.generation != start.generation {
            trace!(offset = start.offset, "page discarded; cursor was reset");
            return Err(LoadError::loader(CxError::Cancelled));
        }
        if page.items.is_empty() {
            trace!(offset = start.offset, "page source exhausted");
            return Ok(Loaded::NoMoreData);
        }
        let consumed = start.offset + page.items.len();
        cursor.offset = consumed;
        let available = match page.total {
            Some(total) => {
                cursor.total = Some(total);
                Available::remaining(total, consumed)
            }
            None => Available::Unbounded,
        };
        drop(cursor);
        trace!(
            offset = start.offset,
            fetched = page.items.len(),
            available = %available,
            "page fetched"
        );
        Ok(Loaded::Page(Page::with_available(page.items, available)))
    }

    fn on_load_begin(&self) {
        self.reset();
    }

    fn on_invalidate(&self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(total: usize) -> impl PageSource<usize> {
        move |offset: usize, limit: usize, _cx: &Cx| -> FetchResult<usize> {
            let end = (offset + limit).min(total);
            Ok(FetchedPage {
                items: (offset..end).collect(),
                total: Some(total),
            })
        }
    }

    #[test]
    fn offset_loader_walks_pages_until_exhausted() {
        let loader = OffsetLoader::new(numbers(25), &PagingConfig::with_page_size(10)).unwrap();
        let (cx, _ctrl) = Cx::background();
        let mut seen = Vec::new();
        loop {
            match loader.load(&cx).unwrap() {
                Loaded::Page(page) => {
                    seen.extend(page.items);
                    if page.available.is_exhausted() {
                        break;
                    }
                }
                Loaded::NoMoreData => break,
            }
        }
        assert_eq!(seen, (0..25).collect::<Vec<_>>());
        assert_eq!(loader.offset(), 25);
        assert_eq!(loader.load(&cx).unwrap(), Loaded::NoMoreData);
    }

    #[test]
    fn reset_restarts_from_zero() {
        let loader = OffsetLoader::new(numbers(5), &PagingConfig::with_page_size(3)).unwrap();
        let (cx, _ctrl) = Cx::background();
        let _ = loader.load(&cx).unwrap();
        assert_eq!(loader.offset(), 3);
        Loader::<usize>::on_invalidate(&loader);
        assert_eq!(loader.offset(), 0);
        let Loaded::Page(page) = loader.load(&cx).unwrap() else {
            panic!("expected a page");
        };
        assert_eq!(page.items, vec![0, 1, 2]);
        assert_eq!(page.available, Available::Count(2));
    }

    #[test]
    fn unknown_total_is_unbounded() {
        let source = |offset: usize, _limit: usize, _cx: &Cx| -> FetchResult<char> {
            Ok(FetchedPage {
                items: if offset == 0 { vec!['a', 'b'] } else { Vec::new() },
                total: None,
            })
        };
        let loader = OffsetLoader::new(source, &PagingConfig::with_page_size(2)).unwrap();
        let (cx, _ctrl) = Cx::background();
        assert_eq!(
            loader.load(&cx).unwrap(),
            Loaded::Page(Page::with_available(vec!['a', 'b'], Available::Unbounded))
        );
        assert_eq!(loader.load(&cx).unwrap(), Loaded::NoMoreData);
    }

    #[test]
    fn source_errors_become_load_errors() {
        let source =
            |_offset: usize, _limit: usize, _cx: &Cx| -> FetchResult<u8> { Err("backend unavailable".into()) };
        let loader = OffsetLoader::new(source, &PagingConfig::default()).unwrap();
        let (cx, _ctrl) = Cx::background();
        let err = loader.load(&cx).unwrap_err();
        assert_eq!(err.to_string(), "loader failed: backend unavailable");
        assert_eq!(loader.offset(), 0);
    }

    #[test]
    fn cancelled_fetch_leaves_the_offset_alone() {
        let (cx, ctrl) = Cx::background();
        let ctrl = Arc::new(ctrl);
        let source = {
            let ctrl = Arc::clone(&ctrl);
            move |offset: usize, limit: usize, _cx: &Cx| -> FetchResult<usize> {
                ctrl.cancel();
                Ok(FetchedPage {
                    items: (offset..offset + limit).collect(),
                    total: Some(100),
                })
            }
        };
        let loader = OffsetLoader::new(source, &PagingConfig::with_page_size(10)).unwrap();
        let err = loader.load(&cx).unwrap_err();
        assert_eq!(err.to_string(), "loader failed: context cancelled");
        assert_eq!(loader.offset(), 0);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(OffsetLoader::new(numbers(1), &PagingConfig::with_page_size(0)).is_err());
    }
}
