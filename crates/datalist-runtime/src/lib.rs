#![forbid(unsafe_code)]

//! Runtime: observable data instances on top of the core primitives.
//!
//! - [`Data`]: the lazily loaded, diff-notifying state machine.
//! - [`IncrementalData`] and [`OffsetLoader`]: page-by-page loading.
//! - [`ImmutableData`]: fixed content behind the same surface.
//! - [`DataWatcher`]: observer registration across a changing set of
//!   instances.
//! - [`ListStore`]: the notifying sequence every instance owns.

pub mod config;
pub mod data;
pub mod error;
pub mod immutable;
pub mod incremental;
pub mod loader;
mod mutation;
pub mod store;
pub mod watcher;

pub use config::{DataConfig, PagingConfig};
pub use data::{Data, DataBuilder, DataId, Phase, SnapshotIter};
pub use error::{BoxError, DataError, LoadError, Result};
pub use immutable::ImmutableData;
pub use incremental::{FetchResult, FetchedPage, IncrementalData, OffsetLoader, PageSource};
pub use loader::{FnLoader, Loaded, Loader, Page, from_fn};
pub use store::ListStore;
pub use watcher::{DataWatcher, WatchedData, WatcherCallbacks};
