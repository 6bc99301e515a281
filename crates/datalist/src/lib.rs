#![forbid(unsafe_code)]

//! datalist public facade crate.
//!
//! Re-exports the stable surface of the datalist crates: observable,
//! lazily loaded lists that diff new content off the scheduler thread and
//! report fine-grained change events.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use datalist::prelude::*;
//!
//! let data = Data::builder(
//!     from_fn(|_cx: &Cx| Ok(vec!["a", "b", "c"])),
//!     Arc::new(ImmediateScheduler),
//!     Arc::new(InlineExecutor),
//! )
//! .equality(Equality::by_value())
//! .build();
//!
//! let events = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&events);
//! data.register_data_observer(Arc::new(move |event: &ChangeEvent| {
//!     sink.lock().unwrap().push(event.clone());
//! }))
//! .unwrap();
//!
//! assert_eq!(data.size(), 3);
//! assert_eq!(*events.lock().unwrap(), vec![ChangeEvent::inserted(0, 3)]);
//! ```

pub use datalist_core as core;
pub use datalist_diff as diff;
pub use datalist_runtime as runtime;

pub mod prelude {
    pub use datalist_core::{
        Available, ChangeEvent, ChangeKind, Cx, CxController, DataObserver, ErrorObserver,
        Executor, ImmediateScheduler, InlineExecutor, LoadingObserver, LoopScheduler, Payload,
        Scheduler, WorkerPool, WorkerPoolConfig,
    };
    pub use datalist_diff::{EditScript, Equality, calculate_diff};
    pub use datalist_runtime::{
        Data, DataConfig, DataError, DataId, DataWatcher, FetchedPage, ImmutableData,
        IncrementalData, LoadError, Loaded, Loader, OffsetLoader, Page, PageSource,
        PagingConfig, Phase, WatchedData, WatcherCallbacks, from_fn,
    };
}
