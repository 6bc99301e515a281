#![forbid(unsafe_code)]

//! Test tooling for datalist.
//!
//! - [`observer`]: recording and verifying observers that replay change
//!   events over a shadow list.
//! - [`loader`]: scripted and counting loaders, with an optional gate for
//!   threaded tests.
//! - [`watch`]: a [`WatchedData`](datalist_runtime::WatchedData) that counts
//!   registration calls.

pub mod loader;
pub mod observer;
pub mod watch;

pub use loader::{CountingLoader, Gate, ScriptedLoader};
pub use observer::{Recorder, RecordingObserver, Slot, VerifyingObserver};
pub use watch::CountingData;
