#![forbid(unsafe_code)]

//! Core primitives for datalist.
//!
//! This crate holds the pieces every other datalist crate builds on:
//!
//! - [`cx`]: cancellation contexts handed to background work.
//! - [`event`]: change events, payloads, and availability.
//! - [`observer`]: observer traits and registries.
//! - [`scheduler`]: the single-threaded schedulers data instances live on.
//! - [`poster`]: the coalescing poster used to hand results back.
//! - [`executor`]: background executors and the worker pool.
//!
//! # Role in datalist
//! `datalist-core` has no knowledge of items or loaders. The diff engine
//! (`datalist-diff`) and the data state machine (`datalist-runtime`) sit
//! on top of it.

pub mod cx;
pub mod event;
pub mod executor;
pub mod observer;
pub mod panic;
pub mod poster;
pub mod scheduler;

pub use cx::{Cx, CxController, CxError};
pub use event::{Available, ChangeEvent, ChangeKind, Payload};
pub use executor::{
    Executor, InlineExecutor, Job, ManualExecutor, PoolExecutor, WorkerPool, WorkerPoolConfig,
};
pub use observer::{
    AvailableObserver, DataObserver, ErrorObserver, LoadingObserver, ObserverError,
    ObserverRegistry,
};
pub use poster::CoalescingPoster;
pub use scheduler::{
    ImmediateScheduler, LoopHandle, LoopScheduler, ManualScheduler, Scheduler, Task,
};
