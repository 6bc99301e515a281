#![forbid(unsafe_code)]

//! Background executors for loads and diffs.
//!
//! - [`InlineExecutor`] runs jobs on the submitting thread.
//! - [`ManualExecutor`] queues jobs until a test runs them.
//! - [`WorkerPool`] owns a fixed set of named worker threads.
//!
//! # Failure Modes
//!
//! A panicking job is logged at `ERROR`; the worker thread survives.
//! Jobs submitted after the pool shut down are dropped with a `WARN`.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use crate::panic;
use crate::scheduler::Task;

/// A unit of background work.
pub type Job = Task;

/// Runs jobs off the scheduler thread.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, job: Job);
}

fn run_job(job: Job, executor: &'static str) {
    if let Err(message) = panic::contain(job) {
        error!(executor, panic = %message, "background job panicked");
    }
}

/// Runs each job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        run_job(job, "inline");
    }
}

/// Holds jobs until they are run explicitly.
#[derive(Default)]
pub struct ManualExecutor {
    jobs: Mutex<VecDeque<Job>>,
}

impl ManualExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn pop_front(&self) -> Option<Job> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run the oldest job. Returns `false` if none was queued.
    pub fn run_next(&self) -> bool {
        match self.pop_front() {
            Some(job) => {
                run_job(job, "manual");
                true
            }
            None => false,
        }
    }

    /// Run the newest job, leaving older ones queued.
    pub fn run_last(&self) -> bool {
        let job = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_back();
        match job {
            Some(job) => {
                run_job(job, "manual");
                true
            }
            None => false,
        }
    }

    /// Run jobs (including ones submitted meanwhile) until none remain.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(job);
    }
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

// ─── WorkerPool ──────────────────────────────────────────────────────────────

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    ///
    /// Default: available parallelism, clamped to `1..=4`.
    pub threads: usize,

    /// Name given to every worker thread.
    ///
    /// Default: `"datalist-worker"`.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let threads = thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
            .clamp(1, 4);
        Self {
            threads,
            thread_name: "datalist-worker".to_owned(),
        }
    }
}

enum WorkerMsg {
    Run(Job),
    Shutdown,
}

/// Cloneable submission handle for a [`WorkerPool`].
#[derive(Clone)]
pub struct PoolExecutor {
    sender: mpsc::Sender<WorkerMsg>,
}

impl Executor for PoolExecutor {
    fn execute(&self, job: Job) {
        if self.sender.send(WorkerMsg::Run(job)).is_err() {
            warn!("worker pool has shut down; job dropped");
        }
    }
}

impl std::fmt::Debug for PoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolExecutor").finish_non_exhaustive()
    }
}

/// Owner of a fixed set of worker threads sharing one job queue.
///
/// Dropping the pool (or calling [`WorkerPool::shutdown`]) lets workers
/// finish every job already queued, then joins them.
pub struct WorkerPool {
    executor: PoolExecutor,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the workers described by `config` (at least one).
    pub fn start(config: &WorkerPoolConfig) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<WorkerMsg>();
        let rx = Arc::new(Mutex::new(rx));
        let count = config.threads.max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let rx = Arc::clone(&rx);
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name))
                .spawn(move || worker_loop(&rx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    let partial = Self {
                        executor: PoolExecutor { sender: tx },
                        workers,
                    };
                    drop(partial);
                    return Err(err);
                }
            }
        }
        debug!(threads = count, name = %config.thread_name, "worker pool started");
        Ok(Self {
            executor: PoolExecutor { sender: tx },
            workers,
        })
    }

    /// A submission handle.
    #[must_use]
    pub fn executor(&self) -> PoolExecutor {
        self.executor.clone()
    }

    /// Shared executor reference suitable for data construction.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn Executor> {
        Arc::new(self.executor.clone())
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Finish queued jobs, then stop and join every worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.executor.sender.send(WorkerMsg::Shutdown);
        }
        let me = thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() == me {
                warn!("worker pool dropped on a worker thread; not joining it");
                continue;
            }
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(rx: &Mutex<mpsc::Receiver<WorkerMsg>>) {
    loop {
        let msg = rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
        match msg {
            Ok(WorkerMsg::Run(job)) => run_job(job, "pool"),
            Ok(WorkerMsg::Shutdown) | Err(_) => return,
        }
    }
}
