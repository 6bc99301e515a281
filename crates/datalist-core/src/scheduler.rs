#![forbid(unsafe_code)]

//! Single-threaded schedulers.
//!
//! Every data instance is bound to one [`Scheduler`]: its state is mutated
//! and its observers are notified only from tasks the scheduler runs.
//! Background work hands results back by posting a task.
//!
//! Three implementations are provided:
//!
//! - [`ImmediateScheduler`] runs posted tasks inline on the posting thread.
//!   Only meaningful when all work is synchronous.
//! - [`ManualScheduler`] queues tasks until the owning thread calls
//!   [`ManualScheduler::run_until_idle`]. Deterministic; used by tests.
//! - [`LoopScheduler`] owns a dedicated named thread that runs tasks in
//!   FIFO order, like a UI main loop.
//!
//! # Failure Modes
//!
//! A panicking task is logged at `ERROR`; the scheduler keeps running the
//! tasks behind it.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, error, warn};

use crate::panic;

/// A unit of work for a scheduler or executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Serial task runner bound to one logical thread.
pub trait Scheduler: Send + Sync + 'static {
    /// Enqueue `task`. Tasks posted from one thread run in posting order.
    fn post(&self, task: Task);

    /// Whether the calling thread is the scheduler's thread.
    fn is_current(&self) -> bool;
}

fn run_contained(task: Task, scheduler: &'static str) {
    if let Err(message) = panic::contain(task) {
        error!(scheduler, panic = %message, "scheduled task panicked");
    }
}

// ─── ImmediateScheduler ──────────────────────────────────────────────────────

/// Runs every task inline, on whatever thread posts it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn post(&self, task: Task) {
        run_contained(task, "immediate");
    }

    fn is_current(&self) -> bool {
        true
    }
}

// ─── ManualScheduler ─────────────────────────────────────────────────────────

/// Queue drained explicitly by its owning thread.
///
/// The thread that constructs the scheduler is its "current" thread.
pub struct ManualScheduler {
    owner: ThreadId,
    queue: Mutex<VecDeque<Task>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn pop(&self) -> Option<Task> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run the oldest queued task. Returns `false` if the queue was empty.
    pub fn run_one(&self) -> bool {
        debug_assert!(self.is_current(), "ManualScheduler driven off its thread");
        match self.pop() {
            Some(task) => {
                run_contained(task, "manual");
                true
            }
            None => false,
        }
    }

    /// Run tasks, including ones posted while running, until none remain.
    /// Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn post(&self, task: Task) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("owner", &self.owner)
            .field("pending", &self.pending())
            .finish()
    }
}

// ─── LoopScheduler ───────────────────────────────────────────────────────────

enum LoopMsg {
    Run(Task),
    Shutdown,
}

/// Cloneable handle that posts onto a [`LoopScheduler`] thread.
#[derive(Clone)]
pub struct LoopHandle {
    sender: mpsc::Sender<LoopMsg>,
    thread_id: ThreadId,
}

impl LoopHandle {
    /// Run `f` on the loop thread and wait for its result.
    ///
    /// Returns `None` if the loop has shut down or `f` panicked.
    /// Must not be called from the loop thread itself.
    pub fn call<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        debug_assert!(!self.is_current(), "LoopHandle::call would deadlock");
        let (tx, rx) = mpsc::sync_channel(1);
        self.post(Box::new(move || {
            let _ = tx.send(f());
        }));
        rx.recv().ok()
    }
}

impl Scheduler for LoopHandle {
    fn post(&self, task: Task) {
        if self.sender.send(LoopMsg::Run(task)).is_err() {
            warn!("loop scheduler has shut down; task dropped");
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

/// Owner of a dedicated scheduler thread.
///
/// Tasks run one at a time in FIFO order. Dropping the owner (or calling
/// [`LoopScheduler::shutdown`]) runs every task already queued, then joins
/// the thread. Tasks posted after shutdown are dropped with a warning.
pub struct LoopScheduler {
    handle: LoopHandle,
    thread: Option<JoinHandle<()>>,
}

impl LoopScheduler {
    /// Spawn the scheduler thread with the given name.
    pub fn start(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<LoopMsg>();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(&rx))?;
        debug!(name = %name, "loop scheduler started");
        Ok(Self {
            handle: LoopHandle {
                sender: tx,
                thread_id: thread.thread().id(),
            },
            thread: Some(thread),
        })
    }

    /// A posting handle for this loop.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Shared scheduler reference suitable for data construction.
    #[must_use]
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::new(self.handle.clone())
    }

    /// Run queued tasks, then stop and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.handle.sender.send(LoopMsg::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                warn!("loop scheduler dropped on its own thread; not joining");
                return;
            }
            let _ = thread.join();
        }
    }
}

impl Drop for LoopScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(rx: &mpsc::Receiver<LoopMsg>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            LoopMsg::Run(task) => run_contained(task, "loop"),
            LoopMsg::Shutdown => break,
        }
    }
    debug!("loop scheduler stopped");
}
