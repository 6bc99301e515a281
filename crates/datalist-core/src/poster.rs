#![forbid(unsafe_code)]

//! Coalescing poster.
//!
//! Funnels tasks from any thread onto a [`Scheduler`] while keeping at most
//! one flush task outstanding. A burst of posts made before the scheduler
//! gets around to flushing costs a single scheduler round trip.
//!
//! # Invariants
//!
//! 1. Tasks run in the order they were posted.
//! 2. At most one flush is queued on the scheduler at any time.
//! 3. A task posted while a flush is draining runs either in that flush or
//!    in one scheduled after it; it is never stranded.
//!
//! # Failure Modes
//!
//! A panicking task is logged at `ERROR` and the flush continues with the
//! next task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, trace};

use crate::panic;
use crate::scheduler::{Scheduler, Task};

struct PosterInner {
    scheduler: Arc<dyn Scheduler>,
    queue: Mutex<VecDeque<Task>>,
    posted: AtomicBool,
    flushes: AtomicU64,
}

impl PosterInner {
    fn pop(&self) -> Option<Task> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn is_empty(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn claim(&self) -> bool {
        self.posted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn schedule_flush(self: &Arc<Self>) {
        if self.claim() {
            self.flushes.fetch_add(1, Ordering::Relaxed);
            let inner = Arc::clone(self);
            self.scheduler.post(Box::new(move || inner.flush()));
        }
    }

    fn flush(&self) {
        let mut ran = 0usize;
        loop {
            while let Some(task) = self.pop() {
                if let Err(message) = panic::contain(task) {
                    error!(panic = %message, "posted task panicked");
                }
                ran += 1;
            }
            self.posted.store(false, Ordering::Release);
            // A post racing the store above saw `posted` still set and did
            // not schedule; pick its task up here.
            if self.is_empty() || !self.claim() {
                break;
            }
        }
        trace!(tasks = ran, "poster flushed");
    }
}

/// Coalescing front end for a [`Scheduler`].
#[derive(Clone)]
pub struct CoalescingPoster {
    inner: Arc<PosterInner>,
}

impl CoalescingPoster {
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(PosterInner {
                scheduler,
                queue: Mutex::new(VecDeque::new()),
                posted: AtomicBool::new(false),
                flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Queue `task` and make sure a flush is scheduled.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Box::new(task));
        self.inner.schedule_flush();
    }

    /// Discard queued tasks that have not run yet. Returns how many.
    pub fn clear(&self) -> usize {
        let mut queue = self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let n = queue.len();
        queue.clear();
        n
    }

    /// Tasks waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of flush tasks handed to the scheduler so far.
    #[must_use]
    pub fn flushes_scheduled(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }
}

impl std::fmt::Debug for CoalescingPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingPoster")
            .field("pending", &self.pending())
            .field("flushes_scheduled", &self.flushes_scheduled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{LoopScheduler, ManualScheduler};
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn manual() -> (Arc<ManualScheduler>, CoalescingPoster) {
        let scheduler = Arc::new(ManualScheduler::new());
        let poster = CoalescingPoster::new(Arc::clone(&scheduler) as Arc<dyn Scheduler>);
        (scheduler, poster)
    }

    #[test]
    fn burst_of_posts_costs_one_flush() {
        let (scheduler, poster) = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let log = Arc::clone(&log);
            poster.post(move || log.lock().unwrap().push(i));
        }
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(poster.flushes_scheduled(), 1);
        scheduler.run_until_idle();
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert_eq!(poster.pending(), 0);
    }

    #[test]
    fn post_after_drain_schedules_new_flush() {
        let (scheduler, poster) = manual();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        poster.post(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.run_until_idle();
        let h = Arc::clone(&hits);
        poster.post(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(poster.flushes_scheduled(), 2);
        scheduler.run_until_idle();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn post_from_inside_flush_runs_in_same_flush() {
        let (scheduler, poster) = manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner_poster = poster.clone();
        let l = Arc::clone(&log);
        poster.post(move || {
            l.lock().unwrap().push("outer");
            let l = Arc::clone(&l);
            inner_poster.post(move || l.lock().unwrap().push("nested"));
        });
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["outer", "nested"]);
        assert_eq!(poster.flushes_scheduled(), 1);
    }

    #[test]
    fn panicking_task_does_not_strand_followers() {
        let (scheduler, poster) = manual();
        let hits = Arc::new(AtomicUsize::new(0));
        poster.post(|| {
            if poster_should_fail() {
                panic!("posted failure");
            }
        });
        let h = Arc::clone(&hits);
        poster.post(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.run_until_idle();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let h = Arc::clone(&hits);
        poster.post(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.run_until_idle();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    fn poster_should_fail() -> bool {
        true
    }

    #[test]
    fn clear_drops_unflushed_tasks() {
        let (scheduler, poster) = manual();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        poster.post(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(poster.clear(), 1);
        scheduler.run_until_idle();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_producers_preserve_per_thread_order() {
        let lp = LoopScheduler::start("datalist-test-poster").unwrap();
        let poster = CoalescingPoster::new(lp.scheduler());
        let log = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..4)
            .map(|t| {
                let poster = poster.clone();
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..250 {
                        let log = Arc::clone(&log);
                        poster.post(move || log.lock().unwrap().push((t, i)));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        lp.shutdown();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1000);
        for t in 0..4 {
            let seq: Vec<_> = log.iter().filter(|(p, _)| *p == t).map(|(_, i)| *i).collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
    }
}
