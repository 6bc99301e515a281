#![forbid(unsafe_code)]

//! Cancellation context (`Cx`) for background loads and diffs.
//!
//! Every unit of work a data instance hands to an executor carries a `Cx`.
//! The worker checks `cx.is_cancelled()` at natural yield points and bails
//! out early; the owner holds the companion [`CxController`] and cancels it
//! when the work is superseded (refresh, invalidate, last observer leaving,
//! dispose).
//!
//! # Design
//!
//! `Cx` is cheaply cloneable (`Arc` inside) and immutable from the outside.
//! Contexts form a parent chain: a data instance owns one root context and
//! derives a child per job, so cancelling the root (on dispose) reaches
//! every job that is still running.
//!
//! # Invariants
//!
//! 1. Cancellation is monotonic: once `is_cancelled()` returns `true` it
//!    never returns `false` again.
//! 2. Cancelling a parent is observed by every descendant.
//! 3. Dropping a [`CxController`] does not cancel anything.
//!
//! # Tracing
//!
//! The first cancellation of a context emits a `DEBUG` event with `cx_id`
//! and bumps a process-wide counter ([`cx_cancellations_total`]).
//!
//! # Example
//!
//! ```
//! use datalist_core::cx::Cx;
//!
//! let (root, root_ctrl) = Cx::background();
//! let (job, _job_ctrl) = root.child();
//! assert!(!job.is_cancelled());
//!
//! root_ctrl.cancel();
//! assert!(job.is_cancelled());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::debug;
use web_time::{Duration, Instant};

// ─── Cx ID generation ────────────────────────────────────────────────────────

static NEXT_CX_ID: AtomicU64 = AtomicU64::new(1);

fn next_cx_id() -> u64 {
    NEXT_CX_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Metrics counters ────────────────────────────────────────────────────────

/// Total number of Cx cancellations observed.
static CX_CANCELLATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total cancellation count (for diagnostics/telemetry).
#[must_use]
pub fn cx_cancellations_total() -> u64 {
    CX_CANCELLATIONS_TOTAL.load(Ordering::Relaxed)
}

// ─── Inner shared state ──────────────────────────────────────────────────────

#[derive(Debug)]
struct CxInner {
    id: u64,
    cancelled: AtomicBool,
    created_at: Instant,
    parent: Option<Arc<CxInner>>,
}

impl CxInner {
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_cancelled(),
            None => false,
        }
    }
}

// ─── Cx ──────────────────────────────────────────────────────────────────────

/// Cancellation context handle.
///
/// Cheaply cloneable. Check `is_cancelled()` at natural yield points
/// (loop iterations, before I/O, before expensive computation).
#[derive(Clone, Debug)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    /// Create a root context.
    #[must_use]
    pub fn background() -> (Self, CxController) {
        Self::new_inner(None)
    }

    /// Derive a child context. Cancelling `self` also cancels the child.
    #[must_use]
    pub fn child(&self) -> (Self, CxController) {
        Self::new_inner(Some(Arc::clone(&self.inner)))
    }

    fn new_inner(parent: Option<Arc<CxInner>>) -> (Self, CxController) {
        let inner = Arc::new(CxInner {
            id: next_cx_id(),
            cancelled: AtomicBool::new(false),
            created_at: Instant::now(),
            parent,
        });
        let cx = Self {
            inner: Arc::clone(&inner),
        };
        (cx, CxController { inner })
    }

    /// Unique identifier for this context (for tracing/logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Check if this context (or any ancestor) has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Instant::now()
            .checked_duration_since(self.inner.created_at)
            .unwrap_or(Duration::ZERO)
    }

    /// Check if the context is still live; return `Err` if cancelled.
    ///
    /// Intended for use at yield points:
    /// ```ignore
    /// cx.check()?;
    /// // ... continue work ...
    /// ```
    pub fn check(&self) -> Result<(), CxError> {
        if self.is_cancelled() {
            return Err(CxError::Cancelled);
        }
        Ok(())
    }

    /// Sleep for the given duration, waking early on cancellation.
    ///
    /// Returns `true` if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let chunk = Duration::from_millis(5);
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = remaining.min(chunk);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        !self.is_cancelled()
    }
}

// ─── CxController ────────────────────────────────────────────────────────────

/// Control handle for a [`Cx`].
///
/// Held by the owner of the context to trigger cancellation.
/// Dropping the controller does **not** cancel the context.
#[derive(Debug)]
pub struct CxController {
    inner: Arc<CxInner>,
}

impl CxController {
    /// Cancel the associated context and all of its children.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::AcqRel);
        if !was_cancelled {
            CX_CANCELLATIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
            debug!(cx_id = self.inner.id, "cx cancelled");
        }
    }

    /// Whether this context (or an ancestor) has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Identifier of the controlled context.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

// ─── CxError ─────────────────────────────────────────────────────────────────

/// Error returned when an operation is abandoned via `Cx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CxError {
    /// The context was explicitly cancelled.
    #[error("context cancelled")]
    Cancelled,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
