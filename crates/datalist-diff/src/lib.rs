#![forbid(unsafe_code)]

//! Sequence diffing for datalist.
//!
//! [`calculate_diff`] compares an old and a new sequence with a
//! linear-space Myers search over item identity, optionally pairs removed
//! and inserted items into moves, and produces an [`EditScript`]: an ordered
//! list of [`ChangeEvent`](datalist_core::ChangeEvent)s that, replayed over
//! the old sequence, reproduces the new one.
//!
//! # Example
//!
//! ```
//! use datalist_core::{ChangeEvent, Cx};
//! use datalist_diff::{Equality, calculate_diff};
//!
//! let (cx, _ctrl) = Cx::background();
//! let old = vec!["a", "b", "c"];
//! let new = vec!["a", "c"];
//! let script = calculate_diff(&old, &new, &Equality::by_value(), true, &cx).unwrap();
//! assert_eq!(script.events(), &[ChangeEvent::removed(1, 1)]);
//! ```
//!
//! # Failure Modes
//!
//! - Cancelling the [`Cx`](datalist_core::Cx) aborts the search with
//!   [`DiffError::Cancelled`].
//! - A panicking equality function is contained and reported as
//!   [`DiffError::Panicked`].

pub mod equality;
mod myers;
pub mod script;

use datalist_core::{Cx, panic};
use tracing::trace;
use web_time::Instant;

pub use equality::{Equality, ItemPredicate, PayloadFn};
pub use script::{DiffStats, EditScript};

/// Why a diff produced no script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// The cancellation context fired before the search finished.
    #[error("diff cancelled")]
    Cancelled,
    /// Identity or content equality was not provided.
    #[error("cannot diff without {missing} equality")]
    IncompleteEquality { missing: &'static str },
    /// An equality or payload function panicked.
    #[error("equality function panicked: {0}")]
    Panicked(String),
}

/// Compute the edit script turning `old` into `new`.
///
/// Structural events come first, then content changes in final positions.
/// With `detect_moves`, an item removed in one place and inserted in
/// another is reported as a single move.
pub fn calculate_diff<T>(
    old: &[T],
    new: &[T],
    equality: &Equality<T>,
    detect_moves: bool,
    cx: &Cx,
) -> Result<EditScript, DiffError> {
    let identity = equality
        .identity()
        .ok_or(DiffError::IncompleteEquality { missing: "identity" })?;
    let content = equality
        .content()
        .ok_or(DiffError::IncompleteEquality { missing: "content" })?;
    let payload = equality.payload();

    let start = Instant::now();
    let same = |x: usize, y: usize| identity(&old[x], &new[y]);
    let same_content = |x: usize, y: usize| content(&old[x], &new[y]);

    let outcome = panic::contain(|| -> Result<EditScript, DiffError> {
        let diagonals = myers::find_diagonals(old.len(), new.len(), &same, cx)?;
        let matching = script::Matching::new(
            old.len(),
            new.len(),
            diagonals,
            &same,
            &same_content,
            detect_moves,
            cx,
        )?;
        cx.check().map_err(|_| DiffError::Cancelled)?;
        let mut events = script::structural_events(&matching, old.len(), new.len());
        events.extend(script::change_events(&matching, |x, y| {
            payload.and_then(|f| f(&old[x], &new[y]))
        }));
        Ok(EditScript::from_events(old.len(), new.len(), events))
    });

    let script = match outcome {
        Ok(result) => result?,
        Err(message) => return Err(DiffError::Panicked(message)),
    };
    trace!(
        old_len = old.len(),
        new_len = new.len(),
        edits = script.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "diff computed"
    );
    Ok(script)
}
