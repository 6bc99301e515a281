#![forbid(unsafe_code)]

//! Serialized content mutations.
//!
//! Mutations of one data instance are applied strictly one at a time in
//! submission order. An overwrite with a diff occupies the queue until its
//! result has been applied, so no mutation ever lands on content that a
//! diff in flight has not seen.
//!
//! # Invariants
//!
//! 1. At most one diff is in flight per queue.
//! 2. With coalescing, a new overwrite drops every mutation still pending
//!    (none of them is observable once it lands).
//! 3. A finished diff is accepted only if its ticket matches the one in
//!    flight; anything else is stale.

use std::collections::VecDeque;

use datalist_core::CxController;

/// A requested change to the content.
#[derive(Debug)]
pub(crate) enum Mutation<T> {
    Overwrite(Vec<T>),
    Append(Vec<T>),
    Prepend(Vec<T>),
    Clear,
}

impl<T> Mutation<T> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Overwrite(_) => "overwrite",
            Self::Append(_) => "append",
            Self::Prepend(_) => "prepend",
            Self::Clear => "clear",
        }
    }
}

/// Who asked for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Caller,
    Load,
}

#[derive(Debug)]
pub(crate) struct Queued<T> {
    pub mutation: Mutation<T>,
    pub origin: Origin,
}

/// The diff currently computing.
#[derive(Debug)]
pub(crate) struct InFlight {
    pub ticket: u64,
    pub origin: Origin,
    pub ctrl: CxController,
}

#[derive(Debug)]
pub(crate) struct MutationQueue<T> {
    pending: VecDeque<Queued<T>>,
    in_flight: Option<InFlight>,
    next_ticket: u64,
}

impl<T> MutationQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            next_ticket: 1,
        }
    }

    /// Enqueue a mutation. Returns how many pending mutations it superseded.
    pub fn push(&mut self, queued: Queued<T>, coalesce: bool) -> usize {
        let superseded = if coalesce && matches!(queued.mutation, Mutation::Overwrite(_)) {
            let n = self.pending.len();
            self.pending.clear();
            n
        } else {
            0
        };
        self.pending.push_back(queued);
        superseded
    }

    /// Next mutation to apply, unless a diff is in flight.
    pub fn pop_ready(&mut self) -> Option<Queued<T>> {
        if self.in_flight.is_some() {
            return None;
        }
        self.pending.pop_front()
    }

    /// Mark a diff as in flight and return its ticket.
    pub fn begin_diff(&mut self, origin: Origin, ctrl: CxController) -> u64 {
        debug_assert!(self.in_flight.is_none(), "second diff started");
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(InFlight {
            ticket,
            origin,
            ctrl,
        });
        ticket
    }

    /// Claim the in-flight diff if `ticket` is current.
    pub fn finish_diff(&mut self, ticket: u64) -> Option<InFlight> {
        match &self.in_flight {
            Some(flight) if flight.ticket == ticket => self.in_flight.take(),
            _ => None,
        }
    }

    /// Drop pending mutations and abandon the diff in flight.
    ///
    /// Returns the dropped pending count and whether any dropped work came
    /// from a load.
    pub fn cancel(&mut self) -> (usize, bool) {
        let mut lost_load = self.pending.iter().any(|q| q.origin == Origin::Load);
        let dropped = self.pending.len();
        self.pending.clear();
        if let Some(flight) = self.in_flight.take() {
            flight.ctrl.cancel();
            lost_load |= flight.origin == Origin::Load;
        }
        (dropped, lost_load)
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    /// Whether load results are still waiting to land.
    pub fn has_load_work(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.origin == Origin::Load)
            || self.pending.iter().any(|q| q.origin == Origin::Load)
    }
}
