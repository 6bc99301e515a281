#![forbid(unsafe_code)]

//! Edit scripts: turning matched diagonals into change events.
//!
//! # Design
//!
//! Structural events (removals, insertions, moves) are produced by walking
//! the diagonals from the end of both sequences towards the start, so an
//! event never shifts the positions of events still to come. Adjacent
//! single-item insertions and removals are batched into ranges.
//!
//! Content changes are collected separately and emitted after every
//! structural event, in final (new-sequence) positions, coalesced into
//! contiguous ranges.
//!
//! # Invariants
//!
//! 1. Replaying the events in order over a shadow of the old sequence
//!    yields a sequence whose length equals the new one.
//! 2. Every unchanged item keeps its identity across the replay.
//! 3. No event has a zero count.

use datalist_core::{ChangeEvent, ChangeKind, Cx, Payload};

use crate::DiffError;
use crate::myers::Diagonal;

/// Outcome of matching one item against the other sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Unmatched,
    /// Paired on a diagonal (stays in place relative to its neighbours).
    Matched { partner: usize, changed: bool },
    /// Paired off-diagonal; reported as a move.
    Moved { partner: usize, changed: bool },
}

impl Status {
    fn changed(self) -> bool {
        matches!(
            self,
            Self::Matched { changed: true, .. } | Self::Moved { changed: true, .. }
        )
    }
}

/// Item pairing between old and new sequences.
pub(crate) struct Matching {
    pub diagonals: Vec<Diagonal>,
    pub old: Vec<Status>,
    pub new: Vec<Status>,
}

impl Matching {
    /// Pair items along `diagonals` and, optionally, detect moves.
    pub fn new<S, C>(
        old_len: usize,
        new_len: usize,
        mut diagonals: Vec<Diagonal>,
        same: &S,
        same_content: &C,
        detect_moves: bool,
        cx: &Cx,
    ) -> Result<Self, DiffError>
    where
        S: Fn(usize, usize) -> bool,
        C: Fn(usize, usize) -> bool,
    {
        if diagonals.first().is_none_or(|d| d.x != 0 || d.y != 0) {
            diagonals.insert(0, Diagonal { x: 0, y: 0, size: 0 });
        }
        diagonals.push(Diagonal {
            x: old_len,
            y: new_len,
            size: 0,
        });

        let mut matching = Self {
            diagonals,
            old: vec![Status::Unmatched; old_len],
            new: vec![Status::Unmatched; new_len],
        };
        for d in &matching.diagonals {
            for offset in 0..d.size {
                let (x, y) = (d.x + offset, d.y + offset);
                let changed = !same_content(x, y);
                matching.old[x] = Status::Matched { partner: y, changed };
                matching.new[y] = Status::Matched { partner: x, changed };
            }
        }
        if detect_moves {
            matching.find_moves(same, same_content, cx)?;
        }
        Ok(matching)
    }

    fn find_moves<S, C>(&mut self, same: &S, same_content: &C, cx: &Cx) -> Result<(), DiffError>
    where
        S: Fn(usize, usize) -> bool,
        C: Fn(usize, usize) -> bool,
    {
        let mut x = 0;
        for i in 0..self.diagonals.len() {
            let d = self.diagonals[i];
            while x < d.x {
                if self.old[x] == Status::Unmatched {
                    cx.check().map_err(|_| DiffError::Cancelled)?;
                    self.match_addition(x, same, same_content);
                }
                x += 1;
            }
            x = d.end_x();
        }
        Ok(())
    }

    /// Pair removed `old[x]` with the first unmatched identity-equal
    /// insertion, if any.
    fn match_addition<S, C>(&mut self, x: usize, same: &S, same_content: &C)
    where
        S: Fn(usize, usize) -> bool,
        C: Fn(usize, usize) -> bool,
    {
        let mut y = 0;
        for d in &self.diagonals {
            while y < d.y {
                if self.new[y] == Status::Unmatched && same(x, y) {
                    let changed = !same_content(x, y);
                    self.old[x] = Status::Moved { partner: y, changed };
                    self.new[y] = Status::Moved { partner: x, changed };
                    return;
                }
                y += 1;
            }
            y = d.end_y();
        }
    }
}

/// A structural edit waiting for its counterpart.
#[derive(Debug)]
struct Postponed {
    /// Index in the sequence that produced it (old for removals).
    pos_in_owner: usize,
    /// Distance from the end of the working sequence.
    current_pos: usize,
    removal: bool,
}

fn take_postponed(postponed: &mut Vec<Postponed>, pos: usize, removal: bool) -> Option<Postponed> {
    let index = postponed
        .iter()
        .position(|p| p.pos_in_owner == pos && p.removal == removal)?;
    let found = postponed.remove(index);
    for later in &mut postponed[index..] {
        if removal {
            later.current_pos -= 1;
        } else {
            later.current_pos += 1;
        }
    }
    Some(found)
}

/// Merges adjacent single-item edits into ranges.
#[derive(Default)]
struct Batcher {
    out: Vec<ChangeEvent>,
    last: Option<(ChangeKind, usize, usize)>,
}

impl Batcher {
    fn flush(&mut self) {
        match self.last.take() {
            Some((ChangeKind::Inserted, position, count)) => {
                self.out.push(ChangeEvent::inserted(position, count));
            }
            Some((ChangeKind::Removed, position, count)) => {
                self.out.push(ChangeEvent::removed(position, count));
            }
            _ => {}
        }
    }

    fn inserted(&mut self, position: usize, count: usize) {
        if let Some((ChangeKind::Inserted, last_pos, last_count)) = &mut self.last
            && position >= *last_pos
            && position <= *last_pos + *last_count
        {
            *last_count += count;
            *last_pos = (*last_pos).min(position);
            return;
        }
        self.flush();
        self.last = Some((ChangeKind::Inserted, position, count));
    }

    fn removed(&mut self, position: usize, count: usize) {
        if let Some((ChangeKind::Removed, last_pos, last_count)) = &mut self.last
            && *last_pos >= position
            && *last_pos <= position + count
        {
            *last_count += count;
            *last_pos = position;
            return;
        }
        self.flush();
        self.last = Some((ChangeKind::Removed, position, count));
    }

    fn moved(&mut self, from: usize, to: usize) {
        self.flush();
        self.out.push(ChangeEvent::moved(from, to));
    }

    fn finish(mut self) -> Vec<ChangeEvent> {
        self.flush();
        self.out
    }
}

/// Structural events, last diagonal first.
pub(crate) fn structural_events(matching: &Matching, old_len: usize, new_len: usize) -> Vec<ChangeEvent> {
    let mut batcher = Batcher::default();
    let mut postponed: Vec<Postponed> = Vec::new();
    let mut current_len = old_len;
    let mut x = old_len;
    let mut y = new_len;

    for d in matching.diagonals.iter().rev() {
        // Removals first, so insertions land in their final slot.
        while x > d.end_x() {
            x -= 1;
            match matching.old[x] {
                Status::Moved { partner, .. } => {
                    if let Some(addition) = take_postponed(&mut postponed, partner, false) {
                        let target = current_len - addition.current_pos;
                        batcher.moved(x, target - 1);
                    } else {
                        postponed.push(Postponed {
                            pos_in_owner: x,
                            current_pos: current_len - x - 1,
                            removal: true,
                        });
                    }
                }
                _ => {
                    batcher.removed(x, 1);
                    current_len -= 1;
                }
            }
        }
        while y > d.end_y() {
            y -= 1;
            match matching.new[y] {
                Status::Moved { partner, .. } => {
                    if let Some(removal) = take_postponed(&mut postponed, partner, true) {
                        let source = current_len - removal.current_pos - 1;
                        batcher.moved(source, x);
                    } else {
                        postponed.push(Postponed {
                            pos_in_owner: y,
                            current_pos: current_len - x,
                            removal: false,
                        });
                    }
                }
                _ => {
                    batcher.inserted(x, 1);
                    current_len += 1;
                }
            }
        }
        x = d.x;
        y = d.y;
    }
    debug_assert!(postponed.is_empty(), "unresolved postponed moves");
    batcher.finish()
}

/// Content changes in final positions, contiguous runs merged.
pub(crate) fn change_events(
    matching: &Matching,
    mut payload: impl FnMut(usize, usize) -> Option<Payload>,
) -> Vec<ChangeEvent> {
    let mut out = Vec::new();
    let mut run: Option<(usize, usize)> = None;
    for (y, status) in matching.new.iter().enumerate() {
        if !status.changed() {
            continue;
        }
        let (Status::Matched { partner, .. } | Status::Moved { partner, .. }) = *status else {
            continue;
        };
        match payload(partner, y) {
            Some(p) => {
                if let Some((start, count)) = run.take() {
                    out.push(ChangeEvent::changed(start, count));
                }
                out.push(ChangeEvent::Changed {
                    position: y,
                    count: 1,
                    payload: Some(p),
                });
            }
            None => match &mut run {
                Some((start, count)) if *start + *count == y => *count += 1,
                _ => {
                    if let Some((start, count)) = run.take() {
                        out.push(ChangeEvent::changed(start, count));
                    }
                    run = Some((y, 1));
                }
            },
        }
    }
    if let Some((start, count)) = run {
        out.push(ChangeEvent::changed(start, count));
    }
    out
}

/// Summary counts of an [`EditScript`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub inserted: usize,
    pub removed: usize,
    pub moved: usize,
    pub changed: usize,
}

/// Ordered change events turning one sequence into another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditScript {
    old_len: usize,
    new_len: usize,
    events: Vec<ChangeEvent>,
}

impl EditScript {
    pub(crate) fn from_events(old_len: usize, new_len: usize, events: Vec<ChangeEvent>) -> Self {
        Self {
            old_len,
            new_len,
            events,
        }
    }

    /// Script for replacing a sequence wholesale without identity
    /// information: the length difference is inserted or removed at the
    /// tail, then the common prefix is reported as changed.
    #[must_use]
    pub fn positional(old_len: usize, new_len: usize) -> Self {
        let mut events = Vec::with_capacity(2);
        if new_len < old_len {
            events.push(ChangeEvent::removed(new_len, old_len - new_len));
        } else if new_len > old_len {
            events.push(ChangeEvent::inserted(old_len, new_len - old_len));
        }
        let common = old_len.min(new_len);
        if common > 0 {
            events.push(ChangeEvent::changed(0, common));
        }
        Self {
            old_len,
            new_len,
            events,
        }
    }

    #[must_use]
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn old_len(&self) -> usize {
        self.old_len
    }

    #[must_use]
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// Item counts per event kind.
    #[must_use]
    pub fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::default();
        for event in &self.events {
            let n = event.count();
            match event.kind() {
                ChangeKind::Inserted => stats.inserted += n,
                ChangeKind::Removed => stats.removed += n,
                ChangeKind::Moved => stats.moved += n,
                ChangeKind::Changed => stats.changed += n,
            }
        }
        stats
    }
}
