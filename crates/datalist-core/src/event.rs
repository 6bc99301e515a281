#![forbid(unsafe_code)]

//! Change notifications and availability.
//!
//! A [`ChangeEvent`] describes one contiguous edit of an observed sequence.
//! Positions are always relative to the sequence as it stands immediately
//! before the event is applied, so a consumer that replays events in
//! delivery order reproduces the producer's sequence exactly.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque per-item change hint attached to [`ChangeEvent::Changed`].
///
/// Payloads are compared by identity: two payloads are equal only when they
/// share the same allocation.
#[derive(Clone)]
pub struct Payload(Arc<dyn Any + Send + Sync>);

impl Payload {
    /// Wrap a value as a payload.
    pub fn new<V: Any + Send + Sync>(value: V) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the payload as `V` if it has that type.
    #[must_use]
    pub fn downcast_ref<V: Any>(&self) -> Option<&V> {
        self.0.downcast_ref::<V>()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// Discriminant of a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Changed,
    Inserted,
    Removed,
    Moved,
}

/// One edit of an observed sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// `count` items starting at `position` were replaced in place.
    Changed {
        position: usize,
        count: usize,
        payload: Option<Payload>,
    },
    /// `count` items were inserted so the first lands at `position`.
    Inserted { position: usize, count: usize },
    /// `count` items starting at `position` were removed.
    Removed { position: usize, count: usize },
    /// `count` items were taken out at `from` and reinserted so the first
    /// lands at `to` in the resulting sequence.
    Moved { from: usize, to: usize, count: usize },
}

impl ChangeEvent {
    #[must_use]
    pub fn changed(position: usize, count: usize) -> Self {
        Self::Changed {
            position,
            count,
            payload: None,
        }
    }

    #[must_use]
    pub fn inserted(position: usize, count: usize) -> Self {
        Self::Inserted { position, count }
    }

    #[must_use]
    pub fn removed(position: usize, count: usize) -> Self {
        Self::Removed { position, count }
    }

    #[must_use]
    pub fn moved(from: usize, to: usize) -> Self {
        Self::Moved { from, to, count: 1 }
    }

    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Changed { .. } => ChangeKind::Changed,
            Self::Inserted { .. } => ChangeKind::Inserted,
            Self::Removed { .. } => ChangeKind::Removed,
            Self::Moved { .. } => ChangeKind::Moved,
        }
    }

    /// First affected position (the source position for moves).
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::Changed { position, .. }
            | Self::Inserted { position, .. }
            | Self::Removed { position, .. } => *position,
            Self::Moved { from, .. } => *from,
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Changed { count, .. }
            | Self::Inserted { count, .. }
            | Self::Removed { count, .. }
            | Self::Moved { count, .. } => *count,
        }
    }

    /// Whether the event changes the shape of the sequence.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::Changed { .. })
    }

    /// Net change in sequence length caused by this event.
    #[must_use]
    pub fn size_delta(&self) -> isize {
        match self {
            Self::Inserted { count, .. } => *count as isize,
            Self::Removed { count, .. } => -(*count as isize),
            Self::Changed { .. } | Self::Moved { .. } => 0,
        }
    }

    /// Replay this event against a shadow sequence.
    ///
    /// Inserted slots are produced by `fill`, which receives the absolute
    /// position of each new slot. Changed slots are passed to `touch`.
    /// Returns `false` (leaving `shadow` untouched) if the event does not
    /// fit the shadow's current length.
    pub fn apply_to<X>(
        &self,
        shadow: &mut Vec<X>,
        mut fill: impl FnMut(usize) -> X,
        mut touch: impl FnMut(&mut X),
    ) -> bool {
        let len = shadow.len();
        match self {
            Self::Inserted { position, count } => {
                if *position > len {
                    return false;
                }
                let tail = shadow.split_off(*position);
                shadow.extend((0..*count).map(|i| fill(position + i)));
                shadow.extend(tail);
            }
            Self::Removed { position, count } => {
                if position + count > len {
                    return false;
                }
                shadow.drain(*position..position + count);
            }
            Self::Changed {
                position, count, ..
            } => {
                if position + count > len {
                    return false;
                }
                shadow[*position..position + count].iter_mut().for_each(&mut touch);
            }
            Self::Moved { from, to, count } => {
                if from + count > len || to + count > len {
                    return false;
                }
                let moved: Vec<X> = shadow.drain(*from..from + count).collect();
                let tail = shadow.split_off(*to);
                shadow.extend(moved);
                shadow.extend(tail);
            }
        }
        true
    }
}

/// How many more items a data source can still deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Available {
    /// Unknown or unlimited.
    #[default]
    Unbounded,
    /// Exactly this many more items; `Count(0)` means exhausted.
    Count(usize),
}

impl Available {
    /// `true` once the source has nothing more to deliver.
    #[must_use]
    pub fn is_exhausted(self) -> bool {
        self == Self::Count(0)
    }

    #[must_use]
    pub fn count(self) -> Option<usize> {
        match self {
            Self::Count(n) => Some(n),
            Self::Unbounded => None,
        }
    }

    /// Remaining items given a known `total` and items consumed so far.
    #[must_use]
    pub fn remaining(total: usize, consumed: usize) -> Self {
        Self::Count(total.saturating_sub(consumed))
    }
}

impl fmt::Display for Available {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("unbounded"),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}
