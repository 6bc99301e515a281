#![forbid(unsafe_code)]

//! Recording and verifying observers.
//!
//! [`RecordingObserver`] keeps every change event it receives and replays
//! it over a shadow list whose slots remember which original item (if
//! any) they hold. After a mutation, [`RecordingObserver::verify`] checks
//! that the shadow describes the new content: same length, and every
//! survivor that was not reported as changed equals the item now in its
//! slot.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use datalist_core::{
    Available, AvailableObserver, ChangeEvent, DataObserver, ErrorObserver, LoadingObserver,
};
use datalist_runtime::LoadError;

/// One shadow position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Index of the item in the content the shadow was last reset to, or
    /// `None` for an inserted slot.
    pub origin: Option<usize>,
    /// A change event touched this slot.
    pub changed: bool,
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<ChangeEvent>,
    shadow: Vec<Slot>,
    misfits: Vec<ChangeEvent>,
}

/// Records change events and replays them on a shadow list.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    inner: Mutex<Recording>,
}

impl RecordingObserver {
    /// An observer whose shadow starts empty.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_len(0)
    }

    /// An observer whose shadow mirrors content of length `len`.
    #[must_use]
    pub fn with_len(len: usize) -> Arc<Self> {
        let observer = Self::default();
        observer.reset(len);
        Arc::new(observer)
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// This observer as a registrable handle.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> Arc<dyn DataObserver> {
        Arc::clone(self) as Arc<dyn DataObserver>
    }

    /// Forget recorded events and restart the shadow at length `len`.
    pub fn reset(&self, len: usize) {
        let mut rec = self.lock();
        rec.events.clear();
        rec.misfits.clear();
        rec.shadow = (0..len)
            .map(|i| Slot {
                origin: Some(i),
                changed: false,
            })
            .collect();
    }

    #[must_use]
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.lock().events.clone()
    }

    /// Events received since the last call (or reset).
    pub fn take_events(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.lock().events)
    }

    #[must_use]
    pub fn shadow(&self) -> Vec<Slot> {
        self.lock().shadow.clone()
    }

    #[must_use]
    pub fn shadow_len(&self) -> usize {
        self.lock().shadow.len()
    }

    /// Events that did not fit the shadow when they arrived.
    #[must_use]
    pub fn misfits(&self) -> Vec<ChangeEvent> {
        self.lock().misfits.clone()
    }

    /// Net size change over the recorded events.
    #[must_use]
    pub fn structural_delta(&self) -> isize {
        self.lock().events.iter().map(ChangeEvent::size_delta).sum()
    }

    /// Check that the shadow, started from `old`, describes `new`.
    pub fn verify<T: PartialEq + Debug>(&self, old: &[T], new: &[T]) -> Result<(), String> {
        let rec = self.lock();
        if let Some(first) = rec.misfits.first() {
            return Err(format!("event {first:?} did not fit the shadow"));
        }
        if rec.shadow.len() != new.len() {
            return Err(format!(
                "shadow has {} slots, content has {} items",
                rec.shadow.len(),
                new.len()
            ));
        }
        for (position, (slot, item)) in rec.shadow.iter().zip(new).enumerate() {
            let Some(origin) = slot.origin else {
                continue;
            };
            let Some(before) = old.get(origin) else {
                return Err(format!("slot {position} claims missing origin {origin}"));
            };
            if !slot.changed && before != item {
                return Err(format!(
                    "slot {position}: {before:?} replaced by {item:?} without a change event"
                ));
            }
        }
        Ok(())
    }
}

impl DataObserver for RecordingObserver {
    fn on_change(&self, event: &ChangeEvent) {
        let mut rec = self.lock();
        rec.events.push(event.clone());
        let fits = event.apply_to(
            &mut rec.shadow,
            |_| Slot {
                origin: None,
                changed: false,
            },
            |slot| slot.changed = true,
        );
        if !fits {
            rec.misfits.push(event.clone());
        }
    }
}

/// Tracks the size implied by the delivered events and compares it with
/// the live size of the source once the source is settled.
pub struct VerifyingObserver {
    size: Box<dyn Fn() -> usize + Send + Sync>,
    state: Mutex<(usize, Vec<String>)>,
}

impl VerifyingObserver {
    /// `size` reads the live size of the observed source.
    #[must_use]
    pub fn new(initial: usize, size: impl Fn() -> usize + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            size: Box::new(size),
            state: Mutex::new((initial, Vec::new())),
        })
    }

    #[must_use]
    pub fn handle(self: &Arc<Self>) -> Arc<dyn DataObserver> {
        Arc::clone(self) as Arc<dyn DataObserver>
    }

    #[must_use]
    pub fn expected_len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    /// Compare the implied size with the source. Call only when no
    /// notification is being delivered.
    pub fn verify_settled(&self) -> Result<(), String> {
        let (expected, failures) = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            (state.0, state.1.clone())
        };
        if let Some(first) = failures.first() {
            return Err(first.clone());
        }
        let actual = (self.size)();
        if expected != actual {
            return Err(format!("events imply {expected} items, source has {actual}"));
        }
        Ok(())
    }
}

impl DataObserver for VerifyingObserver {
    fn on_change(&self, event: &ChangeEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match usize::try_from(state.0 as isize + event.size_delta()) {
            Ok(expected) => state.0 = expected,
            Err(_) => state.1.push(format!("{event:?} drove the size negative")),
        }
    }
}

impl Debug for VerifyingObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyingObserver")
            .field("expected_len", &self.expected_len())
            .finish_non_exhaustive()
    }
}

/// Records the values delivered on one of the scalar channels.
#[derive(Debug)]
pub struct Recorder<V> {
    values: Mutex<Vec<V>>,
}

impl<V: Clone> Recorder<V> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            values: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn last(&self) -> Option<V> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn push(&self, value: V) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
    }
}

impl Recorder<bool> {
    #[must_use]
    pub fn loading_handle(self: &Arc<Self>) -> Arc<dyn LoadingObserver> {
        Arc::clone(self) as Arc<dyn LoadingObserver>
    }
}

impl Recorder<Available> {
    #[must_use]
    pub fn available_handle(self: &Arc<Self>) -> Arc<dyn AvailableObserver> {
        Arc::clone(self) as Arc<dyn AvailableObserver>
    }
}

impl Recorder<LoadError> {
    #[must_use]
    pub fn error_handle(self: &Arc<Self>) -> Arc<dyn ErrorObserver<LoadError>> {
        Arc::clone(self) as Arc<dyn ErrorObserver<LoadError>>
    }
}

impl LoadingObserver for Recorder<bool> {
    fn on_loading_changed(&self, loading: bool) {
        self.push(loading);
    }
}

impl AvailableObserver for Recorder<Available> {
    fn on_available_changed(&self, available: Available) {
        self.push(available);
    }
}

impl ErrorObserver<LoadError> for Recorder<LoadError> {
    fn on_error(&self, error: &LoadError) {
        self.push(error.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_tracks_survivors() {
        let old = ['a', 'b', 'c'];
        let new = ['a', 'c', 'd'];
        let recording = RecordingObserver::with_len(old.len());
        recording.on_change(&ChangeEvent::removed(1, 1));
        recording.on_change(&ChangeEvent::inserted(2, 1));
        assert_eq!(recording.structural_delta(), 0);
        assert_eq!(recording.verify(&old, &new), Ok(()));
        assert_eq!(
            recording.shadow(),
            vec![
                Slot { origin: Some(0), changed: false },
                Slot { origin: Some(2), changed: false },
                Slot { origin: None, changed: false },
            ]
        );
    }

    #[test]
    fn missing_change_event_is_reported() {
        let recording = RecordingObserver::with_len(2);
        assert!(recording.verify(&[1, 2], &[1, 3]).is_err());
        recording.on_change(&ChangeEvent::changed(1, 1));
        assert_eq!(recording.verify(&[1, 2], &[1, 3]), Ok(()));
    }

    #[test]
    fn misfit_events_are_kept() {
        let recording = RecordingObserver::new();
        recording.on_change(&ChangeEvent::removed(0, 1));
        assert_eq!(recording.misfits(), vec![ChangeEvent::removed(0, 1)]);
        assert!(recording.verify::<u8>(&[], &[]).is_err());
    }

    #[test]
    fn verifying_observer_compares_with_source() {
        let live = Arc::new(Mutex::new(3usize));
        let source = Arc::clone(&live);
        let verifier = VerifyingObserver::new(3, move || *source.lock().unwrap());
        verifier.on_change(&ChangeEvent::inserted(3, 2));
        assert!(verifier.verify_settled().is_err());
        *live.lock().unwrap() = 5;
        assert_eq!(verifier.verify_settled(), Ok(()));
        verifier.on_change(&ChangeEvent::removed(0, 9));
        assert!(verifier.verify_settled().is_err());
    }

    #[test]
    fn recorder_keeps_order() {
        let loading = Recorder::<bool>::new();
        let handle = loading.loading_handle();
        handle.on_loading_changed(true);
        handle.on_loading_changed(false);
        assert_eq!(loading.values(), vec![true, false]);
        assert_eq!(loading.last(), Some(false));
    }
}
