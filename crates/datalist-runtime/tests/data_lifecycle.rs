//! Lifecycle of a whole-content data instance: lazy subscription, load
//! results, errors, cancellation, and disposal.

#![forbid(unsafe_code)]

use std::sync::Arc;

use datalist_core::{
    Available, ChangeEvent, DataObserver, ImmediateScheduler, InlineExecutor, ManualExecutor,
    ManualScheduler, ObserverError,
};
use datalist_harness::{CountingLoader, Recorder, RecordingObserver, ScriptedLoader};
use datalist_runtime::{Data, DataError, LoadError, Phase};

// ── Helpers ─────────────────────────────────────────────────────────────

struct Manual {
    scheduler: Arc<ManualScheduler>,
    executor: Arc<ManualExecutor>,
}

impl Manual {
    fn new() -> Self {
        Self {
            scheduler: Arc::new(ManualScheduler::new()),
            executor: Arc::new(ManualExecutor::new()),
        }
    }

    fn data<T: Clone + Send + Sync + 'static>(
        &self,
        loader: impl datalist_runtime::Loader<T>,
    ) -> Data<T> {
        Data::new(loader, self.scheduler.clone(), self.executor.clone())
    }

    /// Run background jobs and scheduler tasks until both are idle.
    fn settle(&self) {
        loop {
            let jobs = self.executor.run_all();
            let tasks = self.scheduler.run_until_idle();
            if jobs == 0 && tasks == 0 {
                break;
            }
        }
    }
}

fn immediate<T: Clone + Send + Sync + 'static>(loader: impl datalist_runtime::Loader<T>) -> Data<T> {
    Data::new(loader, Arc::new(ImmediateScheduler), Arc::new(InlineExecutor))
}

fn faulty_observer(_: &ChangeEvent) {
    panic!("observer bug");
}

// ── Lazy subscription ───────────────────────────────────────────────────

#[test]
fn loader_is_never_invoked_without_observers() {
    let env = Manual::new();
    let loader = CountingLoader::new(vec![1, 2, 3]);
    let data = env.data(Arc::clone(&loader));
    data.refresh();
    data.reload();
    data.invalidate();
    env.settle();
    assert_eq!(loader.calls(), 0);
    assert!(data.is_empty());
    assert!(!data.is_loading());
}

#[test]
fn first_observer_triggers_exactly_one_load() {
    let env = Manual::new();
    let loader = CountingLoader::new(vec![1, 2, 3]);
    let data = env.data(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    data.register_data_observer(recording.handle()).unwrap();
    assert!(data.is_loading());
    assert_eq!(env.executor.pending(), 1);
    env.settle();

    assert_eq!(loader.calls(), 1);
    assert_eq!(data.snapshot().as_slice(), &[1, 2, 3]);
    assert_eq!(recording.events(), vec![ChangeEvent::inserted(0, 3)]);
    assert_eq!(recording.verify(&[], &[1, 2, 3]), Ok(()));
    assert_eq!(data.phase(), Phase::Loaded);

    // A second observer does not reload.
    let other = RecordingObserver::new();
    data.register_data_observer(other.handle()).unwrap();
    env.settle();
    assert_eq!(loader.calls(), 1);
    assert_eq!(data.data_observer_count(), 2);
}

#[test]
fn resubscribing_after_a_completed_load_keeps_content() {
    let env = Manual::new();
    let loader = CountingLoader::new(vec!['a']);
    let data = env.data(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    let handle = recording.handle();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    env.settle();
    data.unregister_data_observer(&handle).unwrap();
    assert!(!data.is_subscribed());
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    env.settle();
    assert_eq!(loader.calls(), 1);
    assert_eq!(data.get(0), Some('a'));
}

#[test]
fn unsubscribing_mid_load_reloads_on_resubscribe() {
    let env = Manual::new();
    let loader = CountingLoader::new(vec![5, 6]);
    let data = env.data(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    let handle = recording.handle();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    data.unregister_data_observer(&handle).unwrap();
    assert!(!data.is_loading());
    assert_eq!(data.phase(), Phase::Idle);
    env.settle();
    assert_eq!(loader.calls(), 0, "the cancelled job never reached the loader");

    data.register_data_observer(Arc::clone(&handle)).unwrap();
    env.settle();
    assert_eq!(loader.calls(), 1);
    assert_eq!(data.size(), 2);
}

// ── Registration errors ─────────────────────────────────────────────────

#[test]
fn duplicate_and_unknown_registrations_fail_fast() {
    let data = immediate(CountingLoader::new(Vec::<u8>::new()));
    let recording = RecordingObserver::new();
    let handle = recording.handle();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    assert_eq!(
        data.register_data_observer(Arc::clone(&handle)),
        Err(DataError::Observer(ObserverError::AlreadyRegistered))
    );
    let stranger: Arc<dyn DataObserver> = RecordingObserver::new();
    assert_eq!(
        data.unregister_data_observer(&stranger),
        Err(DataError::Observer(ObserverError::NotRegistered))
    );
    let loading = Recorder::<bool>::new();
    data.register_loading_observer(loading.loading_handle()).unwrap();
    assert!(data.register_loading_observer(loading.loading_handle()).is_err());
}

// ── Loading, availability, and errors ───────────────────────────────────

#[test]
fn loading_and_available_notifications() {
    let data = immediate(CountingLoader::new(vec![1, 2]));
    let loading = Recorder::<bool>::new();
    let available = Recorder::<Available>::new();
    data.register_loading_observer(loading.loading_handle()).unwrap();
    data.register_available_observer(available.available_handle()).unwrap();
    data.register_data_observer(RecordingObserver::new().handle()).unwrap();

    assert_eq!(loading.values(), vec![true, false]);
    assert_eq!(available.values(), vec![Available::Count(0)]);
    assert_eq!(data.available(), Available::Count(0));
}

#[test]
fn failed_first_load_reports_one_error_and_keeps_content_empty() {
    let loader = ScriptedLoader::<u32>::new();
    loader.push_error("backend down");
    let data = immediate(Arc::clone(&loader));
    let errors = Recorder::<LoadError>::new();
    let loading = Recorder::<bool>::new();
    data.register_error_observer(errors.error_handle()).unwrap();
    data.register_loading_observer(loading.loading_handle()).unwrap();
    let recording = RecordingObserver::new();
    data.register_data_observer(recording.handle()).unwrap();

    assert!(!data.is_loading());
    assert!(data.is_empty());
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.last().map(|e| e.to_string()),
        Some("loader failed: backend down".to_owned())
    );
    assert_eq!(loading.values(), vec![true, false]);
    assert_eq!(data.phase(), Phase::Error);
    assert!(data.error().is_some());
    assert!(recording.events().is_empty());
}

#[test]
fn failed_refresh_keeps_existing_content() {
    let loader = ScriptedLoader::<u32>::new();
    loader.push_items(vec![1, 2, 3]);
    loader.push_error("timeout");
    let data = immediate(Arc::clone(&loader));
    let errors = Recorder::<LoadError>::new();
    data.register_error_observer(errors.error_handle()).unwrap();
    data.register_data_observer(RecordingObserver::new().handle()).unwrap();
    data.refresh();
    assert_eq!(data.snapshot().as_slice(), &[1, 2, 3]);
    assert_eq!(errors.len(), 1);
    assert_eq!(data.phase(), Phase::Error);
}

#[test]
fn failed_load_is_retried_on_resubscribe() {
    let loader = ScriptedLoader::<u32>::new();
    loader.push_error("offline");
    loader.push_items(vec![7, 8]);
    let data = immediate(Arc::clone(&loader));
    let loading = Recorder::<bool>::new();
    data.register_loading_observer(loading.loading_handle()).unwrap();
    let recording = RecordingObserver::new();
    let handle = recording.handle();

    data.register_data_observer(Arc::clone(&handle)).unwrap();
    assert!(data.is_empty());
    data.unregister_data_observer(&handle).unwrap();
    data.register_data_observer(Arc::clone(&handle)).unwrap();

    assert_eq!(data.snapshot().as_slice(), &[7, 8]);
    assert!(data.error().is_none(), "a new load clears the error");
    assert_eq!(data.phase(), Phase::Loaded);
    assert_eq!(loading.values(), vec![true, false, true, false]);
    assert_eq!(loader.loads(), 2);
}

#[test]
fn panicking_loader_is_reported_as_error() {
    let loader = ScriptedLoader::<u32>::new();
    loader.push_panic("loader exploded");
    let data = immediate(Arc::clone(&loader));
    let errors = Recorder::<LoadError>::new();
    data.register_error_observer(errors.error_handle()).unwrap();
    data.register_data_observer(RecordingObserver::new().handle()).unwrap();
    assert!(matches!(
        errors.last(),
        Some(LoadError::LoaderPanicked(message)) if message.contains("loader exploded")
    ));
    assert!(!data.is_loading());
}

#[test]
fn panicking_observer_does_not_starve_peers() {
    let data = immediate(CountingLoader::new(vec![1, 2, 3]));
    let faulty: Arc<dyn DataObserver> = Arc::new(faulty_observer);
    data.register_data_observer(faulty).unwrap();
    let recording = RecordingObserver::new();
    data.register_data_observer(recording.handle()).unwrap();
    data.append(vec![4]);
    assert_eq!(recording.events(), vec![ChangeEvent::inserted(3, 1)]);
    assert_eq!(data.size(), 4);
}

// ── Refresh, reload, invalidate ─────────────────────────────────────────

#[test]
fn refresh_discards_the_superseded_result() {
    let env = Manual::new();
    let loader = ScriptedLoader::<u32>::new();
    loader.push_items(vec![1]);
    loader.push_items(vec![2, 2]);
    let data = env.data(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    data.register_data_observer(recording.handle()).unwrap();

    // The first load completes in the background but is not delivered yet.
    assert!(env.executor.run_next());
    assert_eq!(env.scheduler.pending(), 1);
    data.refresh();
    env.settle();

    assert_eq!(loader.loads(), 2);
    assert_eq!(data.snapshot().as_slice(), &[2, 2]);
    assert_eq!(recording.events(), vec![ChangeEvent::inserted(0, 2)]);
}

#[test]
fn refresh_keeps_stale_content_visible() {
    let env = Manual::new();
    let loader = ScriptedLoader::<u32>::new();
    loader.push_items(vec![1, 2, 3]);
    loader.push_items(vec![4, 5]);
    let data = env.data(Arc::clone(&loader));
    data.register_data_observer(RecordingObserver::new().handle()).unwrap();
    env.settle();
    data.refresh();
    assert!(data.is_loading());
    assert_eq!(data.size(), 3);
    env.settle();
    assert_eq!(data.snapshot().as_slice(), &[4, 5]);
}

#[test]
fn reload_clears_before_loading() {
    let loader = ScriptedLoader::<u32>::new();
    loader.push_items(vec![1, 2, 3]);
    loader.push_items(vec![9]);
    let data = immediate(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    data.register_data_observer(recording.handle()).unwrap();
    recording.reset(3);
    data.reload();
    assert_eq!(
        recording.events(),
        vec![ChangeEvent::removed(0, 3), ChangeEvent::inserted(0, 1)]
    );
    assert_eq!(loader.clears(), 1);
    assert_eq!(loader.load_begins(), 2);
}

#[test]
fn invalidate_defers_clearing_until_next_subscription() {
    let env = Manual::new();
    let loader = ScriptedLoader::<u32>::new();
    loader.push_items(vec![1, 2, 3]);
    loader.push_items(vec![4]);
    let data = env.data(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    let handle = recording.handle();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    env.settle();

    data.invalidate();
    assert_eq!(loader.invalidates(), 1);
    assert_eq!(data.size(), 3, "content survives until resubscription");
    assert_eq!(env.executor.pending(), 0);

    data.unregister_data_observer(&handle).unwrap();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    assert!(data.is_empty());
    env.settle();
    assert_eq!(data.snapshot().as_slice(), &[4]);
    assert_eq!(
        recording.events(),
        vec![
            ChangeEvent::inserted(0, 3),
            ChangeEvent::removed(0, 3),
            ChangeEvent::inserted(0, 1),
        ]
    );
}

#[test]
fn refresh_after_invalidate_settles_the_pending_clear() {
    let loader = CountingLoader::new(vec![1, 2, 3]);
    let data = immediate(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    let handle = recording.handle();
    data.register_data_observer(Arc::clone(&handle)).unwrap();

    data.invalidate();
    data.refresh();
    assert_eq!(data.size(), 3);
    assert_eq!(loader.calls(), 2);

    data.unregister_data_observer(&handle).unwrap();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    assert_eq!(data.snapshot().as_slice(), &[1, 2, 3]);
    assert_eq!(loader.calls(), 2, "content is current, nothing to reload");
    assert_eq!(recording.shadow_len(), 3);
    assert_eq!(data.phase(), Phase::Loaded);
}

#[test]
fn interrupted_load_after_invalidate_still_clears_on_resubscribe() {
    let env = Manual::new();
    let loader = ScriptedLoader::<u32>::new();
    loader.push_items(vec![1, 2, 3]);
    loader.push_items(vec![4]);
    let data = env.data(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    let handle = recording.handle();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    env.settle();

    data.invalidate();
    data.refresh();
    data.unregister_data_observer(&handle).unwrap();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    assert!(data.is_empty(), "stale content cleared before the fresh load");
    env.settle();
    assert_eq!(data.snapshot().as_slice(), &[4]);
}

// ── Caller mutations, visibility, disposal ──────────────────────────────

#[test]
fn caller_mutations_are_announced() {
    let data = immediate(CountingLoader::new(Vec::<char>::new()));
    let recording = RecordingObserver::new();
    data.register_data_observer(recording.handle()).unwrap();
    data.append(vec!['b', 'c']);
    data.prepend(vec!['a']);
    data.clear();
    assert_eq!(
        recording.events(),
        vec![
            ChangeEvent::inserted(0, 2),
            ChangeEvent::inserted(0, 1),
            ChangeEvent::removed(0, 3),
        ]
    );
    assert_eq!(data.available(), Available::Unbounded);
}

#[test]
fn overwrite_without_equality_is_positional() {
    let data = immediate(CountingLoader::new(vec![1, 2, 3, 4]));
    let recording = RecordingObserver::new();
    data.register_data_observer(recording.handle()).unwrap();
    recording.reset(4);
    data.overwrite(vec![7, 8]);
    assert_eq!(
        recording.events(),
        vec![ChangeEvent::removed(2, 2), ChangeEvent::changed(0, 2)]
    );
}

#[test]
fn shown_and_hidden_reach_the_loader_once() {
    let loader = ScriptedLoader::<u8>::new();
    let data = immediate(Arc::clone(&loader));
    data.notify_shown();
    data.notify_shown();
    data.notify_hidden();
    data.notify_hidden();
    assert_eq!((loader.shown(), loader.hidden()), (1, 1));
}

#[test]
fn dispose_clears_and_refuses_further_use() {
    let env = Manual::new();
    let loader = CountingLoader::new(vec![1, 2]);
    let data = env.data(Arc::clone(&loader));
    let recording = RecordingObserver::new();
    let handle = recording.handle();
    data.register_data_observer(Arc::clone(&handle)).unwrap();
    env.settle();

    data.dispose();
    assert!(data.is_disposed());
    assert!(data.is_empty());
    assert_eq!(recording.events().last(), Some(&ChangeEvent::removed(0, 2)));
    assert_eq!(
        data.register_data_observer(RecordingObserver::new().handle()),
        Err(DataError::Disposed)
    );

    data.refresh();
    data.append(vec![3]);
    env.settle();
    assert_eq!(loader.calls(), 1);
    assert!(data.is_empty());
    assert!(data.unregister_data_observer(&handle).is_ok());
}

#[test]
fn results_arriving_after_dispose_are_ignored() {
    let env = Manual::new();
    let loader = CountingLoader::new(vec![1, 2]);
    let data = env.data(Arc::clone(&loader));
    data.register_data_observer(RecordingObserver::new().handle()).unwrap();
    assert!(env.executor.run_next());
    data.dispose();
    env.settle();
    assert!(data.is_empty());
    assert!(!data.is_loading());
}
