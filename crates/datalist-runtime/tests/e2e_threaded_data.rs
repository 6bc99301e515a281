//! End-to-end runs on a real scheduler thread and worker pool.
//!
//! Every call into a data instance goes through the loop thread; the test
//! thread only polls until the expected state is reached.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use datalist_core::{ChangeEvent, Cx, LoopHandle, LoopScheduler, WorkerPool, WorkerPoolConfig};
use datalist_diff::Equality;
use datalist_harness::{CountingLoader, Gate, Recorder, RecordingObserver};
use datalist_runtime::{Data, LoadError, from_fn};

const TIMEOUT: Duration = Duration::from_secs(10);

struct Rig {
    looper: LoopScheduler,
    pool: WorkerPool,
}

impl Rig {
    fn start() -> Self {
        let config = WorkerPoolConfig {
            threads: 2,
            thread_name: "e2e-worker".to_owned(),
        };
        Self {
            looper: LoopScheduler::start("e2e-loop").expect("spawn loop thread"),
            pool: WorkerPool::start(&config).expect("spawn workers"),
        }
    }

    fn handle(&self) -> LoopHandle {
        self.looper.handle()
    }

    fn data<T: Clone + Send + Sync + 'static>(
        &self,
        loader: impl datalist_runtime::Loader<T>,
        equality: Equality<T>,
    ) -> Data<T> {
        Data::builder(loader, self.looper.scheduler(), self.pool.shared())
            .equality(equality)
            .build()
    }
}

fn on_loop<R, F>(handle: &LoopHandle, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    handle.call(f).expect("loop thread alive")
}

/// Poll `check` on the loop thread until it holds.
fn wait_until<F>(handle: &LoopHandle, what: &str, check: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let check = Arc::new(check);
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let probe = Arc::clone(&check);
        if handle.call(move || probe()).unwrap_or(false) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

#[test]
fn overwrites_from_the_loop_thread_replay_exactly() {
    let rig = Rig::start();
    let handle = rig.handle();
    let initial = chars("abcdefgh");
    let data = rig.data(CountingLoader::new(initial.clone()), Equality::by_value());
    let recording = RecordingObserver::new();

    on_loop(&handle, {
        let (data, observer) = (data.clone(), recording.handle());
        move || data.register_data_observer(observer)
    })
    .unwrap();
    wait_until(&handle, "initial load", {
        let data = data.clone();
        move || data.size() == 8 && !data.is_loading()
    });
    recording.reset(initial.len());

    let versions = ["hgfedcba", "abxdefgh", "bcdefghij", "", "zabc", "azbyc"];
    on_loop(&handle, {
        let data = data.clone();
        move || {
            for version in versions {
                data.overwrite(chars(version));
            }
        }
    });
    let last = chars(versions[versions.len() - 1]);
    wait_until(&handle, "last overwrite", {
        let (data, last) = (data.clone(), last.clone());
        move || data.snapshot().as_slice() == last.as_slice()
    });

    assert_eq!(recording.verify(&initial, &last), Ok(()));
    assert!(recording.misfits().is_empty());
}

#[test]
fn refresh_during_a_running_load_delivers_only_the_new_result() {
    let rig = Rig::start();
    let handle = rig.handle();
    let gate = Gate::closed();
    let version = Arc::new(AtomicUsize::new(1));
    let loader = from_fn({
        let (gate, version) = (Arc::clone(&gate), Arc::clone(&version));
        move |cx: &Cx| -> Result<Vec<usize>, LoadError> {
            if !gate.wait(cx) {
                return Err(LoadError::message("cancelled while gated"));
            }
            Ok(vec![version.load(Ordering::SeqCst); 3])
        }
    });
    let data = rig.data(loader, Equality::none());
    let recording = RecordingObserver::new();
    let loading = Recorder::<bool>::new();

    on_loop(&handle, {
        let (data, observer, loading) =
            (data.clone(), recording.handle(), loading.loading_handle());
        move || -> datalist_runtime::Result<()> {
            data.register_loading_observer(loading)?;
            data.register_data_observer(observer)
        }
    })
    .unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while gate.waiters() == 0 {
        assert!(Instant::now() < deadline, "first load never started");
        thread::sleep(Duration::from_millis(1));
    }

    version.store(2, Ordering::SeqCst);
    on_loop(&handle, {
        let data = data.clone();
        move || data.refresh()
    });
    gate.open();
    wait_until(&handle, "refreshed load", {
        let data = data.clone();
        move || !data.is_loading() && data.size() == 3
    });

    assert_eq!(data.snapshot().as_slice(), &[2, 2, 2]);
    assert_eq!(recording.events(), vec![ChangeEvent::inserted(0, 3)]);
    assert_eq!(loading.values(), vec![true, false]);
}

#[test]
fn dispose_during_a_running_load_ignores_its_result() {
    let rig = Rig::start();
    let handle = rig.handle();
    let gate = Gate::closed();
    let loader = from_fn({
        let gate = Arc::clone(&gate);
        move |cx: &Cx| -> Result<Vec<u8>, LoadError> {
            gate.wait(cx);
            Ok(vec![1, 2, 3])
        }
    });
    let data = rig.data(loader, Equality::none());
    let recording = RecordingObserver::new();
    on_loop(&handle, {
        let (data, observer) = (data.clone(), recording.handle());
        move || data.register_data_observer(observer)
    })
    .unwrap();
    let deadline = Instant::now() + TIMEOUT;
    while gate.waiters() == 0 {
        assert!(Instant::now() < deadline, "load never started");
        thread::sleep(Duration::from_millis(1));
    }

    on_loop(&handle, {
        let data = data.clone();
        move || data.dispose()
    });
    gate.open();
    let Rig { looper, pool } = rig;
    pool.shutdown();
    // Anything the workers posted has run once this returns.
    on_loop(&handle, || ());
    looper.shutdown();

    assert!(data.is_disposed());
    assert!(data.is_empty());
    assert!(!data.is_loading());
    assert!(recording.events().is_empty());
}

#[test]
fn instances_sharing_a_pool_load_independently() {
    let rig = Rig::start();
    let handle = rig.handle();
    let loaders: Vec<_> = (0..8u32)
        .map(|n| CountingLoader::new((0..n * 10).collect::<Vec<u32>>()))
        .collect();
    let datas: Vec<Data<u32>> = loaders
        .iter()
        .map(|loader| rig.data(Arc::clone(loader), Equality::by_value()))
        .collect();
    let recordings: Vec<_> = datas.iter().map(|_| RecordingObserver::new()).collect();

    on_loop(&handle, {
        let pairs: Vec<_> = datas
            .iter()
            .cloned()
            .zip(recordings.iter().map(RecordingObserver::handle))
            .collect();
        move || {
            pairs
                .into_iter()
                .try_for_each(|(data, observer)| data.register_data_observer(observer))
        }
    })
    .unwrap();
    wait_until(&handle, "every instance loaded", {
        let datas = datas.clone();
        move || {
            datas
                .iter()
                .enumerate()
                .all(|(n, data)| data.size() == n * 10 && !data.is_loading())
        }
    });

    for (n, (loader, recording)) in loaders.iter().zip(&recordings).enumerate() {
        assert_eq!(loader.calls(), 1);
        assert_eq!(recording.shadow_len(), n * 10);
    }
}
