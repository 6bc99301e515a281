#![no_main]

use std::sync::{Arc, Mutex};

use arbitrary::Arbitrary;
use datalist_core::{ChangeEvent, Cx};
use datalist_diff::{Equality, calculate_diff};
use datalist_runtime::ListStore;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Append(Vec<u8>),
    Prepend(Vec<u8>),
    Positional(Vec<u8>),
    Diffed(Vec<u8>),
    Clear,
}

fuzz_target!(|ops: Vec<Op>| {
    let store = ListStore::<u8>::new();
    let shadow: Arc<Mutex<Vec<u8>>> = Arc::default();
    let sink = Arc::clone(&shadow);
    store
        .observers()
        .register(Arc::new(move |event: &ChangeEvent| {
            let mut shadow = sink.lock().unwrap();
            assert!(event.apply_to(&mut shadow, |_| 0, |_| ()), "event {event:?} does not fit");
        }))
        .expect("first registration");

    let (cx, _ctrl) = Cx::background();
    let equality = Equality::by_value();
    for op in ops.into_iter().take(64) {
        match op {
            Op::Append(items) => store.append(items),
            Op::Prepend(items) => store.prepend(items),
            Op::Positional(items) => store.overwrite_positional(items),
            Op::Diffed(items) => {
                let old = store.snapshot();
                let script = calculate_diff(old.as_slice(), &items, &equality, true, &cx)
                    .expect("complete equality never fails");
                store.apply_script(items, &script);
            }
            Op::Clear => {
                store.clear();
            }
        }
        assert_eq!(shadow.lock().unwrap().len(), store.len());
    }
});
