#![no_main]

use arbitrary::Arbitrary;
use datalist_core::Cx;
use datalist_diff::{Equality, calculate_diff};
use libfuzzer_sys::fuzz_target;

const MAX_LEN: usize = 256;

#[derive(Arbitrary, Debug, Clone, PartialEq)]
struct Item {
    id: u8,
    rev: u8,
}

#[derive(Arbitrary, Debug)]
struct Input {
    old: Vec<Item>,
    new: Vec<Item>,
    detect_moves: bool,
}

fuzz_target!(|input: Input| {
    let old = &input.old[..input.old.len().min(MAX_LEN)];
    let new = &input.new[..input.new.len().min(MAX_LEN)];
    let (cx, _ctrl) = Cx::background();
    let equality = Equality::keyed(|item: &Item| item.id);
    let script = calculate_diff(old, new, &equality, input.detect_moves, &cx)
        .expect("keyed equality never fails");

    let mut shadow: Vec<(Option<usize>, bool)> = (0..old.len()).map(|i| (Some(i), false)).collect();
    for event in script.events() {
        assert!(
            event.apply_to(&mut shadow, |_| (None, false), |slot| slot.1 = true),
            "event {event:?} does not fit"
        );
    }
    assert_eq!(shadow.len(), new.len());
    for (slot, item) in shadow.iter().zip(new) {
        if let (Some(origin), false) = *slot {
            assert_eq!(&old[origin], item);
        }
    }
});
