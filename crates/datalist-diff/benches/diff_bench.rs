//! Benchmarks for the sequence diff.
//!
//! Run with: cargo bench -p datalist-diff --bench diff_bench

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use datalist_core::Cx;
use datalist_diff::{Equality, calculate_diff};
use std::hint::black_box;

#[derive(Clone, PartialEq)]
struct Row {
    id: u32,
    rev: u32,
}

fn rows(n: u32) -> Vec<Row> {
    (0..n).map(|id| Row { id, rev: 0 }).collect()
}

/// Every 7th row edited, every 11th dropped, a few appended.
fn scattered_edit(old: &[Row]) -> Vec<Row> {
    let mut new: Vec<Row> = old
        .iter()
        .filter(|r| r.id % 11 != 0)
        .map(|r| Row {
            id: r.id,
            rev: u32::from(r.id % 7 == 0),
        })
        .collect();
    let base = old.len() as u32;
    new.extend((0..8).map(|i| Row { id: base + i, rev: 0 }));
    new
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    let equality = Equality::keyed(|r: &Row| r.id);
    let (cx, _ctrl) = Cx::background();

    for n in [100u32, 1_000, 5_000] {
        let old = rows(n);
        let same = old.clone();
        let edited = scattered_edit(&old);
        let mut reversed = old.clone();
        reversed.reverse();

        group.bench_with_input(BenchmarkId::new("identical", n), &n, |b, _| {
            b.iter(|| black_box(calculate_diff(&old, &same, &equality, true, &cx)))
        });
        group.bench_with_input(BenchmarkId::new("scattered", n), &n, |b, _| {
            b.iter(|| black_box(calculate_diff(&old, &edited, &equality, true, &cx)))
        });
        if n <= 1_000 {
            group.bench_with_input(BenchmarkId::new("reversed", n), &n, |b, _| {
                b.iter(|| black_box(calculate_diff(&old, &reversed, &equality, true, &cx)))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_diff);
criterion_main!(benches);
