//! Skip list benchmarks.
//!
//! Run with: cargo bench -p strata-skiplist

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use strata_skiplist::pool::Heap;
use strata_skiplist::{node_layout, BasicComparator, SkipList};

const N: u64 = 1_000;

fn keys() -> impl Iterator<Item = u64> {
    let mut num = 0u64;
    (0..N).map(move |_| {
        num = num.wrapping_mul(17).wrapping_add(255);
        num
    })
}

fn filled() -> SkipList<u64, u64> {
    let list = SkipList::new();
    for k in keys() {
        list.insert(k, !k);
    }
    list
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    group.bench_function("pool", |b| {
        b.iter(|| {
            let list = SkipList::new();
            for k in keys() {
                list.insert(k, !k);
            }
            list
        });
    });

    group.bench_function("heap", |b| {
        b.iter(|| {
            let heap = Arc::new(Heap::new(node_layout::<u64, u64>));
            let list = SkipList::<u64, u64, _, _>::with_allocator(BasicComparator, heap).unwrap();
            for k in keys() {
                list.insert(k, !k);
            }
            list
        });
    });

    group.bench_function("from_back/ascending", |b| {
        b.iter(|| {
            let list = SkipList::new();
            for k in 0..N {
                list.insert_from_back(k, k);
            }
            list
        });
    });

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let list = filled();
    c.bench_function("lookup", |b| {
        b.iter(|| {
            for k in keys() {
                black_box(list.find(&k));
            }
        });
    });
}

fn bench_iter(c: &mut Criterion) {
    let list = filled();
    c.bench_function("iter", |b| {
        b.iter(|| {
            for h in list.iter() {
                black_box(h.key());
            }
        });
    });
}

fn bench_pop_front(c: &mut Criterion) {
    c.bench_function("pop_front", |b| {
        b.iter_batched(
            filled,
            |list| {
                while let Some(h) = list.pop_front() {
                    black_box(h.value());
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_insert_remove(c: &mut Criterion) {
    let list = filled();
    c.bench_function("insert_remove", |b| {
        b.iter(|| {
            let handles = keys().map(|k| list.insert(k, k)).collect::<Vec<_>>();
            for h in handles {
                list.remove(&h).unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_lookup,
    bench_iter,
    bench_pop_front,
    bench_insert_remove
);
criterion_main!(benches);
