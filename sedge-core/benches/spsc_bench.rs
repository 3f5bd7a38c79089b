//! SPSC Ring Benchmarks
//!
//! Measures the single-threaded push/pop fast path and the cached-index
//! round trip. The ring is the per-event handoff cost between the ingest
//! and consumer cores, so every nanosecond here is on the tick-to-trade
//! path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sedge_core::spsc;

#[derive(Clone, Copy)]
struct Payload {
    _a: u64,
    _b: u64,
    _c: u64,
    _d: u64,
}

const PAYLOAD: Payload = Payload {
    _a: 1,
    _b: 2,
    _c: 3,
    _d: 4,
};

fn push_pop_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc/push_pop");
    group.significance_level(0.01).sample_size(1000);

    group.bench_function("push_then_pop", |b| {
        let (mut tx, mut rx) = spsc::ring::<Payload>(1024);
        b.iter(|| {
            let _ = tx.try_push(black_box(PAYLOAD));
            black_box(rx.try_pop());
        });
    });

    group.bench_function("push_full_ring", |b| {
        let (mut tx, _rx) = spsc::ring::<Payload>(64);
        while tx.try_push(PAYLOAD) {}
        b.iter(|| black_box(tx.try_push(black_box(PAYLOAD))));
    });

    group.bench_function("pop_empty_ring", |b| {
        let (_tx, mut rx) = spsc::ring::<Payload>(64);
        b.iter(|| black_box(rx.try_pop()));
    });

    group.finish();
}

fn burst_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc/burst");
    group.significance_level(0.01).sample_size(500);

    group.bench_function("burst_64", |b| {
        let (mut tx, mut rx) = spsc::ring::<Payload>(1024);
        b.iter(|| {
            for _ in 0..64 {
                let _ = tx.try_push(PAYLOAD);
            }
            while rx.try_pop().is_some() {}
        });
    });

    group.finish();
}

criterion_group!(benches, push_pop_bench, burst_bench);
criterion_main!(benches);
