//! Slab Pool Benchmarks
//!
//! Acquire/release is the cost of buffering one out-of-order packet. The
//! CAS free list should stay in the low tens of nanoseconds uncontended.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sedge_core::core::RawPacket;
use sedge_core::pool::SlabPool;

fn acquire_release_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/acquire_release");
    group.significance_level(0.01).sample_size(1000);

    group.bench_function("u64_roundtrip", |b| {
        let pool = SlabPool::<u64>::new(1024);
        b.iter(|| {
            let guard = pool.try_insert(black_box(42)).unwrap();
            black_box(&guard);
        });
    });

    group.bench_function("raw_packet_roundtrip", |b| {
        let pool = SlabPool::<RawPacket>::new(1024);
        let bytes = [0xABu8; 64];
        b.iter(|| {
            let guard = pool.try_insert(RawPacket::copy_from(black_box(&bytes))).unwrap();
            black_box(&guard);
        });
    });

    group.bench_function("exhausted_pool_failure", |b| {
        let pool = SlabPool::<u64>::new(2);
        let _a = pool.try_insert(1).unwrap();
        let _b = pool.try_insert(2).unwrap();
        b.iter(|| black_box(pool.try_insert(3).is_none()));
    });

    group.finish();
}

fn contention_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool/contended");
    group.significance_level(0.01).sample_size(200);

    group.bench_function("two_thread_churn", |b| {
        let pool = SlabPool::<u64>::new(256);
        b.iter(|| {
            let other = pool.clone();
            let handle = std::thread::spawn(move || {
                for i in 0..1_000u64 {
                    if let Some(g) = other.try_insert(i) {
                        black_box(&g);
                    }
                }
            });
            for i in 0..1_000u64 {
                if let Some(g) = pool.try_insert(i) {
                    black_box(&g);
                }
            }
            handle.join().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, acquire_release_bench, contention_bench);
criterion_main!(benches);
