use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use futures::executor::block_on;

use phragma::backend::{InMemoryLimiterBackend, LimiterBackend, MemoryBackendConfig};

fn backend() -> InMemoryLimiterBackend {
    let backend = InMemoryLimiterBackend::new(MemoryBackendConfig {
        // Keep the reaper quiet during measurement.
        cleanup_interval: Duration::from_secs(3_600),
        max_keys: 1_000_000,
    })
    .unwrap();
    block_on(backend.connect()).unwrap();
    backend
}

pub fn bench_hot_key_admitted(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_fixed_window/hot_key_admitted");
    group.sample_size(200);

    group.bench_function("check_limit", |b| {
        let backend = backend();

        b.iter(|| {
            black_box(block_on(backend.check_limit(
                black_box("k"),
                black_box(u64::MAX),
                black_box(60_000),
            )))
        });
    });

    group.finish();
}

pub fn bench_hot_key_rejected(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_fixed_window/hot_key_rejected");
    group.sample_size(200);

    group.bench_function("check_limit", |b| {
        let backend = backend();
        block_on(backend.check_limit("k", 1, 3_600_000)).unwrap();

        b.iter(|| {
            black_box(block_on(backend.check_limit(
                black_box("k"),
                black_box(1),
                black_box(3_600_000),
            )))
        });
    });

    group.finish();
}

pub fn bench_many_keys_admitted(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_fixed_window/many_keys_admitted");
    group.sample_size(100);

    for key_space in [1_000_usize, 100_000] {
        group.bench_function(format!("check_limit/keys={key_space}"), |b| {
            let backend = backend();
            let keys: Vec<String> = (0..key_space).map(|i| format!("user_{i}")).collect();
            let mut next = 0usize;

            b.iter(|| {
                let key = &keys[next];
                next = (next + 1) % keys.len();
                black_box(block_on(backend.check_limit(
                    black_box(key),
                    black_box(u64::MAX),
                    black_box(60_000),
                )))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_hot_key_admitted,
    bench_hot_key_rejected,
    bench_many_keys_admitted
);
criterion_main!(benches);
