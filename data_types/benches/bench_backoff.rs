use criterion::{Criterion, criterion_group, criterion_main};
use data_types::{Backoff, compute_delay};
use std::{hint::black_box, time::Duration};

fn bench_compute_delay(c: &mut Criterion) {
    c.bench_function("compute_delay", |b| {
        b.iter(|| {
            for attempt in 1..=16 {
                black_box(compute_delay(
                    black_box(attempt),
                    black_box(1000),
                    black_box(30_000),
                    black_box(2.0),
                ));
            }
        })
    });
}

fn bench_backoff_delay(c: &mut Criterion) {
    let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 5).with_multiplier(1.5);
    c.bench_function("Backoff::delay", |b| {
        b.iter(|| {
            let d = backoff.delay(black_box(4));
            black_box(d);
        })
    });
}

criterion_group!(backoff_benches, bench_compute_delay, bench_backoff_delay);
criterion_main!(backoff_benches);
