//! Benchmarks for the reservation queue and the composition arithmetic.
//!
//! Benchmarks cover:
//! - Merging requests from a handful of owners
//! - Draining a populated queue in batches
//! - Previewing partition totals over a busy queue
//! - Combining and splitting across aggregate parents

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

use battery_os::core::aggregate::{combine, split_target};
use battery_os::core::{EventQueue, ScheduleRequest, Status};

const OWNERS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

// ============================================================================
// Helpers
// ============================================================================

fn requests(count: u64, seed: u64) -> Vec<(ScheduleRequest, &'static str)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=count)
        .map(|sequence| {
            let start = u128::from(rng.random_range(0..100_000u64));
            let len = u128::from(rng.random_range(1..5_000u64));
            let target = f64::from(rng.random_range(-2_000..=2_000i32));
            let owner = OWNERS[rng.random_range(0..OWNERS.len())];
            (ScheduleRequest::new(owner, sequence, target, start, start + len), owner)
        })
        .collect()
}

fn populated(count: u64) -> EventQueue {
    let mut queue = EventQueue::new();
    for (request, owner) in requests(count, 42) {
        queue.merge(&request, owner);
    }
    queue
}

fn parents(count: usize) -> Vec<Status> {
    (0..count)
        .map(|i| {
            let scale = 1.0 + i as f64;
            Status {
                voltage_mv: 3_700.0 + i as f64,
                current_ma: 0.0,
                capacity_mah: 1_000.0 * scale,
                max_capacity_mah: 2_000.0 * scale,
                max_charge_current_ma: 500.0 * scale,
                max_discharge_current_ma: 800.0 * scale,
                timestamp_ms: 1,
            }
        })
        .collect()
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue_merge");

    for size in [100u64, 1_000, 5_000] {
        let batch = requests(size, 7);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| {
                let mut queue = EventQueue::new();
                for (request, owner) in batch {
                    black_box(queue.merge(request, owner));
                }
                queue
            });
        });
    }
    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue_drain");

    for size in [100u64, 1_000, 5_000] {
        let queue = populated(size);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &queue, |b, queue| {
            b.iter(|| {
                let mut queue = queue.clone();
                for now in (0..110_000u128).step_by(1_000) {
                    black_box(queue.drain_due(now));
                    black_box(queue.net_current());
                }
            });
        });
    }
    group.finish();
}

fn bench_preview_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue_preview");

    for size in [100u64, 1_000] {
        let queue = populated(size);
        let request = ScheduleRequest::new("alpha", size + 1, 250.0, 40_000, 60_000);
        group.bench_with_input(BenchmarkId::from_parameter(size), &queue, |b, queue| {
            b.iter(|| {
                let mut preview = queue.clone();
                preview.merge(&request, "alpha");
                let totals: Vec<f64> = std::iter::once(request.start_ms)
                    .chain(preview.edges_within(request.start_ms, request.end_ms, |_| true))
                    .map(|t| preview.level_at(t, |_| true))
                    .collect();
                black_box(totals)
            });
        });
    }
    group.finish();
}

// ============================================================================
// Aggregate Benchmarks
// ============================================================================

fn bench_aggregate_math(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_math");

    for count in [2usize, 8, 32] {
        let statuses = parents(count);
        group.bench_with_input(BenchmarkId::new("combine", count), &statuses, |b, statuses| {
            b.iter(|| black_box(combine(statuses, 500.0)));
        });
        group.bench_with_input(BenchmarkId::new("split", count), &statuses, |b, statuses| {
            b.iter(|| black_box(split_target(statuses, 1_500.0)));
        });
    }
    group.finish();
}

criterion_group!(queue_benches, bench_merge, bench_drain, bench_preview_levels);

criterion_group!(aggregate_benches, bench_aggregate_math);

criterion_main!(queue_benches, aggregate_benches);
