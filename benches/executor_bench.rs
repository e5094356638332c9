//! Benchmarks for the executor and cron evaluation.
//!
//! Benchmarks cover:
//! - Submission throughput through the queue
//! - Rejection policy overhead when saturated
//! - Next-fire-time computation for common expressions

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use task_lanes::config::{ExecutorConfig, RejectionPolicy};
use task_lanes::core::{AsyncExecutor, CronExpression};

fn bench_pool(core: usize, policy: RejectionPolicy, queue: usize) -> AsyncExecutor {
    AsyncExecutor::new(
        ExecutorConfig::new()
            .with_core_pool_size(core)
            .with_max_pool_size(core)
            .with_queue_capacity(queue)
            .with_rejection_policy(policy)
            .with_await_termination(Duration::from_secs(30)),
    )
    .unwrap()
}

// ============================================================================
// Executor Benchmarks
// ============================================================================

fn bench_submit_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor_submit_and_drain");

    for task_count in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(task_count));
        group.bench_with_input(BenchmarkId::from_parameter(task_count), &task_count, |b, &task_count| {
            b.iter(|| {
                let pool = bench_pool(4, RejectionPolicy::Abort, usize::MAX);
                let done = Arc::new(AtomicU64::new(0));
                for i in 0..task_count {
                    let done = Arc::clone(&done);
                    pool.execute(move || {
                        black_box(i);
                        done.fetch_add(1, Ordering::Relaxed);
                    })
                    .unwrap();
                }
                assert!(pool.close());
                assert_eq!(done.load(Ordering::Relaxed), task_count);
            });
        });
    }
    group.finish();
}

fn bench_saturated_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor_saturated");

    for policy in [RejectionPolicy::CallerRuns, RejectionPolicy::Discard, RejectionPolicy::DiscardOldest] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{policy:?}")), &policy, |b, &policy| {
            b.iter(|| {
                let pool = bench_pool(1, policy, 16);
                for i in 0..1_000_u64 {
                    pool.execute(move || {
                        black_box(i);
                    })
                    .unwrap();
                }
                assert!(pool.close());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Cron Benchmarks
// ============================================================================

fn bench_cron_next_after(c: &mut Criterion) {
    let mut group = c.benchmark_group("cron_next_after");
    let reference = Utc.with_ymd_and_hms(2026, 10, 16, 16, 50, 3).unwrap();

    for expr in ["*/5 * * * * *", "0 */15 9-17 * * MON-FRI", "0 0 0 29 2 ?"] {
        let cron = CronExpression::parse(expr).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(expr), &cron, |b, cron| {
            b.iter(|| black_box(cron.next_after(black_box(&reference))));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(executor_benches, bench_submit_and_drain, bench_saturated_policies);

criterion_group!(cron_benches, bench_cron_next_after);

criterion_main!(executor_benches, cron_benches);
