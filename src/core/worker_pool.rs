//! Bounded worker pool with pluggable decoration and rejection policy.
//!
//! [`AsyncExecutor`] runs fire-and-forget [`WorkItem`](crate::core::WorkItem)s on
//! dedicated OS threads. Sizing follows the classic core/queue/max progression:
//!
//! 1. While fewer than `core_pool_size` threads exist, every submission starts a
//!    new thread.
//! 2. Otherwise work is queued, up to `queue_capacity` items.
//! 3. Once the queue is full the pool grows, up to `max_pool_size` threads.
//! 4. Past that the [`RejectionPolicy`](crate::config::RejectionPolicy) decides.
//!
//! # Example
//!
//! ```rust,no_run
//! use task_lanes::config::{ExecutorConfig, RejectionPolicy};
//! use task_lanes::core::{AsyncExecutor, WorkItem};
//!
//! let executor = AsyncExecutor::new(
//!     ExecutorConfig::new()
//!         .with_core_pool_size(2)
//!         .with_max_pool_size(4)
//!         .with_queue_capacity(100)
//!         .with_rejection_policy(RejectionPolicy::CallerRuns),
//! )?;
//!
//! executor.submit(WorkItem::named("warm-cache", || println!("warming")))?;
//! let handle = executor.submit_with_result(|| 6 * 7)?;
//! assert_eq!(handle.wait(std::time::Duration::from_secs(1))?, 42);
//! executor.close();
//! # Ok::<(), task_lanes::core::ExecutorError>(())
//! ```

mod executor;
mod handle;

use std::sync::atomic::{AtomicU64, Ordering};

pub use executor::AsyncExecutor;
pub use handle::TaskHandle;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Threads currently alive.
    pub pool_size: usize,
    /// Most threads ever alive at once.
    pub largest_pool_size: usize,
    /// Threads currently running work.
    pub active_tasks: u64,
    /// Work items waiting in the queue.
    pub queued_tasks: usize,
    /// Work items that ran to completion without error.
    pub completed_tasks: u64,
    /// Work items that returned an error or panicked.
    pub failed_tasks: u64,
    /// Work items accepted or rejected by `submit`.
    pub submitted_tasks: u64,
    /// Submissions that hit the rejection policy.
    pub rejected_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub rejected_tasks: AtomicU64,
}

impl PoolCounters {
    /// Snapshot the counters; sizes come from the locked pool state.
    pub fn snapshot(&self, pool_size: usize, largest_pool_size: usize, queued_tasks: usize) -> PoolStats {
        PoolStats {
            pool_size,
            largest_pool_size,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks,
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            rejected_tasks: self.rejected_tasks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_default() {
        let stats = PoolStats::default();
        assert_eq!(stats.pool_size, 0);
        assert_eq!(stats.active_tasks, 0);
        assert_eq!(stats.completed_tasks, 0);
    }

    #[test]
    fn test_pool_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.submitted_tasks.fetch_add(10, Ordering::Relaxed);
        counters.completed_tasks.fetch_add(5, Ordering::Relaxed);
        counters.rejected_tasks.fetch_add(2, Ordering::Relaxed);

        let stats = counters.snapshot(4, 6, 3);
        assert_eq!(stats.pool_size, 4);
        assert_eq!(stats.largest_pool_size, 6);
        assert_eq!(stats.queued_tasks, 3);
        assert_eq!(stats.submitted_tasks, 10);
        assert_eq!(stats.completed_tasks, 5);
        assert_eq!(stats.rejected_tasks, 2);
    }
}
