//! Native implementation of `AsyncExecutor` using OS threads.
//!
//! # Design Principles
//!
//! - **No polling**: idle workers park on a `Condvar`; submissions notify one
//! - **Single lock**: queue, thread counts and lifecycle live under one `Mutex`
//! - **Detached workers**: threads exit on their own (keep-alive or shutdown);
//!   termination is observed through the live-thread count, not join handles

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{ExecutorConfig, RejectionPolicy};
use crate::core::task::{
    name_or_anonymous, report_failure, run_guarded, LoggingErrorHandler, SharedErrorHandler, WorkItem,
};
use crate::core::ExecutorError;

use super::{PoolCounters, PoolStats, TaskHandle};

/// Lifecycle of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Accepting work.
    Running,
    /// Refusing new work, draining the queue.
    Shutdown,
    /// Refusing new work, queue dropped.
    Stopped,
}

/// Mutable pool state, guarded by `Inner::state`.
struct PoolState {
    queue: VecDeque<WorkItem>,
    /// Threads alive (running work or waiting for it).
    workers: usize,
    /// Threads parked waiting for work.
    idle: usize,
    largest: usize,
    lifecycle: Lifecycle,
}

impl PoolState {
    /// Whether a new item can be queued without growing the pool. A zero-capacity
    /// queue still accepts a handoff while a parked thread is free to take it.
    fn has_room(&self, capacity: usize) -> bool {
        let queued = self.queue.len();
        queued < capacity || queued < self.idle
    }
}

struct Inner {
    config: ExecutorConfig,
    state: Mutex<PoolState>,
    /// Signaled when work is queued or the lifecycle changes.
    work_available: Condvar,
    /// Signaled when the last worker exits.
    terminated: Condvar,
    counters: PoolCounters,
    error_handler: SharedErrorHandler,
    thread_seq: AtomicUsize,
}

/// Bounded thread pool for fire-and-forget work.
///
/// Dropping the executor initiates a graceful shutdown (queued work still runs)
/// without waiting for it; call [`close`](Self::close) or
/// [`await_termination`](Self::await_termination) to wait.
pub struct AsyncExecutor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AsyncExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncExecutor")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl AsyncExecutor {
    /// Create a new executor. Threads are started lazily on submission.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate().map_err(ExecutorError::InvalidConfig)?;

        let error_handler = config
            .error_handler()
            .cloned()
            .unwrap_or_else(|| Arc::new(LoggingErrorHandler::ASYNC));

        info!(
            core_pool_size = config.core_pool_size,
            max_pool_size = config.max_pool_size,
            queue_capacity = config.queue_capacity,
            rejection_policy = ?config.rejection_policy,
            decorated = config.decorator().is_some(),
            "AsyncExecutor initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    workers: 0,
                    idle: 0,
                    largest: 0,
                    lifecycle: Lifecycle::Running,
                }),
                work_available: Condvar::new(),
                terminated: Condvar::new(),
                counters: PoolCounters::default(),
                error_handler,
                thread_seq: AtomicUsize::new(0),
            }),
        })
    }

    /// Submit a work item.
    ///
    /// The configured decorator is applied first. Returns immediately, except
    /// under [`RejectionPolicy::CallerRuns`] when the pool is saturated, in which
    /// case the work runs on the calling thread before this returns.
    ///
    /// # Errors
    ///
    /// - `ExecutorError::RejectedExecution` when saturated under the Abort policy
    /// - `ExecutorError::Shutdown` once the executor has been shut down
    /// - `ExecutorError::Spawn` if a worker thread could not be started
    pub fn submit(&self, work: WorkItem) -> Result<(), ExecutorError> {
        let inner = &self.inner;
        let work = match inner.config.decorator() {
            Some(decorator) => decorator.decorate(work),
            None => work,
        };
        inner.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);

        let mut state = inner.state.lock();
        if state.lifecycle != Lifecycle::Running {
            return Err(ExecutorError::Shutdown);
        }

        if state.workers < inner.config.core_pool_size {
            return Inner::add_worker(inner, &mut state, Some(work));
        }

        if state.has_room(inner.config.queue_capacity) {
            state.queue.push_back(work);
            if state.workers == 0 {
                // No core threads, or all of them timed out: start one to drain the queue.
                if let Err(err) = Inner::add_worker(inner, &mut state, None) {
                    state.queue.pop_back();
                    return Err(err);
                }
                return Ok(());
            }
            inner.work_available.notify_one();
            return Ok(());
        }

        if state.workers < inner.config.max_pool_size {
            return Inner::add_worker(inner, &mut state, Some(work));
        }

        let pool_size = state.workers;
        drop(state);
        self.reject(work, pool_size)
    }

    /// Submit a closure. Shorthand for `submit(WorkItem::new(f))`.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn execute<F>(&self, f: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(WorkItem::new(f))
    }

    /// Submit a closure whose return value is delivered through a [`TaskHandle`].
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_with_result<F, R>(&self, f: F) -> Result<TaskHandle<R>, ExecutorError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        self.submit(WorkItem::new(move || {
            // The caller may have dropped the handle; the value is simply discarded.
            let _ = tx.send(f());
        }))?;
        Ok(TaskHandle::new(rx))
    }

    /// Apply the rejection policy to work that found no room.
    fn reject(&self, work: WorkItem, pool_size: usize) -> Result<(), ExecutorError> {
        let inner = &self.inner;
        inner.counters.rejected_tasks.fetch_add(1, Ordering::Relaxed);
        let task = name_or_anonymous(work.name()).to_owned();

        match inner.config.rejection_policy {
            RejectionPolicy::Abort => {
                warn!(task = %task, pool_size = pool_size, "Executor saturated, rejecting task");
                Err(ExecutorError::RejectedExecution {
                    task,
                    pool_size,
                    queue_capacity: inner.config.queue_capacity,
                })
            }
            RejectionPolicy::CallerRuns => {
                debug!(task = %task, "Executor saturated, running task on caller thread");
                inner.run_work(work);
                Ok(())
            }
            RejectionPolicy::Discard => {
                debug!(task = %task, "Executor saturated, discarding task");
                Ok(())
            }
            RejectionPolicy::DiscardOldest => {
                let mut state = inner.state.lock();
                if state.lifecycle != Lifecycle::Running {
                    return Err(ExecutorError::Shutdown);
                }
                if !state.has_room(inner.config.queue_capacity) {
                    match state.queue.pop_front() {
                        Some(oldest) => {
                            debug!(
                                evicted = name_or_anonymous(oldest.name()),
                                task = %task,
                                "Executor saturated, discarding oldest queued task"
                            );
                        }
                        None => {
                            // Zero-capacity queue with nothing to evict.
                            debug!(task = %task, "Executor saturated, nothing to evict; discarding task");
                            return Ok(());
                        }
                    }
                }
                state.queue.push_back(work);
                inner.work_available.notify_one();
                Ok(())
            }
        }
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        self.inner
            .counters
            .snapshot(state.workers, state.largest, state.queue.len())
    }

    /// The configuration this executor was built with.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    /// Stop accepting work. Queued items still run; idle threads exit once the
    /// queue is empty.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.lifecycle == Lifecycle::Running {
            state.lifecycle = Lifecycle::Shutdown;
            info!(queued = state.queue.len(), "Shutting down executor");
        }
        self.inner.work_available.notify_all();
    }

    /// Stop accepting work and drop everything still queued. Running items are
    /// not interrupted. Returns the dropped items.
    pub fn shutdown_now(&self) -> Vec<WorkItem> {
        let mut state = self.inner.state.lock();
        state.lifecycle = Lifecycle::Stopped;
        let dropped: Vec<WorkItem> = state.queue.drain(..).collect();
        info!(dropped = dropped.len(), "Stopping executor now");
        self.inner.work_available.notify_all();
        dropped
    }

    /// Whether `shutdown` or `shutdown_now` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().lifecycle != Lifecycle::Running
    }

    /// Whether the executor is shut down and every worker thread has exited.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        let state = self.inner.state.lock();
        state.lifecycle != Lifecycle::Running && state.workers == 0
    }

    /// Block until all worker threads have exited or `timeout` elapses. Returns
    /// `true` if the pool terminated in time. Work still running afterwards is
    /// abandoned, not interrupted.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.workers > 0 {
            if self.inner.terminated.wait_until(&mut state, deadline).timed_out() {
                return state.workers == 0;
            }
        }
        true
    }

    /// Shut down and wait up to the configured await-termination timeout.
    /// Returns `true` if every worker exited in time.
    pub fn close(&self) -> bool {
        self.shutdown();
        let terminated = self.await_termination(self.inner.config.await_termination());
        if !terminated {
            warn!(
                pool_size = self.inner.state.lock().workers,
                "Executor did not terminate in time; abandoning running tasks"
            );
        }
        terminated
    }
}

impl Drop for AsyncExecutor {
    fn drop(&mut self) {
        // Signal shutdown but don't join: running work finishes on its own.
        let mut state = self.inner.state.lock();
        if state.lifecycle == Lifecycle::Running {
            state.lifecycle = Lifecycle::Shutdown;
            debug!("AsyncExecutor dropped without explicit shutdown; workers will drain and exit");
        }
        self.inner.work_available.notify_all();
    }
}

impl Inner {
    /// Start a worker with `first` as its initial task, or straight on the queue.
    fn add_worker(this: &Arc<Self>, state: &mut PoolState, first: Option<WorkItem>) -> Result<(), ExecutorError> {
        let worker_id = this.thread_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(this);

        let spawned = thread::Builder::new()
            .name(format!("{}{worker_id}", this.config.thread_name_prefix))
            .spawn(move || worker_loop(&inner, worker_id, first));

        match spawned {
            Ok(_) => {
                state.workers += 1;
                state.largest = state.largest.max(state.workers);
                debug!(worker_id = worker_id, pool_size = state.workers, "Worker thread started");
                Ok(())
            }
            Err(e) => {
                error!(worker_id = worker_id, error = %e, "Failed to spawn worker thread");
                Err(ExecutorError::Spawn(e))
            }
        }
    }

    /// Run one work item, containing any failure.
    fn run_work(&self, work: WorkItem) {
        self.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
        let (name, task) = work.into_parts();
        let result = run_guarded(task);
        self.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);

        match result {
            Ok(()) => {
                self.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                report_failure(&*self.error_handler, name_or_anonymous(name.as_deref()), &err);
            }
        }
    }

    /// Wait for the next queued item. Returns `None` when this worker should
    /// exit; the worker has then already been removed from the live count.
    fn next_work(&self) -> Option<WorkItem> {
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if let Some(work) = state.queue.pop_front() {
                return Some(work);
            }

            let may_time_out = self.config.allow_core_thread_timeout || state.workers > self.config.core_pool_size;
            if state.lifecycle != Lifecycle::Running || (timed_out && may_time_out) {
                state.workers -= 1;
                if state.workers == 0 {
                    self.terminated.notify_all();
                }
                return None;
            }

            state.idle += 1;
            timed_out = if may_time_out {
                self.work_available.wait_for(&mut state, self.config.keep_alive()).timed_out()
            } else {
                self.work_available.wait(&mut state);
                false
            };
            state.idle -= 1;
        }
    }
}

fn worker_loop(inner: &Arc<Inner>, worker_id: usize, first: Option<WorkItem>) {
    let mut next = first.or_else(|| inner.next_work());
    while let Some(work) = next {
        inner.run_work(work);
        next = inner.next_work();
    }
    debug!(worker_id = worker_id, "Worker thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn blocking_pool(queue_capacity: usize, policy: RejectionPolicy) -> AsyncExecutor {
        AsyncExecutor::new(
            ExecutorConfig::new()
                .with_core_pool_size(1)
                .with_max_pool_size(1)
                .with_queue_capacity(queue_capacity)
                .with_rejection_policy(policy)
                .with_await_termination(Duration::from_secs(5)),
        )
        .unwrap()
    }

    #[test]
    fn test_basic_execution() {
        let pool = AsyncExecutor::new(
            ExecutorConfig::new()
                .with_core_pool_size(2)
                .with_await_termination(Duration::from_secs(5)),
        )
        .unwrap();
        let handle = pool.submit_with_result(|| "done").unwrap();
        assert_eq!(handle.wait(Duration::from_secs(5)).unwrap(), "done");

        assert!(pool.close());
        let stats = pool.stats();
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.submitted_tasks, 1);
        assert_eq!(stats.pool_size, 0);
    }

    #[test]
    fn test_rejects_when_saturated() {
        let pool = blocking_pool(0, RejectionPolicy::Abort);
        let (release_tx, release_rx) = bounded::<()>(0);
        pool.execute(move || {
            let _ = release_rx.recv();
        })
        .unwrap();

        let err = pool.submit(WorkItem::named("second", || ())).unwrap_err();
        assert!(matches!(err, ExecutorError::RejectedExecution { ref task, pool_size: 1, .. } if task == "second"));
        assert_eq!(pool.stats().rejected_tasks, 1);

        drop(release_tx);
        assert!(pool.close());
    }

    #[test]
    fn test_zero_capacity_hands_off_to_idle_worker() {
        let pool = blocking_pool(0, RejectionPolicy::Abort);
        let ran = Arc::new(AtomicU64::new(0));

        // Wait until the first worker has parked, then hand it more work.
        let first = pool.submit_with_result(|| ()).unwrap();
        first.wait(Duration::from_secs(5)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.inner.state.lock().idle == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let counter = Arc::clone(&ran);
        pool.execute(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(pool.close());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().largest_pool_size, 1);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let pool = blocking_pool(4, RejectionPolicy::CallerRuns);
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(matches!(pool.execute(|| ()), Err(ExecutorError::Shutdown)));
        assert!(pool.is_terminated());
    }
}
