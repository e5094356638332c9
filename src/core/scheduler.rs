//! Cron-driven scheduler for recurring jobs.
//!
//! Jobs are registered up front, then [`CronScheduler::start`] spawns one
//! dispatcher thread. The dispatcher sleeps until the earliest next-fire time,
//! hands every due job to the scheduler's worker pool, and computes each job's
//! following fire time strictly after "now". Ticks missed while the process was
//! busy or asleep are skipped rather than replayed.
//!
//! Each invocation is wrapped so that an error or panic reaches the configured
//! [`TaskErrorHandler`](crate::core::TaskErrorHandler) and nothing else: the job
//! keeps its schedule and other jobs are unaffected.
//!
//! ```rust,no_run
//! use task_lanes::config::SchedulerConfig;
//! use task_lanes::core::CronScheduler;
//!
//! let scheduler = CronScheduler::new(SchedulerConfig::new().with_pool_size(2))?;
//! scheduler.register("heartbeat", "*/5 * * * * *", || tracing::info!("alive"))?;
//! scheduler.start()?;
//! // ...
//! scheduler.stop();
//! # Ok::<(), task_lanes::core::SchedulerError>(())
//! ```

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{ExecutorConfig, RejectionPolicy, SchedulerConfig};
use crate::core::cron::{CronError, CronExpression};
use crate::core::task::{
    report_failure, run_guarded, IntoTaskResult, LoggingErrorHandler, SharedErrorHandler, TaskResult, WorkItem,
};
use crate::core::worker_pool::{AsyncExecutor, PoolStats};
use crate::core::SchedulerError;

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Whenever the cron expression matches.
    Cron(CronExpression),
    /// Every `period`, measured from one scheduled start to the next.
    FixedRate(Duration),
    /// `delay` after the previous invocation completes.
    FixedDelay(Duration),
}

impl Trigger {
    /// Parse a cron trigger.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidCronExpression` if `expr` does not parse.
    pub fn cron(expr: &str) -> Result<Self, SchedulerError> {
        CronExpression::parse(expr)
            .map(Self::Cron)
            .map_err(|source| SchedulerError::InvalidCronExpression {
                expression: expr.to_owned(),
                source,
            })
    }

    fn validate(&self, job: &str) -> Result<(), SchedulerError> {
        match self {
            Self::FixedRate(interval) | Self::FixedDelay(interval) if *interval < Duration::from_millis(1) => {
                Err(SchedulerError::InvalidTrigger {
                    job: job.to_owned(),
                    reason: format!("interval {interval:?} is shorter than 1ms"),
                })
            }
            _ => Ok(()),
        }
    }

    /// First fire time for a job registered with `base` as its earliest start.
    fn first_fire(&self, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(expr) => expr.next_after(&base),
            Self::FixedRate(_) | Self::FixedDelay(_) => Some(base),
        }
    }

    /// Fire time following a tick scheduled at `scheduled` and dispatched at
    /// `now`. Always strictly after both; missed ticks are skipped. Fixed-delay
    /// jobs return `None` here and are rescheduled on completion.
    fn next_fire(&self, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron(expr) => expr.next_after(&scheduled.max(now)),
            Self::FixedRate(period) => {
                let period = TimeDelta::from_std(*period).ok()?;
                let next = scheduled + period;
                if next > now {
                    return Some(next);
                }
                let step = period.num_milliseconds().max(1);
                let ticks = (now - scheduled).num_milliseconds() / step + 1;
                Some(scheduled + TimeDelta::milliseconds(step.saturating_mul(ticks)))
            }
            Self::FixedDelay(_) => None,
        }
    }

    fn after_completion(&self, completed: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::FixedDelay(delay) => TimeDelta::from_std(*delay).ok().map(|d| completed + d),
            Self::Cron(_) | Self::FixedRate(_) => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron(expr) => write!(f, "cron `{expr}`"),
            Self::FixedRate(period) => write!(f, "fixed rate {period:?}"),
            Self::FixedDelay(delay) => write!(f, "fixed delay {delay:?}"),
        }
    }
}

/// What to do when a tick comes due while the previous invocation still runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Start another invocation concurrently.
    #[default]
    Allow,
    /// Skip this tick.
    Skip,
}

type JobFn = Arc<dyn Fn() -> TaskResult + Send + Sync + 'static>;

/// A named recurring job.
pub struct ScheduledJob {
    name: String,
    trigger: Trigger,
    initial_delay: Duration,
    overlap: OverlapPolicy,
    task: JobFn,
}

impl ScheduledJob {
    /// Create a job with an explicit trigger.
    pub fn new<F, R>(name: impl Into<String>, trigger: Trigger, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        Self {
            name: name.into(),
            trigger,
            initial_delay: Duration::ZERO,
            overlap: OverlapPolicy::Allow,
            task: Arc::new(move || f().into_task_result()),
        }
    }

    /// Create a cron job.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidCronExpression` if `expr` does not parse.
    pub fn cron<F, R>(name: impl Into<String>, expr: &str, f: F) -> Result<Self, SchedulerError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        Ok(Self::new(name, Trigger::cron(expr)?, f))
    }

    /// Create a fixed-rate job.
    pub fn fixed_rate<F, R>(name: impl Into<String>, period: Duration, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        Self::new(name, Trigger::FixedRate(period), f)
    }

    /// Create a fixed-delay job.
    pub fn fixed_delay<F, R>(name: impl Into<String>, delay: Duration, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        Self::new(name, Trigger::FixedDelay(delay), f)
    }

    /// Delay the first fire time by `delay` from registration.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the overlap policy.
    #[must_use]
    pub const fn with_overlap_policy(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    /// Job name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Job trigger.
    #[must_use]
    pub const fn trigger(&self) -> &Trigger {
        &self.trigger
    }
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("initial_delay", &self.initial_delay)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

/// Per-job counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Invocations that ran to the end (successfully or not).
    pub invocations: u64,
    /// Invocations that returned an error or panicked.
    pub failures: u64,
    /// Ticks skipped by [`OverlapPolicy::Skip`].
    pub skipped: u64,
    /// Invocations dispatched but not yet finished.
    pub in_flight: usize,
}

/// A registered job plus its scheduling state.
struct JobEntry {
    job: ScheduledJob,
    next_fire: Mutex<Option<DateTime<Utc>>>,
    in_flight: AtomicUsize,
    invocations: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
}

impl JobEntry {
    fn new(job: ScheduledJob, first_fire: DateTime<Utc>) -> Self {
        Self {
            job,
            next_fire: Mutex::new(Some(first_fire)),
            in_flight: AtomicUsize::new(0),
            invocations: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    fn stats(&self) -> JobStats {
        JobStats {
            invocations: self.invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Messages to the dispatcher thread.
enum Control {
    /// Re-evaluate fire times (a fixed-delay job finished).
    Wake,
    /// Exit the dispatch loop.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Registering,
    Running,
    Stopped,
}

struct Lifecycle {
    phase: Phase,
    control_tx: Option<Sender<Control>>,
    dispatcher: Option<JoinHandle<()>>,
}

/// Dispatches registered jobs on their triggers.
pub struct CronScheduler {
    config: SchedulerConfig,
    jobs: RwLock<BTreeMap<String, Arc<JobEntry>>>,
    lifecycle: Mutex<Lifecycle>,
    workers: Arc<AsyncExecutor>,
    error_handler: SharedErrorHandler,
}

impl CronScheduler {
    /// Create a scheduler. No thread runs until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let error_handler = config
            .error_handler()
            .cloned()
            .unwrap_or_else(|| Arc::new(LoggingErrorHandler::SCHEDULED));

        let mut pool = ExecutorConfig::new()
            .with_core_pool_size(config.pool_size)
            .with_max_pool_size(config.pool_size)
            .with_queue_capacity(usize::MAX)
            .with_rejection_policy(RejectionPolicy::Abort)
            .with_thread_name_prefix(config.thread_name_prefix.clone())
            .with_await_termination(config.await_termination());
        pool.set_error_handler(Arc::clone(&error_handler));
        let workers = AsyncExecutor::new(pool)?;

        Ok(Self {
            config,
            jobs: RwLock::new(BTreeMap::new()),
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Registering,
                control_tx: None,
                dispatcher: None,
            }),
            workers: Arc::new(workers),
            error_handler,
        })
    }

    /// Register a cron job.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidCronExpression` on a malformed expression; the
    ///   job is not added
    /// - `SchedulerError::DuplicateJob` if `name` is taken
    /// - `SchedulerError::AlreadyStarted` / `Stopped` outside the registration phase
    pub fn register<F, R>(&self, name: impl Into<String>, cron_expr: &str, f: F) -> Result<(), SchedulerError>
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: IntoTaskResult,
    {
        self.register_job(ScheduledJob::cron(name, cron_expr, f)?)
    }

    /// Register a job. Its first fire time is computed relative to now.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register); interval triggers shorter than 1ms
    /// yield `SchedulerError::InvalidTrigger`.
    pub fn register_job(&self, job: ScheduledJob) -> Result<(), SchedulerError> {
        let lifecycle = self.lifecycle.lock();
        match lifecycle.phase {
            Phase::Registering => {}
            Phase::Running => return Err(SchedulerError::AlreadyStarted),
            Phase::Stopped => return Err(SchedulerError::Stopped),
        }

        job.trigger.validate(&job.name)?;
        let initial_delay = TimeDelta::from_std(job.initial_delay).map_err(|_| SchedulerError::InvalidTrigger {
            job: job.name.clone(),
            reason: format!("initial delay {:?} out of range", job.initial_delay),
        })?;
        let first_fire = job
            .trigger
            .first_fire(Utc::now() + initial_delay)
            .ok_or_else(|| match &job.trigger {
                Trigger::Cron(expr) => SchedulerError::InvalidCronExpression {
                    expression: expr.as_str().to_owned(),
                    source: CronError::NoFutureMatch,
                },
                other => SchedulerError::InvalidTrigger {
                    job: job.name.clone(),
                    reason: format!("{other} never fires"),
                },
            })?;

        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.name) {
            return Err(SchedulerError::DuplicateJob(job.name));
        }
        info!(job = %job.name, trigger = %job.trigger, first_fire = %first_fire, "Registered scheduled job");
        jobs.insert(job.name.clone(), Arc::new(JobEntry::new(job, first_fire)));
        drop(lifecycle);
        Ok(())
    }

    /// Start the dispatch loop. Calling it again while running is a no-op.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Stopped` if the scheduler was stopped
    /// - `SchedulerError::Spawn` if the dispatcher thread could not be started
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.phase {
            Phase::Registering => {}
            Phase::Running => {
                debug!("Scheduler already started");
                return Ok(());
            }
            Phase::Stopped => return Err(SchedulerError::Stopped),
        }

        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let dispatcher = Dispatcher {
            jobs: self.jobs.read().values().cloned().collect(),
            workers: Arc::clone(&self.workers),
            error_handler: Arc::clone(&self.error_handler),
            control_tx: control_tx.clone(),
            control_rx,
        };
        let handle = thread::Builder::new()
            .name(format!("{}dispatcher", self.config.thread_name_prefix))
            .spawn(move || dispatcher.run())?;

        lifecycle.phase = Phase::Running;
        lifecycle.control_tx = Some(control_tx);
        lifecycle.dispatcher = Some(handle);
        info!(
            jobs = self.jobs.read().len(),
            pool_size = self.config.pool_size,
            "Scheduler started"
        );
        Ok(())
    }

    /// Stop dispatching. In-flight invocations may finish until the configured
    /// await-termination timeout; anything still running then is abandoned.
    /// Returns `true` if every invocation finished in time.
    ///
    /// Called from inside one of this scheduler's own jobs, `stop` does not
    /// wait (the caller would be waiting on itself) and returns `false`.
    pub fn stop(&self) -> bool {
        if !self.halt_dispatch() {
            return self.workers.is_terminated();
        }
        self.workers.shutdown();
        if self.called_from_own_job() {
            debug!("Scheduler stopped from one of its own jobs; not waiting for in-flight work");
            return false;
        }
        let finished = self.workers.await_termination(self.config.await_termination());
        if finished {
            info!("Scheduler stopped");
        } else {
            warn!(
                timeout_ms = self.config.await_termination_ms,
                "In-flight jobs did not finish in time; abandoning them"
            );
        }
        finished
    }

    fn called_from_own_job(&self) -> bool {
        CURRENT_POOL.with(Cell::get) == pool_id(&self.workers)
    }

    /// Move to `Stopped` and join the dispatcher. Returns `false` if the
    /// scheduler was already stopped.
    fn halt_dispatch(&self) -> bool {
        let (control_tx, dispatcher) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.phase == Phase::Stopped {
                return false;
            }
            lifecycle.phase = Phase::Stopped;
            (lifecycle.control_tx.take(), lifecycle.dispatcher.take())
        };

        if let Some(tx) = control_tx {
            let _ = tx.send(Control::Stop);
        }
        if let Some(handle) = dispatcher {
            if handle.join().is_err() {
                error!("Scheduler dispatcher thread panicked");
            }
        }
        true
    }

    /// Whether the dispatch loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().phase == Phase::Running
    }

    /// Names of all registered jobs, sorted.
    #[must_use]
    pub fn job_names(&self) -> Vec<String> {
        self.jobs.read().keys().cloned().collect()
    }

    /// Next fire time of a job. `None` for unknown jobs, for fixed-delay jobs
    /// while an invocation runs, and for cron jobs that will never fire again.
    #[must_use]
    pub fn next_fire_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.jobs.read().get(name).and_then(|entry| *entry.next_fire.lock())
    }

    /// Counters for a job.
    #[must_use]
    pub fn job_stats(&self, name: &str) -> Option<JobStats> {
        self.jobs.read().get(name).map(|entry| entry.stats())
    }

    /// Statistics of the worker pool running invocations.
    #[must_use]
    pub fn worker_stats(&self) -> PoolStats {
        self.workers.stats()
    }

    /// The configuration this scheduler was built with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        if !self.halt_dispatch() {
            return;
        }
        self.workers.shutdown();
        if self.config.daemon || self.called_from_own_job() {
            debug!("Scheduler dropped without waiting; in-flight jobs are detached");
        } else if !self.workers.await_termination(self.config.await_termination()) {
            warn!("Scheduler dropped with jobs still running; abandoning them");
        }
    }
}

/// State owned by the dispatcher thread. The job list is a snapshot taken at
/// start and never changes afterwards.
struct Dispatcher {
    jobs: Vec<Arc<JobEntry>>,
    workers: Arc<AsyncExecutor>,
    error_handler: SharedErrorHandler,
    control_tx: Sender<Control>,
    control_rx: Receiver<Control>,
}

impl Dispatcher {
    fn run(self) {
        debug!(jobs = self.jobs.len(), "Dispatch loop started");
        loop {
            let now = Utc::now();
            let mut earliest: Option<DateTime<Utc>> = None;

            for entry in &self.jobs {
                let Some(fire_at) = *entry.next_fire.lock() else {
                    continue;
                };
                let upcoming = if fire_at <= now {
                    self.fire(entry, fire_at, now)
                } else {
                    Some(fire_at)
                };
                if let Some(t) = upcoming {
                    earliest = Some(earliest.map_or(t, |e| e.min(t)));
                }
            }

            let control = match earliest {
                Some(t) => {
                    let wait = (t - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    match self.control_rx.recv_timeout(wait) {
                        Ok(control) => Some(control),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => Some(Control::Stop),
                    }
                }
                None => Some(self.control_rx.recv().unwrap_or(Control::Stop)),
            };

            if matches!(control, Some(Control::Stop)) {
                break;
            }
        }
        debug!("Dispatch loop stopped");
    }

    /// Dispatch one due tick and return the job's next fire time.
    fn fire(&self, entry: &Arc<JobEntry>, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = entry.job.trigger.next_fire(scheduled, now);
        // Set before submitting: a fixed-delay invocation writes its own next
        // fire time on completion.
        *entry.next_fire.lock() = next;

        if entry.job.overlap == OverlapPolicy::Skip && entry.in_flight.load(Ordering::Acquire) > 0 {
            entry.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(job = %entry.job.name, "Previous invocation still running, skipping tick");
            return next;
        }

        entry.in_flight.fetch_add(1, Ordering::AcqRel);
        debug!(job = %entry.job.name, scheduled = %scheduled, "Dispatching job");
        let work = invocation(
            Arc::clone(entry),
            Arc::clone(&self.error_handler),
            self.control_tx.clone(),
            pool_id(&self.workers),
        );
        if let Err(err) = self.workers.submit(work) {
            entry.in_flight.fetch_sub(1, Ordering::AcqRel);
            warn!(job = %entry.job.name, error = %err, "Failed to dispatch job");
            if let Some(retry) = entry.job.trigger.after_completion(Utc::now()) {
                *entry.next_fire.lock() = Some(retry);
                return Some(retry);
            }
        }
        next
    }
}

thread_local! {
    /// Identity of the scheduler pool whose job this thread is running, or 0.
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

fn pool_id(workers: &Arc<AsyncExecutor>) -> usize {
    Arc::as_ptr(workers) as usize
}

/// Wrap one invocation of a job: contain its failure, update counters, and
/// reschedule fixed-delay jobs once it completes.
fn invocation(
    entry: Arc<JobEntry>,
    error_handler: SharedErrorHandler,
    control_tx: Sender<Control>,
    pool: usize,
) -> WorkItem {
    WorkItem::named(entry.job.name.clone(), move || {
        let outer = CURRENT_POOL.with(|current| current.replace(pool));
        let result = run_guarded(|| (entry.job.task)());
        entry.invocations.fetch_add(1, Ordering::Relaxed);
        if let Err(err) = &result {
            entry.failures.fetch_add(1, Ordering::Relaxed);
            report_failure(&*error_handler, &entry.job.name, err);
        }
        CURRENT_POOL.with(|current| current.set(outer));
        entry.in_flight.fetch_sub(1, Ordering::AcqRel);

        if let Some(next) = entry.job.trigger.after_completion(Utc::now()) {
            *entry.next_fire.lock() = Some(next);
            // The dispatcher is gone once the scheduler stops.
            let _ = control_tx.send(Control::Wake);
        }
    })
}
