//! Error types for executor and scheduler operations.

use thiserror::Error;

use crate::core::cron::CronError;

/// Errors produced by an [`AsyncExecutor`](crate::core::AsyncExecutor).
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Pool and queue are saturated and the Abort policy is in effect.
    #[error("task `{task}` rejected: {pool_size} threads busy and queue of {queue_capacity} full")]
    RejectedExecution {
        /// Name of the rejected work item.
        task: String,
        /// Threads alive when the task was rejected.
        pool_size: usize,
        /// Configured queue capacity.
        queue_capacity: usize,
    },
    /// The executor no longer accepts work.
    #[error("executor has been shut down")]
    Shutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// Waiting for a task result timed out.
    #[error("operation timed out")]
    Timeout,
    /// The task producing a result was dropped or failed before producing it.
    #[error("task result lost: work was discarded or failed")]
    ResultLost,
}

/// Errors produced by a [`CronScheduler`](crate::core::CronScheduler).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A cron expression failed to parse or can never fire.
    #[error("invalid cron expression `{expression}`: {source}")]
    InvalidCronExpression {
        /// The offending expression.
        expression: String,
        /// Parse failure detail.
        #[source]
        source: CronError,
    },
    /// A fixed-rate or fixed-delay interval is unusable.
    #[error("invalid trigger for job `{job}`: {reason}")]
    InvalidTrigger {
        /// Job name.
        job: String,
        /// Why the trigger was refused.
        reason: String,
    },
    /// A job with this name is already registered.
    #[error("job `{0}` is already registered")]
    DuplicateJob(String),
    /// Jobs can only be registered before the scheduler starts.
    #[error("scheduler already started; jobs must be registered before start")]
    AlreadyStarted,
    /// The scheduler was stopped and cannot be restarted.
    #[error("scheduler has been stopped")]
    Stopped,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The dispatcher thread could not be started.
    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The underlying worker pool failed.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
