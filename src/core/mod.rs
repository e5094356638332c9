//! Core task execution and scheduling.

pub mod cron;
pub mod error;
pub mod scheduler;
pub mod task;
pub mod worker_pool;

pub use cron::{CronError, CronExpression, CronField};
pub use error::{ExecutorError, SchedulerError};
pub use scheduler::{CronScheduler, JobStats, OverlapPolicy, ScheduledJob, Trigger};
pub use task::{
    IntoTaskResult, LoggingErrorHandler, RecoveringDecorator, SharedDecorator, SharedErrorHandler, TaskDecorator,
    TaskError, TaskErrorHandler, TaskResult, WorkItem,
};
pub use worker_pool::{AsyncExecutor, PoolStats, TaskHandle};
