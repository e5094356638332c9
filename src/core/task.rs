//! Units of work, task failures, and the decorator / error-handler seams shared by
//! the executor and the scheduler.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

/// Failure raised from inside a work item or scheduled job.
///
/// A task "throws" either by returning an error or by panicking; both end up here
/// and are contained by the pool that ran the task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task failed: {0}")]
    Failed(#[from] anyhow::Error),
    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Build a `TaskError` from a caught panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Self::Panicked(message)
    }
}

/// Outcome of running a single task.
pub type TaskResult = Result<(), TaskError>;

/// Conversion from whatever a task closure returns into a [`TaskResult`].
///
/// Implemented for `()` (infallible tasks) and for `Result<(), E>` where `E`
/// converts into `anyhow::Error`.
pub trait IntoTaskResult {
    /// Convert into a task result.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Failed`] when the closure reported an error.
    fn into_task_result(self) -> TaskResult;
}

impl IntoTaskResult for () {
    fn into_task_result(self) -> TaskResult {
        Ok(())
    }
}

impl<E> IntoTaskResult for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_task_result(self) -> TaskResult {
        self.map_err(|e| TaskError::Failed(e.into()))
    }
}

/// Run `f`, converting a panic into [`TaskError::Panicked`].
pub(crate) fn run_guarded<F>(f: F) -> TaskResult
where
    F: FnOnce() -> TaskResult,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(TaskError::from_panic(&*payload)))
}

type BoxedTask = Box<dyn FnOnce() -> TaskResult + Send + 'static>;

/// A zero-argument unit of work submitted to an [`AsyncExecutor`](crate::core::AsyncExecutor).
///
/// The optional name is what error handlers see when the work fails.
pub struct WorkItem {
    name: Option<Cow<'static, str>>,
    task: BoxedTask,
}

impl WorkItem {
    /// Wrap an anonymous closure.
    pub fn new<F, R>(f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoTaskResult,
    {
        Self {
            name: None,
            task: Box::new(move || f().into_task_result()),
        }
    }

    /// Wrap a closure under a name used in logs and error reports.
    pub fn named<N, F, R>(name: N, f: F) -> Self
    where
        N: Into<Cow<'static, str>>,
        F: FnOnce() -> R + Send + 'static,
        R: IntoTaskResult,
    {
        Self {
            name: Some(name.into()),
            task: Box::new(move || f().into_task_result()),
        }
    }

    /// Name of this work item, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Run the work on the current thread. Panics are caught and returned as
    /// [`TaskError::Panicked`].
    ///
    /// # Errors
    ///
    /// Returns the task's own error, or the panic it raised.
    pub fn run(self) -> TaskResult {
        run_guarded(self.task)
    }

    /// Replace this item with one that runs `around`, which receives the original
    /// item. The name is kept. This is the usual building block for decorators.
    #[must_use]
    pub fn wrap<F>(self, around: F) -> Self
    where
        F: FnOnce(Self) -> TaskResult + Send + 'static,
    {
        let name = self.name.clone();
        Self {
            name,
            task: Box::new(move || around(self)),
        }
    }

    pub(crate) fn into_parts(self) -> (Option<Cow<'static, str>>, BoxedTask) {
        (self.name, self.task)
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Wraps every work item before it reaches a pool thread.
///
/// An executor holds at most one decorator. Callers needing several behaviors
/// compose them into one decorator first.
pub trait TaskDecorator: Send + Sync + 'static {
    /// Return the replacement work item.
    fn decorate(&self, work: WorkItem) -> WorkItem;
}

impl<F> TaskDecorator for F
where
    F: Fn(WorkItem) -> WorkItem + Send + Sync + 'static,
{
    fn decorate(&self, work: WorkItem) -> WorkItem {
        self(work)
    }
}

/// Decorator that runs each work item inside a recovery block and logs any
/// failure, so nothing escapes to the pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveringDecorator;

impl TaskDecorator for RecoveringDecorator {
    fn decorate(&self, work: WorkItem) -> WorkItem {
        work.wrap(|inner| {
            let name = inner.name.clone();
            if let Err(err) = inner.run() {
                error!(task = name_or_anonymous(name.as_deref()), error = %err, "Work item failed");
            }
            Ok(())
        })
    }
}

/// Receives failures that escaped a work item or scheduled job.
pub trait TaskErrorHandler: Send + Sync + 'static {
    /// Handle the failure of the task called `task`.
    fn handle_error(&self, task: &str, error: &TaskError);
}

impl<F> TaskErrorHandler for F
where
    F: Fn(&str, &TaskError) + Send + Sync + 'static,
{
    fn handle_error(&self, task: &str, error: &TaskError) {
        self(task, error);
    }
}

/// Default error handler: logs the failure with the current thread name and
/// carries on.
#[derive(Debug, Clone, Copy)]
pub struct LoggingErrorHandler {
    context: &'static str,
}

impl LoggingErrorHandler {
    /// Handler for ad-hoc async work.
    pub const ASYNC: Self = Self { context: "async task" };
    /// Handler for scheduled jobs.
    pub const SCHEDULED: Self = Self { context: "scheduled job" };

    /// Create a handler that tags log lines with `context`.
    #[must_use]
    pub const fn new(context: &'static str) -> Self {
        Self { context }
    }
}

impl Default for LoggingErrorHandler {
    fn default() -> Self {
        Self::ASYNC
    }
}

impl TaskErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, task: &str, error: &TaskError) {
        let thread = std::thread::current();
        error!(
            thread = thread.name().unwrap_or("unnamed"),
            task = task,
            error = %error,
            "Unexpected error occurred invoking {}",
            self.context
        );
    }
}

/// Hand `error` to `handler`. A panic inside the handler is logged and
/// swallowed so the calling worker keeps its bookkeeping intact.
pub(crate) fn report_failure(handler: &dyn TaskErrorHandler, task: &str, error: &TaskError) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.handle_error(task, error))) {
        let thread = std::thread::current();
        error!(
            thread = thread.name().unwrap_or("unnamed"),
            task = task,
            error = %error,
            handler_panic = %TaskError::from_panic(&*payload),
            "Error handler panicked"
        );
    }
}

/// Shared handle to an error handler.
pub type SharedErrorHandler = Arc<dyn TaskErrorHandler>;

/// Shared handle to a decorator.
pub type SharedDecorator = Arc<dyn TaskDecorator>;

pub(crate) fn name_or_anonymous(name: Option<&str>) -> &str {
    name.unwrap_or("anonymous")
}
