//! Scheduler configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::task::{SharedErrorHandler, TaskErrorHandler};
use crate::util::env::{parse_var, process_env};

/// Configuration of a [`CronScheduler`](crate::core::CronScheduler).
///
/// Defaults: one scheduling thread named `scheduling-1`, non-daemon, 10 s wait
/// for in-flight jobs on stop.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Threads running job invocations.
    pub pool_size: usize,
    /// Scheduler threads are named `{prefix}{n}`; the dispatcher is `{prefix}dispatcher`.
    pub thread_name_prefix: String,
    /// A daemon scheduler does not wait for in-flight jobs when dropped.
    pub daemon: bool,
    /// How long `stop()` waits for in-flight jobs before abandoning them, in milliseconds.
    pub await_termination_ms: u64,
    #[serde(skip)]
    error_handler: Option<SharedErrorHandler>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            thread_name_prefix: "scheduling-".to_owned(),
            daemon: false,
            await_termination_ms: 10_000,
            error_handler: None,
        }
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("pool_size", &self.pool_size)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("daemon", &self.daemon)
            .field("await_termination_ms", &self.await_termination_ms)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of threads running job invocations.
    #[must_use]
    pub const fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Mark the scheduler as daemon (detach in-flight jobs on drop).
    #[must_use]
    pub const fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    /// Set how long `stop()` waits for in-flight jobs.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_await_termination(mut self, timeout: Duration) -> Self {
        self.await_termination_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the handler invoked with each failing job.
    #[must_use]
    pub fn with_error_handler(mut self, handler: impl TaskErrorHandler) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// `stop()` wait as a `Duration`.
    #[must_use]
    pub const fn await_termination(&self) -> Duration {
        Duration::from_millis(self.await_termination_ms)
    }

    /// The configured error handler, if any.
    #[must_use]
    pub fn error_handler(&self) -> Option<&SharedErrorHandler> {
        self.error_handler.as_ref()
    }

    pub(crate) fn set_error_handler(&mut self, handler: SharedErrorHandler) {
        self.error_handler = Some(handler);
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 {
            return Err("pool_size must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a message on malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from `TASK_SCHEDULING_*` environment variables, loading a
    /// `.env` file first when one exists.
    ///
    /// # Errors
    ///
    /// Returns a message when a variable does not parse or the result is invalid.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(process_env())
    }

    /// Like [`from_env`](Self::from_env) but reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns a message when a variable does not parse or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "TASK_SCHEDULING_POOL_SIZE")? {
            cfg.pool_size = v;
        }
        if let Some(v) = lookup("TASK_SCHEDULING_THREAD_NAME_PREFIX") {
            cfg.thread_name_prefix = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_SCHEDULING_DAEMON")? {
            cfg.daemon = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_SCHEDULING_SHUTDOWN_AWAIT_TERMINATION_MS")? {
            cfg.await_termination_ms = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
