//! Executor pool configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::task::{SharedDecorator, SharedErrorHandler, TaskErrorHandler};
use crate::util::env::{parse_var, process_env};

/// What an executor does with work it has no room for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Fail the submission with `ExecutorError::RejectedExecution`.
    #[default]
    Abort,
    /// Run the work on the submitting thread.
    CallerRuns,
    /// Drop the work silently.
    Discard,
    /// Drop the oldest queued item and enqueue the new one.
    DiscardOldest,
}

impl FromStr for RejectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" => Ok(Self::Abort),
            "caller_runs" => Ok(Self::CallerRuns),
            "discard" => Ok(Self::Discard),
            "discard_oldest" => Ok(Self::DiscardOldest),
            other => Err(format!("unknown rejection policy `{other}`")),
        }
    }
}

/// Configuration of an [`AsyncExecutor`](crate::core::AsyncExecutor).
///
/// Defaults: 8 core threads, unbounded max pool and queue, 60 s keep-alive,
/// Abort policy, `task-` thread names.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Threads kept alive even when idle.
    pub core_pool_size: usize,
    /// Upper bound on threads; only reached once the queue is full.
    pub max_pool_size: usize,
    /// Queued work items before the pool grows past core size.
    pub queue_capacity: usize,
    /// Idle time after which threads above core size exit, in milliseconds.
    pub keep_alive_ms: u64,
    /// Let core threads time out too.
    pub allow_core_thread_timeout: bool,
    /// Applied when pool and queue are saturated.
    pub rejection_policy: RejectionPolicy,
    /// Worker threads are named `{prefix}{n}`.
    pub thread_name_prefix: String,
    /// How long `close()` waits for running work, in milliseconds.
    pub await_termination_ms: u64,
    #[serde(skip)]
    decorator: Option<SharedDecorator>,
    #[serde(skip)]
    error_handler: Option<SharedErrorHandler>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            core_pool_size: 8,
            max_pool_size: usize::MAX,
            queue_capacity: usize::MAX,
            keep_alive_ms: 60_000,
            allow_core_thread_timeout: false,
            rejection_policy: RejectionPolicy::Abort,
            thread_name_prefix: "task-".to_owned(),
            await_termination_ms: 0,
            decorator: None,
            error_handler: None,
        }
    }
}

impl fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("core_pool_size", &self.core_pool_size)
            .field("max_pool_size", &self.max_pool_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("keep_alive_ms", &self.keep_alive_ms)
            .field("allow_core_thread_timeout", &self.allow_core_thread_timeout)
            .field("rejection_policy", &self.rejection_policy)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("await_termination_ms", &self.await_termination_ms)
            .field("decorator", &self.decorator.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl ExecutorConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the core pool size.
    #[must_use]
    pub const fn with_core_pool_size(mut self, size: usize) -> Self {
        self.core_pool_size = size;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub const fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }

    /// Set the queue capacity. Zero hands work straight to idle threads.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the idle keep-alive.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive_ms = keep_alive.as_millis() as u64;
        self
    }

    /// Let core threads exit after the keep-alive as well.
    #[must_use]
    pub const fn with_allow_core_thread_timeout(mut self, allow: bool) -> Self {
        self.allow_core_thread_timeout = allow;
        self
    }

    /// Set the rejection policy.
    #[must_use]
    pub const fn with_rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set how long `close()` waits for running work.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_await_termination(mut self, timeout: Duration) -> Self {
        self.await_termination_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the handler receiving errors that escape work items.
    #[must_use]
    pub fn with_error_handler(mut self, handler: impl TaskErrorHandler) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Idle keep-alive as a `Duration`.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// `close()` wait as a `Duration`.
    #[must_use]
    pub const fn await_termination(&self) -> Duration {
        Duration::from_millis(self.await_termination_ms)
    }

    /// The configured decorator, if any. Set through
    /// [`TaskExecutorBuilder`](crate::builders::TaskExecutorBuilder).
    #[must_use]
    pub fn decorator(&self) -> Option<&SharedDecorator> {
        self.decorator.as_ref()
    }

    /// The configured error handler, if any.
    #[must_use]
    pub fn error_handler(&self) -> Option<&SharedErrorHandler> {
        self.error_handler.as_ref()
    }

    pub(crate) fn set_decorator(&mut self, decorator: SharedDecorator) {
        self.decorator = Some(decorator);
    }

    pub(crate) fn set_error_handler(&mut self, handler: SharedErrorHandler) {
        self.error_handler = Some(handler);
    }

    /// Validate pool sizing.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_pool_size == 0 {
            return Err("max_pool_size must be greater than 0".into());
        }
        if self.core_pool_size > self.max_pool_size {
            return Err(format!(
                "core_pool_size ({}) must not exceed max_pool_size ({})",
                self.core_pool_size, self.max_pool_size
            ));
        }
        if self.allow_core_thread_timeout && self.keep_alive_ms == 0 {
            return Err("keep_alive_ms must be greater than 0 when core threads may time out".into());
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

    /// Read configuration from `TASK_EXECUTION_*` environment variables, loading a
    /// `.env` file first when one exists. Unset variables keep their defaults.
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
        if let Some(v) = parse_var(&lookup, "TASK_EXECUTION_POOL_CORE_SIZE")? {
            cfg.core_pool_size = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_EXECUTION_POOL_MAX_SIZE")? {
            cfg.max_pool_size = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_EXECUTION_POOL_QUEUE_CAPACITY")? {
            cfg.queue_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_EXECUTION_POOL_KEEP_ALIVE_MS")? {
            cfg.keep_alive_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_EXECUTION_POOL_ALLOW_CORE_THREAD_TIMEOUT")? {
            cfg.allow_core_thread_timeout = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_EXECUTION_REJECTION_POLICY")? {
            cfg.rejection_policy = v;
        }
        if let Some(v) = lookup("TASK_EXECUTION_THREAD_NAME_PREFIX") {
            cfg.thread_name_prefix = v;
        }
        if let Some(v) = parse_var(&lookup, "TASK_EXECUTION_SHUTDOWN_AWAIT_TERMINATION_MS")? {
            cfg.await_termination_ms = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
