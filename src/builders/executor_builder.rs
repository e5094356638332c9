//! Builder assembling an [`AsyncExecutor`] from configuration, a decorator and
//! customizers.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{ExecutorConfig, RejectionPolicy};
use crate::core::{AsyncExecutor, ExecutorError, TaskDecorator, TaskErrorHandler};

type ExecutorCustomizer = Box<dyn Fn(&mut ExecutorConfig) + Send + Sync>;

/// Builds an [`AsyncExecutor`].
///
/// Customizers run in registration order after all other settings, so a later
/// customizer overrides both earlier ones and the plain setters.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use task_lanes::builders::TaskExecutorBuilder;
/// use task_lanes::config::RejectionPolicy;
/// use task_lanes::core::RecoveringDecorator;
///
/// let executor = TaskExecutorBuilder::new()
///     .core_pool_size(4)
///     .queue_capacity(256)
///     .rejection_policy(RejectionPolicy::CallerRuns)
///     .task_decorator(RecoveringDecorator)
///     .customizer(|cfg| cfg.thread_name_prefix = "io-".into())
///     .build()?;
/// # Ok::<(), task_lanes::core::ExecutorError>(())
/// ```
#[derive(Default)]
pub struct TaskExecutorBuilder {
    config: ExecutorConfig,
    decorators: Vec<Arc<dyn TaskDecorator>>,
    customizers: Vec<ExecutorCustomizer>,
}

impl TaskExecutorBuilder {
    /// Start from [`ExecutorConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one read with
    /// [`ExecutorConfig::from_env`].
    #[must_use]
    pub fn from_config(config: ExecutorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Set the core pool size.
    #[must_use]
    pub fn core_pool_size(mut self, size: usize) -> Self {
        self.config.core_pool_size = size;
        self
    }

    /// Set the maximum pool size.
    #[must_use]
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.config.max_pool_size = size;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the idle keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config = self.config.with_keep_alive(keep_alive);
        self
    }

    /// Let core threads time out.
    #[must_use]
    pub fn allow_core_thread_timeout(mut self, allow: bool) -> Self {
        self.config.allow_core_thread_timeout = allow;
        self
    }

    /// Set the rejection policy.
    #[must_use]
    pub fn rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.config.rejection_policy = policy;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set how long `close()` waits for running work.
    #[must_use]
    pub fn await_termination(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_await_termination(timeout);
        self
    }

    /// Set the decorator. Only one may be configured; compose several into one
    /// decorator before passing it here.
    #[must_use]
    pub fn task_decorator(mut self, decorator: impl TaskDecorator) -> Self {
        self.decorators.push(Arc::new(decorator));
        self
    }

    /// Set the handler receiving errors that escape work items.
    #[must_use]
    pub fn error_handler(mut self, handler: impl TaskErrorHandler) -> Self {
        self.config.set_error_handler(Arc::new(handler));
        self
    }

    /// Add a customizer applied to the final configuration.
    #[must_use]
    pub fn customizer<F>(mut self, customizer: F) -> Self
    where
        F: Fn(&mut ExecutorConfig) + Send + Sync + 'static,
    {
        self.customizers.push(Box::new(customizer));
        self
    }

    /// Resolve the configuration without starting an executor.
    ///
    /// # Errors
    ///
    /// `ExecutorError::InvalidConfig` if more than one decorator was given or the
    /// resulting values are invalid.
    pub fn build_config(self) -> Result<ExecutorConfig, ExecutorError> {
        let Self {
            mut config,
            mut decorators,
            customizers,
        } = self;

        if decorators.len() > 1 {
            return Err(ExecutorError::InvalidConfig(format!(
                "{} task decorators configured; only one is allowed, compose them first",
                decorators.len()
            )));
        }
        if let Some(decorator) = decorators.pop() {
            config.set_decorator(decorator);
        }

        for customize in &customizers {
            customize(&mut config);
        }
        debug!(customizers = customizers.len(), config = ?config, "Resolved executor configuration");

        config.validate().map_err(ExecutorError::InvalidConfig)?;
        Ok(config)
    }

    /// Build the executor.
    ///
    /// # Errors
    ///
    /// See [`build_config`](Self::build_config).
    pub fn build(self) -> Result<AsyncExecutor, ExecutorError> {
        AsyncExecutor::new(self.build_config()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RecoveringDecorator, WorkItem};

    #[test]
    fn test_customizers_apply_in_order() {
        let config = TaskExecutorBuilder::new()
            .core_pool_size(2)
            .customizer(|cfg| cfg.core_pool_size = 3)
            .customizer(|cfg| cfg.core_pool_size = 5)
            .build_config()
            .unwrap();
        assert_eq!(config.core_pool_size, 5);
    }

    #[test]
    fn test_second_decorator_is_refused() {
        let err = TaskExecutorBuilder::new()
            .task_decorator(RecoveringDecorator)
            .task_decorator(|work: WorkItem| work)
            .build_config()
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidConfig(msg) if msg.contains("only one")));
    }

    #[test]
    fn test_single_decorator_is_kept() {
        let config = TaskExecutorBuilder::new()
            .task_decorator(RecoveringDecorator)
            .build_config()
            .unwrap();
        assert!(config.decorator().is_some());
    }
}
