//! Builder assembling a [`CronScheduler`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::SchedulerConfig;
use crate::core::{CronScheduler, SchedulerError, TaskErrorHandler};

type SchedulerCustomizer = Box<dyn Fn(&mut SchedulerConfig) + Send + Sync>;

/// Builds a [`CronScheduler`]. Customizers run last, in registration order.
#[derive(Default)]
pub struct TaskSchedulerBuilder {
    config: SchedulerConfig,
    customizers: Vec<SchedulerCustomizer>,
}

impl TaskSchedulerBuilder {
    /// Start from [`SchedulerConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub fn from_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            customizers: Vec::new(),
        }
    }

    /// Set the number of threads running job invocations.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Mark the scheduler as daemon.
    #[must_use]
    pub fn daemon(mut self, daemon: bool) -> Self {
        self.config.daemon = daemon;
        self
    }

    /// Set how long `stop()` waits for in-flight jobs.
    #[must_use]
    pub fn await_termination(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_await_termination(timeout);
        self
    }

    /// Set the handler invoked with each failing job.
    #[must_use]
    pub fn error_handler(mut self, handler: impl TaskErrorHandler) -> Self {
        self.config.set_error_handler(Arc::new(handler));
        self
    }

    /// Add a customizer applied to the final configuration.
    #[must_use]
    pub fn customizer<F>(mut self, customizer: F) -> Self
    where
        F: Fn(&mut SchedulerConfig) + Send + Sync + 'static,
    {
        self.customizers.push(Box::new(customizer));
        self
    }

    /// Resolve the configuration.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` if the resulting values are invalid.
    pub fn build_config(self) -> Result<SchedulerConfig, SchedulerError> {
        let mut config = self.config;
        for customize in &self.customizers {
            customize(&mut config);
        }
        debug!(customizers = self.customizers.len(), config = ?config, "Resolved scheduler configuration");
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        Ok(config)
    }

    /// Build the scheduler. Jobs are registered on the result before `start()`.
    ///
    /// # Errors
    ///
    /// See [`build_config`](Self::build_config).
    pub fn build(self) -> Result<CronScheduler, SchedulerError> {
        CronScheduler::new(self.build_config()?)
    }
}
