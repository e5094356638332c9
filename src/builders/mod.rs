//! Builders for executors and schedulers.

pub mod executor_builder;
pub mod scheduler_builder;

pub use executor_builder::TaskExecutorBuilder;
pub use scheduler_builder::TaskSchedulerBuilder;
