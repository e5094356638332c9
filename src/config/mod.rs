//! Configuration models for the executor and the scheduler.

pub mod pool;
pub mod scheduler;

pub use pool::{ExecutorConfig, RejectionPolicy};
pub use scheduler::SchedulerConfig;
