//! # Task Lanes
//!
//! Two execution lanes for background work in a long-running service:
//!
//! - **[`AsyncExecutor`](core::AsyncExecutor)**: a bounded thread pool for
//!   fire-and-forget work. Core threads, a FIFO queue and burst threads up to a
//!   maximum absorb load; past that a configurable rejection policy (Abort,
//!   CallerRuns, Discard, DiscardOldest) decides. An optional decorator wraps
//!   every submission, and failures that escape a work item go to an error
//!   handler instead of killing the thread.
//! - **[`CronScheduler`](core::CronScheduler)**: runs named jobs on cron,
//!   fixed-rate or fixed-delay triggers. A failing job is reported and keeps its
//!   schedule; missed ticks are skipped, never replayed.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use task_lanes::builders::{TaskExecutorBuilder, TaskSchedulerBuilder};
//! use task_lanes::config::RejectionPolicy;
//! use task_lanes::core::RecoveringDecorator;
//!
//! # fn main() -> anyhow::Result<()> {
//! task_lanes::util::init_tracing();
//!
//! let executor = TaskExecutorBuilder::new()
//!     .core_pool_size(2)
//!     .max_pool_size(4)
//!     .queue_capacity(100)
//!     .rejection_policy(RejectionPolicy::CallerRuns)
//!     .task_decorator(RecoveringDecorator)
//!     .build()?;
//! executor.execute(|| tracing::info!("hello from the pool"))?;
//!
//! let scheduler = TaskSchedulerBuilder::new().build()?;
//! scheduler.register("report", "0/5 * * * * ?", || tracing::info!("tick"))?;
//! scheduler.start()?;
//!
//! std::thread::sleep(Duration::from_secs(12));
//! scheduler.stop();
//! executor.close();
//! # Ok(())
//! # }
//! ```
//!
//! Both lanes read their settings from JSON or `TASK_EXECUTION_*` /
//! `TASK_SCHEDULING_*` environment variables; see [`config`].

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Work items, the executor, cron evaluation and the scheduler.
pub mod core;
/// Configuration models for the executor and the scheduler.
pub mod config;
/// Builders applying decorators and customizers.
pub mod builders;
/// Shared utilities.
pub mod util;
