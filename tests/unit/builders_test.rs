//! Tests for builder modules

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use task_lanes::builders::{TaskExecutorBuilder, TaskSchedulerBuilder};
use task_lanes::config::{ExecutorConfig, RejectionPolicy};
use task_lanes::core::{ExecutorError, RecoveringDecorator, WorkItem};

#[test]
fn test_executor_builder_defaults() {
    let config = TaskExecutorBuilder::new().build_config().unwrap();
    assert_eq!(config.core_pool_size, 8);
    assert!(config.decorator().is_none());
    assert!(config.error_handler().is_none());
}

#[test]
fn test_executor_builder_setters() {
    let config = TaskExecutorBuilder::from_config(ExecutorConfig::new().with_core_pool_size(1))
        .max_pool_size(3)
        .queue_capacity(5)
        .keep_alive(Duration::from_secs(2))
        .rejection_policy(RejectionPolicy::Discard)
        .thread_name_prefix("batch-")
        .error_handler(|_: &str, _: &task_lanes::core::TaskError| {})
        .build_config()
        .unwrap();
    assert_eq!(config.core_pool_size, 1);
    assert_eq!(config.max_pool_size, 3);
    assert_eq!(config.queue_capacity, 5);
    assert_eq!(config.keep_alive_ms, 2_000);
    assert_eq!(config.rejection_policy, RejectionPolicy::Discard);
    assert_eq!(config.thread_name_prefix, "batch-");
    assert!(config.error_handler().is_some());
}

#[test]
fn test_customizer_overrides_setter() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let config = TaskExecutorBuilder::new()
        .thread_name_prefix("setter-")
        .customizer(move |cfg| {
            seen.fetch_add(1, Ordering::SeqCst);
            cfg.thread_name_prefix = "customized-".into();
        })
        .build_config()
        .unwrap();
    assert_eq!(config.thread_name_prefix, "customized-");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_customizer_output_is_validated() {
    let err = TaskExecutorBuilder::new()
        .customizer(|cfg| cfg.max_pool_size = 0)
        .build()
        .unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidConfig(_)));
}

#[test]
fn test_two_decorators_are_a_configuration_error() {
    let err = TaskExecutorBuilder::new()
        .task_decorator(RecoveringDecorator)
        .task_decorator(|work: WorkItem| work)
        .build()
        .unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidConfig(_)));
}

#[test]
fn test_scheduler_builder() {
    let scheduler = TaskSchedulerBuilder::new()
        .pool_size(2)
        .thread_name_prefix("cron-")
        .daemon(true)
        .customizer(|cfg| cfg.pool_size = 3)
        .build()
        .unwrap();
    assert_eq!(scheduler.config().pool_size, 3);
    assert_eq!(scheduler.config().thread_name_prefix, "cron-");
    assert!(scheduler.config().daemon);
    assert!(!scheduler.is_running());
}
