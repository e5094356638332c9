//! Tests for configuration validation and loading

use std::collections::HashMap;
use std::time::Duration;

use task_lanes::config::{ExecutorConfig, RejectionPolicy, SchedulerConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_executor_defaults() {
    let cfg = ExecutorConfig::default();
    assert_eq!(cfg.core_pool_size, 8);
    assert_eq!(cfg.max_pool_size, usize::MAX);
    assert_eq!(cfg.queue_capacity, usize::MAX);
    assert_eq!(cfg.keep_alive(), Duration::from_secs(60));
    assert_eq!(cfg.rejection_policy, RejectionPolicy::Abort);
    assert_eq!(cfg.thread_name_prefix, "task-");
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_executor_invalid_sizes() {
    assert!(ExecutorConfig::new().with_max_pool_size(0).validate().is_err());
    assert!(ExecutorConfig::new()
        .with_core_pool_size(4)
        .with_max_pool_size(2)
        .validate()
        .is_err());
    assert!(ExecutorConfig::new()
        .with_allow_core_thread_timeout(true)
        .with_keep_alive(Duration::ZERO)
        .validate()
        .is_err());
}

#[test]
fn test_executor_from_json() {
    let json = r#"{
        "core_pool_size": 2,
        "max_pool_size": 4,
        "queue_capacity": 10,
        "rejection_policy": "caller_runs"
    }"#;
    let cfg = ExecutorConfig::from_json_str(json).expect("valid json");
    assert_eq!(cfg.core_pool_size, 2);
    assert_eq!(cfg.max_pool_size, 4);
    assert_eq!(cfg.queue_capacity, 10);
    assert_eq!(cfg.rejection_policy, RejectionPolicy::CallerRuns);
    assert_eq!(cfg.thread_name_prefix, "task-");

    let err = ExecutorConfig::from_json_str(r#"{"core_pool_size": 9, "max_pool_size": 3}"#).unwrap_err();
    assert!(err.contains("core_pool_size"));
    assert!(ExecutorConfig::from_json_str("{").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_executor_from_lookup() {
    let cfg = ExecutorConfig::from_lookup(lookup(&[
        ("TASK_EXECUTION_POOL_CORE_SIZE", "3"),
        ("TASK_EXECUTION_POOL_MAX_SIZE", "6"),
        ("TASK_EXECUTION_POOL_QUEUE_CAPACITY", "0"),
        ("TASK_EXECUTION_REJECTION_POLICY", "discard-oldest"),
        ("TASK_EXECUTION_THREAD_NAME_PREFIX", "io-"),
    ]))
    .expect("valid variables");
    assert_eq!(cfg.core_pool_size, 3);
    assert_eq!(cfg.max_pool_size, 6);
    assert_eq!(cfg.queue_capacity, 0);
    assert_eq!(cfg.rejection_policy, RejectionPolicy::DiscardOldest);
    assert_eq!(cfg.thread_name_prefix, "io-");

    let err = ExecutorConfig::from_lookup(lookup(&[("TASK_EXECUTION_POOL_CORE_SIZE", "many")])).unwrap_err();
    assert!(err.contains("TASK_EXECUTION_POOL_CORE_SIZE"));
}

#[test]
fn test_scheduler_defaults_and_lookup() {
    let cfg = SchedulerConfig::default();
    assert_eq!(cfg.pool_size, 1);
    assert_eq!(cfg.thread_name_prefix, "scheduling-");
    assert!(!cfg.daemon);

    let cfg = SchedulerConfig::from_lookup(lookup(&[
        ("TASK_SCHEDULING_POOL_SIZE", "4"),
        ("TASK_SCHEDULING_DAEMON", "true"),
        ("TASK_SCHEDULING_SHUTDOWN_AWAIT_TERMINATION_MS", "250"),
    ]))
    .expect("valid variables");
    assert_eq!(cfg.pool_size, 4);
    assert!(cfg.daemon);
    assert_eq!(cfg.await_termination(), Duration::from_millis(250));

    assert!(SchedulerConfig::from_lookup(lookup(&[("TASK_SCHEDULING_POOL_SIZE", "0")])).is_err());
    assert!(SchedulerConfig::from_json_str(r#"{"pool_size": 2, "daemon": true}"#).is_ok());
}
