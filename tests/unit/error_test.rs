//! Tests for error types

use task_lanes::core::{CronError, CronField, ExecutorError, SchedulerError, TaskError};

#[test]
fn test_rejected_execution_error() {
    let err = ExecutorError::RejectedExecution {
        task: "report".to_string(),
        pool_size: 1,
        queue_capacity: 0,
    };
    assert_eq!(
        format!("{err}"),
        "task `report` rejected: 1 threads busy and queue of 0 full"
    );
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", ExecutorError::Shutdown), "executor has been shut down");
}

#[test]
fn test_invalid_cron_error_keeps_source() {
    let err = SchedulerError::InvalidCronExpression {
        expression: "61 * * * * *".to_string(),
        source: CronError::OutOfRange {
            field: CronField::Second,
            value: 61,
            min: 0,
            max: 59,
        },
    };
    assert_eq!(
        format!("{err}"),
        "invalid cron expression `61 * * * * *`: second value 61 not in range 0-59"
    );
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_executor_error_is_transparent_in_scheduler_error() {
    let err: SchedulerError = ExecutorError::Shutdown.into();
    assert_eq!(format!("{err}"), "executor has been shut down");
}

#[test]
fn test_task_error_display() {
    let err = TaskError::Failed(anyhow::anyhow!("upstream unavailable"));
    assert_eq!(format!("{err}"), "task failed: upstream unavailable");
    assert_eq!(format!("{}", TaskError::Panicked("boom".into())), "task panicked: boom");
}
