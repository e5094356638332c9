//! Tests for utility functions

use task_lanes::util::init_tracing;

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!(test = "util", "tracing initialized");
}
