//! Telemetry helpers for structured logging.

/// Install a default `fmt` subscriber filtered by `RUST_LOG`, unless a global
/// subscriber is already set. Worker and scheduler threads are named, so thread
/// names are included in every line.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
