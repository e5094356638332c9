//! Shared utilities.

pub(crate) mod env;
pub mod telemetry;

pub use telemetry::*;
