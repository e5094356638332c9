//! Environment lookups for `from_env` style configuration.

use std::str::FromStr;

/// Read and parse `key` through `lookup`. A missing key yields `Ok(None)`.
pub(crate) fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{key}: cannot parse `{raw}`: {e}"))
        })
        .transpose()
}

/// Load a `.env` file if present, then read from the process environment.
pub(crate) fn process_env() -> impl Fn(&str) -> Option<String> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            tracing::warn!(error = %err, "Failed to load .env file");
        }
    }
    |key: &str| std::env::var(key).ok()
}
