//! Environment variable helpers shared by the library configs.

use std::str::FromStr;

/// Parse `key` from the environment, falling back to `default` when it is
/// unset or unparsable.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Non-empty string value of `key`.
pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
