//! Runtime configuration
//!
//! A single tunable lives at this layer: the RPC timeout, read from the
//! environment and overridable per connector. Values are read lazily so a
//! process can adjust its environment before the first connection.

use std::time::Duration;
use tracing::warn;

/// Environment key for the RPC timeout in seconds
pub const KEY_RPC_TIMEOUT_SEC: &str = "OVSDB_RPC_TIMEOUT_SEC";

/// Default RPC timeout in seconds
pub const DEFAULT_RPC_TIMEOUT_SEC: u64 = 60;

/// Get an integer configuration value with a default.
pub fn get_config_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!(key, value = %value, "ignoring unparseable configuration value");
            default
        }),
        Err(_) => default,
    }
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// The configured RPC timeout.
pub fn rpc_timeout() -> Duration {
    Duration::from_secs(get_config_u64(KEY_RPC_TIMEOUT_SEC, DEFAULT_RPC_TIMEOUT_SEC))
}
