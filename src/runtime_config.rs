//! Environment variable driven runtime configuration.
//!
//! Knobs that affect the serving loop rather than the routing table:
//!
//! - `GANTRY_STACK_SIZE`: stack size for connection coroutines, decimal or
//!   hexadecimal with an `0x` prefix (default `0x10000`, 64 KiB).
//! - `GANTRY_DRAIN_TIMEOUT_MS`: how long `stop` waits for in-flight
//!   requests to finish before force-closing (default 5000).
//! - `GANTRY_KEEPALIVE_MAX`: maximum requests served on one keep-alive
//!   connection before it is closed (default 1024).
//!
//! Stack size matters because every accepted connection gets its own
//! coroutine: total stack memory is `stack_size × concurrent connections`.
//! Handlers with deep call chains need more; mostly-idle fleets want less.

use std::env;
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 0x10000;
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5000;
const DEFAULT_KEEPALIVE_MAX: usize = 1024;

/// Runtime configuration loaded from environment variables.
///
/// Load once at startup with [`RuntimeConfig::from_env()`]; every instance
/// captures its own copy, so two instances in one process may be configured
/// differently by mutating the copy before `start`.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size in bytes for connection coroutines.
    pub stack_size: usize,
    /// Bounded wait for in-flight requests during `stop`.
    pub drain_timeout: Duration,
    /// Requests served per keep-alive connection before closing.
    pub keepalive_max: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults on missing or unparseable values.
    pub fn from_env() -> Self {
        let stack_size = env::var("GANTRY_STACK_SIZE")
            .ok()
            .and_then(|v| parse_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let drain_timeout = env::var("GANTRY_DRAIN_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS));
        let keepalive_max = env::var("GANTRY_KEEPALIVE_MAX")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_KEEPALIVE_MAX);
        RuntimeConfig {
            stack_size,
            drain_timeout,
            keepalive_max,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE,
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            keepalive_max: DEFAULT_KEEPALIVE_MAX,
        }
    }
}

fn parse_size(val: &str) -> Option<usize> {
    if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}
