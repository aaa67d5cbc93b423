//! SPDX-License-Identifier: MIT
//!
//! Centralized environment variable access for the daemon crate.

use std::time::Duration;

/// Listen port for the fan-out hub's WebSocket server.
pub fn port() -> u16 {
    std::env::var("FLEET_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(3001)
}

/// Liveness ping interval, default 30s.
pub fn heartbeat_interval() -> Duration {
    std::env::var("FLEET_HEARTBEAT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

/// Delay between SIGTERM and SIGKILL when stopping a worker, default 5s.
pub fn kill_timeout() -> Duration {
    std::env::var("FLEET_KILL_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Bounded wait for all workers to report `terminated` during supervisor
/// shutdown before the hub is closed anyway.
pub fn shutdown_timeout() -> Duration {
    std::env::var("FLEET_SHUTDOWN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}
