//! SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use crate::server_registry::ServerRegistry;

/// Supervisor configuration, populated from `FLEET_*` environment
/// variables by `fleetd` or constructed directly by embedders/tests.
pub struct FleetConfig {
    pub port: u16,
    /// WebSocket path clients are expected to connect on. Informational
    /// only: the hub's accept loop does not route on HTTP path, since the
    /// protocol serves exactly one endpoint.
    pub path: String,
    pub heartbeat_interval: Duration,
    pub kill_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Resolves a `serverId` from a `spawn` command to a launchable
    /// command. `None` means every `spawn` fails with a command error.
    pub server_registry: Option<Arc<dyn ServerRegistry>>,
}

impl FleetConfig {
    pub fn from_env() -> Self {
        Self {
            port: crate::env::port(),
            path: "/fleet".to_string(),
            heartbeat_interval: crate::env::heartbeat_interval(),
            kill_timeout: crate::env::kill_timeout(),
            shutdown_timeout: crate::env::shutdown_timeout(),
            server_registry: None,
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            path: "/fleet".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            kill_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(10),
            server_registry: None,
        }
    }
}
