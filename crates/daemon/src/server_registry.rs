//! SPDX-License-Identifier: MIT
//!
//! Resolves a `spawn` command's `serverId` to a launchable MCP server
//! definition, in the trait-object-over-async style used elsewhere in this
//! workspace for pluggable backends.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub name: String,
    pub command: String,
    pub argv: Vec<String>,
}

#[async_trait]
pub trait ServerRegistry: Send + Sync + 'static {
    async fn resolve(&self, server_id: &str) -> Option<ServerSpec>;
}

/// In-memory registry keyed by `serverId`, useful for tests and simple
/// deployments that do not need a dynamic source of server definitions.
pub struct StaticServerRegistry {
    servers: std::collections::HashMap<String, ServerSpec>,
}

impl StaticServerRegistry {
    pub fn new(servers: impl IntoIterator<Item = (String, ServerSpec)>) -> Self {
        Self { servers: servers.into_iter().collect() }
    }
}

#[async_trait]
impl ServerRegistry for StaticServerRegistry {
    async fn resolve(&self, server_id: &str) -> Option<ServerSpec> {
        self.servers.get(server_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_registry_resolves_known_server() {
        let registry = StaticServerRegistry::new([(
            "S".to_string(),
            ServerSpec { name: "demo".into(), command: "/bin/echo-srv".into(), argv: vec![] },
        )]);
        assert!(registry.resolve("S").await.is_some());
        assert!(registry.resolve("unknown").await.is_none());
    }
}
