//! Wiring of the bridge from configuration.

use std::sync::Arc;

use tracing::{info, warn};

use mcplink_bridge::{ClientInfo, ConnectionManager, ManagerConfig, ToolBridge};
use mcplink_config::{BridgeConfig, Config, ConfigValidator};
use mcplink_core::{MemoryServerStore, MemoryToolRegistry, MemoryToolStore};

/// User that owns servers configured without a `user_id`.
pub(crate) const DEFAULT_USER: &str = "local";

/// Everything a command needs.
pub(crate) struct App {
    pub config: Config,
    pub manager: Arc<ConnectionManager>,
    pub bridge: ToolBridge,
    pub registry: Arc<MemoryToolRegistry>,
}

impl App {
    /// Validate the configuration and build the manager and tool bridge.
    pub fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let warnings = ConfigValidator::validate(&config).into_result()?;
        for warning in &warnings {
            warn!(path = %warning.path, "{}", warning.message);
        }

        let manager = Arc::new(ConnectionManager::new(manager_config(&config.bridge)));
        let registry = Arc::new(MemoryToolRegistry::new());
        let servers = Arc::new(MemoryServerStore::with_servers(
            config.servers.iter().cloned().map(|mut server| {
                if server.user_id.is_empty() {
                    server.user_id = DEFAULT_USER.to_string();
                }
                server
            }),
        ));
        let bridge = ToolBridge::new(
            manager.clone(),
            registry.clone(),
            Arc::new(MemoryToolStore::new()),
        )
        .with_server_store(servers);

        info!(servers = config.servers.len(), "Bridge ready");
        Ok(Self {
            config,
            manager,
            bridge,
            registry,
        })
    }
}

pub(crate) fn manager_config(bridge: &BridgeConfig) -> ManagerConfig {
    ManagerConfig {
        request_timeout: bridge.request_timeout(),
        handshake_timeout: bridge.handshake_timeout(),
        session_timeout: bridge.session_timeout(),
        shutdown_grace: bridge.shutdown_grace(),
        ws_ping_interval: bridge.ws_ping_interval(),
        ws_pong_timeout: bridge.ws_pong_timeout(),
        client: ClientInfo {
            name: bridge.client_name.clone(),
            version: bridge.client_version.clone(),
            protocol_version: bridge.protocol_version.clone(),
        },
    }
}
