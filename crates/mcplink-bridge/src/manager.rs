//! Connection manager.
//!
//! Owns one [`Connection`] per server id, drives the connect and handshake
//! state machine and routes `tools/list` / `tools/call` either over raw
//! JSON-RPC or through the [`ProtocolHandler`] for managed sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mcplink_protocols::server::ServerDescriptor;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::correlator::RequestCorrelator;
use crate::error::BridgeError;
use crate::protocol::{parse_tool_list, ClientInfo, McpMethod, McpToolDefinition, McpToolResult};
use crate::session::{ProtocolHandler, SessionTarget};
use crate::transport::{self, TransportSettings};

/// Timeouts and client identity for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub request_timeout: Duration,
    pub handshake_timeout: Duration,
    pub session_timeout: Duration,
    pub shutdown_grace: Duration,
    pub ws_ping_interval: Duration,
    pub ws_pong_timeout: Duration,
    pub client: ClientInfo,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            ws_ping_interval: Duration::from_secs(30),
            ws_pong_timeout: Duration::from_secs(10),
            client: ClientInfo::default(),
        }
    }
}

impl ManagerConfig {
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            request_timeout: self.request_timeout,
            shutdown_grace: self.shutdown_grace,
            ws_ping_interval: self.ws_ping_interval,
            ws_pong_timeout: self.ws_pong_timeout,
        }
    }
}

/// Lifecycle of one server id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    HandshakeInitializing,
    Ready,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::HandshakeInitializing => "handshake_initializing",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnecting => "disconnecting",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of [`ConnectionManager::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionOutcome {
    Connected,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: ConnectionOutcome,
    pub message: String,
    #[serde(default)]
    pub tools: Vec<McpToolDefinition>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionOutcome::Connected
    }
}

/// Tracks live connections keyed by server id.
pub struct ConnectionManager {
    config: ManagerConfig,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    connect_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    states: Mutex<HashMap<String, ConnectionState>>,
    descriptors: Mutex<HashMap<String, ServerDescriptor>>,
    sessions: ProtocolHandler,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig) -> Self {
        let sessions = ProtocolHandler::new(config.session_timeout, config.client.clone());
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
            connect_locks: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            descriptors: Mutex::new(HashMap::new()),
            sessions,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current lifecycle state; unknown ids are `Disconnected`.
    pub fn state(&self, server_id: &str) -> ConnectionState {
        self.states
            .lock()
            .get(server_id)
            .copied()
            .unwrap_or_default()
    }

    fn set_state(&self, server_id: &str, state: ConnectionState) {
        debug!(server_id, %state, "Connection state");
        self.states.lock().insert(server_id.to_string(), state);
    }

    /// Whether a descriptor has been given for this id and not yet forgotten.
    pub fn knows(&self, server_id: &str) -> bool {
        self.descriptors.lock().contains_key(server_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn connected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn connect_lock(&self, server_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.connect_locks
            .lock()
            .entry(server_id.to_string())
            .or_default()
            .clone()
    }

    /// Connect to a server, reusing a live connection with the same descriptor.
    pub async fn connect(&self, descriptor: &ServerDescriptor) -> Result<Arc<Connection>, BridgeError> {
        descriptor
            .validate()
            .map_err(|e| BridgeError::connection(&descriptor.id, e))?;

        let server_id = descriptor.id.as_str();
        let lock = self.connect_lock(server_id);
        let _guard = lock.lock().await;

        self.descriptors
            .lock()
            .insert(server_id.to_string(), descriptor.clone());

        let existing = self.connections.lock().get(server_id).cloned();
        if let Some(existing) = existing {
            if existing.descriptor() == descriptor && existing.is_alive().await {
                debug!(server_id, "Reusing live connection");
                return Ok(existing);
            }
            info!(server_id, "Replacing stale or changed connection");
            self.connections.lock().remove(server_id);
            self.set_state(server_id, ConnectionState::Disconnecting);
            existing.close().await;
            self.set_state(server_id, ConnectionState::Disconnected);
        }

        self.set_state(server_id, ConnectionState::Connecting);
        match self.establish(descriptor).await {
            Ok(connection) => {
                let connection = Arc::new(connection);
                self.connections
                    .lock()
                    .insert(server_id.to_string(), connection.clone());
                self.set_state(server_id, ConnectionState::Ready);
                info!(
                    server_id,
                    transport = %descriptor.transport_kind(),
                    session = %descriptor.session,
                    "Connected to MCP server"
                );
                Ok(connection)
            }
            Err(e) => {
                self.set_state(server_id, ConnectionState::Disconnected);
                warn!(server_id, error = %e, "Connect failed");
                Err(e)
            }
        }
    }

    async fn establish(&self, descriptor: &ServerDescriptor) -> Result<Connection, BridgeError> {
        if descriptor.session.is_managed() {
            return Ok(Connection::managed(
                descriptor.clone(),
                self.config.request_timeout,
            ));
        }

        let correlator = Arc::new(RequestCorrelator::new(descriptor.id.clone()));
        let transport = transport::connect(
            descriptor,
            correlator.clone(),
            &self.config.transport_settings(),
        )
        .await
        .map_err(|e| BridgeError::connection(&descriptor.id, e))?;

        let connection = Connection::raw(
            descriptor.clone(),
            transport,
            correlator,
            self.config.request_timeout,
        );

        self.set_state(&descriptor.id, ConnectionState::HandshakeInitializing);
        if let Err(e) = self.handshake(&connection).await {
            connection.close().await;
            return Err(e);
        }
        Ok(connection)
    }

    async fn handshake(&self, connection: &Connection) -> Result<(), BridgeError> {
        let server_id = connection.server_id();
        let response = connection
            .request_with_timeout(
                McpMethod::Initialize.as_str(),
                Some(self.config.client.initialize_params()),
                self.config.handshake_timeout,
            )
            .await
            .map_err(|e| match e {
                BridgeError::Timeout(_) => e,
                other => BridgeError::handshake(server_id, other),
            })?;

        let result = response
            .into_result()
            .map_err(|e| BridgeError::handshake(server_id, e))?;
        debug!(
            server_id,
            protocol_version = %result.get("protocolVersion").cloned().unwrap_or_default(),
            "Initialize acknowledged"
        );

        if let Err(e) = connection
            .notify(McpMethod::Initialized.as_str(), None)
            .await
        {
            warn!(server_id, error = %e, "Failed to send initialized notification");
        }
        Ok(())
    }

    /// The tracked connection if alive, otherwise a reconnect with the last
    /// descriptor seen for this id.
    async fn live_connection(&self, server_id: &str) -> Result<Arc<Connection>, BridgeError> {
        let existing = self.connections.lock().get(server_id).cloned();
        if let Some(connection) = existing {
            if connection.is_alive().await {
                return Ok(connection);
            }
            info!(server_id, "Connection is dead, reconnecting");
        }

        let descriptor = self
            .descriptors
            .lock()
            .get(server_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotConnected(server_id.to_string()))?;
        self.connect(&descriptor).await
    }

    pub async fn list_tools(&self, server_id: &str) -> Result<Vec<McpToolDefinition>, BridgeError> {
        let connection = self.live_connection(server_id).await?;

        if connection.is_managed() {
            let target = session_target(&connection)?;
            let listing = self.sessions.list_tools(&target).await;
            return match listing.error {
                Some(error) => Err(BridgeError::Session(error)),
                None => Ok(listing.tools),
            };
        }

        let result = connection
            .request(McpMethod::ListTools.as_str(), None)
            .await?
            .into_result()
            .map_err(|e| BridgeError::Protocol(format!("tools/list on {}: {}", server_id, e)))?;
        let tools = parse_tool_list(result).map_err(|e| BridgeError::Protocol(e.to_string()))?;
        debug!(server_id, count = tools.len(), "Listed tools");
        Ok(tools)
    }

    /// Invoke a remote tool, returning the `tools/call` result.
    ///
    /// A JSON-RPC error and a result flagged `isError` both surface as
    /// [`BridgeError::ToolExecution`], whichever path serves the server.
    pub async fn call_tool(
        &self,
        server_id: &str,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        let connection = self.live_connection(server_id).await?;

        if connection.is_managed() {
            let target = session_target(&connection)?;
            let outcome = self.sessions.execute_tool(&target, name, arguments).await;
            if !outcome.success {
                return Err(BridgeError::tool_execution(
                    outcome.error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
            return Ok(serde_json::json!({
                "content": [{"type": "text", "text": outcome.content_text()}],
                "isError": false
            }));
        }

        let params = serde_json::json!({"name": name, "arguments": arguments});
        debug!(server_id, tool = name, "Calling tool");
        let result = connection
            .request(McpMethod::CallTool.as_str(), Some(params))
            .await?
            .into_result()
            .map_err(|e| BridgeError::tool_execution(e.message))?;

        if result.get("isError").and_then(|v| v.as_bool()) == Some(true) {
            let text = serde_json::from_value::<McpToolResult>(result)
                .map(|r| r.text())
                .unwrap_or_default();
            return Err(BridgeError::tool_execution(text));
        }
        Ok(result)
    }

    /// Connect, list tools, report. Never fails.
    ///
    /// A server that was not tracked before the probe is disconnected again.
    pub async fn test_connection(&self, descriptor: &ServerDescriptor) -> ConnectionStatus {
        let was_known = self.knows(&descriptor.id);

        let outcome = match self.connect(descriptor).await {
            Ok(_) => self.list_tools(&descriptor.id).await,
            Err(e) => Err(e),
        };

        if !was_known {
            self.disconnect(&descriptor.id).await;
        }

        match outcome {
            Ok(tools) => ConnectionStatus {
                status: ConnectionOutcome::Connected,
                message: format!("Connected, {} tools available", tools.len()),
                tools,
            },
            Err(e) => ConnectionStatus {
                status: ConnectionOutcome::Error,
                message: e.to_string(),
                tools: Vec::new(),
            },
        }
    }

    /// Close and forget a server. Unknown ids are a no-op.
    pub async fn disconnect(&self, server_id: &str) {
        let lock = self.connect_lock(server_id);
        let _guard = lock.lock().await;

        self.descriptors.lock().remove(server_id);
        let connection = self.connections.lock().remove(server_id);
        let Some(connection) = connection else {
            return;
        };

        self.set_state(server_id, ConnectionState::Disconnecting);
        connection.close().await;
        self.set_state(server_id, ConnectionState::Disconnected);
        info!(server_id, "Disconnected from MCP server");
    }

    pub async fn disconnect_all(&self) {
        let mut ids: Vec<String> = self.connections.lock().keys().cloned().collect();
        for id in self.descriptors.lock().keys() {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        futures::future::join_all(ids.iter().map(|id| self.disconnect(id))).await;
    }
}

fn session_target(connection: &Connection) -> Result<SessionTarget, BridgeError> {
    SessionTarget::from_descriptor(connection.descriptor()).ok_or_else(|| {
        BridgeError::Session(format!(
            "{} has no managed-session endpoint",
            connection.server_id()
        ))
    })
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
