//! Tool bridge.
//!
//! Mirrors remote tools into the host registry. Each registry entry is an
//! [`McpTool`] bound to `(server, tool name)` that forwards invocations to
//! the [`ConnectionManager`].

use std::sync::Arc;

use async_trait::async_trait;
use mcplink_protocols::error::ToolError;
use mcplink_protocols::registry::{HostToolRegistry, McpToolStore, ServerStore};
use mcplink_protocols::server::ServerDescriptor;
use mcplink_protocols::tool::{
    Tool, ToolDefinition, ToolDescriptor, ToolInvocationResult, ToolManifest,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::BridgeError;
use crate::manager::ConnectionManager;
use crate::protocol::{McpToolDefinition, McpToolResult};

/// Counts from a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub total: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.synced += other.synced;
        self.failed += other.failed;
        self.total += other.total;
    }
}

/// Keeps the host registry in step with remote servers.
pub struct ToolBridge {
    manager: Arc<ConnectionManager>,
    registry: Arc<dyn HostToolRegistry>,
    tools: Arc<dyn McpToolStore>,
    servers: Option<Arc<dyn ServerStore>>,
}

impl ToolBridge {
    pub fn new(
        manager: Arc<ConnectionManager>,
        registry: Arc<dyn HostToolRegistry>,
        tools: Arc<dyn McpToolStore>,
    ) -> Self {
        Self {
            manager,
            registry,
            tools,
            servers: None,
        }
    }

    /// Server store used by [`Self::sync_user_tools`] and for connecting on demand.
    pub fn with_server_store(mut self, servers: Arc<dyn ServerStore>) -> Self {
        self.servers = Some(servers);
        self
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Connect, list the server's tools and register each one.
    ///
    /// Connection and listing failures are errors; a failing tool only
    /// counts as `failed`.
    pub async fn sync_server_tools(
        &self,
        descriptor: &ServerDescriptor,
        user_id: &str,
    ) -> Result<SyncReport, BridgeError> {
        self.manager.connect(descriptor).await?;
        let remote = self.manager.list_tools(&descriptor.id).await?;

        let mut report = SyncReport {
            total: remote.len(),
            ..SyncReport::default()
        };

        for tool in remote {
            let name = tool.name.clone();
            match self.sync_one(descriptor, user_id, tool).await {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    warn!(server_id = %descriptor.id, tool = %name, error = %e, "Failed to sync tool");
                    report.failed += 1;
                }
            }
        }

        info!(
            server_id = %descriptor.id,
            user_id,
            synced = report.synced,
            failed = report.failed,
            total = report.total,
            "Synced server tools"
        );
        Ok(report)
    }

    async fn sync_one(
        &self,
        descriptor: &ServerDescriptor,
        user_id: &str,
        remote: McpToolDefinition,
    ) -> Result<(), BridgeError> {
        let local = ToolDescriptor::new(
            &descriptor.id,
            &remote.name,
            remote.description.clone().unwrap_or_default(),
            Some(remote.input_schema.clone()),
        );
        self.tools
            .upsert(local.clone())
            .await
            .map_err(|e| BridgeError::Adapter(e.to_string()))?;

        let tool: Arc<dyn Tool> = Arc::new(McpTool::new(
            descriptor.clone(),
            local,
            user_id,
            self.manager.clone(),
        ));
        let id = tool.definition().id.clone();

        let outcome = if self.registry.get(&id).await.is_some() {
            self.registry.update(tool).await
        } else {
            self.registry.create(user_id, tool).await
        };
        outcome.map_err(|e| BridgeError::Adapter(e.to_string()))?;
        debug!(tool_id = %id, "Registered MCP tool");
        Ok(())
    }

    /// Sync every enabled server of a user.
    ///
    /// A server that cannot be synced adds one failure to the totals.
    pub async fn sync_user_tools(&self, user_id: &str) -> Result<SyncReport, BridgeError> {
        let servers = self.server_store()?;
        let descriptors = servers
            .list_by_user(user_id)
            .await
            .map_err(|e| BridgeError::Adapter(e.to_string()))?;

        let mut report = SyncReport::default();
        for descriptor in descriptors.iter().filter(|d| d.enabled) {
            match self.sync_server_tools(descriptor, user_id).await {
                Ok(server_report) => report.merge(server_report),
                Err(e) => {
                    error!(server_id = %descriptor.id, user_id, error = %e, "Server sync failed");
                    report.failed += 1;
                    report.total += 1;
                }
            }
        }
        Ok(report)
    }

    /// Delete the server's registry entries and local descriptors.
    ///
    /// Returns the number of registry entries removed. Never fails.
    pub async fn remove_server_tools(&self, server_id: &str, user_id: &str) -> usize {
        let mut removed = 0;
        for tool in self.registry.list_by_user(user_id).await {
            let definition = tool.definition();
            if !definition.is_from_server(server_id) {
                continue;
            }
            match self.registry.delete(&definition.id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(server_id, tool_id = %definition.id, error = %e, "Failed to remove tool");
                }
            }
        }

        match self.tools.delete_by_server(server_id).await {
            Ok(count) => debug!(server_id, count, "Removed tool descriptors"),
            Err(e) => error!(server_id, error = %e, "Failed to remove tool descriptors"),
        }

        info!(server_id, user_id, removed, "Removed server tools");
        removed
    }

    /// Invoke a remote tool, connecting from the server store if needed.
    pub async fn execute_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> ToolInvocationResult {
        if !self.manager.knows(server_id) {
            if let Err(e) = self.connect_from_store(server_id).await {
                return ToolInvocationResult::failure(e.to_string());
            }
        }
        invoke(&self.manager, server_id, tool_name, arguments)
            .await
            .unwrap_or_else(|e| ToolInvocationResult::failure(e.to_string()))
    }

    async fn connect_from_store(&self, server_id: &str) -> Result<(), BridgeError> {
        let descriptor = self
            .server_store()?
            .get(server_id)
            .await
            .map_err(|e| BridgeError::Adapter(e.to_string()))?
            .ok_or_else(|| BridgeError::NotConnected(server_id.to_string()))?;
        self.manager.connect(&descriptor).await?;
        Ok(())
    }

    fn server_store(&self) -> Result<&Arc<dyn ServerStore>, BridgeError> {
        self.servers
            .as_ref()
            .ok_or_else(|| BridgeError::Adapter("no server store configured".to_string()))
    }
}

/// Call a tool and flatten its content to text.
///
/// A remote tool error is a failed result, not an `Err`.
async fn invoke(
    manager: &ConnectionManager,
    server_id: &str,
    tool_name: &str,
    arguments: serde_json::Value,
) -> Result<ToolInvocationResult, BridgeError> {
    let result = match manager.call_tool(server_id, tool_name, arguments).await {
        Ok(result) => result,
        Err(BridgeError::ToolExecution { message }) => {
            return Ok(ToolInvocationResult::failure(message));
        }
        Err(e) => return Err(e),
    };

    match serde_json::from_value::<McpToolResult>(result.clone()) {
        Ok(parsed) if parsed.has_text() => Ok(ToolInvocationResult::success(parsed.text())),
        _ => Ok(ToolInvocationResult::success(result)),
    }
}

/// Host registry entry for one remote tool.
pub struct McpTool {
    definition: ToolDefinition,
    server: ServerDescriptor,
    descriptor: ToolDescriptor,
    manager: Arc<ConnectionManager>,
}

impl McpTool {
    pub fn new(
        server: ServerDescriptor,
        descriptor: ToolDescriptor,
        owner: &str,
        manager: Arc<ConnectionManager>,
    ) -> Self {
        let definition = ToolDefinition::new(
            descriptor.id.clone(),
            format!("{}: {}", server.name, descriptor.name),
            descriptor.description.clone(),
        )
        .with_parameters_schema(descriptor.parameters.clone())
        .with_owner(owner)
        .with_manifest(ToolManifest::Mcp {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            tool_name: descriptor.name.clone(),
        });

        Self {
            definition,
            server,
            descriptor,
            manager,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server.id
    }

    pub fn tool_name(&self) -> &str {
        &self.descriptor.name
    }
}

#[async_trait]
impl Tool for McpTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolInvocationResult, ToolError> {
        self.validate(&params)?;

        if !self.manager.knows(&self.server.id) {
            self.manager
                .connect(&self.server)
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        }

        invoke(&self.manager, &self.server.id, &self.descriptor.name, params)
            .await
            .map_err(|e| match e {
                BridgeError::Timeout(_) => {
                    ToolError::Timeout(self.manager.config().request_timeout.as_secs())
                }
                other => ToolError::ExecutionFailed(other.to_string()),
            })
    }
}
