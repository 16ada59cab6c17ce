//! Host tool registry entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::Metadata;

/// Where a host tool comes from and how to invoke it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolManifest {
    /// A tool proxied to a remote MCP server.
    Mcp {
        server_id: String,
        server_name: String,
        tool_name: String,
    },
}

impl ToolManifest {
    /// Server id for MCP manifests.
    pub fn server_id(&self) -> &str {
        match self {
            ToolManifest::Mcp { server_id, .. } => server_id,
        }
    }
}

/// Definition of a tool in the host registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique identifier for the tool.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Description of what the tool does.
    pub description: String,

    /// JSON Schema for the parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters_schema: Option<serde_json::Value>,

    /// Owning user id.
    #[serde(default)]
    pub owner: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ToolManifest>,

    /// Additional metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            parameters_schema: None,
            owner: String::new(),
            manifest: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the parameters schema.
    pub fn with_parameters_schema(mut self, schema: serde_json::Value) -> Self {
        self.parameters_schema = Some(schema);
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_manifest(mut self, manifest: ToolManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Whether this entry proxies a tool on the given server.
    pub fn is_from_server(&self, server_id: &str) -> bool {
        self.manifest
            .as_ref()
            .is_some_and(|m| m.server_id() == server_id)
    }
}
