//! Locally mirrored description of a remote tool.

use serde::{Deserialize, Serialize};

/// A tool discovered on a remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Deterministic id, see [`ToolDescriptor::derive_id`].
    pub id: String,

    /// Owning server id.
    pub server_id: String,

    /// Tool name, unique within the server.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema for the arguments.
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// `{"type": "object", "properties": {}}`
pub fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolDescriptor {
    pub fn new(
        server_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Option<serde_json::Value>,
    ) -> Self {
        let server_id = server_id.into();
        let name = name.into();
        Self {
            id: Self::derive_id(&server_id, &name),
            server_id,
            name,
            description: description.into(),
            parameters: parameters.unwrap_or_else(empty_object_schema),
            enabled: true,
        }
    }

    /// `mcp_{server_id}_{name}`
    pub fn derive_id(server_id: &str, name: &str) -> String {
        format!("mcp_{}_{}", server_id, name)
    }
}
