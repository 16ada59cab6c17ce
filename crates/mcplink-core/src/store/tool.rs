//! In-memory mirror of discovered remote tools.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use mcplink_protocols::error::StoreError;
use mcplink_protocols::registry::McpToolStore;
use mcplink_protocols::tool::ToolDescriptor;

use crate::registry::{BaseRegistry, Registerable};

impl Registerable for ToolDescriptor {
    fn registry_id(&self) -> &str {
        &self.id
    }
}

#[derive(Default)]
pub struct MemoryToolStore {
    tools: BaseRegistry<ToolDescriptor>,
}

impl MemoryToolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl McpToolStore for MemoryToolStore {
    async fn upsert(&self, tool: ToolDescriptor) -> Result<(), StoreError> {
        self.tools.upsert(Arc::new(tool));
        Ok(())
    }

    async fn list_by_server(&self, server_id: &str) -> Result<Vec<ToolDescriptor>, StoreError> {
        let mut tools: Vec<ToolDescriptor> = self
            .tools
            .iter()
            .filter(|t| t.server_id == server_id)
            .map(|t| (*t).clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    async fn delete_by_server(&self, server_id: &str) -> Result<usize, StoreError> {
        let removed = self.tools.remove_where(|t| t.server_id == server_id);
        debug!(server_id, removed, "Removed mirrored tools");
        Ok(removed)
    }
}
