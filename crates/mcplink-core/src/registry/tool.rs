//! In-memory host tool registry.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use mcplink_protocols::error::RegistryError;
use mcplink_protocols::registry::HostToolRegistry;
use mcplink_protocols::tool::{Tool, ToolDefinition};

use super::base::{BaseRegistry, Registerable};

impl Registerable for dyn Tool {
    fn registry_id(&self) -> &str {
        &self.definition().id
    }
}

/// Registry for host tools, tracking which user owns each entry.
pub struct MemoryToolRegistry {
    inner: BaseRegistry<dyn Tool>,
    owners: DashMap<String, String>,
}

impl MemoryToolRegistry {
    pub fn new() -> Self {
        Self {
            inner: BaseRegistry::new(),
            owners: DashMap::new(),
        }
    }

    /// List all tool definitions.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.inner.iter().map(|t| t.definition().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for MemoryToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostToolRegistry for MemoryToolRegistry {
    async fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.inner.get(id)
    }

    async fn create(&self, user_id: &str, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let id = tool.definition().id.clone();
        self.inner.register(tool)?;
        self.owners.insert(id.clone(), user_id.to_string());
        debug!(tool_id = %id, user_id, "Registered tool");
        Ok(())
    }

    async fn update(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let id = tool.definition().id.clone();
        self.inner.replace(tool)?;
        debug!(tool_id = %id, "Updated tool");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, RegistryError> {
        self.owners.remove(id);
        Ok(self.inner.unregister(id).is_some())
    }

    async fn list_by_user(&self, user_id: &str) -> Vec<Arc<dyn Tool>> {
        self.inner
            .iter()
            .filter(|tool| {
                self.owners
                    .get(&tool.definition().id)
                    .is_some_and(|owner| owner.as_str() == user_id)
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "tool_tests.rs"]
mod tests;
