//! Collaborator ports implemented by the host application.
//!
//! The bridge only talks to storage through these traits. In-memory
//! implementations live in `mcplink-core`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{RegistryError, StoreError};
use crate::server::ServerDescriptor;
use crate::tool::{Tool, ToolDescriptor};

/// The host application's tool registry.
#[async_trait]
pub trait HostToolRegistry: Send + Sync {
    async fn get(&self, id: &str) -> Option<Arc<dyn Tool>>;

    /// Register a new tool owned by `user_id`.
    async fn create(&self, user_id: &str, tool: Arc<dyn Tool>) -> Result<(), RegistryError>;

    /// Replace an existing tool with the same id.
    async fn update(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError>;

    /// Returns whether a tool was removed.
    async fn delete(&self, id: &str) -> Result<bool, RegistryError>;

    async fn list_by_user(&self, user_id: &str) -> Vec<Arc<dyn Tool>>;
}

/// Persistent server configuration.
#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ServerDescriptor>, StoreError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ServerDescriptor>, StoreError>;

    async fn create(&self, server: ServerDescriptor) -> Result<(), StoreError>;

    async fn update(&self, server: ServerDescriptor) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Persistent mirror of discovered remote tools.
#[async_trait]
pub trait McpToolStore: Send + Sync {
    /// Insert or replace by descriptor id.
    async fn upsert(&self, tool: ToolDescriptor) -> Result<(), StoreError>;

    async fn list_by_server(&self, server_id: &str) -> Result<Vec<ToolDescriptor>, StoreError>;

    /// Returns the number of descriptors removed.
    async fn delete_by_server(&self, server_id: &str) -> Result<usize, StoreError>;
}
