//! In-memory server configuration store.

use async_trait::async_trait;
use std::sync::Arc;

use mcplink_protocols::error::{RegistryError, StoreError};
use mcplink_protocols::registry::ServerStore;
use mcplink_protocols::server::ServerDescriptor;

use crate::registry::{BaseRegistry, Registerable};

impl Registerable for ServerDescriptor {
    fn registry_id(&self) -> &str {
        &self.id
    }
}

/// Server descriptors keyed by id.
#[derive(Default)]
pub struct MemoryServerStore {
    servers: BaseRegistry<ServerDescriptor>,
}

impl MemoryServerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with descriptors, later ids winning.
    pub fn with_servers(servers: impl IntoIterator<Item = ServerDescriptor>) -> Self {
        let store = Self::new();
        for server in servers {
            store.servers.upsert(Arc::new(server));
        }
        store
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

fn store_error(err: RegistryError) -> StoreError {
    match err {
        RegistryError::AlreadyExists(id) => StoreError::Conflict(id),
        RegistryError::NotFound(id) => StoreError::NotFound(id),
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl ServerStore for MemoryServerStore {
    async fn get(&self, id: &str) -> Result<Option<ServerDescriptor>, StoreError> {
        Ok(self.servers.get(id).map(|s| (*s).clone()))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ServerDescriptor>, StoreError> {
        let mut servers: Vec<ServerDescriptor> = self
            .servers
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| (*s).clone())
            .collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(servers)
    }

    async fn create(&self, server: ServerDescriptor) -> Result<(), StoreError> {
        self.servers.register(Arc::new(server)).map_err(store_error)
    }

    async fn update(&self, server: ServerDescriptor) -> Result<(), StoreError> {
        self.servers.replace(Arc::new(server)).map_err(store_error)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.servers.unregister(id).is_some())
    }
}
