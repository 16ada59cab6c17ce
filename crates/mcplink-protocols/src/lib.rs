//! # mcplink Protocols
//!
//! Shared data types and collaborator traits for the mcplink workspace.
//! Contains only definitions - connection handling lives in `mcplink-bridge`.
//!
//! ## Core Types
//!
//! - [`ServerDescriptor`] - How to reach one remote MCP server
//! - [`ToolDescriptor`] - Locally mirrored description of one remote tool
//! - [`ToolInvocationResult`] - Outcome of invoking a remote tool
//!
//! ## Collaborator Traits
//!
//! - [`Tool`] - An invocable entry in the host tool registry
//! - [`HostToolRegistry`] - The host application's tool registry
//! - [`ServerStore`] - Persistent server configuration
//! - [`McpToolStore`] - Persistent mirror of discovered remote tools

pub mod error;
pub mod registry;
pub mod server;
pub mod tool;
pub mod types;

pub use error::{RegistryError, StoreError, ToolError};
pub use registry::{HostToolRegistry, McpToolStore, ServerStore};
pub use server::{ServerDescriptor, ServerEndpoint};
pub use tool::{
    Tool, ToolDefinition, ToolDescriptor, ToolInvocationResult, ToolManifest,
};
pub use types::*;
