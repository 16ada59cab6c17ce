//! # mcplink Core
//!
//! In-memory implementations of the collaborator ports defined in
//! `mcplink-protocols`. The CLI wires these up; embedding applications
//! usually provide their own persistent versions.
//!
//! - [`MemoryToolRegistry`] - [`HostToolRegistry`](mcplink_protocols::HostToolRegistry)
//! - [`MemoryServerStore`] - [`ServerStore`](mcplink_protocols::ServerStore)
//! - [`MemoryToolStore`] - [`McpToolStore`](mcplink_protocols::McpToolStore)

pub mod registry;
pub mod store;

pub use registry::{BaseRegistry, MemoryToolRegistry, Registerable};
pub use store::{MemoryServerStore, MemoryToolStore};
