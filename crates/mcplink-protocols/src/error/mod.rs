//! Error types for the mcplink protocol layer.

mod registry;
mod store;
mod tool;

pub use registry::*;
pub use store::*;
pub use tool::*;
