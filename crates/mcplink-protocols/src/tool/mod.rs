//! Tool definitions shared between the bridge and the host registry.
//!
//! A [`ToolDescriptor`] is the bridge's local mirror of a remote tool; a
//! [`ToolDefinition`] is the entry the host application sees.

mod definition;
mod descriptor;
mod result;
mod traits;

pub use definition::*;
pub use descriptor::*;
pub use result::*;
pub use traits::*;
