//! In-memory stores for server configuration and mirrored tools.

mod server;
mod tool;

pub use server::MemoryServerStore;
pub use tool::MemoryToolStore;
