//! Registries keyed by id.

mod base;
mod tool;

pub use base::{BaseRegistry, Registerable};
pub use tool::MemoryToolRegistry;
