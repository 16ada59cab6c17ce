//! Common types used across the mcplink workspace.

mod common;

pub use common::*;
