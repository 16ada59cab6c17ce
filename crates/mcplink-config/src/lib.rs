//! # mcplink Config
//!
//! TOML configuration for the mcplink bridge: logging, bridge timeouts and
//! the list of configured servers.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
