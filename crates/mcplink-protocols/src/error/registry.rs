//! Host tool registry errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tool not found in registry: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    AlreadyExists(String),

    #[error("Registry rejected tool {id}: {reason}")]
    Rejected { id: String, reason: String },
}
