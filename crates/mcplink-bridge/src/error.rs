//! Bridge and transport errors.

use thiserror::Error;

/// Wire-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Connection closed")]
    Closed,
}

/// Errors surfaced by the connection manager and tool bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to connect to {server_id}: {message}")]
    Connection { server_id: String, message: String },

    #[error("Handshake with {server_id} failed: {message}")]
    Handshake { server_id: String, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Tool execution failed: {message}")]
    ToolExecution { message: String },

    #[error("Tool adapter error: {0}")]
    Adapter(String),

    #[error("Server not connected: {0}")]
    NotConnected(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl BridgeError {
    pub fn connection(server_id: impl Into<String>, message: impl ToString) -> Self {
        BridgeError::Connection {
            server_id: server_id.into(),
            message: message.to_string(),
        }
    }

    pub fn handshake(server_id: impl Into<String>, message: impl ToString) -> Self {
        BridgeError::Handshake {
            server_id: server_id.into(),
            message: message.to_string(),
        }
    }

    pub fn tool_execution(message: impl Into<String>) -> Self {
        BridgeError::ToolExecution {
            message: message.into(),
        }
    }
}
