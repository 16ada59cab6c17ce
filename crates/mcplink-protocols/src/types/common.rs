//! Common utility types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Unique identifier type.
pub type Id = String;

/// Metadata map type.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Extra HTTP headers sent to a remote server.
pub type Headers = HashMap<String, String>;

/// Wire transport used to reach a remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
    Websocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::Websocket => "websocket",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "http" => Ok(TransportKind::Http),
            "websocket" | "ws" => Ok(TransportKind::Websocket),
            other => Err(format!("unknown transport kind: {}", other)),
        }
    }
}

/// How the bridge talks to a server once the transport is chosen.
///
/// `Raw` servers get hand-framed JSON-RPC over a long-lived connection.
/// The managed variants delegate to a per-call session that performs the
/// protocol's own handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Raw,
    /// Streamable HTTP with `Mcp-Session-Id` tracking.
    StreamableHttp,
    /// HTTP POST paired with a server-sent event stream.
    Sse,
}

impl SessionMode {
    /// Whether this mode uses the managed-session path.
    pub fn is_managed(&self) -> bool {
        !matches!(self, SessionMode::Raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Raw => "raw",
            SessionMode::StreamableHttp => "streamable_http",
            SessionMode::Sse => "sse",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "common_tests.rs"]
mod tests;
