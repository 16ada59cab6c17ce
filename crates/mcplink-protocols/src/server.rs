//! Remote server descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Headers, Metadata, SessionMode, TransportKind};

/// How to reach a remote server.
///
/// The transport kind is the tag, so a descriptor can never carry a URL
/// for a stdio server or a command for an HTTP one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ServerEndpoint {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
    Websocket {
        url: String,
    },
}

impl ServerEndpoint {
    pub fn kind(&self) -> TransportKind {
        match self {
            ServerEndpoint::Stdio { .. } => TransportKind::Stdio,
            ServerEndpoint::Http { .. } => TransportKind::Http,
            ServerEndpoint::Websocket { .. } => TransportKind::Websocket,
        }
    }

    /// URL for network endpoints, `None` for stdio.
    pub fn url(&self) -> Option<&str> {
        match self {
            ServerEndpoint::Stdio { .. } => None,
            ServerEndpoint::Http { url } | ServerEndpoint::Websocket { url } => Some(url),
        }
    }
}

/// Immutable snapshot of one configured remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique server id.
    pub id: String,

    /// Owning user.
    #[serde(default)]
    pub user_id: String,

    /// Display name.
    pub name: String,

    #[serde(flatten)]
    pub endpoint: ServerEndpoint,

    /// Extra headers for network transports.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: Headers,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Raw JSON-RPC or a managed session.
    #[serde(default)]
    pub session: SessionMode,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,
}

fn default_enabled() -> bool {
    true
}

impl ServerDescriptor {
    /// Create a descriptor with defaults for everything but the endpoint.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        endpoint: ServerEndpoint,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            name: name.into(),
            endpoint,
            headers: HashMap::new(),
            enabled: true,
            session: SessionMode::Raw,
            metadata: HashMap::new(),
        }
    }

    pub fn stdio(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self::new(
            id,
            name,
            ServerEndpoint::Stdio {
                command: command.into(),
                args,
                env: HashMap::new(),
            },
        )
    }

    pub fn http(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, name, ServerEndpoint::Http { url: url.into() })
    }

    pub fn websocket(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::new(id, name, ServerEndpoint::Websocket { url: url.into() })
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_session(mut self, session: SessionMode) -> Self {
        self.session = session;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.endpoint.kind()
    }

    /// Check the descriptor is internally consistent.
    ///
    /// Stdio servers need a command; network servers need a URL whose
    /// scheme matches the transport. Managed sessions only run over HTTP.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("server id must not be empty".to_string());
        }

        match &self.endpoint {
            ServerEndpoint::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    return Err(format!("server '{}': stdio command must not be empty", self.id));
                }
            }
            ServerEndpoint::Http { url } => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(format!(
                        "server '{}': http url must start with http:// or https://, got '{}'",
                        self.id, url
                    ));
                }
            }
            ServerEndpoint::Websocket { url } => {
                if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                    return Err(format!(
                        "server '{}': websocket url must start with ws:// or wss://, got '{}'",
                        self.id, url
                    ));
                }
            }
        }

        if self.session.is_managed() && self.transport_kind() != TransportKind::Http {
            return Err(format!(
                "server '{}': session mode '{}' requires the http transport",
                self.id, self.session
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
