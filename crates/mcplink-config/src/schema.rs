//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use mcplink_protocols::server::ServerDescriptor;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,
}

impl Config {
    /// Look up a configured server by id.
    pub fn server(&self, id: &str) -> Option<&ServerDescriptor> {
        self.servers.iter().find(|s| s.id == id)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_directory")]
    pub directory: String,

    /// Emit JSON lines in the log file.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Log directory with `~` expanded.
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.directory).as_ref())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "~/.mcplink/logs".to_string()
}

/// Connection manager and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_thirty")]
    pub request_timeout_seconds: u64,

    #[serde(default = "default_thirty")]
    pub handshake_timeout_seconds: u64,

    /// Deadline for each managed-session operation.
    #[serde(default = "default_thirty")]
    pub session_timeout_seconds: u64,

    /// Time a stdio child gets between SIGTERM and SIGKILL.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,

    #[serde(default = "default_thirty")]
    pub ws_ping_interval_seconds: u64,

    #[serde(default = "default_pong_timeout")]
    pub ws_pong_timeout_seconds: u64,

    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    #[serde(default = "default_client_name")]
    pub client_name: String,

    #[serde(default = "default_client_version")]
    pub client_version: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_thirty(),
            handshake_timeout_seconds: default_thirty(),
            session_timeout_seconds: default_thirty(),
            shutdown_grace_seconds: default_shutdown_grace(),
            ws_ping_interval_seconds: default_thirty(),
            ws_pong_timeout_seconds: default_pong_timeout(),
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
        }
    }
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_seconds)
    }

    pub fn ws_pong_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_pong_timeout_seconds)
    }
}

fn default_thirty() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_pong_timeout() -> u64 {
    10
}

fn default_protocol_version() -> String {
    "2024-11-05".to_string()
}

fn default_client_name() -> String {
    "mcplink".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
