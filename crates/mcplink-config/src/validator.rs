//! Configuration validation.

use std::collections::HashSet;

use url::Url;

use mcplink_protocols::server::{ServerDescriptor, ServerEndpoint};
use mcplink_protocols::types::SessionMode;

use crate::error::ConfigError;
use crate::schema::Config;

/// URL fragments typical of hosted servers that speak the managed-session
/// protocol rather than bare JSON-RPC.
const MANAGED_SESSION_HINTS: &[&str] = &["smithery.ai", "mcp.sh", "composio.dev", "/mcp"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a `ConfigError`.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_logging(config, &mut result);
        Self::validate_bridge(config, &mut result);
        Self::validate_servers(config, &mut result);

        result
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "Log level cannot be empty",
            ));
        }
    }

    fn validate_bridge(config: &Config, result: &mut ValidationResult) {
        let bridge = &config.bridge;
        let timeouts = [
            ("bridge.request_timeout_seconds", bridge.request_timeout_seconds),
            ("bridge.handshake_timeout_seconds", bridge.handshake_timeout_seconds),
            ("bridge.session_timeout_seconds", bridge.session_timeout_seconds),
            ("bridge.ws_ping_interval_seconds", bridge.ws_ping_interval_seconds),
            ("bridge.ws_pong_timeout_seconds", bridge.ws_pong_timeout_seconds),
        ];
        for (path, value) in timeouts {
            if value == 0 {
                result.add_error(ValidationError::new(path, "must be greater than 0"));
            }
        }

        if bridge.ws_pong_timeout_seconds >= bridge.ws_ping_interval_seconds
            && bridge.ws_ping_interval_seconds > 0
        {
            result.add_warning(ValidationWarning::new(
                "bridge.ws_pong_timeout_seconds",
                "pong timeout is not shorter than the ping interval",
            ));
        }

        if bridge.protocol_version.trim().is_empty() {
            result.add_error(ValidationError::new(
                "bridge.protocol_version",
                "protocol_version cannot be empty",
            ));
        }
    }

    fn validate_servers(config: &Config, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (index, server) in config.servers.iter().enumerate() {
            let path = format!("servers[{}]", index);

            if server.id.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.id", path),
                    "Server id cannot be empty",
                ));
            } else if !seen.insert(server.id.as_str()) {
                result.add_error(ValidationError::new(
                    format!("{}.id", path),
                    format!("Duplicate server id '{}'", server.id),
                ));
            }

            if !server.enabled {
                result.add_warning(ValidationWarning::new(
                    path.clone(),
                    format!("Server '{}' is disabled and will be skipped", server.id),
                ));
            }

            Self::validate_endpoint(server, &path, result);
        }
    }

    fn validate_endpoint(server: &ServerDescriptor, path: &str, result: &mut ValidationResult) {
        match &server.endpoint {
            ServerEndpoint::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    result.add_error(ValidationError::new(
                        format!("{}.command", path),
                        "stdio servers need a command",
                    ));
                }
            }
            ServerEndpoint::Http { url } => {
                Self::check_url(url, &["http", "https"], path, result);
                if server.session == SessionMode::Raw && looks_managed(url) {
                    result.add_warning(ValidationWarning::new(
                        format!("{}.session", path),
                        format!(
                            "'{}' looks like a managed-session host; set session = \"streamable_http\" or \"sse\" if raw JSON-RPC fails",
                            url
                        ),
                    ));
                }
            }
            ServerEndpoint::Websocket { url } => {
                Self::check_url(url, &["ws", "wss"], path, result);
            }
        }

        if server.session.is_managed() && !matches!(server.endpoint, ServerEndpoint::Http { .. }) {
            result.add_error(ValidationError::new(
                format!("{}.session", path),
                format!(
                    "session mode '{}' requires transport = \"http\"",
                    server.session
                ),
            ));
        }
    }

    fn check_url(url: &str, schemes: &[&str], path: &str, result: &mut ValidationResult) {
        match Url::parse(url) {
            Ok(parsed) if schemes.contains(&parsed.scheme()) => {}
            Ok(parsed) => result.add_error(ValidationError::new(
                format!("{}.url", path),
                format!(
                    "scheme '{}' does not match transport, expected one of {:?}",
                    parsed.scheme(),
                    schemes
                ),
            )),
            Err(e) => result.add_error(ValidationError::new(
                format!("{}.url", path),
                format!("invalid url '{}': {}", url, e),
            )),
        }
    }
}

fn looks_managed(url: &str) -> bool {
    MANAGED_SESSION_HINTS.iter().any(|hint| url.contains(hint))
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
