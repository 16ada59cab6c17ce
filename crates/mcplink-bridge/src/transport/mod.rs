//! Transport layer for MCP communication.
//!
//! A transport moves JSON frames to one server. Long-lived transports
//! (stdio, websocket) push every inbound frame to a [`MessageHandler`];
//! HTTP pairs each request with its response body instead.

mod http;
mod stdio;
mod websocket;

pub use http::HttpTransport;
pub use stdio::StdioTransport;
pub use websocket::WebSocketTransport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_protocols::server::{ServerDescriptor, ServerEndpoint};
use mcplink_protocols::types::TransportKind;

use crate::correlator::MessageHandler;
use crate::error::TransportError;
use crate::protocol::McpResponse;

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Write one JSON-RPC frame.
    ///
    /// Returns `Some` only for transports that answer in the same exchange.
    async fn send(&self, message: &serde_json::Value) -> Result<Option<McpResponse>, TransportError>;

    /// Liveness probe.
    async fn is_alive(&self) -> bool;

    /// Tear down. Idempotent; failures are logged.
    async fn close(&self);
}

/// Timing knobs shared by all transports.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub ws_ping_interval: Duration,
    pub ws_pong_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            ws_ping_interval: Duration::from_secs(30),
            ws_pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Open the transport named by the descriptor's endpoint.
pub async fn connect(
    descriptor: &ServerDescriptor,
    handler: Arc<dyn MessageHandler>,
    settings: &TransportSettings,
) -> Result<Arc<dyn Transport>, TransportError> {
    let transport: Arc<dyn Transport> = match &descriptor.endpoint {
        ServerEndpoint::Stdio { command, args, env } => Arc::new(StdioTransport::spawn(
            &descriptor.id,
            command,
            args,
            env,
            handler,
            settings.shutdown_grace,
        )?),
        ServerEndpoint::Http { url } => Arc::new(HttpTransport::new(
            &descriptor.id,
            url,
            &descriptor.headers,
            settings.request_timeout,
        )?),
        ServerEndpoint::Websocket { url } => Arc::new(
            WebSocketTransport::connect(&descriptor.id, url, &descriptor.headers, handler, settings)
                .await?,
        ),
    };
    Ok(transport)
}
