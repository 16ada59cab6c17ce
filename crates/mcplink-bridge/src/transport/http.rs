//! HTTP transport for MCP communication.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mcplink_protocols::types::TransportKind;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tracing::{debug, warn};

use super::Transport;
use crate::error::TransportError;
use crate::protocol::McpResponse;

/// Stateless JSON-RPC over HTTP POST.
///
/// Each request is an independent POST whose body carries the response,
/// so no correlator is involved.
pub struct HttpTransport {
    server_id: String,
    url: String,
    client: Client,
    headers: HeaderMap,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(
        server_id: &str,
        url: &str,
        extra_headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        for (key, value) in extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| TransportError::Http(format!("invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Http(format!("invalid value for header '{}': {}", key, e)))?;
            headers.insert(name, value);
        }

        Ok(Self {
            server_id: server_id.to_string(),
            url: url.to_string(),
            client,
            headers,
            closed: AtomicBool::new(false),
        })
    }

    fn post(&self, message: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(message)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn send(&self, message: &serde_json::Value) -> Result<Option<McpResponse>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        // Notifications are posted without waiting for the reply.
        if message.get("id").is_none() {
            let request = self.post(message);
            let server_id = self.server_id.clone();
            tokio::spawn(async move {
                if let Err(e) = request.send().await {
                    debug!(server_id = %server_id, error = %e, "Notification POST failed");
                }
            });
            return Ok(None);
        }

        let response = self
            .post(message)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !status.is_success() {
            warn!(server_id = %self.server_id, %status, "HTTP request failed");
            return Err(TransportError::Http(format!("HTTP {}: {}", status, body)));
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        let response: McpResponse = serde_json::from_str(&body)?;
        Ok(Some(response))
    }

    async fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
