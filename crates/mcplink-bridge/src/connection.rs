//! One live link to a configured server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mcplink_protocols::server::ServerDescriptor;
use mcplink_protocols::types::{SessionMode, TransportKind};
use tracing::{debug, warn};

use crate::correlator::RequestCorrelator;
use crate::error::BridgeError;
use crate::protocol::{McpNotification, McpRequest, McpResponse};
use crate::transport::Transport;

/// Raw JSON-RPC over a transport, or a managed session opened per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Raw,
    ManagedSession(SessionMode),
}

/// Runtime state for one server id.
pub struct Connection {
    descriptor: ServerDescriptor,
    mode: ConnectionMode,
    transport: Option<Arc<dyn Transport>>,
    correlator: Arc<RequestCorrelator>,
    request_timeout: Duration,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("descriptor", &self.descriptor)
            .field("mode", &self.mode)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn raw(
        descriptor: ServerDescriptor,
        transport: Arc<dyn Transport>,
        correlator: Arc<RequestCorrelator>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            descriptor,
            mode: ConnectionMode::Raw,
            transport: Some(transport),
            correlator,
            request_timeout,
        }
    }

    /// A managed-session connection holds no transport of its own.
    pub fn managed(descriptor: ServerDescriptor, request_timeout: Duration) -> Self {
        let correlator = Arc::new(RequestCorrelator::new(descriptor.id.clone()));
        Self {
            mode: ConnectionMode::ManagedSession(descriptor.session),
            descriptor,
            transport: None,
            correlator,
            request_timeout,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn is_managed(&self) -> bool {
        matches!(self.mode, ConnectionMode::ManagedSession(_))
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    fn transport(&self) -> Result<&Arc<dyn Transport>, BridgeError> {
        match (&self.mode, &self.transport) {
            (ConnectionMode::Raw, Some(transport)) => Ok(transport),
            (ConnectionMode::ManagedSession(mode), _) => Err(BridgeError::Protocol(format!(
                "{} uses a {} session; raw JSON-RPC is not available",
                self.descriptor.id, mode
            ))),
            (ConnectionMode::Raw, None) => Err(BridgeError::NotConnected(self.descriptor.id.clone())),
        }
    }

    /// Send a request with the default timeout.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<McpResponse, BridgeError> {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    /// Send a request and wait for its response.
    ///
    /// HTTP answers in the same exchange; other transports resolve through
    /// the correlator. The write and the wait share one deadline.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<McpResponse, BridgeError> {
        let transport = self.transport()?;

        let id = self.correlator.next_id();
        let mut request = McpRequest::new(id.clone(), method);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        let message =
            serde_json::to_value(&request).map_err(|e| BridgeError::Protocol(e.to_string()))?;

        debug!(server_id = %self.descriptor.id, method, id = %id, "Sending request");

        if transport.kind() == TransportKind::Http {
            return match tokio::time::timeout(timeout, transport.send(&message)).await {
                Ok(Ok(Some(response))) => Ok(response),
                Ok(Ok(None)) => Err(BridgeError::Protocol(format!(
                    "{} returned an empty body for {}",
                    self.descriptor.id, method
                ))),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(BridgeError::Timeout(format!(
                    "{} (id {}) after {:?}",
                    method, id, timeout
                ))),
            };
        }

        let started = Instant::now();
        let slot = self.correlator.register(&id, method)?;
        match tokio::time::timeout(timeout, transport.send(&message)).await {
            Ok(Ok(Some(response))) => {
                self.correlator.forget(&id);
                Ok(response)
            }
            Ok(Ok(None)) => {
                let remaining = timeout.saturating_sub(started.elapsed());
                self.correlator.await_result(slot, remaining).await
            }
            Ok(Err(e)) => {
                self.correlator.forget(&id);
                Err(e.into())
            }
            Err(_) => {
                self.correlator.forget(&id);
                warn!(server_id = %self.descriptor.id, method, id = %id, "Write did not complete in time");
                Err(BridgeError::Timeout(format!(
                    "{} (id {}) after {:?}",
                    method, id, timeout
                )))
            }
        }
    }

    /// Fire-and-forget notification.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), BridgeError> {
        let transport = self.transport()?;
        let mut notification = McpNotification::new(method);
        notification.params = params;
        let message = serde_json::to_value(&notification)
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;
        match tokio::time::timeout(self.request_timeout, transport.send(&message)).await {
            Ok(sent) => {
                sent?;
                Ok(())
            }
            Err(_) => Err(BridgeError::Timeout(format!(
                "{} after {:?}",
                method, self.request_timeout
            ))),
        }
    }

    /// Managed sessions are always usable; raw connections ask the transport.
    pub async fn is_alive(&self) -> bool {
        match &self.transport {
            None => self.is_managed(),
            Some(transport) => !self.correlator.is_closed() && transport.is_alive().await,
        }
    }

    /// Cancel pending requests and close the transport. Never fails.
    pub async fn close(&self) {
        self.correlator.close("connection closed");
        if let Some(transport) = &self.transport {
            transport.close().await;
        }
    }
}
