//! WebSocket transport with ping/pong keepalive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use mcplink_protocols::types::TransportKind;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::{Transport, TransportSettings};
use crate::correlator::MessageHandler;
use crate::error::TransportError;
use crate::protocol::McpResponse;

const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Persistent socket. Every inbound text frame goes to the handler.
pub struct WebSocketTransport {
    server_id: String,
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    closed: Arc<AtomicBool>,
    recv_task: JoinHandle<()>,
    keepalive_task: JoinHandle<()>,
}

impl WebSocketTransport {
    pub async fn connect(
        server_id: &str,
        url: &str,
        headers: &HashMap<String, String>,
        handler: Arc<dyn MessageHandler>,
        settings: &TransportSettings,
    ) -> Result<Self, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::WebSocket(format!("invalid url '{}': {}", url, e)))?;
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| TransportError::WebSocket(format!("invalid header '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::WebSocket(format!("invalid header '{}': {}", key, e)))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        info!(server_id, url, "WebSocket connected");

        let (sink, source) = stream.split();
        let sink = Arc::new(tokio::sync::Mutex::new(sink));
        let closed = Arc::new(AtomicBool::new(false));
        let pongs = Arc::new(AtomicU64::new(0));

        let recv_task = tokio::spawn(Self::receive_loop(
            server_id.to_string(),
            source,
            handler.clone(),
            closed.clone(),
            pongs.clone(),
        ));

        let keepalive_task = tokio::spawn(Self::keepalive_loop(
            server_id.to_string(),
            sink.clone(),
            handler,
            closed.clone(),
            pongs,
            settings.clone(),
        ));

        Ok(Self {
            server_id: server_id.to_string(),
            sink,
            closed,
            recv_task,
            keepalive_task,
        })
    }

    /// WebSocket receive loop.
    async fn receive_loop(
        server_id: String,
        mut source: WsSource,
        handler: Arc<dyn MessageHandler>,
        closed: Arc<AtomicBool>,
        pongs: Arc<AtomicU64>,
    ) {
        while let Some(msg) = source.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    trace!(server_id = %server_id, "ws recv: {}", text.as_str());
                    handler.handle_message(text.as_str());
                }
                Ok(Message::Pong(_)) => {
                    pongs.fetch_add(1, Ordering::SeqCst);
                }
                Ok(Message::Close(frame)) => {
                    debug!(server_id = %server_id, ?frame, "WebSocket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(server_id = %server_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }
        closed.store(true, Ordering::SeqCst);
        handler.handle_closed();
    }

    /// Ping every interval; no pong within the timeout marks the socket dead.
    async fn keepalive_loop(
        server_id: String,
        sink: Arc<tokio::sync::Mutex<WsSink>>,
        handler: Arc<dyn MessageHandler>,
        closed: Arc<AtomicBool>,
        pongs: Arc<AtomicU64>,
        settings: TransportSettings,
    ) {
        let mut ticker = tokio::time::interval(settings.ws_ping_interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if closed.load(Ordering::SeqCst) {
                break;
            }

            let before = pongs.load(Ordering::SeqCst);
            let sent = sink.lock().await.send(Message::Ping(Default::default())).await;
            if let Err(e) = sent {
                warn!(server_id = %server_id, error = %e, "Ping failed");
                break;
            }

            tokio::time::sleep(settings.ws_pong_timeout).await;
            if pongs.load(Ordering::SeqCst) == before && !closed.load(Ordering::SeqCst) {
                warn!(server_id = %server_id, "No pong within {:?}, closing", settings.ws_pong_timeout);
                break;
            }
        }

        if !closed.swap(true, Ordering::SeqCst) {
            let _ = sink.lock().await.close().await;
            handler.handle_closed();
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    async fn send(&self, message: &serde_json::Value) -> Result<Option<McpResponse>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let json = serde_json::to_string(message)?;
        trace!(server_id = %self.server_id, "ws send: {}", json);
        self.sink
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        Ok(None)
    }

    async fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        let already_closed = self.closed.swap(true, Ordering::SeqCst);
        self.keepalive_task.abort();
        if !already_closed {
            match self.sink.try_lock() {
                Ok(mut sink) => {
                    match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, sink.close()).await {
                        Ok(Err(e)) => {
                            debug!(server_id = %self.server_id, error = %e, "WebSocket close frame failed")
                        }
                        Err(_) => debug!(server_id = %self.server_id, "WebSocket close frame timed out"),
                        Ok(Ok(())) => {}
                    }
                }
                Err(_) => debug!(server_id = %self.server_id, "Sink busy, dropping socket without close frame"),
            }
        }
        self.recv_task.abort();
        info!(server_id = %self.server_id, "WebSocket transport closed");
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.keepalive_task.abort();
        self.recv_task.abort();
    }
}
