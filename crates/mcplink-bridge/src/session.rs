//! Managed-session protocol handler.
//!
//! Servers speaking the session-oriented flavour of the protocol get a
//! fresh session per operation: connect, initialize, do one thing, tear
//! down. Two wire forms are supported:
//!
//! - streamable HTTP: POST with `Mcp-Session-Id` tracking, replies as JSON
//!   or as an event stream
//! - SSE: a `GET` event stream announces a POST endpoint; replies arrive as
//!   `message` events on the stream
//!
//! Failures never escape as errors. Every operation returns a result/error
//! pair.

use std::time::{Duration, Instant};

use futures::StreamExt;
use mcplink_protocols::server::{ServerDescriptor, ServerEndpoint};
use mcplink_protocols::tool::ToolInvocationResult;
use mcplink_protocols::types::{Headers, SessionMode};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::BridgeError;
use crate::protocol::{
    parse_tool_list, ClientInfo, McpMethod, McpNotification, McpRequest, McpResponse,
    McpToolDefinition, McpToolResult,
};
use crate::sse::{parse_sse_events, SseDecoder, SseEvent};

const SESSION_HEADER: &str = "mcp-session-id";

/// Where and how to open a managed session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTarget {
    pub url: String,
    pub mode: SessionMode,
    pub headers: Headers,
}

impl SessionTarget {
    pub fn new(url: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            url: url.into(),
            mode,
            headers: Headers::new(),
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// `None` for descriptors that are not HTTP managed sessions.
    pub fn from_descriptor(descriptor: &ServerDescriptor) -> Option<Self> {
        match (&descriptor.endpoint, descriptor.session) {
            (_, SessionMode::Raw) => None,
            (ServerEndpoint::Http { url }, mode) => {
                Some(Self::new(url.clone(), mode).with_headers(descriptor.headers.clone()))
            }
            _ => None,
        }
    }
}

/// Tools discovered over a managed session, or why discovery failed.
#[derive(Debug, Clone, Default)]
pub struct ToolListing {
    pub tools: Vec<McpToolDefinition>,
    pub error: Option<String>,
}

/// Opens short-lived sessions against managed-session servers.
pub struct ProtocolHandler {
    client: Client,
    deadline: Duration,
    client_info: ClientInfo,
}

impl ProtocolHandler {
    pub fn new(deadline: Duration, client_info: ClientInfo) -> Self {
        Self {
            client: Client::new(),
            deadline,
            client_info,
        }
    }

    /// Open a session and initialize it. Returns `(ok, error)`.
    pub async fn test_connect(&self, target: &SessionTarget) -> (bool, Option<String>) {
        match self.with_session(target, None).await {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        }
    }

    pub async fn list_tools(&self, target: &SessionTarget) -> ToolListing {
        let outcome = self
            .with_session(target, Some((McpMethod::ListTools, None)))
            .await
            .and_then(|result| {
                parse_tool_list(result).map_err(|e| BridgeError::Protocol(e.to_string()))
            });

        match outcome {
            Ok(tools) => {
                debug!(url = %target.url, count = tools.len(), "Listed tools over managed session");
                ToolListing { tools, error: None }
            }
            Err(e) => {
                warn!(url = %target.url, error = %e, "Managed-session tools/list failed");
                ToolListing {
                    tools: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn execute_tool(
        &self,
        target: &SessionTarget,
        name: &str,
        arguments: serde_json::Value,
    ) -> ToolInvocationResult {
        let params = serde_json::json!({"name": name, "arguments": arguments});
        let outcome = self
            .with_session(target, Some((McpMethod::CallTool, Some(params))))
            .await
            .and_then(|result| {
                serde_json::from_value::<McpToolResult>(result)
                    .map_err(|e| BridgeError::Protocol(e.to_string()))
            });

        match outcome {
            Ok(result) if result.is_error => ToolInvocationResult::failure(result.text()),
            Ok(result) => ToolInvocationResult::success(result.text()),
            Err(e) => {
                warn!(url = %target.url, tool = name, error = %e, "Managed-session tools/call failed");
                ToolInvocationResult::failure(e.to_string())
            }
        }
    }

    /// Open, initialize, run at most one call, close.
    ///
    /// Open, initialize and the call share the deadline. Teardown always
    /// runs, including after the deadline has passed.
    ///
    /// Returns the call's `result`, or `Null` when there is no call.
    async fn with_session(
        &self,
        target: &SessionTarget,
        call: Option<(McpMethod, Option<serde_json::Value>)>,
    ) -> Result<serde_json::Value, BridgeError> {
        let started = Instant::now();
        let timed_out = || {
            BridgeError::Timeout(format!(
                "managed session with {} after {:?}",
                target.url, self.deadline
            ))
        };

        let mut session = tokio::time::timeout(
            self.deadline,
            ManagedSession::open(&self.client, target, self.deadline),
        )
        .await
        .map_err(|_| timed_out())??;

        let work = async {
            session.initialize(&self.client_info).await?;
            match call {
                Some((method, params)) => session.call(method.as_str(), params).await,
                None => Ok(serde_json::Value::Null),
            }
        };
        let remaining = self.deadline.saturating_sub(started.elapsed());
        let outcome = tokio::time::timeout(remaining, work)
            .await
            .unwrap_or_else(|_| Err(timed_out()));

        session.close().await;
        outcome
    }
}

/// One open managed session.
enum ManagedSession {
    Streamable(StreamableSession),
    Sse(SseSession),
}

impl ManagedSession {
    async fn open(
        client: &Client,
        target: &SessionTarget,
        teardown_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let headers = header_map(&target.headers)?;
        match target.mode {
            SessionMode::StreamableHttp => Ok(ManagedSession::Streamable(StreamableSession {
                client: client.clone(),
                url: target.url.clone(),
                headers,
                session_id: None,
                next_id: 0,
                teardown_timeout,
            })),
            SessionMode::Sse => Ok(ManagedSession::Sse(
                SseSession::open(client.clone(), &target.url, headers).await?,
            )),
            SessionMode::Raw => Err(BridgeError::Session(format!(
                "{} is not configured for a managed session",
                target.url
            ))),
        }
    }

    async fn initialize(&mut self, client_info: &ClientInfo) -> Result<(), BridgeError> {
        let result = self
            .call(McpMethod::Initialize.as_str(), Some(client_info.initialize_params()))
            .await
            .map_err(|e| match e {
                BridgeError::Timeout(_) => e,
                other => BridgeError::Session(format!("initialize failed: {}", other)),
            })?;
        debug!(server_info = %result.get("serverInfo").cloned().unwrap_or_default(), "Session initialized");
        self.notify(McpMethod::Initialized.as_str()).await;
        Ok(())
    }

    /// Request/response returning `result`, with JSON-RPC errors mapped.
    async fn call(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, BridgeError> {
        let response = match self {
            ManagedSession::Streamable(s) => s.request(method, params).await?,
            ManagedSession::Sse(s) => s.request(method, params).await?,
        };
        response.into_result().map_err(|e| {
            if method == McpMethod::CallTool.as_str() {
                BridgeError::tool_execution(e.message)
            } else {
                BridgeError::Session(format!("{} failed: {}", method, e))
            }
        })
    }

    async fn notify(&mut self, method: &str) {
        let result = match self {
            ManagedSession::Streamable(s) => s.notify(method).await,
            ManagedSession::Sse(s) => s.notify(method).await,
        };
        if let Err(e) = result {
            debug!(method, error = %e, "Session notification failed");
        }
    }

    async fn close(self) {
        match self {
            ManagedSession::Streamable(s) => s.close().await,
            ManagedSession::Sse(s) => s.close(),
        }
    }
}

fn header_map(headers: &Headers) -> Result<HeaderMap, BridgeError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| BridgeError::Session(format!("invalid header '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BridgeError::Session(format!("invalid header '{}': {}", key, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn session_error(context: &str, err: impl std::fmt::Display) -> BridgeError {
    BridgeError::Session(format!("{}: {}", context, err))
}

async fn ensure_success(response: Response, context: &str) -> Result<Response, BridgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BridgeError::Session(format!(
        "{}: HTTP {}: {}",
        context, status, body
    )))
}

/// Pick the response with `id` out of a batch of decoded events.
fn find_response(events: &[SseEvent], id: &str) -> Option<McpResponse> {
    events
        .iter()
        .filter(|event| event.is_message())
        .filter_map(|event| serde_json::from_str::<McpResponse>(&event.data).ok())
        .find(|response| response.id_key().as_deref() == Some(id))
}

/// Streamable HTTP session.
struct StreamableSession {
    client: Client,
    url: String,
    headers: HeaderMap,
    session_id: Option<String>,
    next_id: u64,
    teardown_timeout: Duration,
}

impl StreamableSession {
    fn post(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session_id) = &self.session_id {
            request = request.header(SESSION_HEADER, session_id);
        }
        request
    }

    fn capture_session_id(&mut self, headers: &HeaderMap) {
        if let Some(value) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            if self.session_id.as_deref() != Some(value) {
                debug!(session_id = value, "Captured session id");
                self.session_id = Some(value.to_string());
            }
        }
    }

    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<McpResponse, BridgeError> {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut request = McpRequest::new(id.clone(), method);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        let body = serde_json::to_value(&request).map_err(|e| BridgeError::Protocol(e.to_string()))?;

        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|e| session_error(method, e))?;
        self.capture_session_id(response.headers());
        let response = ensure_success(response, method).await?;

        let is_stream = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));
        let text = response.text().await.map_err(|e| session_error(method, e))?;

        if is_stream {
            find_response(&parse_sse_events(&text), &id).ok_or_else(|| {
                BridgeError::Session(format!("{}: no response with id {} in event stream", method, id))
            })
        } else {
            serde_json::from_str(&text).map_err(|e| session_error(method, e))
        }
    }

    async fn notify(&mut self, method: &str) -> Result<(), BridgeError> {
        let body = serde_json::to_value(McpNotification::new(method))
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;
        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|e| session_error(method, e))?;
        self.capture_session_id(response.headers());
        ensure_success(response, method).await?;
        Ok(())
    }

    async fn close(self) {
        let Some(session_id) = self.session_id else {
            return;
        };
        let result = self
            .client
            .delete(&self.url)
            .headers(self.headers)
            .timeout(self.teardown_timeout)
            .header(SESSION_HEADER, &session_id)
            .send()
            .await;
        match result {
            Ok(response) => debug!(session_id, status = %response.status(), "Session deleted"),
            Err(e) => debug!(session_id, error = %e, "Session delete failed"),
        }
    }
}

/// Legacy SSE session: GET stream plus POST endpoint.
struct SseSession {
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
    events: mpsc::UnboundedReceiver<SseEvent>,
    reader: AbortOnDrop,
    next_id: u64,
}

impl SseSession {
    async fn open(client: Client, url: &str, headers: HeaderMap) -> Result<Self, BridgeError> {
        let stream_url = Url::parse(url).map_err(|e| session_error("invalid url", e))?;

        let response = client
            .get(stream_url.clone())
            .headers(headers.clone())
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| session_error("event stream", e))?;
        let response = ensure_success(response, "event stream").await?;

        let (tx, mut events) = mpsc::unbounded_channel();
        let reader = AbortOnDrop(tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for event in decoder.push(&bytes) {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Event stream ended with error");
                        return;
                    }
                }
            }
        }));

        let endpoint = loop {
            match events.recv().await {
                Some(event) if event.event_type() == "endpoint" => {
                    break stream_url
                        .join(event.data.trim())
                        .map_err(|e| session_error("endpoint event", e))?;
                }
                Some(_) => continue,
                None => {
                    return Err(BridgeError::Session(
                        "event stream closed before announcing an endpoint".to_string(),
                    ));
                }
            }
        };
        info!(stream = %stream_url, endpoint = %endpoint, "SSE session opened");

        Ok(Self {
            client,
            endpoint,
            headers,
            events,
            reader,
            next_id: 0,
        })
    }

    async fn post(&self, body: &serde_json::Value, context: &str) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| session_error(context, e))?;
        ensure_success(response, context).await?;
        Ok(())
    }

    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<McpResponse, BridgeError> {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let mut request = McpRequest::new(id.clone(), method);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        let body = serde_json::to_value(&request).map_err(|e| BridgeError::Protocol(e.to_string()))?;
        self.post(&body, method).await?;

        while let Some(event) = self.events.recv().await {
            if let Some(response) = find_response(std::slice::from_ref(&event), &id) {
                return Ok(response);
            }
        }
        Err(BridgeError::Session(format!(
            "{}: event stream closed before the response arrived",
            method
        )))
    }

    async fn notify(&mut self, method: &str) -> Result<(), BridgeError> {
        let body = serde_json::to_value(McpNotification::new(method))
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;
        self.post(&body, method).await
    }

    fn close(self) {
        debug!(endpoint = %self.endpoint, "SSE session closed");
        drop(self.reader);
    }
}

/// Aborts the wrapped task when dropped, so an abandoned session never
/// leaves its event stream open.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_descriptor() {
        let desc = ServerDescriptor::http("s", "S", "https://example.com/mcp")
            .with_header("Authorization", "Bearer t")
            .with_session(SessionMode::StreamableHttp);
        let target = SessionTarget::from_descriptor(&desc).unwrap();
        assert_eq!(target.url, "https://example.com/mcp");
        assert_eq!(target.mode, SessionMode::StreamableHttp);
        assert_eq!(target.headers["Authorization"], "Bearer t");
    }

    #[test]
    fn test_target_from_raw_descriptor() {
        let desc = ServerDescriptor::http("s", "S", "https://example.com/mcp");
        assert!(SessionTarget::from_descriptor(&desc).is_none());
    }

    #[test]
    fn test_find_response_skips_other_ids_and_events() {
        let events = parse_sse_events(concat!(
            "event: endpoint\ndata: /x\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":{\"a\":1}}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":\"2\",\"result\":{\"b\":2}}\n\n",
        ));
        let response = find_response(&events, "2").unwrap();
        assert_eq!(response.into_result().unwrap()["b"], 2);
        assert!(find_response(&events, "3").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_error() {
        let handler = ProtocolHandler::new(Duration::from_secs(5), ClientInfo::default());
        let target = SessionTarget::new("http://127.0.0.1:9/mcp", SessionMode::StreamableHttp);

        let (ok, error) = handler.test_connect(&target).await;
        assert!(!ok);
        assert!(error.is_some());

        let listing = handler.list_tools(&target).await;
        assert!(listing.tools.is_empty());
        assert!(listing.error.is_some());

        let result = handler
            .execute_tool(&target, "echo", serde_json::json!({}))
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_raw_target_is_rejected() {
        let handler = ProtocolHandler::new(Duration::from_secs(1), ClientInfo::default());
        let target = SessionTarget::new("http://127.0.0.1:9/mcp", SessionMode::Raw);
        let (ok, error) = handler.test_connect(&target).await;
        assert!(!ok);
        assert!(error.unwrap().contains("not configured"));
    }
}
