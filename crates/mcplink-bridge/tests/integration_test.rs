//! End-to-end tests for the connection manager and tool bridge.
//!
//! Stub servers: `/bin/sh` scripts for stdio, wiremock for plain HTTP and
//! axum for WebSocket and streamable HTTP.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcplink_bridge::{
    BridgeError, ClientInfo, ConnectionManager, ConnectionState, ManagerConfig, ProtocolHandler,
    SessionTarget, SyncReport, ToolBridge,
};
use mcplink_core::{MemoryServerStore, MemoryToolRegistry, MemoryToolStore};
use mcplink_protocols::{
    HostToolRegistry, McpToolStore, RegistryError, ServerDescriptor, SessionMode, Tool,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Answers initialize, tools/list (tools named by `$TOOLS`) and tools/call.
/// A call to the tool `fail` reports `isError`.
const STUB_SERVER: &str = r#"
tools=""
for name in $TOOLS; do
  entry="{\"name\":\"$name\",\"description\":\"Tool $name\",\"inputSchema\":{\"type\":\"object\"}}"
  if [ -z "$tools" ]; then tools="$entry"; else tools="$tools,$entry"; fi
done
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"stub","version":"0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      [ -n "$SILENT" ] && continue
      printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[%s]}}\n' "$id" "$tools" ;;
    *'"method":"tools/call"'*)
      case "$line" in
        *'"name":"fail"'*)
          printf '{"jsonrpc":"2.0","id":"%s","result":{"content":[{"type":"text","text":"disk full"}],"isError":true}}\n' "$id" ;;
        *)
          printf '{"jsonrpc":"2.0","id":"%s","result":{"content":[{"type":"text","text":"ok"}],"isError":false}}\n' "$id" ;;
      esac ;;
  esac
done
"#;

fn stub_descriptor(id: &str, tools: &[&str]) -> ServerDescriptor {
    let mut desc = ServerDescriptor::stdio(
        id,
        format!("Stub {}", id),
        "/bin/sh",
        vec!["-c".to_string(), STUB_SERVER.to_string()],
    );
    if let mcplink_protocols::ServerEndpoint::Stdio { env, .. } = &mut desc.endpoint {
        env.insert("TOOLS".to_string(), tools.join(" "));
    }
    desc
}

fn silent_descriptor(id: &str) -> ServerDescriptor {
    let mut desc = stub_descriptor(id, &["a"]);
    if let mcplink_protocols::ServerEndpoint::Stdio { env, .. } = &mut desc.endpoint {
        env.insert("SILENT".to_string(), "1".to_string());
    }
    desc
}

fn test_config() -> ManagerConfig {
    ManagerConfig {
        request_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(5),
        session_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(2),
        ..ManagerConfig::default()
    }
}

async fn serve(app: Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn initialize_result(id: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "stub", "version": "0"}
        }
    })
}

fn tool_list() -> Value {
    json!([
        {"name": "echo", "description": "Echo input", "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}},
        {"name": "add", "inputSchema": {"type": "object"}}
    ])
}

// ============================================================================
// Stdio
// ============================================================================

#[tokio::test]
async fn test_stdio_connect_list_disconnect() {
    let manager = ConnectionManager::new(test_config());
    let desc = stub_descriptor("stub", &["read", "write"]);

    manager.connect(&desc).await.unwrap();
    assert_eq!(manager.state("stub"), ConnectionState::Ready);

    let tools = manager.list_tools("stub").await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["read", "write"]);
    assert_eq!(tools[0].description.as_deref(), Some("Tool read"));

    let result = manager.call_tool("stub", "read", json!({})).await.unwrap();
    assert_eq!(result["content"][0]["text"], "ok");

    let started = Instant::now();
    manager.disconnect("stub").await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(manager.state("stub"), ConnectionState::Disconnected);
    assert_eq!(manager.connection_count(), 0);
}

#[tokio::test]
async fn test_concurrent_connects_share_one_connection() {
    let manager = Arc::new(ConnectionManager::new(test_config()));
    let desc = stub_descriptor("shared", &["a"]);

    let (a, b) = tokio::join!(manager.connect(&desc), manager.connect(&desc));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(manager.connection_count(), 1);
    manager.disconnect_all().await;
}

#[tokio::test]
async fn test_request_ids_increase_per_connection() {
    let manager = ConnectionManager::new(test_config());
    let connection = manager.connect(&stub_descriptor("ids", &["a"])).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let response = connection.request("tools/list", None).await.unwrap();
        let id: u64 = response.id_key().unwrap().parse().unwrap();
        seen.push(id);
    }
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(seen[0] > 1, "initialize used the first id");
    manager.disconnect_all().await;
}

#[tokio::test]
async fn test_unanswered_request_times_out_and_is_forgotten() {
    let config = ManagerConfig {
        request_timeout: Duration::from_millis(300),
        ..test_config()
    };
    let manager = ConnectionManager::new(config);
    let connection = manager.connect(&silent_descriptor("quiet")).await.unwrap();

    let err = manager.list_tools("quiet").await.unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));
    assert_eq!(connection.correlator().pending_count(), 0);
    manager.disconnect_all().await;
}

/// Answers initialize, then stops reading stdin for good.
const STALLED_SERVER: &str = r#"
IFS= read -r line
id=$(printf '%s\n' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"stalled","version":"0"}}}\n' "$id"
exec sleep 1000
"#;

/// Ignores SIGTERM, names its one tool after its pid and keeps running
/// after stdin closes.
const STUBBORN_SERVER: &str = r#"
trap '' TERM
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"stubborn","version":"0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[{"name":"pid_%s","inputSchema":{"type":"object"}}]}}\n' "$id" "$$" ;;
  esac
done
while :; do sleep 0.1; done
"#;

fn script_descriptor(id: &str, script: &str) -> ServerDescriptor {
    ServerDescriptor::stdio(
        id,
        format!("Script {}", id),
        "/bin/sh",
        vec!["-c".to_string(), script.to_string()],
    )
}

#[tokio::test]
async fn test_blocked_stdin_write_times_out() {
    let config = ManagerConfig {
        request_timeout: Duration::from_secs(1),
        ..test_config()
    };
    let manager = ConnectionManager::new(config);
    let connection = manager
        .connect(&script_descriptor("stalled", STALLED_SERVER))
        .await
        .unwrap();

    // Larger than any pipe buffer, so the write itself cannot finish.
    let payload = "x".repeat(2 * 1024 * 1024);
    let started = Instant::now();
    let err = manager
        .call_tool("stalled", "write", json!({"data": payload}))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Timeout(_)), "unexpected error: {err}");
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(connection.correlator().pending_count(), 0);

    let started = Instant::now();
    manager.disconnect("stalled").await;
    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(manager.state("stalled"), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_kills_server_that_ignores_sigterm() {
    let config = ManagerConfig {
        shutdown_grace: Duration::from_millis(500),
        ..test_config()
    };
    let manager = ConnectionManager::new(config);
    manager
        .connect(&script_descriptor("stubborn", STUBBORN_SERVER))
        .await
        .unwrap();

    let tools = manager.list_tools("stubborn").await.unwrap();
    let pid: i32 = tools[0].name.strip_prefix("pid_").unwrap().parse().unwrap();

    let started = Instant::now();
    manager.disconnect("stubborn").await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500), "killed before the grace period: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "disconnect took {elapsed:?}");

    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        assert!(kill(Pid::from_raw(pid), None).is_err(), "process {pid} survived");
    }
    #[cfg(not(unix))]
    let _ = pid;
}

#[tokio::test]
async fn test_stdio_tool_error_flag_becomes_tool_execution_error() {
    let manager = Arc::new(ConnectionManager::new(test_config()));
    let registry = Arc::new(MemoryToolRegistry::new());
    let servers = Arc::new(MemoryServerStore::with_servers([
        stub_descriptor("flaky", &["fail", "read"]).with_user("carol"),
    ]));
    let bridge = ToolBridge::new(manager.clone(), registry, Arc::new(MemoryToolStore::new()))
        .with_server_store(servers);

    let result = bridge.execute_tool("flaky", "fail", json!({})).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("disk full"));

    match manager.call_tool("flaky", "fail", json!({})).await.unwrap_err() {
        BridgeError::ToolExecution { message } => assert_eq!(message, "disk full"),
        other => panic!("unexpected error: {other}"),
    }

    let ok = manager.call_tool("flaky", "read", json!({})).await.unwrap();
    assert_eq!(ok["isError"], false);
    manager.disconnect_all().await;
}

#[tokio::test]
async fn test_disconnect_unknown_id_is_noop() {
    let manager = ConnectionManager::new(test_config());
    manager.disconnect("never-connected").await;
    manager.disconnect_all().await;
    assert_eq!(manager.connection_count(), 0);
}

// ============================================================================
// Plain HTTP
// ============================================================================

#[tokio::test]
async fn test_http_tool_error_becomes_tool_execution_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "initialize"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(initialize_result(&json!("1"))))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "notifications/initialized"})))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "tools/call"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "2",
            "error": {"code": -1, "message": "boom"}
        })))
        .mount(&server)
        .await;

    let manager = ConnectionManager::new(test_config());
    let desc = ServerDescriptor::http("remote", "Remote", format!("{}/mcp", server.uri()));
    manager.connect(&desc).await.unwrap();

    let err = manager
        .call_tool("remote", "explode", json!({}))
        .await
        .unwrap_err();
    match err {
        BridgeError::ToolExecution { message } => assert!(message.contains("boom")),
        other => panic!("unexpected error: {other}"),
    }
    manager.disconnect_all().await;
}

#[tokio::test]
async fn test_http_handshake_error_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": "1",
            "error": {"code": -32600, "message": "unsupported protocol"}
        })))
        .mount(&server)
        .await;

    let manager = ConnectionManager::new(test_config());
    let desc = ServerDescriptor::http("bad", "Bad", server.uri());
    let err = manager.connect(&desc).await.unwrap_err();

    assert!(matches!(err, BridgeError::Handshake { .. }));
    assert_eq!(manager.state("bad"), ConnectionState::Disconnected);
    assert_eq!(manager.connection_count(), 0);
}

// ============================================================================
// WebSocket
// ============================================================================

#[derive(Default)]
struct WsStub {
    connections: AtomicUsize,
}

async fn ws_upgrade(State(stub): State<Arc<WsStub>>, ws: WebSocketUpgrade) -> Response {
    stub.connections.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(ws_session)
}

async fn ws_session(mut socket: WebSocket) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let id = request["id"].clone();
        let reply = match request["method"].as_str() {
            Some("initialize") => initialize_result(&id),
            Some("tools/call") if request["params"]["name"] == "drop" => {
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
            Some("tools/call") => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"content": [{"type": "text", "text": "pong"}], "isError": false}
            }),
            _ => continue,
        };
        if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
            return;
        }
    }
}

#[tokio::test]
async fn test_websocket_close_cancels_then_reconnects() {
    let stub = Arc::new(WsStub::default());
    let app = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(stub.clone());
    let addr = serve(app).await;

    let manager = ConnectionManager::new(test_config());
    let desc = ServerDescriptor::websocket("sock", "Socket", format!("ws://{}/ws", addr));
    manager.connect(&desc).await.unwrap();

    let err = manager.call_tool("sock", "drop", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::Cancelled(_)), "got {err}");

    let result = manager.call_tool("sock", "echo", json!({})).await.unwrap();
    assert_eq!(result["content"][0]["text"], "pong");
    assert_eq!(stub.connections.load(Ordering::SeqCst), 2);

    manager.disconnect_all().await;
}

// ============================================================================
// Managed sessions
// ============================================================================

const SESSION_ID: &str = "session-42";

#[derive(Default)]
struct HttpStub {
    deleted: AtomicUsize,
}

/// Serves both raw JSON-RPC and streamable HTTP on one route.
async fn rpc(headers: HeaderMap, Json(request): Json<Value>) -> Response {
    let wants_stream = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));
    let session_header = HeaderName::from_static("mcp-session-id");
    let id = request["id"].clone();

    match request["method"].as_str() {
        Some("initialize") => (
            [(session_header, SESSION_ID)],
            Json(initialize_result(&id)),
        )
            .into_response(),
        Some("tools/list") => {
            let body = json!({"jsonrpc": "2.0", "id": id, "result": {"tools": tool_list()}});
            if !wants_stream {
                return Json(body).into_response();
            }
            let has_session = headers
                .get(&session_header)
                .and_then(|v| v.to_str().ok())
                == Some(SESSION_ID);
            if !has_session {
                return (StatusCode::BAD_REQUEST, "missing session").into_response();
            }
            let stream = format!(
                "event: message\ndata: {}\n\nevent: message\ndata: {}\n\n",
                json!({"jsonrpc": "2.0", "method": "notifications/progress"}),
                body
            );
            ([(header::CONTENT_TYPE, "text/event-stream")], stream).into_response()
        }
        _ => StatusCode::ACCEPTED.into_response(),
    }
}

async fn end_session(State(stub): State<Arc<HttpStub>>) -> StatusCode {
    stub.deleted.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

#[tokio::test]
async fn test_raw_and_managed_tool_lists_match() {
    let stub = Arc::new(HttpStub::default());
    let app = Router::new()
        .route("/mcp", post(rpc).delete(end_session))
        .with_state(stub.clone());
    let addr = serve(app).await;
    let url = format!("http://{}/mcp", addr);

    let manager = ConnectionManager::new(test_config());
    let raw = ServerDescriptor::http("raw", "Raw", &url);
    let managed =
        ServerDescriptor::http("managed", "Managed", &url).with_session(SessionMode::StreamableHttp);

    manager.connect(&raw).await.unwrap();
    manager.connect(&managed).await.unwrap();

    let via_raw = manager.list_tools("raw").await.unwrap();
    let via_session = manager.list_tools("managed").await.unwrap();

    assert_eq!(via_raw.len(), 2);
    assert_eq!(via_raw, via_session);
    assert_eq!(stub.deleted.load(Ordering::SeqCst), 1);

    let status = manager.test_connection(&managed).await;
    assert!(status.is_connected());
    assert_eq!(status.tools.len(), 2);
    assert!(manager.knows("managed"));

    manager.disconnect_all().await;
}

/// Legacy SSE server: `GET /sse` streams events, `POST /messages` takes
/// requests and answers on the stream.
#[derive(Default)]
struct SseStub {
    next_session: AtomicUsize,
    open_streams: AtomicUsize,
    streams: Mutex<HashMap<usize, mpsc::UnboundedSender<Value>>>,
    silent: AtomicBool,
}

/// Counts an event stream as open until axum drops it.
struct OpenStream(Arc<SseStub>);

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn sse_stream(
    State(stub): State<Arc<SseStub>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = stub.next_session.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::unbounded_channel();
    stub.streams.lock().insert(session, tx);
    stub.open_streams.fetch_add(1, Ordering::SeqCst);

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session={}", session));
    let replies = futures::stream::unfold((rx, OpenStream(stub)), |(mut rx, open)| async move {
        let reply: Value = rx.recv().await?;
        let event = Event::default().event("message").data(reply.to_string());
        Some((Ok::<_, Infallible>(event), (rx, open)))
    });

    Sse::new(futures::stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(replies))
        .keep_alive(KeepAlive::new().interval(Duration::from_millis(100)))
}

async fn sse_message(
    State(stub): State<Arc<SseStub>>,
    Query(query): Query<HashMap<String, String>>,
    Json(request): Json<Value>,
) -> StatusCode {
    let stream = query
        .get("session")
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|session| stub.streams.lock().get(&session).cloned());
    let Some(stream) = stream else {
        return StatusCode::NOT_FOUND;
    };
    if stub.silent.load(Ordering::SeqCst) {
        return StatusCode::ACCEPTED;
    }

    let id = request["id"].clone();
    let reply = match request["method"].as_str() {
        Some("initialize") => Some(initialize_result(&id)),
        Some("tools/list") => Some(json!({"jsonrpc": "2.0", "id": id, "result": {"tools": tool_list()}})),
        Some("tools/call") => {
            let text = request["params"]["arguments"]["text"].as_str().unwrap_or_default();
            Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"content": [{"type": "text", "text": format!("echo: {}", text)}], "isError": false}
            }))
        }
        _ => None,
    };
    if let Some(reply) = reply {
        let _ = stream.send(reply);
    }
    StatusCode::ACCEPTED
}

async fn wait_for_closed_streams(stub: &SseStub) -> bool {
    for _ in 0..30 {
        if stub.open_streams.load(Ordering::SeqCst) == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_sse_session_lists_and_calls_tools() {
    let stub = Arc::new(SseStub::default());
    let app = Router::new()
        .route("/mcp", post(rpc))
        .route("/sse", get(sse_stream))
        .route("/messages", post(sse_message))
        .with_state(stub.clone());
    let addr = serve(app).await;

    let manager = Arc::new(ConnectionManager::new(test_config()));
    let raw = ServerDescriptor::http("raw", "Raw", format!("http://{}/mcp", addr));
    let legacy = ServerDescriptor::http("legacy", "Legacy", format!("http://{}/sse", addr))
        .with_session(SessionMode::Sse)
        .with_user("dave");
    manager.connect(&raw).await.unwrap();
    manager.connect(&legacy).await.unwrap();

    let via_raw = manager.list_tools("raw").await.unwrap();
    let via_sse = manager.list_tools("legacy").await.unwrap();
    assert_eq!(via_sse.len(), 2);
    assert_eq!(via_raw, via_sse);

    let result = manager
        .call_tool("legacy", "echo", json!({"text": "hi"}))
        .await
        .unwrap();
    assert_eq!(result["content"][0]["text"], "echo: hi");

    let bridge = ToolBridge::new(
        manager.clone(),
        Arc::new(MemoryToolRegistry::new()),
        Arc::new(MemoryToolStore::new()),
    )
    .with_server_store(Arc::new(MemoryServerStore::with_servers([legacy])));
    let invoked = bridge.execute_tool("legacy", "echo", json!({"text": "again"})).await;
    assert!(invoked.success);
    assert_eq!(invoked.content_text(), "echo: again");

    assert!(wait_for_closed_streams(&stub).await, "event streams left open");
    manager.disconnect_all().await;
}

#[tokio::test]
async fn test_sse_session_deadline_still_closes_stream() {
    let stub = Arc::new(SseStub::default());
    stub.silent.store(true, Ordering::SeqCst);
    let app = Router::new()
        .route("/sse", get(sse_stream))
        .route("/messages", post(sse_message))
        .with_state(stub.clone());
    let addr = serve(app).await;

    let handler = ProtocolHandler::new(Duration::from_millis(500), ClientInfo::default());
    let target = SessionTarget::new(format!("http://{}/sse", addr), SessionMode::Sse);

    let started = Instant::now();
    let (ok, error) = handler.test_connect(&target).await;
    assert!(!ok);
    assert!(error.is_some());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(stub.next_session.load(Ordering::SeqCst), 1);

    assert!(wait_for_closed_streams(&stub).await, "event stream outlived the session");
}

// ============================================================================
// Tool bridge
// ============================================================================

/// Registry that refuses to register one tool id.
struct FlakyRegistry {
    inner: MemoryToolRegistry,
    reject: String,
}

#[async_trait]
impl HostToolRegistry for FlakyRegistry {
    async fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.inner.get(id).await
    }

    async fn create(&self, user_id: &str, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if tool.definition().id == self.reject {
            return Err(RegistryError::Rejected {
                id: self.reject.clone(),
                reason: "write failed".to_string(),
            });
        }
        self.inner.create(user_id, tool).await
    }

    async fn update(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        self.inner.update(tool).await
    }

    async fn delete(&self, id: &str) -> Result<bool, RegistryError> {
        self.inner.delete(id).await
    }

    async fn list_by_user(&self, user_id: &str) -> Vec<Arc<dyn Tool>> {
        self.inner.list_by_user(user_id).await
    }
}

#[tokio::test]
async fn test_sync_counts_failed_registry_write() {
    let manager = Arc::new(ConnectionManager::new(test_config()));
    let registry = Arc::new(FlakyRegistry {
        inner: MemoryToolRegistry::new(),
        reject: "mcp_s_b".to_string(),
    });
    let store = Arc::new(MemoryToolStore::new());
    let bridge = ToolBridge::new(manager.clone(), registry.clone(), store.clone());

    let desc = stub_descriptor("s", &["a", "b", "c"]);
    let report = bridge.sync_server_tools(&desc, "alice").await.unwrap();

    assert_eq!(report, SyncReport { synced: 2, failed: 1, total: 3 });
    assert!(registry.get("mcp_s_a").await.is_some());
    assert!(registry.get("mcp_s_b").await.is_none());
    assert!(registry.get("mcp_s_c").await.is_some());
    assert_eq!(store.list_by_server("s").await.unwrap().len(), 3);

    manager.disconnect_all().await;
}

#[tokio::test]
async fn test_registered_tool_invokes_remote() {
    let manager = Arc::new(ConnectionManager::new(test_config()));
    let registry = Arc::new(MemoryToolRegistry::new());
    let store = Arc::new(MemoryToolStore::new());
    let bridge = ToolBridge::new(manager.clone(), registry.clone(), store.clone());

    let desc = stub_descriptor("fs", &["read"]);
    bridge.sync_server_tools(&desc, "alice").await.unwrap();

    let tool = registry.get("mcp_fs_read").await.unwrap();
    assert_eq!(tool.definition().name, "Stub fs: read");

    manager.disconnect("fs").await;
    let result = tool.execute(json!({"path": "/tmp"})).await.unwrap();
    assert!(result.success);
    assert_eq!(result.content_text(), "ok");

    let removed = bridge.remove_server_tools("fs", "alice").await;
    assert_eq!(removed, 1);
    assert!(registry.get("mcp_fs_read").await.is_none());
    assert!(store.list_by_server("fs").await.unwrap().is_empty());

    manager.disconnect_all().await;
}

#[tokio::test]
async fn test_sync_user_tools_counts_failing_server() {
    let manager = Arc::new(ConnectionManager::new(test_config()));
    let registry = Arc::new(MemoryToolRegistry::new());
    let store = Arc::new(MemoryToolStore::new());
    let servers = Arc::new(MemoryServerStore::with_servers([
        stub_descriptor("good", &["x", "y"]).with_user("bob"),
        ServerDescriptor::stdio("broken", "Broken", "/no/such/binary", vec![]).with_user("bob"),
        stub_descriptor("off", &["z"]).with_user("bob").with_enabled(false),
    ]));
    let bridge = ToolBridge::new(manager.clone(), registry.clone(), store)
        .with_server_store(servers);

    let report = bridge.sync_user_tools("bob").await.unwrap();
    assert_eq!(report, SyncReport { synced: 2, failed: 1, total: 3 });
    assert!(registry.get("mcp_off_z").await.is_none());

    let result = bridge.execute_tool("good", "x", json!({})).await;
    assert!(result.success);
    let missing = bridge.execute_tool("ghost", "x", json!({})).await;
    assert!(!missing.success);

    manager.disconnect_all().await;
}
