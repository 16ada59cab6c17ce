//! MCP (Model Context Protocol) connection manager and protocol bridge.
//!
//! Connects to external MCP servers over stdio, HTTP or WebSocket, performs
//! the JSON-RPC handshake, correlates requests with responses and mirrors
//! each server's tools into a host tool registry.
//!
//! ## Layers
//!
//! - [`transport`] - moves JSON frames to one server
//! - [`RequestCorrelator`] - matches responses to pending requests
//! - [`ConnectionManager`] - one connection per server id, handshake, reconnect
//! - [`ProtocolHandler`] - short-lived managed sessions (streamable HTTP, SSE)
//! - [`ToolBridge`] - registers remote tools as host [`Tool`](mcplink_protocols::Tool)s

mod adapter;
mod connection;
mod correlator;
mod error;
mod manager;
mod protocol;
mod session;
mod sse;
pub mod transport;

pub use adapter::{McpTool, SyncReport, ToolBridge};
pub use connection::{Connection, ConnectionMode};
pub use correlator::{MessageHandler, RequestCorrelator, ResultSlot};
pub use error::{BridgeError, TransportError};
pub use manager::{
    ConnectionManager, ConnectionOutcome, ConnectionState, ConnectionStatus, ManagerConfig,
};
pub use protocol::{
    ClientInfo, Inbound, JsonRpcError, McpContent, McpMethod, McpNotification, McpRequest,
    McpResponse, McpToolDefinition, McpToolResult, RequestId, DEFAULT_PROTOCOL_VERSION,
    JSONRPC_VERSION,
};
pub use session::{ProtocolHandler, SessionTarget, ToolListing};
pub use sse::{parse_sse_events, SseDecoder, SseEvent};
pub use transport::{Transport, TransportSettings};
