//! MCP (Model Context Protocol) client engine for Skein.
//!
//! This crate turns a configured server entry into a live session that can
//! list and call the server's tools, whichever of the three MCP transports
//! the server speaks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SessionManager                                             │
//! │  - One cached session per entry id, rebuilt on updatedAt    │
//! │  - Uncached one-shot probe (test_list_tools)                │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ProtocolSession<C: RpcChannel>                             │
//! │  - initialize + notifications/initialized, once             │
//! │  - tools/list, tools/call                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌──────────────────┬──────────────────┬───────────────────────┐
//! │  Streamable HTTP │  Legacy SSE      │  Stdio                │
//! │  POST per message│  GET stream +    │  child process,       │
//! │                  │  POST messages   │  FrameDecoder         │
//! └──────────────────┴──────────────────┴───────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Correlator                                                 │
//! │  - ids from 1, pending table, timeouts, reject-all on close │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use skein_mcp::{ServerEntry, SessionManager, TransportKind};
//!
//! let entry = ServerEntry::new(
//!     "weather",
//!     "Weather",
//!     TransportKind::Http,
//!     r#"{"mcpServers": {"weather": {"url": "https://mcp.example.com/mcp"}}}"#,
//! )
//! .with_token("secret");
//!
//! let manager = SessionManager::new();
//! for tool in manager.list_tools(&entry).await?.tools {
//!     println!("Tool: {} - {:?}", tool.name, tool.description);
//! }
//! let result = manager.call_tool(&entry, "forecast", json!({"city": "Oslo"})).await?;
//! println!("Result: {:?}", result.text());
//! ```
//!
//! # Stdio framing
//!
//! Stdio servers use Content-Length framing by default:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! {"jsonrpc": "2.0", "id": 1, "method": "...", "params": {...}}
//! ```
//!
//! or one JSON message per line with `"framing": "newline"`. A Content-Length
//! decoder reads newline-delimited output until it first sees a header.

pub mod codec;
pub mod config;
pub mod correlator;
pub mod entry;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export main types
pub use codec::{FrameDecoder, FramingMode, encode_frame};
pub use config::{HttpConfig, ResolvedConfig, SseConfig, StdioConfig, resolve_config_object};
pub use correlator::{Correlator, Shutdown};
pub use entry::{ServerEntry, TransportKind};
pub use error::{McpError, Result};
pub use manager::SessionManager;
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    RequestId, ServerInfo, ToolContent, ToolDescriptor,
};
pub use session::{McpSession, ProbeOptions, ProtocolSession, SessionOptions, open_session};
pub use transport::{
    LogObserver, LogStream, RpcChannel, SseChannel, StdioChannel, StreamableHttpChannel,
};
