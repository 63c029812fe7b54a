//! Initialized sessions over any transport.
//!
//! A session runs the `initialize` handshake once, then serves `tools/list`
//! and `tools/call`. The protocol logic lives in [`ProtocolSession`], written
//! once against [`RpcChannel`]; [`open_session`] picks the channel from the
//! server entry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::codec::FramingMode;
use crate::config::ResolvedConfig;
use crate::entry::{ServerEntry, TransportKind};
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, ListToolsResult, methods,
};
use crate::transport::{LogObserver, RpcChannel, SseChannel, StdioChannel, StreamableHttpChannel};

/// Upper bound on `tools/list` pages followed for one listing.
const MAX_TOOL_PAGES: usize = 64;

/// A live connection to one tool server.
#[async_trait]
pub trait McpSession: Send + Sync {
    /// Run the handshake unless it already completed.
    ///
    /// Concurrent callers share one handshake. A failed handshake is retried
    /// by the next call.
    async fn ensure_initialized(&self) -> Result<()>;

    /// List the server's tools.
    async fn list_tools(&self) -> Result<ListToolsResult>;

    /// Call a tool by name.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult>;

    /// Close the session, rejecting anything outstanding.
    async fn close(&self);

    /// Whether the session can no longer serve requests.
    fn is_closed(&self) -> bool;

    /// Transport the session runs over.
    fn transport(&self) -> TransportKind;
}

/// Protocol state machine over a channel.
pub struct ProtocolSession<C> {
    server: String,
    protocol_version: String,
    channel: C,
    initialized: OnceCell<InitializeResult>,
}

impl<C: RpcChannel> ProtocolSession<C> {
    /// Wrap a channel. Nothing is sent until the first call.
    pub fn new(server: impl Into<String>, protocol_version: impl Into<String>, channel: C) -> Self {
        Self {
            server: server.into(),
            protocol_version: protocol_version.into(),
            channel,
            initialized: OnceCell::new(),
        }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The server's `initialize` result, once the handshake has completed.
    pub fn initialize_result(&self) -> Option<&InitializeResult> {
        self.initialized.get()
    }

    async fn handshake(&self) -> Result<InitializeResult> {
        tracing::info!(
            server = %self.server,
            transport = %self.channel.transport(),
            protocol_version = %self.protocol_version,
            "initializing MCP session"
        );

        let params = serde_json::to_value(InitializeParams::new(self.protocol_version.clone()))?;
        let result = self
            .channel
            .request(methods::INITIALIZE, Some(params))
            .await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("invalid initialize result: {e}")))?;

        self.channel.notify(methods::INITIALIZED, None).await?;

        tracing::info!(
            server = %self.server,
            server_name = init.server_info.as_ref().map(|i| i.name.as_str()).unwrap_or(""),
            protocol_version = init.protocol_version.as_deref().unwrap_or(""),
            "MCP session initialized"
        );
        Ok(init)
    }
}

#[async_trait]
impl<C: RpcChannel> McpSession for ProtocolSession<C> {
    async fn ensure_initialized(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| self.handshake())
            .await
            .map(|_| ())
    }

    async fn list_tools(&self) -> Result<ListToolsResult> {
        self.ensure_initialized().await?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.channel.request(methods::TOOLS_LIST, params).await?;
            tools.extend(ListToolsResult::from_value(&result)?.tools);

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        if cursor.is_some() {
            tracing::warn!(server = %self.server, pages = MAX_TOOL_PAGES, "stopped following tools/list pages");
        }

        tracing::debug!(server = %self.server, count = tools.len(), "listed MCP tools");
        Ok(ListToolsResult { tools })
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.ensure_initialized().await?;

        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;

        tracing::debug!(server = %self.server, tool = name, "calling MCP tool");
        let result = self.channel.request(methods::TOOLS_CALL, Some(params)).await?;
        Ok(CallToolResult::new(result))
    }

    async fn close(&self) {
        self.channel.close().await;
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    fn transport(&self) -> TransportKind {
        self.channel.transport()
    }
}

/// Options for opening a session.
#[derive(Clone, Default)]
pub struct SessionOptions {
    /// Receives raw stdout/stderr text of stdio servers.
    pub log_observer: Option<LogObserver>,
    /// Use newline framing for stdio regardless of the configured framing.
    pub force_newline_framing: bool,
}

/// Options for a one-shot diagnostic probe.
pub type ProbeOptions = SessionOptions;

impl SessionOptions {
    /// Attach a log observer.
    pub fn with_log_observer(mut self, observer: LogObserver) -> Self {
        self.log_observer = Some(observer);
        self
    }

    /// Force newline framing for stdio servers.
    pub fn with_newline_framing(mut self, force: bool) -> Self {
        self.force_newline_framing = force;
        self
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("log_observer", &self.log_observer.is_some())
            .field("force_newline_framing", &self.force_newline_framing)
            .finish()
    }
}

/// Resolve the entry's config and open an uninitialized session for it.
///
/// Stdio servers are spawned here; HTTP transports connect on first use.
pub fn open_session(entry: &ServerEntry, options: &SessionOptions) -> Result<Arc<dyn McpSession>> {
    let config = ResolvedConfig::from_entry(entry)?;
    let bearer = entry.bearer_token().map(str::to_string);
    let server = entry.id.as_str();

    let session: Arc<dyn McpSession> = match config {
        ResolvedConfig::Http(config) => {
            let version = config.protocol_version.clone();
            let channel = StreamableHttpChannel::new(server, config, bearer)?;
            Arc::new(ProtocolSession::new(server, version, channel))
        }
        ResolvedConfig::Sse(config) => {
            let version = config.protocol_version.clone();
            let channel = SseChannel::new(server, config, bearer)?;
            Arc::new(ProtocolSession::new(server, version, channel))
        }
        ResolvedConfig::Stdio(mut config) => {
            if options.force_newline_framing {
                config.framing = FramingMode::Newline;
            }
            let version = config.protocol_version.clone();
            let channel = StdioChannel::spawn(server, &config, options.log_observer.clone())?;
            Arc::new(ProtocolSession::new(server, version, channel))
        }
    };
    Ok(session)
}
