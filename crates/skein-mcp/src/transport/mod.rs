//! Transport layer for MCP communication.
//!
//! Three carriers move JSON-RPC envelopes between the client and a server:
//!
//! - [`StreamableHttpChannel`]: one POST per message, the response in the
//!   POST's body.
//! - [`SseChannel`]: POSTs to a messages endpoint, responses on a long-lived
//!   event stream.
//! - [`StdioChannel`]: framed JSON over a child process's stdin/stdout.
//!
//! All three implement [`RpcChannel`], which is all the session layer needs.

use async_trait::async_trait;
use serde_json::Value;

use crate::entry::TransportKind;
use crate::error::Result;

pub mod http;
pub mod sse;
pub mod stdio;

pub use http::StreamableHttpChannel;
pub use sse::SseChannel;
pub use stdio::{LogObserver, LogStream, StdioChannel};

/// A request/notification carrier for one server.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Send a request and wait for its result.
    ///
    /// A JSON-RPC error object in the response becomes
    /// [`McpError::ServerError`](crate::McpError::ServerError).
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value>;

    /// Send a notification. No response is awaited.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Release the carrier and reject anything outstanding.
    async fn close(&self);

    /// Whether the carrier is gone (closed, exited, or stream lost).
    fn is_closed(&self) -> bool;

    /// Which transport this is.
    fn transport(&self) -> TransportKind;
}

/// Apply configured headers and the bearer token to a request.
pub(crate) fn apply_headers(
    mut request: reqwest::RequestBuilder,
    headers: &[(String, String)],
    bearer: Option<&str>,
) -> reqwest::RequestBuilder {
    for (key, value) in headers {
        request = request.header(key, value);
    }
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    request
}
