//! Streamable HTTP transport: every message is a POST to one endpoint.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::watch;

use super::{RpcChannel, apply_headers};
use crate::config::HttpConfig;
use crate::entry::TransportKind;
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Header carrying the server-assigned session id.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// Header carrying the negotiated protocol version.
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Streamable HTTP carrier.
pub struct StreamableHttpChannel {
    server: String,
    client: reqwest::Client,
    config: HttpConfig,
    bearer: Option<String>,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    /// Flipped to `true` once by `close()`; in-flight exchanges watch it.
    closed: watch::Sender<bool>,
}

impl StreamableHttpChannel {
    /// Create a channel for `server`. No connection is made until the first
    /// message.
    pub fn new(server: impl Into<String>, config: HttpConfig, bearer: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(5)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {e}")))?;

        let server = server.into();
        tracing::info!(
            server = %server,
            url = %config.url,
            timeout_ms = u64::try_from(config.request_timeout.as_millis()).unwrap_or(u64::MAX),
            "created streamable HTTP transport"
        );

        Ok(Self {
            server,
            client,
            config,
            bearer,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: watch::Sender::new(false),
        })
    }

    /// The session id the server assigned, once it has sent one.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn builder(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, self.config.url.clone())
            .header(PROTOCOL_VERSION_HEADER, &self.config.protocol_version);
        request = apply_headers(request, &self.config.headers, self.bearer.as_deref());
        if let Some(session_id) = self.session_id() {
            request = request.header(SESSION_ID_HEADER, session_id);
        }
        request
    }

    async fn post(&self, method: &str, body: String) -> Result<reqwest::Response> {
        if self.is_closed() {
            return Err(McpError::SessionClosed);
        }

        tracing::trace!(server = %self.server, json = %body, "sending MCP HTTP message");

        let response = self
            .builder(reqwest::Method::POST)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_VALUE)
            .body(body)
            .send()
            .await
            .map_err(|e| self.send_error(method, e))?;

        self.capture_session_id(&response);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(server = %self.server, method, status = status.as_u16(), "HTTP error response");
            return Err(McpError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn send_error(&self, method: &str, error: reqwest::Error) -> McpError {
        if error.is_timeout() {
            McpError::timeout(method, self.config.request_timeout)
        } else {
            McpError::transport(format!("HTTP request failed: {error}"))
        }
    }

    fn capture_session_id(&self, response: &reqwest::Response) {
        let Some(value) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return;
        };

        let mut slot = self.session_id.lock();
        if slot.is_none() {
            tracing::debug!(server = %self.server, session_id = value, "server assigned session id");
            *slot = Some(value.to_string());
        }
    }

    async fn read_response(
        &self,
        response: reqwest::Response,
        method: &str,
        id: u64,
    ) -> Result<JsonRpcResponse> {
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with("text/event-stream"));

        if is_event_stream {
            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| match e {
                    EventStreamError::Transport(e) => self.read_error(method, e),
                    other => McpError::protocol(format!("malformed event stream: {other}")),
                })?;
                if event.data.trim().is_empty() {
                    continue;
                }
                if let Some(response) = parse_matching(&event.data, id) {
                    return Ok(response);
                }
            }
            return Err(McpError::protocol(format!(
                "event stream ended without a response to '{method}' (id {id})"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.read_error(method, e))?;
        tracing::trace!(server = %self.server, json = %text, "received MCP HTTP response");

        if text.trim().is_empty() {
            return Err(McpError::protocol(format!(
                "empty response body for '{method}'"
            )));
        }
        let value: Value = serde_json::from_str(&text)?;
        matching_response(value, id).ok_or_else(|| {
            McpError::protocol(format!(
                "response body for '{method}' does not contain a response with id {id}"
            ))
        })
    }

    /// Run one exchange, abandoning it with [`McpError::SessionClosed`] as
    /// soon as the channel is closed.
    async fn until_closed<T>(&self, exchange: impl Future<Output = Result<T>>) -> Result<T> {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => Err(McpError::SessionClosed),
            result = exchange => result,
        }
    }

    fn read_error(&self, method: &str, error: reqwest::Error) -> McpError {
        if error.is_timeout() {
            self.send_error(method, error)
        } else {
            McpError::transport(format!("failed to read response body: {error}"))
        }
    }
}

fn parse_matching(data: &str, id: u64) -> Option<JsonRpcResponse> {
    match serde_json::from_str::<Value>(data) {
        Ok(value) => matching_response(value, id),
        Err(e) => {
            tracing::trace!(error = %e, "skipping non-JSON event data");
            None
        }
    }
}

/// Find the response for `id` in a single message or a batch.
fn matching_response(value: Value, id: u64) -> Option<JsonRpcResponse> {
    match value {
        Value::Array(items) => items.into_iter().find_map(|item| matching_response(item, id)),
        other => JsonRpcMessage::from_value(other)
            .and_then(JsonRpcMessage::into_response)
            .filter(|response| response.id.as_u64() == Some(id)),
    }
}

#[async_trait]
impl RpcChannel for StreamableHttpChannel {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        self.until_closed(async {
            let response = self.post(method, body).await?;
            self.read_response(response, method, id).await
        })
        .await?
        .into_result()
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.until_closed(async {
            self.post(method, body).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        let Some(session_id) = self.session_id() else {
            tracing::info!(server = %self.server, "closed streamable HTTP transport");
            return;
        };

        match self.builder(reqwest::Method::DELETE).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    server = %self.server,
                    session_id = %session_id,
                    status = response.status().as_u16(),
                    "server rejected session DELETE"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(server = %self.server, error = %e, "failed to send session DELETE");
            }
        }
        tracing::info!(server = %self.server, "closed streamable HTTP transport");
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Http
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use url::Url;

    fn config() -> HttpConfig {
        HttpConfig {
            url: Url::parse("http://127.0.0.1:9/mcp").unwrap(),
            headers: vec![("X-Api-Key".to_string(), "k".to_string())],
            protocol_version: "2025-03-26".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_matching_response_single_and_batch() {
        let single = json!({"jsonrpc": "2.0", "id": 3, "result": {"ok": true}});
        assert!(matching_response(single.clone(), 3).is_some());
        assert!(matching_response(single, 4).is_none());

        let batch = json!([
            {"jsonrpc": "2.0", "method": "notifications/progress"},
            {"jsonrpc": "2.0", "id": "7", "result": {}}
        ]);
        assert_eq!(matching_response(batch, 7).unwrap().id.as_u64(), Some(7));
    }

    #[test]
    fn test_parse_matching_skips_garbage() {
        assert!(parse_matching("not json", 1).is_none());
        assert!(parse_matching(r#"{"id":1,"result":null}"#, 1).is_some());
    }

    #[tokio::test]
    async fn test_new_channel_is_open_without_session() {
        let channel = StreamableHttpChannel::new("srv", config(), None).unwrap();
        assert!(!channel.is_closed());
        assert_eq!(channel.session_id(), None);
        assert_eq!(channel.transport(), TransportKind::Http);
    }

    #[tokio::test]
    async fn test_closed_channel_refuses_requests() {
        let channel = StreamableHttpChannel::new("srv", config(), None).unwrap();
        channel.close().await;
        assert!(channel.is_closed());
        let err = channel.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::SessionClosed));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let channel = StreamableHttpChannel::new("srv", config(), Some("tok".into())).unwrap();
        let err = channel.request("initialize", None).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err:?}");
        // HTTP failures do not close the channel.
        assert!(!channel.is_closed());
    }
}
