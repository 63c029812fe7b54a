//! Legacy HTTP + SSE transport.
//!
//! Requests are POSTed to the messages endpoint; responses come back on a
//! long-lived `text/event-stream` GET that is opened on first use and shared
//! by every request of the session.

use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{RpcChannel, apply_headers};
use crate::config::SseConfig;
use crate::correlator::{Correlator, Shutdown, deadline_after};
use crate::entry::TransportKind;
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest};

/// Legacy SSE carrier.
pub struct SseChannel {
    server: String,
    client: reqwest::Client,
    config: SseConfig,
    bearer: Option<String>,
    correlator: Arc<Correlator>,
    stream: Mutex<Option<JoinHandle<()>>>,
}

impl SseChannel {
    /// Create a channel for `server`. The event stream is opened lazily.
    pub fn new(server: impl Into<String>, config: SseConfig, bearer: Option<String>) -> Result<Self> {
        // No client-wide timeout: it would cut the event stream.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {e}")))?;

        let server = server.into();
        tracing::info!(
            server = %server,
            sse_url = %config.sse_url,
            messages_url = %config.messages_url,
            "created SSE transport"
        );

        Ok(Self {
            server,
            client,
            config,
            bearer,
            correlator: Arc::new(Correlator::new()),
            stream: Mutex::new(None),
        })
    }

    /// Open the event stream unless it is already open.
    ///
    /// Waiting for the stream's response headers is bounded by `deadline`;
    /// the stream body itself has none.
    async fn ensure_stream(&self, method: &str, deadline: Instant) -> Result<()> {
        let mut slot = self.stream.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let request = self
            .client
            .get(self.config.sse_url.clone())
            .header(ACCEPT, "text/event-stream");
        let opening = apply_headers(request, &self.config.headers, self.bearer.as_deref()).send();
        let response = tokio::time::timeout_at(deadline, opening)
            .await
            .map_err(|_| {
                tracing::debug!(server = %self.server, method, "event stream did not open in time");
                McpError::timeout(method, self.config.request_timeout)
            })?
            .map_err(|e| McpError::transport(format!("failed to open event stream: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = tokio::time::timeout_at(deadline, response.text())
                .await
                .ok()
                .and_then(|text| text.ok())
                .unwrap_or_default();
            return Err(McpError::Http {
                status: status.as_u16(),
                body,
            });
        }
        if let Some(err) = self.correlator.shutdown_error() {
            return Err(err);
        }

        tracing::debug!(server = %self.server, "event stream opened");
        *slot = Some(tokio::spawn(read_events(
            self.server.clone(),
            response,
            Arc::clone(&self.correlator),
        )));
        Ok(())
    }

    async fn post(&self, method: &str, body: String) -> Result<()> {
        tracing::trace!(server = %self.server, json = %body, "sending MCP SSE message");

        let request = self
            .client
            .post(self.config.messages_url.clone())
            .timeout(self.config.request_timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let response = apply_headers(request, &self.config.headers, self.bearer.as_deref())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    McpError::timeout(method, self.config.request_timeout)
                } else {
                    McpError::transport(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Route the data of every event on the stream to the correlator until the
/// stream ends, then fail whatever is still outstanding.
async fn read_events(server: String, response: reqwest::Response, correlator: Arc<Correlator>) {
    let mut events = response.bytes_stream().eventsource();

    let reason = loop {
        match events.next().await {
            Some(Ok(event)) => {
                if event.data.trim().is_empty() {
                    continue;
                }
                tracing::trace!(server = %server, event = %event.event, "received SSE event");
                dispatch_data(&server, &correlator, &event.data);
            }
            Some(Err(e)) => break format!("event stream failed: {e}"),
            None => break "event stream ended".to_string(),
        }
    };

    tracing::warn!(server = %server, reason = %reason, "SSE transport lost");
    correlator.shutdown(Shutdown::Failed(reason));
}

fn dispatch_data(server: &str, correlator: &Correlator, data: &str) {
    match serde_json::from_str::<Value>(data) {
        Ok(message) => {
            tracing::trace!(server, json = %data, "received MCP SSE message");
            correlator.dispatch(message);
        }
        Err(e) => {
            tracing::trace!(server, error = %e, "skipping non-JSON event data");
        }
    }
}

#[async_trait]
impl RpcChannel for SseChannel {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let pending = self.correlator.begin()?;
        let deadline = deadline_after(self.config.request_timeout);
        self.ensure_stream(method, deadline).await?;
        let body = serde_json::to_string(&JsonRpcRequest::new(pending.id(), method, params))?;
        self.post(method, body).await?;
        pending
            .wait_until(method, deadline, self.config.request_timeout)
            .await?
            .into_result()
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.correlator.is_shut_down() {
            return Err(McpError::SessionClosed);
        }
        self.ensure_stream(method, deadline_after(self.config.request_timeout))
            .await?;
        let body = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.post(method, body).await
    }

    async fn close(&self) {
        self.correlator.shutdown(Shutdown::Closed);
        // A caller still opening the stream holds the slot; it discards the
        // stream once it sees the shutdown.
        if let Ok(mut slot) = self.stream.try_lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        tracing::info!(server = %self.server, "closed SSE transport");
    }

    fn is_closed(&self) -> bool {
        self.correlator.is_shut_down()
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Sse
    }
}

impl Drop for SseChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.stream.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;

    fn config() -> SseConfig {
        config_at("127.0.0.1:9")
    }

    fn config_at(host: &str) -> SseConfig {
        SseConfig {
            sse_url: Url::parse(&format!("http://{host}/sse")).unwrap(),
            messages_url: Url::parse(&format!("http://{host}/messages")).unwrap(),
            session_id: None,
            headers: Vec::new(),
            protocol_version: "2024-11-05".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_dispatch_data_routes_responses() {
        let correlator = Correlator::new();
        let pending = correlator.begin().unwrap();
        dispatch_data("srv", &correlator, "not json");
        assert_eq!(correlator.pending_count(), 1);
        dispatch_data(
            "srv",
            &correlator,
            &format!(r#"{{"jsonrpc":"2.0","id":{},"result":{{}}}}"#, pending.id()),
        );
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_stream_is_transport_error() {
        let channel = SseChannel::new("srv", config(), None).unwrap();
        let err = channel.request("initialize", None).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err:?}");
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn test_close_refuses_later_requests() {
        let channel = SseChannel::new("srv", config(), None).unwrap();
        channel.close().await;
        assert!(channel.is_closed());
        assert_eq!(channel.transport(), TransportKind::Sse);
        let err = channel.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::SessionClosed));
    }

    #[tokio::test]
    async fn test_silent_stream_open_times_out() {
        // Accepts connections and never answers them.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = SseConfig {
            request_timeout: Duration::from_millis(300),
            ..config_at(&addr.to_string())
        };
        let channel = SseChannel::new("srv", config, None).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(3), channel.request("tools/list", None))
            .await
            .expect("opening the stream should give up at the request timeout");
        match outcome {
            Err(McpError::Timeout { method, timeout_ms }) => {
                assert_eq!(method, "tools/list");
                assert_eq!(timeout_ms, 300);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(channel.correlator.pending_count(), 0);
    }
}
