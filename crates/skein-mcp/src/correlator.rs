//! Request/response correlation for transports whose responses arrive
//! asynchronously (stdio and legacy SSE).
//!
//! Each request registers a [`Pending`] entry keyed by its id. The reader side
//! calls [`Correlator::resolve`] for every inbound response; the waiting side
//! awaits its entry with a timeout. Dropping a [`Pending`] removes its entry,
//! so a timed-out or abandoned request never resolves later.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcMessage, JsonRpcResponse};

/// Why a correlator stopped accepting requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shutdown {
    /// The session was closed by its owner.
    Closed,
    /// The carrier failed (process exit, stream error).
    Failed(String),
}

impl Shutdown {
    fn to_error(&self) -> McpError {
        match self {
            Self::Closed => McpError::SessionClosed,
            Self::Failed(reason) => McpError::transport(reason.clone()),
        }
    }
}

type Completion = oneshot::Sender<Result<JsonRpcResponse>>;

#[derive(Default)]
struct Table {
    pending: HashMap<u64, Completion>,
    shutdown: Option<Shutdown>,
}

/// Tracks outstanding requests for one session.
pub struct Correlator {
    next_id: AtomicU64,
    table: Mutex<Table>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Create a correlator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: Mutex::new(Table::default()),
        }
    }

    /// Allocate the next request id without registering it.
    ///
    /// Used by transports that get the response synchronously.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocate an id and register it as outstanding.
    ///
    /// Fails immediately once the correlator has shut down.
    pub fn begin(&self) -> Result<Pending<'_>> {
        let mut table = self.table.lock();
        if let Some(shutdown) = &table.shutdown {
            return Err(shutdown.to_error());
        }
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        table.pending.insert(id, tx);
        Ok(Pending {
            id,
            rx,
            correlator: self,
        })
    }

    /// Route an inbound message. Returns `true` if it completed a request.
    ///
    /// Anything that is not a response to an outstanding id is ignored.
    pub fn dispatch(&self, message: serde_json::Value) -> bool {
        match JsonRpcMessage::from_value(message) {
            Some(JsonRpcMessage::Response(response)) => self.resolve(response),
            Some(JsonRpcMessage::Notification(note)) => {
                tracing::trace!(method = %note.method, "ignoring server notification");
                false
            }
            Some(JsonRpcMessage::Request(request)) => {
                tracing::trace!(method = %request.method, "ignoring server request");
                false
            }
            None => false,
        }
    }

    /// Complete the request matching this response's id.
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id.as_u64() else {
            tracing::trace!(id = ?response.id, "ignoring response with non-numeric id");
            return false;
        };
        let completion = self.table.lock().pending.remove(&id);
        match completion {
            Some(tx) => {
                // The waiter may have just timed out; nothing to do then.
                let _ = tx.send(Ok(response));
                true
            }
            None => {
                tracing::trace!(id, "ignoring response for unknown request id");
                false
            }
        }
    }

    /// Reject every outstanding request and refuse new ones.
    ///
    /// Only the first shutdown reason is kept.
    pub fn shutdown(&self, reason: Shutdown) {
        let drained: Vec<Completion> = {
            let mut table = self.table.lock();
            if table.shutdown.is_none() {
                table.shutdown = Some(reason.clone());
            }
            table.pending.drain().map(|(_, tx)| tx).collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), reason = ?reason, "rejecting outstanding requests");
        }
        for tx in drained {
            let _ = tx.send(Err(reason.to_error()));
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.table.lock().shutdown.is_some()
    }

    /// The error outstanding requests were rejected with, once shut down.
    pub fn shutdown_error(&self) -> Option<McpError> {
        self.table.lock().shutdown.as_ref().map(Shutdown::to_error)
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }

    fn forget(&self, id: u64) {
        self.table.lock().pending.remove(&id);
    }
}

/// The instant `timeout` from now, clamped for very large timeouts.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

const FAR_FUTURE_SECS: u64 = 30 * 365 * 24 * 60 * 60;

/// An outstanding request registered with a [`Correlator`].
pub struct Pending<'a> {
    id: u64,
    rx: oneshot::Receiver<Result<JsonRpcResponse>>,
    correlator: &'a Correlator,
}

impl Pending<'_> {
    /// The id allocated for this request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the response, failing with [`McpError::Timeout`] after
    /// `timeout`.
    pub async fn wait(self, method: &str, timeout: Duration) -> Result<JsonRpcResponse> {
        self.wait_until(method, deadline_after(timeout), timeout).await
    }

    /// Wait for the response until `deadline`.
    ///
    /// `timeout` is the full request budget, reported in the error.
    pub async fn wait_until(
        mut self,
        method: &str,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::SessionClosed),
            Err(_) => {
                tracing::debug!(id = self.id, method, "request timed out");
                Err(McpError::timeout(method, timeout))
            }
        }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.correlator.forget(self.id);
    }
}
