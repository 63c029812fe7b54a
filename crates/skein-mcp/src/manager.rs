//! Session cache and lifecycle management.
//!
//! The [`SessionManager`] keeps one live session per server entry, keyed by
//! the entry id. A cached session is reused while the entry's `updated_at`
//! is unchanged and the session is still open; otherwise it is closed and
//! replaced on the next call.
//!
//! # Example
//!
//! ```rust,ignore
//! use skein_mcp::{ServerEntry, SessionManager, TransportKind};
//!
//! let manager = SessionManager::new();
//! let entry = ServerEntry::new(
//!     "files",
//!     "Files",
//!     TransportKind::Stdio,
//!     r#"{"command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]}"#,
//! );
//!
//! let tools = manager.list_tools(&entry).await?;
//! let result = manager
//!     .call_tool(&entry, "read_file", json!({"path": "/tmp/notes.txt"}))
//!     .await?;
//! println!("{}", result.text().unwrap_or_default());
//!
//! manager.close_all().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::entry::ServerEntry;
use crate::error::Result;
use crate::protocol::{CallToolResult, ListToolsResult};
use crate::session::{McpSession, ProbeOptions, SessionOptions, open_session};

struct CachedSession {
    updated_at: DateTime<Utc>,
    session: Arc<dyn McpSession>,
}

/// Cache of live sessions, one per server entry.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, CachedSession>>,
    options: SessionOptions,
}

impl SessionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager whose cached sessions are opened with `options`.
    pub fn with_options(options: SessionOptions) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// Get the live session for `entry`, opening a fresh one if there is no
    /// usable cached session.
    pub async fn session_for(&self, entry: &ServerEntry) -> Result<Arc<dyn McpSession>> {
        let mut sessions = self.sessions.lock().await;

        if let Some(cached) = sessions.get(&entry.id) {
            if cached.updated_at == entry.updated_at && !cached.session.is_closed() {
                return Ok(Arc::clone(&cached.session));
            }
        }

        let stale = sessions.remove(&entry.id);
        if let Some(stale) = &stale {
            tracing::info!(
                server = %entry.id,
                revision_changed = stale.updated_at != entry.updated_at,
                closed = stale.session.is_closed(),
                "replacing cached MCP session"
            );
        }

        let opened = open_session(entry, &self.options);
        if let Ok(session) = &opened {
            tracing::debug!(server = %entry.id, transport = %session.transport(), "caching MCP session");
            sessions.insert(
                entry.id.clone(),
                CachedSession {
                    updated_at: entry.updated_at,
                    session: Arc::clone(session),
                },
            );
        }
        drop(sessions);

        if let Some(stale) = stale {
            stale.session.close().await;
        }
        opened
    }

    /// List the tools of `entry`'s server.
    pub async fn list_tools(&self, entry: &ServerEntry) -> Result<ListToolsResult> {
        self.session_for(entry).await?.list_tools().await
    }

    /// Call a tool on `entry`'s server.
    pub async fn call_tool(
        &self,
        entry: &ServerEntry,
        name: &str,
        arguments: Value,
    ) -> Result<CallToolResult> {
        self.session_for(entry).await?.call_tool(name, arguments).await
    }

    /// List tools through a fresh, uncached session that is closed afterward.
    ///
    /// Used to check a configuration before saving it.
    pub async fn test_list_tools(
        &self,
        entry: &ServerEntry,
        options: ProbeOptions,
    ) -> Result<ListToolsResult> {
        tracing::debug!(server = %entry.id, newline = options.force_newline_framing, "probing MCP server");
        let session = open_session(entry, &options)?;
        let result = session.list_tools().await;
        session.close().await;
        result
    }

    /// Close and forget the session for one server.
    ///
    /// Returns `true` if a session was cached.
    pub async fn close_server(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id);
        match removed {
            Some(cached) => {
                cached.session.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every cached session.
    pub async fn close_all(&self) {
        let drained: Vec<(String, CachedSession)> = self.sessions.lock().await.drain().collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "closing all MCP sessions");
        }
        for (_, cached) in drained {
            cached.session.close().await;
        }
    }

    /// Number of cached sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session is cached.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
