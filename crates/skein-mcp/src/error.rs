//! Error types for MCP operations.

use std::time::Duration;

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The server entry's config JSON could not be parsed or is ambiguous.
    #[error("invalid MCP config for server '{server}': {message}")]
    InvalidConfig {
        /// Server id the config belongs to.
        server: String,
        /// What was wrong with it.
        message: String,
    },

    /// A transport-specific required field is missing or unusable.
    #[error("MCP server '{server}' is missing required field '{field}': {hint}")]
    MissingField {
        /// Server id the config belongs to.
        server: String,
        /// Name of the missing field.
        field: &'static str,
        /// How to fix it.
        hint: String,
    },

    /// Failed to spawn the MCP server process.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// Failed to communicate with the MCP server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered an HTTP request with a non-2xx status.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// The server sent a payload that does not follow the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// The session was closed while the request was outstanding.
    #[error("MCP session closed")]
    SessionClosed,

    /// Timeout waiting for response.
    #[error("timeout waiting for response to '{method}' after {timeout_ms}ms")]
    Timeout {
        /// Method of the request that timed out.
        method: String,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },
}

impl McpError {
    /// Create an invalid config error.
    pub fn invalid_config(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a missing field error.
    pub fn missing_field(
        server: impl Into<String>,
        field: &'static str,
        hint: impl Into<String>,
    ) -> Self {
        Self::MissingField {
            server: server.into(),
            field,
            hint: hint.into(),
        }
    }

    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a timeout error for `method` after `timeout`.
    pub fn timeout(method: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            method: method.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Whether this error came from the carrier rather than the remote server.
    ///
    /// Transport errors fail the in-flight request; the next call against the
    /// same entry may get a fresh session.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed(_)
                | Self::Transport(_)
                | Self::Http { .. }
                | Self::SessionClosed
        )
    }

    /// Whether this error is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error was caused by the server entry's configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::MissingField { .. })
    }
}
