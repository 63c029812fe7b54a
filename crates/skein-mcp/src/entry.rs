//! Server entries as supplied by the host application.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire transport a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Streamable HTTP: one POST per message.
    #[serde(
        rename = "http",
        alias = "streamable-http",
        alias = "streamable_http",
        alias = "streamableHttp"
    )]
    Http,
    /// Legacy HTTP + server-sent events.
    #[serde(rename = "sse")]
    Sse,
    /// Local subprocess over stdin/stdout.
    #[serde(rename = "stdio")]
    Stdio,
}

impl TransportKind {
    /// Short name used in config and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Sse => "sse",
            Self::Stdio => "stdio",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured tool server.
///
/// Entries are immutable once read. A changed `updated_at` tells the session
/// cache that any live session for this entry is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    /// Stable identifier; the session cache key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Transport kind.
    pub transport: TransportKind,
    /// Bearer credential sent verbatim; empty for none.
    #[serde(default)]
    pub token: String,
    /// Freeform JSON configuration text.
    #[serde(default)]
    pub config_json: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Revision marker.
    pub updated_at: DateTime<Utc>,
}

impl ServerEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        transport: TransportKind,
        config_json: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            transport,
            token: String::new(),
            config_json: config_json.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Replace the config JSON.
    pub fn with_config_json(mut self, config_json: impl Into<String>) -> Self {
        self.config_json = config_json.into();
        self
    }

    /// Set the revision marker.
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// The bearer token, if one is set.
    pub fn bearer_token(&self) -> Option<&str> {
        let token = self.token.trim();
        (!token.is_empty()).then_some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let entry: ServerEntry = serde_json::from_str(
            r#"{
                "id": "srv-1",
                "name": "Files",
                "transport": "stdio",
                "token": "",
                "configJson": "{\"command\":\"npx\"}",
                "createdAt": "2025-01-01T00:00:00Z",
                "updatedAt": "2025-01-02T00:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(entry.id, "srv-1");
        assert_eq!(entry.transport, TransportKind::Stdio);
        assert_eq!(entry.config_json, r#"{"command":"npx"}"#);
        assert!(entry.updated_at > entry.created_at);
        assert_eq!(entry.bearer_token(), None);
    }

    #[test]
    fn test_transport_aliases() {
        for raw in ["\"http\"", "\"streamable-http\"", "\"streamableHttp\""] {
            let kind: TransportKind = serde_json::from_str(raw).unwrap();
            assert_eq!(kind, TransportKind::Http);
        }
        let kind: TransportKind = serde_json::from_str("\"sse\"").unwrap();
        assert_eq!(kind.to_string(), "sse");
        assert!(serde_json::from_str::<TransportKind>("\"websocket\"").is_err());
    }

    #[test]
    fn test_builder() {
        let entry = ServerEntry::new("a", "A", TransportKind::Http, "{}").with_token(" tok ");
        assert_eq!(entry.bearer_token(), Some("tok"));
        assert_eq!(entry.created_at, entry.updated_at);
    }
}
