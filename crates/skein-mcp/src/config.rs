//! Resolution of a server entry's freeform config JSON into a
//! transport-specific configuration.
//!
//! Users paste configs copied from all kinds of READMEs, so two common
//! wrappings are unwrapped before the transport fields are read:
//!
//! ```json
//! { "mcpServers": { "files": { "command": "npx", "args": ["-y", "server-files"] } } }
//! { "files": { "command": "npx", "args": ["-y", "server-files"] } }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use crate::codec::FramingMode;
use crate::entry::{ServerEntry, TransportKind};
use crate::error::{McpError, Result};
use crate::protocol::{MCP_PROTOCOL_VERSION, STREAMABLE_HTTP_PROTOCOL_VERSION};

/// Default request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Request timeout for stdio servers launched through a package runner,
/// which may download the package on first start.
pub const PACKAGE_RUNNER_TIMEOUT_MS: u64 = 180_000;

/// Keys whose presence marks an object as a transport config.
const TRANSPORT_KEYS: [&str; 4] = ["command", "url", "sseUrl", "messagesUrl"];

/// Key of the multi-server wrapping convention.
const MCP_SERVERS_KEY: &str = "mcpServers";

// ─────────────────────────────────────────────────────────────────────────────
// Object resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Parse `config_json` and unwrap it down to this server's config object.
pub fn resolve_config_object(entry: &ServerEntry) -> Result<Map<String, Value>> {
    let text = entry.config_json.trim();
    if text.is_empty() {
        return Ok(Map::new());
    }

    let parsed: Value = serde_json::from_str(text).map_err(|e| {
        McpError::invalid_config(&entry.id, format!("config is not valid JSON: {e}"))
    })?;
    let Value::Object(root) = parsed else {
        return Err(McpError::invalid_config(
            &entry.id,
            "config must be a JSON object",
        ));
    };

    if let Some(servers) = root.get(MCP_SERVERS_KEY) {
        return select_from_mcp_servers(entry, servers);
    }

    if !looks_like_transport(&root) && root.len() == 1 {
        if let Some((key, Value::Object(inner))) = root.iter().next() {
            if looks_like_transport(inner) {
                tracing::debug!(server = %entry.id, key = %key, "unwrapping config keyed by server name");
                return Ok(inner.clone());
            }
        }
    }

    Ok(root)
}

fn select_from_mcp_servers(entry: &ServerEntry, servers: &Value) -> Result<Map<String, Value>> {
    let Value::Object(servers) = servers else {
        return Err(McpError::invalid_config(
            &entry.id,
            "\"mcpServers\" must be an object mapping server names to configs",
        ));
    };

    let selected = servers
        .get_key_value(entry.id.as_str())
        .or_else(|| servers.get_key_value(entry.name.as_str()))
        .or_else(|| {
            if servers.len() == 1 {
                servers.iter().next()
            } else {
                None
            }
        });

    match selected {
        Some((_, Value::Object(config))) => Ok(config.clone()),
        Some((key, _)) => Err(McpError::invalid_config(
            &entry.id,
            format!("\"mcpServers\".\"{key}\" must be an object"),
        )),
        None if servers.is_empty() => Err(McpError::invalid_config(
            &entry.id,
            "\"mcpServers\" is empty",
        )),
        None => {
            let keys: Vec<&str> = servers.keys().map(String::as_str).collect();
            Err(McpError::invalid_config(
                &entry.id,
                format!(
                    "\"mcpServers\" has {} entries ({}) and none matches this server's id or name \
                     '{}'; paste only the single nested server object, or rename the server to \
                     match one of the keys",
                    keys.len(),
                    keys.join(", "),
                    entry.name
                ),
            ))
        }
    }
}

fn looks_like_transport(obj: &Map<String, Value>) -> bool {
    TRANSPORT_KEYS.iter().any(|key| obj.contains_key(*key))
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport configs
// ─────────────────────────────────────────────────────────────────────────────

/// Streamable HTTP configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Endpoint every message is POSTed to.
    pub url: Url,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Protocol version offered in `initialize`.
    pub protocol_version: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl HttpConfig {
    /// Read an HTTP config from a resolved config object.
    pub fn from_object(server: &str, obj: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            url: required_url(server, obj, "url", "streamable HTTP")?,
            headers: string_pairs(server, obj, "headers")?,
            protocol_version: optional_string(server, obj, "protocolVersion")?
                .unwrap_or_else(|| STREAMABLE_HTTP_PROTOCOL_VERSION.to_string()),
            request_timeout: timeout(server, obj, DEFAULT_REQUEST_TIMEOUT_MS)?,
        })
    }
}

/// Legacy HTTP + SSE configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SseConfig {
    /// Long-lived event stream.
    pub sse_url: Url,
    /// Endpoint requests are POSTed to; carries `sessionId` when configured.
    pub messages_url: Url,
    /// Session id the server expects on the messages URL.
    pub session_id: Option<String>,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Protocol version offered in `initialize`.
    pub protocol_version: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl SseConfig {
    /// Read an SSE config from a resolved config object.
    pub fn from_object(server: &str, obj: &Map<String, Value>) -> Result<Self> {
        let sse_url = required_url(server, obj, "sseUrl", "SSE")?;
        let mut messages_url = required_url(server, obj, "messagesUrl", "SSE")?;
        let session_id = optional_string(server, obj, "sessionId")?.filter(|s| !s.is_empty());

        if let Some(session_id) = &session_id {
            let already_set = messages_url.query_pairs().any(|(k, _)| k == "sessionId");
            if !already_set {
                messages_url
                    .query_pairs_mut()
                    .append_pair("sessionId", session_id);
            }
        }

        Ok(Self {
            sse_url,
            messages_url,
            session_id,
            headers: string_pairs(server, obj, "headers")?,
            protocol_version: optional_string(server, obj, "protocolVersion")?
                .unwrap_or_else(|| MCP_PROTOCOL_VERSION.to_string()),
            request_timeout: timeout(server, obj, DEFAULT_REQUEST_TIMEOUT_MS)?,
        })
    }
}

/// Local subprocess configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StdioConfig {
    /// Program to spawn.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory, if not inherited.
    pub cwd: Option<PathBuf>,
    /// Environment overrides on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Framing used on stdin/stdout.
    pub framing: FramingMode,
    /// Protocol version offered in `initialize`.
    pub protocol_version: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl StdioConfig {
    /// Read a stdio config from a resolved config object.
    pub fn from_object(server: &str, obj: &Map<String, Value>) -> Result<Self> {
        let command = optional_string(server, obj, "command")?
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                McpError::missing_field(
                    server,
                    "command",
                    "stdio servers need a \"command\" to launch, e.g. {\"command\": \"npx\", \"args\": [\"-y\", \"<package>\"]}",
                )
            })?;
        let args = string_list(server, obj, "args")?;

        let framing = match optional_string(server, obj, "framing")? {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| McpError::invalid_config(server, e))?,
            None => FramingMode::default(),
        };

        let default_timeout = if is_package_runner(&command, &args) {
            PACKAGE_RUNNER_TIMEOUT_MS
        } else {
            DEFAULT_REQUEST_TIMEOUT_MS
        };

        Ok(Self {
            cwd: optional_string(server, obj, "cwd")?
                .filter(|c| !c.trim().is_empty())
                .map(PathBuf::from),
            env: string_pairs(server, obj, "env")?,
            framing,
            protocol_version: optional_string(server, obj, "protocolVersion")?
                .unwrap_or_else(|| MCP_PROTOCOL_VERSION.to_string()),
            request_timeout: timeout(server, obj, default_timeout)?,
            command,
            args,
        })
    }
}

/// Whether `command` downloads and runs a package on demand.
fn is_package_runner(command: &str, args: &[String]) -> bool {
    let program = Path::new(command)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(command)
        .to_ascii_lowercase();

    match program.as_str() {
        "npx" | "bunx" | "pnpx" | "uvx" | "pipx" => true,
        "pnpm" | "yarn" | "npm" | "bun" => args
            .first()
            .is_some_and(|a| matches!(a.as_str(), "dlx" | "exec" | "x")),
        _ => false,
    }
}

/// A config resolved for one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedConfig {
    /// Streamable HTTP.
    Http(HttpConfig),
    /// Legacy SSE.
    Sse(SseConfig),
    /// Stdio subprocess.
    Stdio(StdioConfig),
}

impl ResolvedConfig {
    /// Resolve the entry's config JSON for its transport.
    pub fn from_entry(entry: &ServerEntry) -> Result<Self> {
        let obj = resolve_config_object(entry)?;
        let server = entry.id.as_str();
        Ok(match entry.transport {
            TransportKind::Http => Self::Http(HttpConfig::from_object(server, &obj)?),
            TransportKind::Sse => Self::Sse(SseConfig::from_object(server, &obj)?),
            TransportKind::Stdio => Self::Stdio(StdioConfig::from_object(server, &obj)?),
        })
    }

    /// The transport this config is for.
    pub fn transport(&self) -> TransportKind {
        match self {
            Self::Http(_) => TransportKind::Http,
            Self::Sse(_) => TransportKind::Sse,
            Self::Stdio(_) => TransportKind::Stdio,
        }
    }

    /// The request timeout in effect.
    pub fn request_timeout(&self) -> Duration {
        match self {
            Self::Http(c) => c.request_timeout,
            Self::Sse(c) => c.request_timeout,
            Self::Stdio(c) => c.request_timeout,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field helpers
// ─────────────────────────────────────────────────────────────────────────────

fn optional_string(server: &str, obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(McpError::invalid_config(
            server,
            format!("\"{key}\" must be a string, got {other}"),
        )),
    }
}

fn required_url(
    server: &str,
    obj: &Map<String, Value>,
    key: &'static str,
    transport: &str,
) -> Result<Url> {
    let raw = optional_string(server, obj, key)?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            McpError::missing_field(
                server,
                key,
                format!("{transport} servers need \"{key}\" set to an http:// or https:// URL"),
            )
        })?;

    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        Ok(url) => Err(McpError::missing_field(
            server,
            key,
            format!(
                "\"{key}\" must use http or https, got scheme '{}'",
                url.scheme()
            ),
        )),
        Err(e) => Err(McpError::missing_field(
            server,
            key,
            format!("\"{key}\" is not a valid URL ({e}): {raw}"),
        )),
    }
}

/// Render a scalar as the string a header or env var would carry.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_pairs(server: &str, obj: &Map<String, Value>, key: &str) -> Result<Vec<(String, String)>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => {
            let mut pairs = Vec::with_capacity(map.len());
            for (name, value) in map {
                if value.is_null() {
                    continue;
                }
                let value = scalar_to_string(value).ok_or_else(|| {
                    McpError::invalid_config(
                        server,
                        format!("\"{key}\".\"{name}\" must be a string"),
                    )
                })?;
                pairs.push((name.clone(), value));
            }
            Ok(pairs)
        }
        Some(other) => Err(McpError::invalid_config(
            server,
            format!("\"{key}\" must be an object of strings, got {other}"),
        )),
    }
}

fn string_list(server: &str, obj: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                scalar_to_string(item).ok_or_else(|| {
                    McpError::invalid_config(
                        server,
                        format!("\"{key}\" must contain only strings, got {item}"),
                    )
                })
            })
            .collect(),
        Some(other) => Err(McpError::invalid_config(
            server,
            format!("\"{key}\" must be an array of strings, got {other}"),
        )),
    }
}

fn timeout(server: &str, obj: &Map<String, Value>, default_ms: u64) -> Result<Duration> {
    let ms = match obj.get("requestTimeoutMs") {
        None | Some(Value::Null) => default_ms,
        Some(value) => value
            .as_u64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| f.is_finite() && *f >= 1.0)
                    .map(|f| f as u64)
            })
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                McpError::invalid_config(
                    server,
                    format!("\"requestTimeoutMs\" must be a positive number of milliseconds, got {value}"),
                )
            })?,
    };
    Ok(Duration::from_millis(ms))
}
