//! JSON-RPC 2.0 protocol types for MCP.
//!
//! Outgoing requests always carry numeric ids. Incoming messages are
//! classified leniently: servers in the wild omit `jsonrpc`, echo ids as
//! strings, or interleave their own requests and notifications with
//! responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::McpError;

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version offered over stdio and legacy SSE.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP protocol version offered over streamable HTTP.
pub const STREAMABLE_HTTP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Method names used by the client.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON-RPC Base Types
// ─────────────────────────────────────────────────────────────────────────────

/// A JSON-RPC request id, numeric or string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id (the only kind this client emits).
    Number(u64),
    /// String id.
    String(String),
}

impl RequestId {
    /// The numeric value of this id, if it has one.
    ///
    /// String ids that hold a decimal number are accepted, since some servers
    /// echo numeric ids back as strings.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0").
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Request ID for correlating responses.
    pub id: RequestId,
    /// Method name to call.
    pub method: String,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Number(id),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0").
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Method parameters (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Request ID this response is for.
    pub id: RequestId,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Get the result, or turn the error object into an [`McpError`].
    pub fn into_result(self) -> Result<Value, McpError> {
        match self.error {
            Some(error) => Err(McpError::server_error(error.code, error.message, error.data)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC error codes
impl JsonRpcError {
    /// Parse error - Invalid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Invalid Request - Not a valid Request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Any message a server may send.
#[derive(Debug, Clone)]
pub enum JsonRpcMessage {
    /// Server-initiated request.
    Request(JsonRpcRequest),
    /// Server-initiated notification.
    Notification(JsonRpcNotification),
    /// Response to one of our requests.
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Classify a decoded JSON value.
    ///
    /// Returns `None` for values that are not a recognizable envelope,
    /// including responses with a `null` id.
    pub fn from_value(value: Value) -> Option<Self> {
        let obj = value.as_object()?;
        let has_id = obj.get("id").is_some_and(|id| !id.is_null());

        if obj.contains_key("method") {
            return if has_id {
                serde_json::from_value(value).ok().map(Self::Request)
            } else {
                serde_json::from_value(value).ok().map(Self::Notification)
            };
        }

        if has_id && (obj.contains_key("result") || obj.contains_key("error")) {
            return serde_json::from_value(value).ok().map(Self::Response);
        }

        None
    }

    /// The response, if this message is one.
    pub fn into_response(self) -> Option<JsonRpcResponse> {
        match self {
            Self::Response(response) => Some(response),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MCP Protocol Types
// ─────────────────────────────────────────────────────────────────────────────

/// Client info sent during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "skein".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version.
    pub protocol_version: String,
    /// Client capabilities (always empty).
    pub capabilities: Map<String, Value>,
    /// Client info.
    pub client_info: ClientInfo,
}

impl InitializeParams {
    /// Initialize parameters offering the given protocol version.
    pub fn new(protocol_version: impl Into<String>) -> Self {
        Self {
            protocol_version: protocol_version.into(),
            capabilities: Map::new(),
            client_info: ClientInfo::default(),
        }
    }
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self::new(MCP_PROTOCOL_VERSION)
    }
}

/// Server info returned during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    #[serde(default)]
    pub name: String,
    /// Server version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Result of the initialize request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version chosen by the server.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Server capabilities, passed through uninterpreted.
    #[serde(default)]
    pub capabilities: Value,
    /// Server info.
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

/// A tool definition from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name (unique identifier, trimmed, never empty).
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

impl ToolDescriptor {
    /// Build a descriptor from one entry of a `tools/list` result.
    ///
    /// Returns `None` when the entry has no usable name.
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            input_schema: value.get("inputSchema").filter(|v| !v.is_null()).cloned(),
        })
    }
}

/// Result of the tools/list request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// List of available tools.
    pub tools: Vec<ToolDescriptor>,
}

impl ListToolsResult {
    /// Parse a `tools/list` result, dropping descriptors without a name.
    pub fn from_value(value: &Value) -> Result<Self, McpError> {
        let entries = match value.get("tools") {
            Some(Value::Array(entries)) => entries.as_slice(),
            Some(Value::Null) | None => &[],
            Some(other) => {
                return Err(McpError::protocol(format!(
                    "tools/list returned a non-array 'tools' field: {other}"
                )));
            }
        };

        let mut tools = Vec::with_capacity(entries.len());
        for entry in entries {
            match ToolDescriptor::from_value(entry) {
                Some(tool) => tools.push(tool),
                None => tracing::warn!(entry = %entry, "dropping tool descriptor without a name"),
            }
        }
        Ok(Self { tools })
    }
}

/// Parameters for the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments to pass to the tool.
    pub arguments: Value,
}

/// Content item in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Image content (base64 encoded).
    Image {
        /// Base64-encoded image data.
        data: String,
        /// MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource.
    Resource {
        /// The resource payload.
        resource: Value,
    },
    /// Any part type this client does not model.
    #[serde(other)]
    Unknown,
}

/// Result of the tools/call request.
///
/// The raw result is kept as-is so callers can forward it untouched; the
/// accessors only interpret the commonly used fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallToolResult {
    raw: Value,
}

impl CallToolResult {
    /// Wrap a raw `tools/call` result.
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// The typed content parts, skipping parts that fail to parse.
    pub fn content(&self) -> Vec<ToolContent> {
        self.raw
            .get("content")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| serde_json::from_value(part.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `structuredContent` value, if present.
    pub fn structured_content(&self) -> Option<&Value> {
        self.raw.get("structuredContent").filter(|v| !v.is_null())
    }

    /// Get the text content from the result.
    pub fn text(&self) -> Option<String> {
        let texts: Vec<String> = self
            .content()
            .into_iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text),
                _ => None,
            })
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }

    /// Check if the tool call was an error.
    pub fn is_error(&self) -> bool {
        self.raw
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Borrow the raw result.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Take the raw result.
    pub fn into_value(self) -> Value {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", Some(json!({"test": true})));
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcNotification::new(methods::INITIALIZED, None);
        let value = serde_json::to_value(&note).unwrap();
        assert!(value.get("id").is_none());
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_classify_messages() {
        let response = JsonRpcMessage::from_value(json!({"jsonrpc":"2.0","id":3,"result":{}}));
        assert!(matches!(response, Some(JsonRpcMessage::Response(_))));

        let note = JsonRpcMessage::from_value(json!({"jsonrpc":"2.0","method":"notifications/progress"}));
        assert!(matches!(note, Some(JsonRpcMessage::Notification(_))));

        let request = JsonRpcMessage::from_value(json!({"jsonrpc":"2.0","id":"a","method":"ping"}));
        assert!(matches!(request, Some(JsonRpcMessage::Request(_))));

        assert!(JsonRpcMessage::from_value(json!({"id":null,"error":{"code":1,"message":"x"}})).is_none());
        assert!(JsonRpcMessage::from_value(json!([1, 2])).is_none());
        assert!(JsonRpcMessage::from_value(json!({"hello":"world"})).is_none());
    }

    #[test]
    fn test_string_ids_are_numeric_when_possible() {
        let response = JsonRpcMessage::from_value(json!({"id":"7","result":null}))
            .and_then(JsonRpcMessage::into_response)
            .unwrap();
        assert_eq!(response.id.as_u64(), Some(7));
        assert_eq!(RequestId::String("abc".into()).as_u64(), None);
    }

    #[test]
    fn test_error_response_into_result() {
        let json =
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        assert!(resp.is_error());
        match resp.into_result() {
            Err(McpError::ServerError { code, message, .. }) => {
                assert_eq!(code, JsonRpcError::INVALID_REQUEST);
                assert_eq!(message, "Invalid Request");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_initialize_params() {
        let params = InitializeParams::new("2025-03-26");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["protocolVersion"], "2025-03-26");
        assert_eq!(value["capabilities"], json!({}));
        assert_eq!(value["clientInfo"]["name"], "skein");
    }

    #[test]
    fn test_list_tools_drops_blank_names() {
        let result = ListToolsResult::from_value(&json!({
            "tools": [
                {"name": "  read_file ", "description": "Read a file", "inputSchema": {"type": "object"}},
                {"name": "   "},
                {"description": "no name"},
                {"name": "bare"}
            ]
        }))
        .unwrap();
        let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["read_file", "bare"]);
        assert!(result.tools[0].input_schema.is_some());
        assert!(result.tools[1].description.is_none());
    }

    #[test]
    fn test_list_tools_missing_array_is_empty() {
        assert!(ListToolsResult::from_value(&json!({})).unwrap().tools.is_empty());
        assert!(ListToolsResult::from_value(&json!({"tools": "nope"})).is_err());
    }

    #[test]
    fn test_list_tools_serializes_as_tools_object() {
        let value = serde_json::to_value(ListToolsResult::default()).unwrap();
        assert_eq!(value, json!({"tools": []}));
    }

    #[test]
    fn test_call_tool_result_accessors() {
        let result = CallToolResult::new(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "audio", "data": "..."},
                {"type": "text", "text": "second"}
            ],
            "structuredContent": {"rows": 2},
            "isError": false
        }));
        assert!(!result.is_error());
        assert_eq!(result.text(), Some("first\nsecond".to_string()));
        assert_eq!(result.content().len(), 3);
        assert!(matches!(result.content()[1], ToolContent::Unknown));
        assert_eq!(result.structured_content(), Some(&json!({"rows": 2})));
    }

    #[test]
    fn test_call_tool_result_passthrough() {
        let raw = json!({"anything": [1, 2, 3]});
        let result = CallToolResult::new(raw.clone());
        assert_eq!(result.text(), None);
        assert_eq!(serde_json::to_value(&result).unwrap(), raw);
        assert_eq!(result.into_value(), raw);
    }
}
