//! MCP probe data model and JSON-RPC 2.0 envelope builders
//!
//! Server definitions are produced upstream by whatever reads the host's MCP
//! configuration; this module only describes their shape. Result records are
//! created once per probe call and never mutated afterwards. Struct fields
//! are `camelCase` on the wire via `#[serde(rename_all = "camelCase")]`, and
//! `Option<>` fields are omitted from JSON when `None`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// Protocol revision announced in every `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Lifecycle: client sends `initialize` to open a session.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Lifecycle: client sends `notifications/initialized` after the server ACKs.
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
/// Request the list of available tools.
pub const METHOD_TOOLS_LIST: &str = "tools/list";

/// Fixed request id for `initialize`.
pub const INITIALIZE_REQUEST_ID: u64 = 1;
/// Fixed request id for `tools/list`.
pub const TOOLS_LIST_REQUEST_ID: u64 = 2;

/// Session header used by the streamable HTTP transport.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

// ---------------------------------------------------------------------------
// Server definitions
// ---------------------------------------------------------------------------

/// Transport variant of a configured MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Spawned local process speaking newline-delimited JSON-RPC.
    Stdio,
    /// Request/response HTTP endpoint with optional session continuity.
    #[serde(alias = "streamable-http", alias = "streamableHttp")]
    Http,
    /// Legacy SSE transport with an endpoint-discovery handshake.
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::Sse => "sse",
        };
        write!(f, "{}", s)
    }
}

/// One externally configured MCP server.
///
/// Exactly one of `command` (stdio) or `url` (http/sse) is expected to be
/// populated. A definition missing the field its transport needs is reported
/// as a configuration error without any process or network activity.
///
/// # Examples
///
/// ```
/// use mcp_probe::mcp::types::{ServerDefinition, TransportKind};
///
/// let def = ServerDefinition::stdio("files", "npx", vec!["-y".into(), "server-fs".into()]);
/// assert_eq!(def.transport, TransportKind::Stdio);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDefinition {
    /// Display name of the server
    pub name: String,
    /// Transport used to reach the server
    #[serde(rename = "type", default = "default_transport")]
    pub transport: TransportKind,
    /// Executable to spawn (stdio only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments for the executable (stdio only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables already filtered by the config resolver
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Endpoint URL (http/sse only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extra request headers; non-string values are dropped before use
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, Value>,
}

fn default_transport() -> TransportKind {
    TransportKind::Stdio
}

impl ServerDefinition {
    /// Build a stdio server definition.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args,
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
        }
    }

    /// Build a network server definition (`Http` or `Sse`).
    pub fn remote(name: impl Into<String>, transport: TransportKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            headers: HashMap::new(),
        }
    }

    /// Attach a header, returning `self` for chaining.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Attach an environment variable, returning `self` for chaining.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Terminal connectivity status of a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Timed out (or exited cleanly) without a terminal signal.
    Pending,
    /// A plausible MCP response was observed.
    Connected,
    /// An explicit protocol or transport error was observed.
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// `serverInfo` as announced in an `initialize` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server implementation name
    pub name: String,
    /// Server implementation version
    #[serde(default)]
    pub version: String,
}

/// Outcome of one connectivity verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityResult {
    /// Server name from the definition
    pub name: String,
    /// Terminal status
    pub status: ConnectionStatus,
    /// Announced server info, when the response carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
    /// Short error or inconclusive-reason message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectivityResult {
    /// A `Connected` result.
    pub fn connected(name: &str, server_info: Option<ServerInfo>) -> Self {
        Self {
            name: name.to_string(),
            status: ConnectionStatus::Connected,
            server_info,
            error: None,
        }
    }

    /// A `Failed` result with an error message.
    pub fn failed(name: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: ConnectionStatus::Failed,
            server_info: None,
            error: Some(error.into()),
        }
    }

    /// A `Pending` result with the reason the probe was inconclusive.
    pub fn pending(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: ConnectionStatus::Pending,
            server_info: None,
            error: Some(reason.into()),
        }
    }
}

/// A tool as listed by `tools/list`. Passed through without validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON-schema-like input description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Outcome of one tool catalogue fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolFetchResult {
    /// Server name from the definition
    pub name: String,
    /// Tools reported by the server (empty on error)
    pub tools: Vec<ToolDescriptor>,
    /// Short error message when the fetch failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transport the fetch used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<TransportKind>,
}

impl ToolFetchResult {
    /// A successful fetch.
    pub fn ok(name: &str, transport: TransportKind, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            tools,
            error: None,
            server_type: Some(transport),
        }
    }

    /// A failed fetch.
    pub fn err(name: &str, transport: TransportKind, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            error: Some(error.into()),
            server_type: Some(transport),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC envelopes
// ---------------------------------------------------------------------------

/// Client identity announced in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name
    pub name: String,
    /// Client version
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Build the `initialize` request with the fixed id `1`.
pub fn initialize_request(client: &ClientInfo) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": INITIALIZE_REQUEST_ID,
        "method": METHOD_INITIALIZE,
        "params": {
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": client,
        }
    })
}

/// Build the `notifications/initialized` notification (no id).
pub fn initialized_notification() -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": METHOD_INITIALIZED,
        "params": {}
    })
}

/// Build the `tools/list` request with the fixed id `2`.
pub fn tools_list_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": TOOLS_LIST_REQUEST_ID,
        "method": METHOD_TOOLS_LIST,
        "params": {}
    })
}

/// Serialize a message as one newline-terminated line for stdio/SSE framing.
pub fn to_line(message: &Value) -> String {
    format!("{}\n", message)
}

/// Returns true when `message` is a JSON-RPC response carrying `id`.
pub fn is_response_to(message: &Value, id: u64) -> bool {
    message.get("id").and_then(Value::as_u64) == Some(id)
        && (message.get("result").is_some() || message.get("error").is_some())
}

/// Split a JSON-RPC response into its `result`, or a protocol error.
pub fn into_result(message: Value) -> crate::error::ProbeResult<Value> {
    if let Some(error) = message.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(crate::error::ProbeError::Protocol {
            code,
            message: text,
        });
    }
    match message {
        Value::Object(mut map) => map.remove("result").ok_or_else(|| {
            crate::error::ProbeError::Transport("response carried no result".to_string())
        }),
        _ => Err(crate::error::ProbeError::Transport(
            "response is not a JSON object".to_string(),
        )),
    }
}

/// Pull `serverInfo` out of an `initialize` result, if well-formed.
pub fn server_info_from_result(result: &Value) -> Option<ServerInfo> {
    result
        .get("serverInfo")
        .and_then(|info| serde_json::from_value(info.clone()).ok())
}

/// Parse the `tools` array of a `tools/list` result.
///
/// Entries that are not objects with a string `name` are skipped.
pub fn tools_from_result(result: &Value) -> Vec<ToolDescriptor> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| serde_json::from_value(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
