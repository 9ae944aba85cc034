//! JSON-RPC message types for tool server communication.
//!
//! - **Requests**: client → tool server (`initialize`, `tools/list`, `tools/call`, `ping`)
//! - **Responses**: tool server → client (result or error)
//! - **Notifications**: either direction (`notifications/initialized`,
//!   `notifications/tools/list_changed`)

use concierge_domain::{Capability, PermissionTier, ToolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Protocol revision announced during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Method names understood by tool servers.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
}

/// Standard JSON-RPC error code for unknown methods.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Server error codes that describe a retryable condition.
const TRANSIENT_ERROR_CODES: &[&str] = &["UNAVAILABLE", "BUSY", "TIMEOUT", "RATE_LIMITED"];

/// Global request ID counter for JSON-RPC requests.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request with an auto-generated ID.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: next_id(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC notification (no `id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
        }
    }
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// Response we send back for a server-initiated request.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponseOut {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl JsonRpcResponseOut {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

// ==================== initialize ====================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client_info: ClientInfo,
    pub capabilities: Value,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: ClientInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Servers vary in what they return here; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: Option<ClientInfo>,
}

// ==================== tools/list ====================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolListResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// One tool as advertised by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(
        default = "default_input_schema",
        rename = "inputSchema",
        alias = "input_schema"
    )]
    pub input_schema: Value,
    #[serde(default, rename = "permissionTier", alias = "permission_tier")]
    pub permission_tier: Option<String>,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

impl ToolDescriptor {
    /// Build the registry capability owned by `server`.
    ///
    /// An unrecognised permission tier is treated as elevated.
    pub fn into_capability(self, server: &str) -> Capability {
        let tier = match self.permission_tier.as_deref() {
            None => PermissionTier::Standard,
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!(
                    server = %server,
                    tool = %self.name,
                    error = %err,
                    "Unknown permission tier, requiring elevated permission"
                );
                PermissionTier::Elevated
            }),
        };
        Capability::new(server, &self.name, self.description)
            .with_input_schema(self.input_schema)
            .with_tier(tier)
    }
}

// ==================== tools/call ====================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolParams<'a> {
    pub capability_name: &'a str,
    pub arguments: &'a Value,
}

/// Interpret a successful `tools/call` response body.
///
/// Tool-level failures travel inside the result as `{errorCode, message}`
/// or `{isError: true, ...}`.
pub fn parse_call_result(result: Value) -> Result<Value, ToolError> {
    if let Some(code) = result.get("errorCode").and_then(|c| c.as_str()) {
        let message = result
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("tool reported an error")
            .to_string();
        if TRANSIENT_ERROR_CODES.contains(&code) {
            return Err(ToolError {
                code: code.to_string(),
                ..ToolError::transient(message)
            });
        }
        return Err(ToolError::remote(code, message));
    }

    if result.get("isError").and_then(|e| e.as_bool()) == Some(true) {
        let message = result
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| result.to_string());
        return Err(ToolError::remote("REMOTE_ERROR", message));
    }

    match result {
        Value::Object(mut map) if map.contains_key("result") => {
            Ok(map.remove("result").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}
