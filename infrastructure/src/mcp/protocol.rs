//! JSON-RPC protocol types for MCP tool server communication.
//!
//! # Protocol Overview
//!
//! - **Requests**: Client → Server (`initialize`, `tools/list`, `tools/call`)
//! - **Responses**: Server → Client (result or error, correlated by `id`)
//! - **Notifications**: either direction, no `id`
//!   (`notifications/initialized`, `notifications/message`, ...)
//! - **Server requests**: Server → Client with `id` + `method` (`ping`)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use toolchat_domain::ToolDescriptor;

/// Protocol version we ask for in `initialize`.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Versions this client can speak, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// JSON-RPC "method not found"
pub const METHOD_NOT_FOUND: i64 = -32601;

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
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification sent from client to server
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotificationOut {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotificationOut {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params: None,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Notification or request received from the server
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Value>,
}

/// JSON-RPC response sent from client to server (answers a server request).
#[derive(Debug, Clone, Serialize)]
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

/// Client identification sent in `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn this_client() -> Self {
        Self {
            name: "toolchat".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `initialize` parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Map<String, Value>,
    pub client_info: Implementation,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: Map::new(),
            client_info: Implementation::this_client(),
        }
    }
}

/// `initialize` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    pub server_info: Option<Implementation>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// `tools/list` parameters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListToolsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `tools/list` result (one page)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpTool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A tool as it appears on the wire.
///
/// Everything is optional so that an incomplete entry reaches the schema
/// adapter, which reports exactly which field is missing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

impl From<McpTool> for ToolDescriptor {
    fn from(tool: McpTool) -> Self {
        ToolDescriptor {
            name: tool.name,
            description: tool.description,
            parameter_schema: tool.input_schema,
        }
    }
}

/// `tools/call` parameters
#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// `tools/call` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub structured_content: Option<Value>,
}

/// A block of tool output
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        #[serde(default)]
        mime_type: String,
        #[serde(default)]
        data: String,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        #[serde(default)]
        mime_type: String,
        #[serde(default)]
        data: String,
    },
    Resource {
        resource: Value,
    },
    ResourceLink {
        uri: String,
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    /// Text form handed to the model. Binary payloads are summarized.
    pub fn render(&self) -> String {
        match self {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::Image { mime_type, data } => {
                format!("[image: {}, {} bytes base64]", mime_type, data.len())
            }
            ContentBlock::Audio { mime_type, data } => {
                format!("[audio: {}, {} bytes base64]", mime_type, data.len())
            }
            ContentBlock::Resource { resource } => {
                if let Some(text) = resource.get("text").and_then(|t| t.as_str()) {
                    return text.to_string();
                }
                let uri = resource
                    .get("uri")
                    .and_then(|u| u.as_str())
                    .unwrap_or("unknown");
                format!("[resource: {}]", uri)
            }
            ContentBlock::ResourceLink { uri, name } => match name {
                Some(name) => format!("[resource link: {} ({})]", name, uri),
                None => format!("[resource link: {}]", uri),
            },
            ContentBlock::Unknown => "[unsupported content]".to_string(),
        }
    }

    fn is_text(&self) -> bool {
        matches!(self, ContentBlock::Text { .. })
    }
}

impl CallToolResult {
    /// Render the result as the text the model will see.
    ///
    /// Falls back to `structuredContent` when no text block is present.
    pub fn render(&self) -> String {
        if !self.content.iter().any(ContentBlock::is_text)
            && let Some(structured) = &self.structured_content
        {
            return structured.to_string();
        }
        self.content
            .iter()
            .map(ContentBlock::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
