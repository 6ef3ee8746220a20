//! Error types for the MCP adapter

use std::time::Duration;
use thiserror::Error;
use toolchat_application::BackendError;

/// Result type alias for MCP operations
pub type Result<T> = std::result::Result<T, McpError>;

/// Errors that can occur when communicating with the MCP tool server
#[derive(Error, Debug)]
pub enum McpError {
    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("JSON-RPC error (code {code}): {message}")]
    RpcError { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Unsupported protocol version '{0}'")]
    UnsupportedProtocolVersion(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("'{method}' timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
}

impl From<McpError> for BackendError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::Timeout { method, timeout } => BackendError::Timeout { method, timeout },
            McpError::TransportClosed => BackendError::ChannelClosed,
            other => BackendError::Protocol(other.to_string()),
        }
    }
}
