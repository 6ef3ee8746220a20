//! Transport layer for the MCP stdio channel.
//!
//! Frames are newline-delimited JSON: one compact JSON-RPC message per line,
//! in both directions. The session's background reader task calls
//! [`classify_message`] once per line to decide where it goes.

use crate::mcp::error::Result;
use serde::Serialize;
use serde_json::Value;

/// Classification of an incoming JSON-RPC message.
///
/// - `Response` → oneshot correlation for pending requests
/// - `IncomingRequest` → answered by the session (`ping`) or rejected
/// - `Notification` → logged
/// - `UncorrelatedError` → the server could not tell which request failed
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to a request we sent (has `id`, no `method`).
    Response,
    /// A request from the server (has `id` + `method`).
    IncomingRequest { id: Value },
    /// A notification (has `method`, no `id`).
    Notification,
    /// An error response with a missing or null `id`.
    UncorrelatedError,
    /// Neither `id` nor `method`.
    Invalid,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
pub fn classify_message(json: &Value) -> MessageKind {
    let id = json.get("id").filter(|v| !v.is_null());
    let has_method = json.get("method").and_then(|v| v.as_str()).is_some();

    match (id, has_method) {
        (Some(id), true) => MessageKind::IncomingRequest { id: id.clone() },
        (Some(_), false) => MessageKind::Response,
        (None, true) => MessageKind::Notification,
        (None, false) if json.get("error").is_some() => MessageKind::UncorrelatedError,
        (None, false) => MessageKind::Invalid,
    }
}

/// Serialize a message into one newline-terminated frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}
