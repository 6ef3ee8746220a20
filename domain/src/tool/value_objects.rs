//! Tool domain value objects: immutable result and error types
//!
//! A tool that fails is ordinary data: its [`ToolError`] is handed back to
//! the model as tool content. Only channel faults (timeouts, a dead backend)
//! are exceptional, and those are reported by the backend port instead.

use serde::{Deserialize, Serialize};

/// Error reported by the tool backend for a single call.
///
/// | Code | Description |
/// |------|-------------|
/// | `TOOL_FAILED` | The tool ran and reported failure (`isError`) |
/// | `RPC_ERROR` | The backend rejected the call (unknown tool, bad params) |
/// | `INVALID_ARGUMENT` | Arguments could not be parsed before dispatch |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    /// Error code (e.g., "TOOL_FAILED", "RPC_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn tool_failed(message: impl Into<String>) -> Self {
        Self::new("TOOL_FAILED", message)
    }

    pub fn rpc_error(code: i64, message: impl Into<String>) -> Self {
        Self::new("RPC_ERROR", message).with_details(format!("code {}", code))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new("INVALID_ARGUMENT", message)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ToolError {}

/// Result of a tool call, carrying output or error information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Whether the execution was successful
    pub success: bool,
    /// Output content (for successful execution)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error information (for failed execution)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    /// Duration of execution in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output: Some(output.into()),
            error: None,
            duration_ms: None,
        }
    }

    /// Create a failed result
    pub fn failure(tool_name: impl Into<String>, error: ToolError) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: None,
            error: Some(error),
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn error(&self) -> Option<&ToolError> {
        self.error.as_ref()
    }

    /// Text handed back to the model as the tool message content.
    pub fn content_for_model(&self) -> String {
        match (&self.output, &self.error) {
            (_, Some(error)) => format!("Error: {}", error),
            (Some(output), None) => output.clone(),
            (None, None) => String::new(),
        }
    }
}
