//! Domain error types

use crate::conversation::message::Role;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Tool result for call id '{0}' does not answer an open tool call")]
    UnmatchedToolResult(String),

    #[error("Expected an assistant message, got a {0} message")]
    UnexpectedRole(Role),
}

/// The serialized `arguments` of a tool call could not be turned into a
/// structured key-value mapping.
///
/// Recoverable: the orchestrator reports it back to the model as tool
/// content instead of dispatching the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentParseError {
    #[error("arguments for tool '{tool_name}' are not valid JSON: {reason}")]
    InvalidJson { tool_name: String, reason: String },

    #[error("arguments for tool '{tool_name}' must be a JSON object, got {found}")]
    NotAnObject {
        tool_name: String,
        found: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_tool_result_display() {
        let error = DomainError::UnmatchedToolResult("c9".to_string());
        assert_eq!(
            error.to_string(),
            "Tool result for call id 'c9' does not answer an open tool call"
        );
    }

    #[test]
    fn test_not_an_object_display() {
        let error = ArgumentParseError::NotAnObject {
            tool_name: "echo".to_string(),
            found: "array",
        };
        assert_eq!(
            error.to_string(),
            "arguments for tool 'echo' must be a JSON object, got array"
        );
    }
}
