//! Execution parameters: conversation loop control.
//!
//! [`ExecutionParams`] groups the static parameters that bound the tool
//! loop in [`ConversationOrchestrator`](crate::use_cases::run_conversation::ConversationOrchestrator).

use serde::{Deserialize, Serialize};

/// Tool-loop control parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Maximum tool-dispatch rounds within a single user turn.
    pub max_tool_rounds: usize,
    /// Extra attempts for a failed tool call while the backend stays ready.
    /// Zero disables retries.
    pub tool_retries: usize,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            max_tool_rounds: 10,
            tool_retries: 0,
        }
    }
}

impl ExecutionParams {
    pub fn with_max_tool_rounds(mut self, max: usize) -> Self {
        self.max_tool_rounds = max;
        self
    }

    pub fn with_tool_retries(mut self, retries: usize) -> Self {
        self.tool_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let params = ExecutionParams::default();
        assert_eq!(params.max_tool_rounds, 10);
        assert_eq!(params.tool_retries, 0);
    }

    #[test]
    fn test_builder() {
        let params = ExecutionParams::default()
            .with_max_tool_rounds(3)
            .with_tool_retries(2);

        assert_eq!(params.max_tool_rounds, 3);
        assert_eq!(params.tool_retries, 2);
    }
}
