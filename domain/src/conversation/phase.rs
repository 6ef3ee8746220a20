//! Turn phases of the conversation loop.

use serde::{Deserialize, Serialize};

/// Where a conversation turn currently is.
///
/// ```text
/// AwaitingUserInput ──▶ RequestingCompletion ──▶ Responding ──▶ AwaitingUserInput
///                              ▲      │
///                              │      ▼
///                              └─ DispatchingTools
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    AwaitingUserInput,
    RequestingCompletion,
    DispatchingTools,
    Responding,
}

impl TurnPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnPhase::AwaitingUserInput => "awaiting_user_input",
            TurnPhase::RequestingCompletion => "requesting_completion",
            TurnPhase::DispatchingTools => "dispatching_tools",
            TurnPhase::Responding => "responding",
        }
    }
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
