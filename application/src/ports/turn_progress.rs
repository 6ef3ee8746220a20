//! Turn progress port
//!
//! Callbacks fired while a conversation turn runs, so the presentation layer
//! can show what the orchestrator is waiting on.

use toolchat_domain::ToolCallRequest;

pub trait TurnProgress: Send + Sync {
    /// A completion request is about to be sent (`round` starts at 1).
    fn on_completion_started(&self, _round: usize) {}

    /// The completion service answered (successfully or not).
    fn on_completion_finished(&self) {}

    fn on_tool_call_started(&self, _call: &ToolCallRequest) {}

    fn on_tool_call_finished(&self, _call: &ToolCallRequest, _success: bool) {}
}

/// No-op progress notifier for when progress reporting is not needed
pub struct NoTurnProgress;

impl TurnProgress for NoTurnProgress {}
