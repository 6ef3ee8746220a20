//! Run Conversation use case.
//!
//! [`ConversationOrchestrator`] owns the conversation history and drives one
//! user turn at a time:
//!
//! 1. Append the user message
//! 2. Request a completion with the full history and the function specs
//! 3. No tool calls → the assistant text is the answer
//! 4. Otherwise dispatch every tool call **sequentially, in emitted order**,
//!    appending one tool message per call, then go back to 2
//!
//! Nothing that happens inside a turn is fatal: completion failures abandon
//! the turn with an apology, tool failures become tool content for the model.

use crate::config::ExecutionParams;
use crate::ports::completion_gateway::CompletionGateway;
use crate::ports::tool_backend::ToolBackend;
use crate::ports::turn_progress::{NoTurnProgress, TurnProgress};
use serde_json::{Map, Value};
use std::sync::Arc;
use toolchat_domain::util::preview;
use toolchat_domain::{Conversation, FunctionSpec, Role, ToolCallRequest, TurnPhase};
use tracing::{debug, info, warn};

/// Shown to the user when a completion request fails.
const APOLOGY: &str =
    "Sorry, I couldn't get a response from the model service. Please try again.";

/// How a single user turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model produced a final answer.
    Answered { text: String, tool_rounds: usize },
    /// The model kept requesting tools until `max_tool_rounds` was reached.
    RoundLimitReached { text: String, tool_rounds: usize },
    /// A completion request failed; the turn was abandoned.
    Abandoned { apology: String, error: String },
}

impl TurnOutcome {
    /// Text to surface to the user.
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Answered { text, .. } | TurnOutcome::RoundLimitReached { text, .. } => {
                text
            }
            TurnOutcome::Abandoned { apology, .. } => apology,
        }
    }
}

/// Conversation orchestrator (root of the tool-calling loop).
///
/// One orchestrator per conversation; its history is never shared.
pub struct ConversationOrchestrator {
    gateway: Arc<dyn CompletionGateway>,
    backend: Arc<dyn ToolBackend>,
    functions: Vec<FunctionSpec>,
    params: ExecutionParams,
    progress: Arc<dyn TurnProgress>,
    history: Conversation,
    phase: TurnPhase,
}

impl ConversationOrchestrator {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        backend: Arc<dyn ToolBackend>,
        functions: Vec<FunctionSpec>,
        params: ExecutionParams,
    ) -> Self {
        Self {
            gateway,
            backend,
            functions,
            params,
            progress: Arc::new(NoTurnProgress),
            history: Conversation::new(),
            phase: TurnPhase::AwaitingUserInput,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn TurnProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn history(&self) -> &Conversation {
        &self.history
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn functions(&self) -> &[FunctionSpec] {
        &self.functions
    }

    /// Forget the conversation so far.
    pub fn reset(&mut self) {
        self.history.clear();
        self.phase = TurnPhase::AwaitingUserInput;
    }

    /// Run one user turn to completion.
    pub async fn run_turn(&mut self, input: &str) -> TurnOutcome {
        info!("Starting turn: {}", preview(input, 80));
        self.history.push_user(input);

        let mut tool_rounds = 0;
        let outcome = loop {
            self.phase = TurnPhase::RequestingCompletion;
            self.progress.on_completion_started(tool_rounds + 1);
            let completion = self
                .gateway
                .complete(self.history.messages(), &self.functions)
                .await;
            self.progress.on_completion_finished();

            let reply = match completion {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Completion request failed, abandoning turn: {}", e);
                    break TurnOutcome::Abandoned {
                        apology: APOLOGY.to_string(),
                        error: e.to_string(),
                    };
                }
            };

            let text = reply.content.clone();
            let calls = reply.tool_calls.clone();
            if let Err(e) = self.history.push_assistant(reply) {
                warn!("Completion service returned an unusable message: {}", e);
                break TurnOutcome::Abandoned {
                    apology: APOLOGY.to_string(),
                    error: e.to_string(),
                };
            }

            if calls.is_empty() {
                self.phase = TurnPhase::Responding;
                debug!("Turn answered after {} tool rounds", tool_rounds);
                break TurnOutcome::Answered { text, tool_rounds };
            }

            self.phase = TurnPhase::DispatchingTools;
            debug!(
                "Tool round {}/{}: {} calls",
                tool_rounds + 1,
                self.params.max_tool_rounds,
                calls.len()
            );
            for call in &calls {
                self.dispatch(call).await;
            }
            tool_rounds += 1;

            if tool_rounds >= self.params.max_tool_rounds {
                warn!(
                    "Tool loop reached max_tool_rounds ({}), ending turn",
                    self.params.max_tool_rounds
                );
                self.phase = TurnPhase::Responding;
                let text = if text.is_empty() {
                    format!(
                        "Stopped after {} rounds of tool calls without a final answer.",
                        tool_rounds
                    )
                } else {
                    text
                };
                break TurnOutcome::RoundLimitReached { text, tool_rounds };
            }
        };

        self.phase = TurnPhase::AwaitingUserInput;
        outcome
    }

    /// Execute one tool call and record its outcome as a tool message.
    async fn dispatch(&mut self, call: &ToolCallRequest) {
        self.progress.on_tool_call_started(call);

        let (content, success) = match call.parse_arguments() {
            Ok(arguments) => self.invoke(call, arguments).await,
            Err(e) => {
                warn!(call_id = %call.call_id, "Skipping tool call: {}", e);
                (format!("Error: {}", e), false)
            }
        };

        self.progress.on_tool_call_finished(call, success);

        if let Err(e) = self
            .history
            .push_tool_result(&call.call_id, &call.tool_name, content)
        {
            warn!("Dropping tool result: {}", e);
        }
    }

    /// Call the backend, retrying failures while it stays ready.
    async fn invoke(&self, call: &ToolCallRequest, arguments: Map<String, Value>) -> (String, bool) {
        let attempts = self.params.tool_retries + 1;
        let mut attempt = 1;
        loop {
            let content = match self.backend.call_tool(&call.tool_name, arguments.clone()).await {
                Ok(result) if result.is_success() => return (result.content_for_model(), true),
                Ok(result) => result.content_for_model(),
                Err(e) => {
                    warn!(call_id = %call.call_id, tool = %call.tool_name, "Tool call failed: {}", e);
                    format!("Error: tool call failed: {}", e)
                }
            };

            if attempt >= attempts || !self.backend.state().is_ready() {
                return (content, false);
            }
            attempt += 1;
            debug!(
                "Retrying tool '{}' (attempt {}/{})",
                call.tool_name, attempt, attempts
            );
        }
    }

    /// Number of assistant messages in the history (one per completion).
    #[cfg(test)]
    fn completion_count(&self) -> usize {
        self.history
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}
