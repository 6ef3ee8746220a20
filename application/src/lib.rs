//! Application layer for toolchat
//!
//! This crate contains the conversation orchestrator, the port definitions
//! it drives, and its loop-control parameters. It depends only on the
//! domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::ExecutionParams;
pub use ports::{
    completion_gateway::{CompletionGateway, GatewayError},
    credential::{AuthenticationError, BearerToken, CredentialFailure, TokenCredential},
    tool_backend::{BackendError, ToolBackend},
    turn_progress::{NoTurnProgress, TurnProgress},
};
pub use use_cases::run_conversation::{ConversationOrchestrator, TurnOutcome};
