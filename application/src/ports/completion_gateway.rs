//! Completion Gateway port
//!
//! Defines the interface for requesting the next assistant message from the
//! model service.

use crate::ports::credential::AuthenticationError;
use async_trait::async_trait;
use thiserror::Error;
use toolchat_domain::{FunctionSpec, Message};

/// Errors that can occur during completion requests
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Completion service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("Timeout")]
    Timeout,
}

/// Gateway to the completion service
///
/// Implementations (adapters) live in the infrastructure layer.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Send the full history plus the available functions and return the
    /// assistant message the model produced (text and/or tool calls).
    async fn complete(
        &self,
        history: &[Message],
        functions: &[FunctionSpec],
    ) -> Result<Message, GatewayError>;
}
