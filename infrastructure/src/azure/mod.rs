//! Azure OpenAI chat completions adapter
//!
//! Implements the [`CompletionGateway`](toolchat_application::CompletionGateway)
//! port against `POST {endpoint}/openai/deployments/{model}/chat/completions`,
//! authenticating with a bearer token from the credential chain.

pub mod gateway;
pub mod wire;
