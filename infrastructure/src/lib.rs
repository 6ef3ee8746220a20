//! Infrastructure layer for toolchat
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: the MCP tool server session, the Azure OpenAI
//! completion gateway, the credential chain and configuration loading.

pub mod auth;
pub mod azure;
pub mod config;
pub mod mcp;

// Re-export commonly used types
pub use auth::{ChainedTokenCredential, CredentialSettings};
pub use azure::gateway::{AzureOpenAiGateway, AzureOpenAiSettings};
pub use config::{ConfigError, ConfigLoader, FileConfig, ValidatedConfig};
pub use mcp::{
    error::{McpError, Result},
    session::{McpSession, McpSessionConfig},
};
