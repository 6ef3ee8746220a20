//! Configuration loading for toolchat
//!
//! Sources, lowest to highest priority: built-in defaults, the global
//! `config.toml`, `./toolchat.toml`, `--config <path>`, `TOOLCHAT_*`
//! variables, then the well-known `AZURE_OPENAI_*` variables.

mod file_config;
mod loader;

pub use file_config::{
    ConfigError, FileAuthConfig, FileBackendConfig, FileCompletionConfig, FileConfig,
    FileConversationConfig, ValidatedConfig,
};
pub use loader::ConfigLoader;
