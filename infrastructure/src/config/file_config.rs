//! Raw TOML configuration data types
//!
//! These structs mirror the config file (and the `TOOLCHAT_*` environment
//! variables) exactly. [`FileConfig::validate`] turns them into the settings
//! the adapters consume.

use crate::auth::{COGNITIVE_SERVICES_SCOPE, CredentialSettings, DEFAULT_AUTHORITY_HOST};
use crate::azure::gateway::AzureOpenAiSettings;
use crate::mcp::session::McpSessionConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use toolchat_application::ExecutionParams;

/// Configuration problems that stop startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("missing required setting '{key}' (set {env} or add it to toolchat.toml)")]
    Missing { key: &'static str, env: &'static str },

    #[error("invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub completion: FileCompletionConfig,
    pub backend: FileBackendConfig,
    pub conversation: FileConversationConfig,
    pub auth: FileAuthConfig,
}

/// `[completion]`: the Azure OpenAI deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCompletionConfig {
    pub endpoint: Option<String>,
    /// Deployment name
    pub model: Option<String>,
    pub api_version: String,
    pub request_timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for FileCompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            api_version: "2024-10-21".to_string(),
            request_timeout_secs: 120,
            temperature: None,
        }
    }
}

/// `[backend]`: the MCP tool server process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBackendConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub handshake_timeout_secs: u64,
    pub call_timeout_secs: u64,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        let defaults = McpSessionConfig::default();
        Self {
            command: defaults.command,
            args: defaults.args,
            env: defaults.env,
            handshake_timeout_secs: defaults.handshake_timeout.as_secs(),
            call_timeout_secs: defaults.call_timeout.as_secs(),
        }
    }
}

/// `[conversation]`: tool loop limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConversationConfig {
    pub max_tool_rounds: usize,
    pub tool_retries: usize,
    pub system_prompt: Option<String>,
}

impl Default for FileConversationConfig {
    fn default() -> Self {
        let defaults = ExecutionParams::default();
        Self {
            max_tool_rounds: defaults.max_tool_rounds,
            tool_retries: defaults.tool_retries,
            system_prompt: None,
        }
    }
}

/// `[auth]`: credential chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAuthConfig {
    pub scope: String,
    pub tenant_id: Option<String>,
    pub authority_host: String,
    /// Allow the device code sign-in when nothing else works
    pub allow_interactive: bool,
}

impl Default for FileAuthConfig {
    fn default() -> Self {
        Self {
            scope: COGNITIVE_SERVICES_SCOPE.to_string(),
            tenant_id: None,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            allow_interactive: true,
        }
    }
}

/// Configuration that passed validation, split per consumer.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub completion: AzureOpenAiSettings,
    pub backend: McpSessionConfig,
    pub execution: ExecutionParams,
    pub credentials: CredentialSettings,
}

fn required(
    value: &Option<String>,
    key: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing { key, env }),
    }
}

fn positive_secs(secs: u64, key: &'static str) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

impl FileConfig {
    /// Check required settings and build the adapter settings.
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let endpoint = required(
            &self.completion.endpoint,
            "completion.endpoint",
            "AZURE_OPENAI_ENDPOINT",
        )?;
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                key: "completion.endpoint",
                reason: format!("'{}' is not an http(s) URL", endpoint),
            });
        }
        let model = required(&self.completion.model, "completion.model", "AZURE_OPENAI_MODEL")?;

        if self.backend.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "backend.command",
                reason: "must not be empty".to_string(),
            });
        }
        if self.conversation.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid {
                key: "conversation.max_tool_rounds",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(ValidatedConfig {
            completion: AzureOpenAiSettings {
                endpoint,
                model,
                api_version: self.completion.api_version.clone(),
                request_timeout: positive_secs(
                    self.completion.request_timeout_secs,
                    "completion.request_timeout_secs",
                )?,
                temperature: self.completion.temperature,
                system_prompt: self
                    .conversation
                    .system_prompt
                    .clone()
                    .filter(|p| !p.trim().is_empty()),
            },
            backend: McpSessionConfig {
                command: self.backend.command.clone(),
                args: self.backend.args.clone(),
                env: self.backend.env.clone(),
                handshake_timeout: positive_secs(
                    self.backend.handshake_timeout_secs,
                    "backend.handshake_timeout_secs",
                )?,
                call_timeout: positive_secs(
                    self.backend.call_timeout_secs,
                    "backend.call_timeout_secs",
                )?,
                ..McpSessionConfig::default()
            },
            execution: ExecutionParams::default()
                .with_max_tool_rounds(self.conversation.max_tool_rounds)
                .with_tool_retries(self.conversation.tool_retries),
            credentials: CredentialSettings {
                scope: self.auth.scope.clone(),
                tenant_id: self.auth.tenant_id.clone(),
                authority_host: self.auth.authority_host.clone(),
                allow_interactive: self.auth.allow_interactive,
            },
        })
    }

    /// Effective configuration rendered as TOML (for `--show-config`).
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> FileConfig {
        let mut config = FileConfig::default();
        config.completion.endpoint = Some("https://res.openai.azure.com".to_string());
        config.completion.model = Some("gpt-4o".to_string());
        config
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[completion]
endpoint = "https://res.openai.azure.com"
model = "gpt-4o"
temperature = 0.2

[backend]
command = "azmcp"
args = ["server", "start", "--namespace", "storage"]
call_timeout_secs = 90

[backend.env]
AZURE_MCP_COLLECT_TELEMETRY = "false"

[conversation]
max_tool_rounds = 4
system_prompt = "You manage Azure resources."

[auth]
allow_interactive = false
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.completion.model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.completion.api_version, "2024-10-21");
        assert_eq!(config.backend.command, "azmcp");
        assert_eq!(config.backend.call_timeout_secs, 90);
        assert_eq!(config.backend.handshake_timeout_secs, 30);
        assert_eq!(
            config.backend.env.get("AZURE_MCP_COLLECT_TELEMETRY").map(String::as_str),
            Some("false")
        );
        assert_eq!(config.conversation.max_tool_rounds, 4);
        assert!(!config.auth.allow_interactive);
    }

    #[test]
    fn test_defaults() {
        let config = FileConfig::default();
        assert_eq!(config.backend.command, "npx");
        assert_eq!(
            config.backend.args,
            vec!["-y", "@azure/mcp@latest", "server", "start"]
        );
        assert_eq!(config.conversation.max_tool_rounds, 10);
        assert_eq!(config.conversation.tool_retries, 0);
        assert_eq!(config.auth.scope, COGNITIVE_SERVICES_SCOPE);
    }

    #[test]
    fn test_validate_minimal_config() {
        let validated = minimal().validate().unwrap();
        assert_eq!(validated.completion.model, "gpt-4o");
        assert_eq!(validated.completion.request_timeout, Duration::from_secs(120));
        assert_eq!(validated.backend.call_timeout, Duration::from_secs(60));
        assert_eq!(validated.execution.max_tool_rounds, 10);
        assert!(validated.completion.system_prompt.is_none());
    }

    #[test]
    fn test_missing_endpoint_names_variable() {
        let mut config = minimal();
        config.completion.endpoint = None;

        let err = config.validate().unwrap_err();

        assert!(matches!(err, ConfigError::Missing { env: "AZURE_OPENAI_ENDPOINT", .. }));
        assert!(err.to_string().contains("AZURE_OPENAI_ENDPOINT"));
    }

    #[test]
    fn test_blank_model_is_missing() {
        let mut config = minimal();
        config.completion.model = Some("  ".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing { key: "completion.model", .. })
        ));
    }

    #[test]
    fn test_zero_rounds_is_invalid() {
        let mut config = minimal();
        config.conversation.max_tool_rounds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "conversation.max_tool_rounds", .. })
        ));
    }

    #[test]
    fn test_endpoint_must_be_url() {
        let mut config = minimal();
        config.completion.endpoint = Some("res.openai.azure.com".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = minimal();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[completion]"));
        let parsed: FileConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
