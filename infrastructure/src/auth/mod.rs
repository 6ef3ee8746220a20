//! Credential chain for the completion service
//!
//! [`ChainedTokenCredential`] implements the
//! [`TokenCredential`](toolchat_application::TokenCredential) port by asking
//! each [`CredentialSource`] in turn until one produces a token:
//!
//! 1. [`EnvironmentCredential`]: service principal from `AZURE_*` variables
//! 2. [`ManagedIdentityCredential`]: App Service / IMDS endpoint
//! 3. [`AzureCliCredential`]: `az account get-access-token`
//! 4. [`DeviceCodeCredential`]: interactive sign-in (terminal only)
//!
//! The winning token is cached and reused until it is close to expiry.

mod azure_cli;
mod device_code;
mod environment;
mod managed_identity;
mod token;

pub use azure_cli::AzureCliCredential;
pub use device_code::DeviceCodeCredential;
pub use environment::EnvironmentCredential;
pub use managed_identity::ManagedIdentityCredential;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::io::IsTerminal;
use thiserror::Error;
use tokio::sync::Mutex;
use toolchat_application::{AuthenticationError, BearerToken, CredentialFailure, TokenCredential};
use tracing::{debug, info};

/// Scope of the Azure OpenAI data plane.
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Default Entra ID authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Tokens closer than this to expiry are refreshed.
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Why a single credential source did not produce a token
#[derive(Error, Debug)]
pub enum CredentialSourceError {
    /// The source is not configured on this host; the chain moves on.
    #[error("{0}")]
    Unavailable(String),

    /// The source is configured but the request failed.
    #[error("{0}")]
    Failed(String),
}

impl From<reqwest::Error> for CredentialSourceError {
    fn from(e: reqwest::Error) -> Self {
        CredentialSourceError::Failed(format!("request failed: {}", e))
    }
}

/// One way of obtaining a token.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs and in the aggregated error.
    fn name(&self) -> &'static str;

    async fn fetch(&self, scope: &str) -> Result<BearerToken, CredentialSourceError>;
}

/// Settings for building the default chain
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub scope: String,
    pub tenant_id: Option<String>,
    pub authority_host: String,
    pub allow_interactive: bool,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            scope: COGNITIVE_SERVICES_SCOPE.to_string(),
            tenant_id: None,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            allow_interactive: true,
        }
    }
}

/// Resource URI for endpoints that take a resource instead of a scope.
pub(crate) fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Credential chain with a token cache.
pub struct ChainedTokenCredential {
    scope: String,
    sources: Vec<Box<dyn CredentialSource>>,
    cached: Mutex<Option<BearerToken>>,
}

impl ChainedTokenCredential {
    pub fn new(scope: impl Into<String>, sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self {
            scope: scope.into(),
            sources,
            cached: Mutex::new(None),
        }
    }

    /// Environment → managed identity → Azure CLI → device code.
    ///
    /// The device code source is only added when interactive sign-in is
    /// allowed and stdin is a terminal.
    pub fn from_settings(settings: &CredentialSettings, client: reqwest::Client) -> Self {
        let mut sources: Vec<Box<dyn CredentialSource>> = vec![
            Box::new(EnvironmentCredential::from_env(
                client.clone(),
                &settings.authority_host,
            )),
            Box::new(ManagedIdentityCredential::from_env(client.clone())),
            Box::new(AzureCliCredential::new(settings.tenant_id.clone())),
        ];
        if settings.allow_interactive && std::io::stdin().is_terminal() {
            sources.push(Box::new(DeviceCodeCredential::new(
                client,
                &settings.authority_host,
                settings.tenant_id.clone(),
            )));
        }
        Self::new(settings.scope.clone(), sources)
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    async fn get_token(&self) -> Result<BearerToken, AuthenticationError> {
        // Held across the fetch so concurrent callers share one refresh.
        let mut cached = self.cached.lock().await;
        let margin = Duration::minutes(REFRESH_MARGIN_MINUTES);
        if let Some(token) = cached.as_ref()
            && token.is_fresh_at(Utc::now(), margin)
        {
            return Ok(token.clone());
        }

        let mut attempts = Vec::new();
        for source in &self.sources {
            match source.fetch(&self.scope).await {
                Ok(token) => {
                    info!(
                        "Authenticated via {} (token expires {})",
                        source.name(),
                        token.expires_at()
                    );
                    *cached = Some(token.clone());
                    return Ok(token);
                }
                Err(e) => {
                    debug!("Credential source {} skipped: {}", source.name(), e);
                    attempts.push(CredentialFailure::new(source.name(), e.to_string()));
                }
            }
        }

        *cached = None;
        Err(AuthenticationError::new(attempts))
    }
}
