//! Managed identity credential (App Service / Functions, or IMDS on VMs)

use super::token::read_token_response;
use super::{CredentialSource, CredentialSourceError, scope_to_resource};
use async_trait::async_trait;
use std::time::Duration;
use toolchat_application::BearerToken;
use tracing::debug;

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// IMDS is link-local; off-Azure the connect attempt should fail fast.
const IMDS_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const APP_SERVICE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    /// `IDENTITY_ENDPOINT` + `IDENTITY_HEADER`
    AppService { url: String, header: String },
    Imds { url: String },
}

pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    endpoint: Endpoint,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    /// App Service when `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` are set,
    /// otherwise IMDS. `AZURE_CLIENT_ID` selects a user-assigned identity.
    pub fn from_env(client: reqwest::Client) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        let endpoint = match (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER")) {
            (Some(url), Some(header)) => Endpoint::AppService { url, header },
            _ => Endpoint::Imds {
                url: IMDS_ENDPOINT.to_string(),
            },
        };
        Self {
            client,
            endpoint,
            client_id: var("AZURE_CLIENT_ID"),
        }
    }

    pub fn app_service(client: reqwest::Client, url: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: Endpoint::AppService {
                url: url.into(),
                header: header.into(),
            },
            client_id: None,
        }
    }

    pub fn imds(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: Endpoint::Imds { url: url.into() },
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

#[async_trait]
impl CredentialSource for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        "managed_identity"
    }

    async fn fetch(&self, scope: &str) -> Result<BearerToken, CredentialSourceError> {
        let resource = scope_to_resource(scope);
        let mut query = vec![("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let request = match &self.endpoint {
            Endpoint::AppService { url, header } => {
                debug!("Requesting managed identity token from App Service endpoint");
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.client
                    .get(url)
                    .header("X-IDENTITY-HEADER", header)
                    .query(&query)
                    .timeout(APP_SERVICE_TIMEOUT)
            }
            Endpoint::Imds { url } => {
                debug!("Probing IMDS for a managed identity token");
                query.push(("api-version", IMDS_API_VERSION));
                self.client
                    .get(url)
                    .header("Metadata", "true")
                    .query(&query)
                    .timeout(IMDS_PROBE_TIMEOUT)
            }
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Err(CredentialSourceError::Unavailable(
                    "no managed identity endpoint reachable".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        // IMDS answers 400 when the host has no identity assigned.
        if matches!(self.endpoint, Endpoint::Imds { .. })
            && response.status() == reqwest::StatusCode::BAD_REQUEST
        {
            return Err(CredentialSourceError::Unavailable(
                "no managed identity assigned to this host".to_string(),
            ));
        }
        read_token_response(response).await
    }
}
