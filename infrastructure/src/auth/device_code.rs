//! Interactive device code sign-in

use super::token::{TokenErrorResponse, TokenResponse};
use super::{CredentialSource, CredentialSourceError};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::{Duration, Instant};
use toolchat_application::BearerToken;
use tracing::debug;

/// Public client id of the Azure CLI, usable for device code sign-in.
const AZURE_CLI_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    message: String,
    expires_in: u64,
    #[serde(default = "default_interval")]
    interval: u64,
}

fn default_interval() -> u64 {
    5
}

pub struct DeviceCodeCredential {
    client: reqwest::Client,
    authority_host: String,
    tenant: String,
    client_id: String,
}

impl DeviceCodeCredential {
    pub fn new(client: reqwest::Client, authority_host: &str, tenant_id: Option<String>) -> Self {
        Self {
            client,
            authority_host: authority_host.trim_end_matches('/').to_string(),
            tenant: tenant_id.unwrap_or_else(|| "organizations".to_string()),
            client_id: AZURE_CLI_CLIENT_ID.to_string(),
        }
    }

    fn url(&self, leaf: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{}", self.authority_host, self.tenant, leaf)
    }

    async fn poll(&self, code: &DeviceCodeResponse) -> Result<BearerToken, CredentialSourceError> {
        let deadline = Instant::now()
            .checked_add(Duration::from_secs(code.expires_in))
            .ok_or_else(|| {
                CredentialSourceError::Failed(format!(
                    "device code lifetime of {}s is out of range",
                    code.expires_in
                ))
            })?;
        let mut interval = Duration::from_secs(code.interval);

        loop {
            tokio::time::sleep(interval).await;
            if Instant::now() >= deadline {
                return Err(CredentialSourceError::Failed(
                    "device code expired before sign-in completed".to_string(),
                ));
            }

            let response = self
                .client
                .post(self.url("token"))
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", self.client_id.as_str()),
                    ("device_code", code.device_code.as_str()),
                ])
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;

            if status.is_success() {
                let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
                    CredentialSourceError::Failed(format!("malformed token response: {}", e))
                })?;
                return token.into_token(Utc::now());
            }

            let error: TokenErrorResponse = serde_json::from_str(&body).map_err(|_| {
                CredentialSourceError::Failed(format!("HTTP {}", status.as_u16()))
            })?;
            match error.error.as_str() {
                "authorization_pending" => debug!("Waiting for device code sign-in"),
                "slow_down" => interval = interval.saturating_add(SLOW_DOWN_STEP),
                _ => return Err(CredentialSourceError::Failed(error.summary())),
            }
        }
    }
}

#[async_trait]
impl CredentialSource for DeviceCodeCredential {
    fn name(&self) -> &'static str {
        "device_code"
    }

    async fn fetch(&self, scope: &str) -> Result<BearerToken, CredentialSourceError> {
        let response = self
            .client
            .post(self.url("devicecode"))
            .form(&[("client_id", self.client_id.as_str()), ("scope", scope)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CredentialSourceError::Failed(format!(
                "device code request returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let code: DeviceCodeResponse = response.json().await?;

        // The user has to act on this, so it goes to the terminal, not the log.
        eprintln!("{}", code.message);
        self.poll(&code).await
    }
}
