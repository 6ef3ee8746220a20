//! Azure CLI credential (`az account get-access-token`)

use super::{CredentialSource, CredentialSourceError, scope_to_resource};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use toolchat_application::BearerToken;
use tracing::debug;

const CLI_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Local time, e.g. "2024-05-01 13:45:10.000000"
    #[serde(default)]
    expires_on: Option<String>,
    /// Unix seconds (newer CLI versions)
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

impl CliToken {
    fn into_token(self) -> Result<BearerToken, CredentialSourceError> {
        let expires_at = match (self.expires_on_unix, self.expires_on.as_deref()) {
            (Some(unix), _) => DateTime::<Utc>::from_timestamp(unix, 0),
            (None, Some(local)) => parse_local_time(local),
            (None, None) => None,
        }
        .ok_or_else(|| CredentialSourceError::Failed("az returned no usable expiry".to_string()))?;
        Ok(BearerToken::new(self.access_token, expires_at))
    }
}

fn parse_local_time(text: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

pub struct AzureCliCredential {
    tenant_id: Option<String>,
}

impl AzureCliCredential {
    pub fn new(tenant_id: Option<String>) -> Self {
        Self { tenant_id }
    }
}

#[async_trait]
impl CredentialSource for AzureCliCredential {
    fn name(&self) -> &'static str {
        "azure_cli"
    }

    async fn fetch(&self, scope: &str) -> Result<BearerToken, CredentialSourceError> {
        let az = which::which("az")
            .map_err(|_| CredentialSourceError::Unavailable("az not found on PATH".to_string()))?;

        let mut cmd = Command::new(az);
        cmd.args([
            "account",
            "get-access-token",
            "--output",
            "json",
            "--resource",
            scope_to_resource(scope),
        ]);
        if let Some(tenant) = &self.tenant_id {
            cmd.args(["--tenant", tenant.as_str()]);
        }
        cmd.kill_on_drop(true);
        debug!("Requesting token from Azure CLI");

        let output = tokio::time::timeout(CLI_TIMEOUT, cmd.output())
            .await
            .map_err(|_| CredentialSourceError::Failed("az timed out".to_string()))?
            .map_err(|e| CredentialSourceError::Failed(format!("failed to run az: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("no output");
            // "Please run 'az login'" means the CLI is installed but signed out.
            if stderr.contains("az login") {
                return Err(CredentialSourceError::Unavailable(format!(
                    "not signed in ({})",
                    first.trim()
                )));
            }
            return Err(CredentialSourceError::Failed(first.trim().to_string()));
        }

        let token: CliToken = serde_json::from_slice(&output.stdout).map_err(|e| {
            CredentialSourceError::Failed(format!("unexpected az output: {}", e))
        })?;
        token.into_token()
    }
}
