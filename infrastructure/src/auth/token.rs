//! Token endpoint response parsing shared by the HTTP-based sources

use super::CredentialSourceError;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use toolchat_application::BearerToken;

/// Successful token response.
///
/// Entra ID returns `expires_in` as a number; the managed identity endpoints
/// return `expires_in`/`expires_on` as strings.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<Value>,
    #[serde(default)]
    pub expires_on: Option<Value>,
}

/// Error response (`error` + `error_description`).
#[derive(Debug, Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    pub fn summary(&self) -> String {
        match &self.error_description {
            // Descriptions carry trace ids on following lines.
            Some(d) => format!("{}: {}", self.error, d.lines().next().unwrap_or_default()),
            None => self.error.clone(),
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl TokenResponse {
    pub fn into_token(self, now: DateTime<Utc>) -> Result<BearerToken, CredentialSourceError> {
        let expires_at = if let Some(on) = self.expires_on.as_ref().and_then(as_i64) {
            DateTime::<Utc>::from_timestamp(on, 0)
        } else if let Some(secs) = self.expires_in.as_ref().and_then(as_i64) {
            let expires_at = Duration::try_seconds(secs).and_then(|d| now.checked_add_signed(d));
            if expires_at.is_none() {
                return Err(CredentialSourceError::Failed(format!(
                    "token lifetime of {}s is out of range",
                    secs
                )));
            }
            expires_at
        } else {
            None
        };
        let expires_at = expires_at.ok_or_else(|| {
            CredentialSourceError::Failed("token response has no usable expiry".to_string())
        })?;
        Ok(BearerToken::new(self.access_token, expires_at))
    }
}

/// Read a token endpoint reply, mapping error payloads to a failure.
pub(crate) async fn read_token_response(
    response: reqwest::Response,
) -> Result<BearerToken, CredentialSourceError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(error) => error.summary(),
            Err(_) => format!("HTTP {}", status.as_u16()),
        };
        return Err(CredentialSourceError::Failed(reason));
    }
    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| CredentialSourceError::Failed(format!("malformed token response: {}", e)))?;
    token.into_token(Utc::now())
}
