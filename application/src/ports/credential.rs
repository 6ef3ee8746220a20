//! Credential port
//!
//! Produces the bearer token presented to the completion service. Callers
//! ask for a token on every request; caching and refresh are the
//! implementation's business.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// An access token together with its expiry.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True if the token stays valid for at least `margin` from `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin > now
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Why one credential source in the chain did not produce a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFailure {
    pub source: String,
    pub reason: String,
}

impl CredentialFailure {
    pub fn new(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            reason: reason.into(),
        }
    }
}

/// Every credential source failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no credential source produced a token ({})", summarize(.attempts))]
pub struct AuthenticationError {
    pub attempts: Vec<CredentialFailure>,
}

fn summarize(attempts: &[CredentialFailure]) -> String {
    if attempts.is_empty() {
        return "no sources configured".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.source, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AuthenticationError {
    pub fn new(attempts: Vec<CredentialFailure>) -> Self {
        Self { attempts }
    }

    /// Multi-line hint shown to the user when startup authentication fails.
    pub fn guidance(&self) -> String {
        let mut text = String::from("Could not obtain a token for the completion service.\n");
        for attempt in &self.attempts {
            text.push_str(&format!("  - {}: {}\n", attempt.source, attempt.reason));
        }
        text.push_str(
            "Set AZURE_TENANT_ID/AZURE_CLIENT_ID/AZURE_CLIENT_SECRET, run on a host with a \
             managed identity, or sign in with `az login`.",
        );
        text
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self) -> Result<BearerToken, AuthenticationError>;
}
