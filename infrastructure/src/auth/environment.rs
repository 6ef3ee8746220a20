//! Service principal credential from environment variables

use super::token::read_token_response;
use super::{CredentialSource, CredentialSourceError};
use async_trait::async_trait;
use toolchat_application::BearerToken;
use tracing::debug;

/// Client-credentials grant using `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
/// `AZURE_CLIENT_SECRET`. `AZURE_AUTHORITY_HOST` overrides the authority.
pub struct EnvironmentCredential {
    client: reqwest::Client,
    authority_host: String,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl EnvironmentCredential {
    pub fn new(
        client: reqwest::Client,
        authority_host: impl Into<String>,
        tenant_id: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            authority_host: authority_host.into(),
            tenant_id,
            client_id,
            client_secret,
        }
    }

    pub fn from_env(client: reqwest::Client, default_authority: &str) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self::new(
            client,
            var("AZURE_AUTHORITY_HOST").unwrap_or_else(|| default_authority.to_string()),
            var("AZURE_TENANT_ID"),
            var("AZURE_CLIENT_ID"),
            var("AZURE_CLIENT_SECRET"),
        )
    }
}

#[async_trait]
impl CredentialSource for EnvironmentCredential {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn fetch(&self, scope: &str) -> Result<BearerToken, CredentialSourceError> {
        let (tenant_id, client_id, client_secret) =
            match (&self.tenant_id, &self.client_id, &self.client_secret) {
                (Some(t), Some(c), Some(s)) => (t, c, s),
                (None, _, _) => return Err(unset("AZURE_TENANT_ID")),
                (_, None, _) => return Err(unset("AZURE_CLIENT_ID")),
                (_, _, None) => return Err(unset("AZURE_CLIENT_SECRET")),
            };

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            tenant_id
        );
        debug!("Requesting client-credentials token from {}", url);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await?;
        read_token_response(response).await
    }
}

fn unset(name: &str) -> CredentialSourceError {
    CredentialSourceError::Unavailable(format!("{} not set", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::COGNITIVE_SERVICES_SCOPE;

    fn credential(authority: &str, secret: Option<&str>) -> EnvironmentCredential {
        EnvironmentCredential::new(
            reqwest::Client::new(),
            authority,
            Some("tenant-1".to_string()),
            Some("client-1".to_string()),
            secret.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn missing_variable_is_unavailable() {
        let err = credential("http://unused", None)
            .fetch(COGNITIVE_SERVICES_SCOPE)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialSourceError::Unavailable(ref m) if m == "AZURE_CLIENT_SECRET not set"));
    }

    #[tokio::test]
    async fn posts_client_credentials_grant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
                mockito::Matcher::UrlEncoded("client_id".into(), "client-1".into()),
                mockito::Matcher::UrlEncoded("scope".into(), COGNITIVE_SERVICES_SCOPE.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token_type":"Bearer","expires_in":3599,"access_token":"sp-token"}"#)
            .create_async()
            .await;

        let token = credential(&server.url(), Some("s3cret"))
            .fetch(COGNITIVE_SERVICES_SCOPE)
            .await
            .unwrap();

        assert_eq!(token.secret(), "sp-token");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_secret_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tenant-1/oauth2/v2.0/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret."}"#)
            .create_async()
            .await;

        let err = credential(&server.url(), Some("wrong"))
            .fetch(COGNITIVE_SERVICES_SCOPE)
            .await
            .unwrap_err();

        assert!(matches!(err, CredentialSourceError::Failed(ref m) if m.starts_with("invalid_client")));
    }
}
