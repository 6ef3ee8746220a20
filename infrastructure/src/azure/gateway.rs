//! Azure OpenAI completion gateway

use crate::azure::wire::{ChatCompletionRequest, ChatCompletionResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use toolchat_application::{CompletionGateway, GatewayError, TokenCredential};
use toolchat_domain::{FunctionSpec, Message};
use tracing::{debug, trace, warn};

/// Where and how to reach the completion service.
#[derive(Debug, Clone)]
pub struct AzureOpenAiSettings {
    /// e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    /// Deployment name
    pub model: String,
    pub api_version: String,
    pub request_timeout: Duration,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

/// Gateway to Azure OpenAI chat completions.
pub struct AzureOpenAiGateway {
    client: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    settings: AzureOpenAiSettings,
}

impl AzureOpenAiGateway {
    pub fn new(
        client: reqwest::Client,
        credential: Arc<dyn TokenCredential>,
        settings: AzureOpenAiSettings,
    ) -> Self {
        Self {
            client,
            credential,
            settings,
        }
    }

    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model,
            self.settings.api_version
        )
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::ConnectionError(e.to_string())
    }
}

#[async_trait]
impl CompletionGateway for AzureOpenAiGateway {
    async fn complete(
        &self,
        history: &[Message],
        functions: &[FunctionSpec],
    ) -> Result<Message, GatewayError> {
        let token = self.credential.get_token().await?;
        let body = ChatCompletionRequest::new(
            self.settings.system_prompt.as_deref(),
            history,
            functions,
            self.settings.temperature,
        );
        let url = self.completions_url();
        debug!(
            "Completion request to deployment '{}' ({} messages, {} functions)",
            self.settings.model,
            body.messages.len(),
            body.tools.len()
        );
        trace!(
            "Completion request body: {}",
            serde_json::to_string(&body).unwrap_or_default()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.secret())
            .timeout(self.settings.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            warn!("Completion service returned HTTP {}", status);
            return Err(GatewayError::Http { status, body: text });
        }
        trace!("Completion response body: {}", text);

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::MalformedResponse("response has no choices".into()))?;
        if choice.finish_reason.as_deref() == Some("length") {
            warn!("Completion was cut off by the token limit");
        }

        let message = Message::from(choice.message);
        debug!(
            "Completion returned {} chars and {} tool calls",
            message.content.len(),
            message.tool_calls.len()
        );
        Ok(message)
    }
}
