//! Remote hosted generation service.

use super::prompt::PromptBuilder;
use super::stream::read_event_stream;
use super::{mask_secret, Backend, BackendError};
use crate::config::ExternalBackendConfig;
use async_trait::async_trait;
use reqwest::multipart::Form;

pub struct ExternalBackend {
    api_url: String,
    api_key: String,
    channel_id: String,
    prompt: PromptBuilder,
    client: reqwest::Client,
}

impl ExternalBackend {
    pub fn new(config: &ExternalBackendConfig, prompt: PromptBuilder) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.trim().to_string(),
            channel_id: config.channel_id.clone(),
            prompt,
            // Per-read, not total: a stream may outlast the timeout while tokens
            // keep arriving.
            client: reqwest::Client::builder()
                .connect_timeout(config.timeout())
                .read_timeout(config.timeout())
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn form(&self, message: String) -> Form {
        Form::new()
            .text("channel_id", self.channel_id.clone())
            .text("thread_id", format!("req-{}", uuid::Uuid::new_v4()))
            .text("user_info", "{}")
            .text("message", message)
    }
}

#[async_trait]
impl Backend for ExternalBackend {
    fn name(&self) -> &str {
        "external"
    }

    async fn generate(&self, query: &str, context: &str) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::MissingCredentials);
        }
        tracing::debug!(key = %mask_secret(&self.api_key), "Calling external backend");

        let message = self.prompt.external_message(query, context);
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .multipart(self.form(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("External backend returned {status}: {body}");
            return Err(BackendError::Status(status.as_u16()));
        }

        let text = read_event_stream(response).await?;
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(text)
    }
}
