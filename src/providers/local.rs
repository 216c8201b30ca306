//! Local inference service (OpenAI-style chat completions, streamed).

use super::prompt::{ChatMessage, PromptBuilder};
use super::stream::read_event_stream;
use super::{Backend, BackendError};
use crate::config::LocalBackendConfig;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    features: Features,
    options: GenerationOptions,
}

#[derive(Debug, Serialize)]
struct Features {
    web_search: bool,
}

#[derive(Debug, Serialize)]
struct GenerationOptions {
    num_ctx: u32,
    temperature: f64,
}

pub struct LocalBackend {
    api_url: String,
    api_key: String,
    model: String,
    num_ctx: u32,
    temperature: f64,
    prompt: PromptBuilder,
    client: reqwest::Client,
}

impl LocalBackend {
    pub fn new(config: &LocalBackendConfig, prompt: PromptBuilder) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.trim().to_string(),
            model: config.model.clone(),
            num_ctx: config.num_ctx,
            temperature: config.temperature,
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

    fn request_body(&self, query: &str, context: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: self.prompt.local_messages(query, context),
            stream: true,
            // The gateway already did retrieval; the model must not search again.
            features: Features { web_search: false },
            options: GenerationOptions {
                num_ctx: self.num_ctx,
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn generate(&self, query: &str, context: &str) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::MissingCredentials);
        }
        tracing::info!(model = %self.model, "Generating on local backend");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(query, context))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Local backend returned {status}: {body}");
            return Err(BackendError::Status(status.as_u16()));
        }

        let text = read_event_stream(response).await?;
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(text)
    }
}
