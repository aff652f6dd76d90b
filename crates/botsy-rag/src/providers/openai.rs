//! OpenAI-compatible chat completions provider (OpenAI, Groq, vLLM, ...)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::llm::{retry_with_backoff, ChatPrompt, LlmProvider, PromptMessage};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions over `{base_url}/chat/completions`
pub struct OpenAiCompatibleLlm {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OpenAiCompatibleLlm {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleLlm {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let url = url.as_str();

        retry_with_backoff(self.max_retries, RETRY_BASE_DELAY, "chat completion", || async move {
            let request = CompletionRequest {
                model: &self.model,
                messages: &prompt.messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let response = self
                .authorized(self.client.post(url))
                .json(&request)
                .send()
                .await
                .map_err(|e| Error::generation(format!("Completion request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::generation(format!(
                    "Completion failed: HTTP {} - {}",
                    status, body
                )));
            }

            let body: CompletionResponse = response
                .json()
                .await
                .map_err(|e| Error::generation(format!("Failed to parse completion: {}", e)))?;

            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| Error::generation("Completion contained no choices"))
        })
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        match self.authorized(self.client.get(&url)).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
