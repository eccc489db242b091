//! OpenAI-compatible chat-completions provider
//!
//! One HTTP backend covers both hosted APIs and local servers (Ollama,
//! vLLM, llama.cpp all expose the same /chat/completions shape). The API
//! key is read from an environment variable named in config; when the
//! variable is unset the Authorization header is simply omitted, which is
//! what local servers expect.

use super::{ChatMessage, LLMError, LLMProvider, Result};
use crate::config::LlmConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

pub struct OpenAiCompatProvider {
    config: LlmConfig,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.config.api_key_env).ok().filter(|k| !k.is_empty())
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                })
            })
            .collect();

        let payload = json!({
            "model": self.config.model,
            "messages": api_messages,
        });

        tracing::debug!(
            "chat-completions request: model={}, messages={}",
            self.config.model,
            messages.len()
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&payload);

        if let Some(key) = self.api_key() {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout
            } else {
                LLMError::NetworkError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                _ => LLMError::InvalidRequest(text),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| LLMError::ParseError("No content in response".to_string()))?;

        Ok(content.to_string())
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        self.client
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
