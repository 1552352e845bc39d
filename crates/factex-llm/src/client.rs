//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use factex_core::{FactexError, LlmClient, LlmConfig, LlmError, Result};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// LLM client for any OpenAI-compatible `/chat/completions` endpoint.
///
/// Maps provider failures onto the typed [`LlmError`] kinds: HTTP 429 is
/// `RateLimited`, request timeouts are `Timeout`, 5xx and connection errors
/// are `Transient`, everything else is `Permanent`.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsClient {
    /// Build a client from config; the API key is read from the environment
    /// variable the config names.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            FactexError::config(format!(
                "missing API key: set the {} environment variable",
                config.api_key_env
            ))
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> std::result::Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            max_tokens: 1024,
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "calling LLM");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        seconds: timeout.as_secs(),
                    }
                } else {
                    LlmError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("LLM provider rate limited the request");
            return Err(LlmError::RateLimited);
        }
        if status.is_server_error() {
            return Err(LlmError::Transient(format!("provider returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Permanent(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Permanent(format!("malformed provider response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Permanent("provider returned no choices".to_string()))?;

        debug!(response_len = content.len(), "LLM response received");
        Ok(content)
    }
}
