//! Chat completion backends.
//!
//! [`OpenAIChat`] implements the core [`ChatBackend`] trait against
//! `POST {api_base}/chat/completions`. It makes exactly one request per
//! call: failures and timeouts are returned to the caller, never retried.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use lexrag_core::conversation::{ChatBackend, Completion};
use lexrag_core::models::ChatMessage;
use lexrag_core::{RagError, Result};

use crate::config::LlmConfig;
use crate::embedding::{api_key, API_KEY_ENV};

/// Chat backend using the OpenAI chat completions API.
pub struct OpenAIChat {
    endpoint: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = api_key().ok_or_else(|| {
            RagError::InvalidConfig(format!("{} environment variable not set", API_KEY_ENV))
        })?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Completion(e.to_string()))?;

        Ok(Self {
            endpoint: format!(
                "{}/chat/completions",
                config.api_base.trim_end_matches('/')
            ),
            api_key,
            timeout,
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[async_trait]
impl ChatBackend for OpenAIChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
    ) -> Result<Completion> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
        });
        debug!(model, messages = messages.len(), "sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::Timeout {
                        operation: "chat completion".to_string(),
                        after: self.timeout,
                    }
                } else {
                    RagError::Completion(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Completion(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::Completion(e.to_string()))?;
        parse_completion(json)
    }
}

fn parse_completion(json: serde_json::Value) -> Result<Completion> {
    let parsed: CompletionResponse = serde_json::from_value(json)
        .map_err(|e| RagError::Completion(format!("invalid response: {}", e)))?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| RagError::Completion("response contained no message".into()))?;
    Ok(Completion {
        text,
        total_tokens: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
    })
}

/// Create the [`ChatBackend`] named by `config.provider`.
pub fn create_chat_backend(config: &LlmConfig) -> Result<Box<dyn ChatBackend>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        other => Err(RagError::InvalidConfig(format!(
            "unknown llm provider: {}",
            other
        ))),
    }
}
