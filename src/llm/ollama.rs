//! Ollama chat API client.

use super::{CompletionError, CompletionRequest, CompletionService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection settings for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.3,
            max_tokens: Some(4000),
            timeout_seconds: 300,
        }
    }
}

/// Message in the chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Completion service backed by a local or remote Ollama server.
pub struct OllamaClient {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, CompletionError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'))
    }

    fn build_request(&self, request: &CompletionRequest<'_>) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                num_predict: self.config.max_tokens,
            },
        }
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError> {
        let url = self.chat_url();
        let body = self.build_request(&request);

        debug!(
            "Sending completion request ({} system chars, {} user chars)",
            request.system.chars().count(),
            request.user.chars().count()
        );

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(format!(
                        "request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else if e.is_connect() {
                    CompletionError::Connect(self.config.ollama_url.clone())
                } else {
                    CompletionError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Decode(e.to_string()))?;

        Ok(chat_response.message.content)
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
