//! Language-completion service abstraction.
//!
//! Agents talk to a model only through [`CompletionService`]; the
//! production implementation is the Ollama chat client.

pub mod ollama;

pub use ollama::{OllamaClient, OllamaConfig};

use async_trait::async_trait;
use thiserror::Error;

/// One completion round trip: system instructions plus a user message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    /// Per-agent sampling temperature; `None` uses the service default.
    pub temperature: Option<f32>,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(system: &'a str, user: &'a str) -> Self {
        Self {
            system,
            user,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Failures a completion service may report.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("TimeoutError: {0}")]
    Timeout(String),

    #[error("cannot connect to completion service at {0}")]
    Connect(String),

    #[error("completion service error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode completion response: {0}")]
    Decode(String),

    #[error("completion request failed: {0}")]
    Request(String),
}

/// Asynchronous text completion. Implementations may be slow and may fail.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError>;

    /// Human-readable identifier of the backing model.
    fn model_name(&self) -> &str;
}
