//! Agents: the capability contract, the registry and the built-in specialists.

pub mod registry;
pub mod specialists;

pub use registry::{AgentDescriptor, AgentRegistry, RegistryError};

use crate::llm::{CompletionRequest, CompletionService};
use crate::models::{AgentInput, AgentOutput, ConfigMap};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Contract every agent variant implements.
///
/// Instances are shared across requests by the registry, so implementations
/// must keep no per-request mutable state; everything a step needs arrives
/// in its [`AgentInput`].
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registered name of this agent.
    fn name(&self) -> &str;

    /// Fixed guidance text steering the completion service.
    fn instructions(&self) -> &str;

    /// Run one query-answering step.
    ///
    /// An `Err` (or a panic) is recovered by the coordinator and recorded as
    /// a zero-confidence output; it never aborts the pipeline.
    async fn execute(&self, input: &AgentInput) -> Result<AgentOutput>;
}

/// Everything a factory needs to construct an agent instance.
#[derive(Clone)]
pub struct AgentSettings {
    pub name: String,
    pub description: String,
    /// Default configuration merged with any caller override.
    pub config: ConfigMap,
    pub llm: Option<Arc<dyn CompletionService>>,
}

impl AgentSettings {
    /// Sampling temperature from the `temperature` config key.
    pub fn temperature(&self) -> Option<f32> {
        self.config
            .get("temperature")
            .and_then(Value::as_f64)
            .map(|t| t as f32)
    }

    /// Send one prompt to the completion service.
    ///
    /// A missing service or a failed call comes back as the degraded output
    /// the agent should return as-is.
    pub async fn consult(&self, instructions: &str, prompt: &str) -> Result<String, AgentOutput> {
        let Some(llm) = self.llm.as_ref() else {
            return Err(AgentOutput::new(&self.name, "Completion service is not configured.")
                .with_confidence(0.0)
                .with_reasoning("completion service not configured"));
        };

        let request = CompletionRequest::new(instructions, prompt).with_temperature(self.temperature());
        llm.complete(request).await.map_err(|e| {
            warn!("Agent {} completion failed: {}", self.name, e);
            AgentOutput::failed(&self.name, &e)
        })
    }
}

impl std::fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSettings")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("config", &self.config)
            .field("llm", &self.llm.as_ref().map(|l| l.model_name().to_string()))
            .finish()
    }
}
