//! Data models shared by agents, the coordinator and synthesis.
//!
//! This module contains the structured inputs and outputs exchanged
//! between agents, plus the introspection records exposed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A free-form key/value record (sources, chart rows, metadata, configs).
pub type Record = serde_json::Map<String, Value>;

/// Agent configuration maps use the same representation as records.
pub type ConfigMap = Record;

/// Confidence assigned to outputs that don't set one explicitly.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Clamp a self-reported confidence into `[0, 1]`. NaN counts as failure.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Return at most `max_chars` characters of `text`, never splitting a code point.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build a record from string keys and JSON values.
pub fn record<I, K>(entries: I) -> Record
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Input handed to a single agent step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInput {
    /// The user's original question.
    pub query: String,
    /// Shared context: caller-supplied entries plus one entry per finished agent.
    #[serde(default)]
    pub context: Record,
    /// Outputs of the agents that ran before this one, in execution order.
    #[serde(default)]
    pub previous_results: Vec<AgentOutput>,
    /// Session the request belongs to, if any.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AgentInput {
    #[cfg(test)]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// First prior output produced by `agent_name`, if that agent already ran.
    pub fn previous(&self, agent_name: &str) -> Option<&AgentOutput> {
        self.previous_results
            .iter()
            .find(|r| r.agent_name == agent_name)
    }

    /// Text value stored under `key` in the shared context.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}

/// Chart type tag for a visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    Bar,
    Pie,
    Line,
    Heatmap,
    Table,
    Compare,
}

impl fmt::Display for VisualizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisualizationKind::Bar => "bar",
            VisualizationKind::Pie => "pie",
            VisualizationKind::Line => "line",
            VisualizationKind::Heatmap => "heatmap",
            VisualizationKind::Table => "table",
            VisualizationKind::Compare => "compare",
        };
        write!(f, "{}", name)
    }
}

/// Chart description attached to an agent output. Pure data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    #[serde(rename = "type")]
    pub kind: VisualizationKind,
    pub title: String,
    #[serde(default)]
    pub data: Vec<Record>,
    #[serde(default)]
    pub insight: String,
}

/// Structured result of one agent step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Name of the agent that produced this output.
    pub agent_name: String,
    /// Main analysis text.
    pub result: String,
    /// Self-reported reliability in `[0, 1]`; 0 means failed/unusable.
    pub confidence: f64,
    /// Short description of how the result was reached.
    #[serde(default)]
    pub reasoning: String,
    /// Reference records backing the result.
    #[serde(default)]
    pub sources: Vec<Record>,
    /// Agent-specific metadata (`error: true` marks degraded outputs).
    #[serde(default)]
    pub metadata: Record,
    /// Wall-clock duration of the step, filled in by the coordinator.
    #[serde(default)]
    pub duration_ms: u64,
    /// When the output was produced.
    pub timestamp: DateTime<Utc>,
    /// Charts the presentation layer may render.
    #[serde(default)]
    pub visualizations: Vec<Visualization>,
}

impl AgentOutput {
    /// Creates an output with the default confidence.
    pub fn new(agent_name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            result: result.into(),
            confidence: DEFAULT_CONFIDENCE,
            reasoning: String::new(),
            sources: Vec::new(),
            metadata: Record::new(),
            duration_ms: 0,
            timestamp: Utc::now(),
            visualizations: Vec::new(),
        }
    }

    /// Creates the degraded output recorded when an agent step fails.
    pub fn failed(agent_name: impl Into<String>, error: impl fmt::Display) -> Self {
        let mut output = Self::new(agent_name, format!("Agent execution failed: {}", error))
            .with_confidence(0.0)
            .with_reasoning(format!("Error: {}", error));
        output.metadata.insert("error".to_string(), Value::Bool(true));
        output
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_source(mut self, source: Record) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_visualization(mut self, visualization: Visualization) -> Self {
        self.visualizations.push(visualization);
        self
    }

    /// True when the output is a degraded failure record.
    pub fn is_failed(&self) -> bool {
        self.confidence <= 0.0
            || self
                .metadata
                .get("error")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// The slice of this output later agents see through the shared context.
    pub fn context_entry(&self) -> Value {
        serde_json::json!({
            "result": self.result,
            "confidence": self.confidence,
            "sources": self.sources,
        })
    }
}

/// Severity glyph for an output, derived from its confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Below 0.4
    Fail,
    /// 0.4 up to 0.7
    Warn,
    /// 0.7 and above
    Pass,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.7 {
            ConfidenceLevel::Pass
        } else if confidence >= 0.4 {
            ConfidenceLevel::Warn
        } else {
            ConfidenceLevel::Fail
        }
    }

    /// Returns an emoji representation of the level.
    pub fn emoji(&self) -> &'static str {
        match self {
            ConfidenceLevel::Pass => "✅",
            ConfidenceLevel::Warn => "⚠️",
            ConfidenceLevel::Fail => "❌",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::Pass => write!(f, "Pass"),
            ConfidenceLevel::Warn => write!(f, "Warn"),
            ConfidenceLevel::Fail => write!(f, "Fail"),
        }
    }
}

/// Lightweight record of one executed agent step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub agent_name: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub confidence: f64,
}

impl From<&AgentOutput> for ExecutionTrace {
    fn from(output: &AgentOutput) -> Self {
        Self {
            agent_name: output.agent_name.clone(),
            timestamp: Utc::now(),
            duration_ms: output.duration_ms,
            confidence: output.confidence,
        }
    }
}

/// Descriptor view returned to administrative callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub config: ConfigMap,
    pub has_instance: bool,
}

/// Coarse lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered, no instance constructed yet.
    Registered,
    /// Registered and a singleton instance is cached.
    Cached,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Registered => write!(f, "registered"),
            AgentStatus::Cached => write!(f, "cached"),
        }
    }
}
