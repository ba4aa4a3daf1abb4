//! Synthesis: merges the per-agent outputs of one request into a single
//! report and one aggregate confidence score.

pub mod aggregator;

pub use aggregator::{aggregate_confidence, collect_sources, recent_traces, LevelSummary};

use crate::models::{excerpt, AgentOutput, ConfidenceLevel, ExecutionTrace, Record};
use serde::{Deserialize, Serialize};

/// Report text returned when nothing ran.
pub const EMPTY_REPORT: &str = "No analysis results.";

/// Formatting knobs for the synthesized report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Maximum characters of each agent's reasoning shown in the report.
    pub reasoning_excerpt_chars: usize,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            reasoning_excerpt_chars: 200,
        }
    }
}

/// Result of synthesizing one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub report: String,
    pub confidence: f64,
    pub agent_count: usize,
    pub sources: Vec<Record>,
    /// The traces of the outputs that were synthesized.
    pub traces: Vec<ExecutionTrace>,
    pub levels: LevelSummary,
}

/// Build the report and aggregate confidence for `outputs`, in execution order.
pub fn synthesize(
    query: &str,
    outputs: &[AgentOutput],
    traces: &[ExecutionTrace],
    options: &SynthesisOptions,
) -> Synthesis {
    if outputs.is_empty() {
        return Synthesis {
            report: EMPTY_REPORT.to_string(),
            confidence: 0.0,
            agent_count: 0,
            sources: Vec::new(),
            traces: Vec::new(),
            levels: LevelSummary::default(),
        };
    }

    let confidence = aggregate_confidence(outputs);

    let mut report = String::new();
    report.push_str("## 📊 Combined Analysis Report\n\n");
    report.push_str(&format!("**Question:** {}\n\n", query));
    report.push_str(&format!("**Agents consulted:** {}\n\n", outputs.len()));
    report.push_str(&format!(
        "**Overall confidence:** {:.0}%\n\n",
        confidence * 100.0
    ));
    report.push_str("---\n\n");

    for output in outputs {
        report.push_str(&agent_section(output, options.reasoning_excerpt_chars));
    }

    Synthesis {
        report,
        confidence,
        agent_count: outputs.len(),
        sources: collect_sources(outputs),
        traces: recent_traces(traces, outputs.len()),
        levels: LevelSummary::from_outputs(outputs),
    }
}

/// One section per agent output.
fn agent_section(output: &AgentOutput, reasoning_chars: usize) -> String {
    let mut section = String::new();
    let level = ConfidenceLevel::from_confidence(output.confidence);

    section.push_str(&format!("### {} {}\n\n", level.emoji(), output.agent_name));
    section.push_str(&format!(
        "**Confidence:** {:.0}%\n\n",
        output.confidence * 100.0
    ));
    section.push_str(&output.result);
    section.push_str("\n\n");

    if !output.reasoning.is_empty() {
        let shown = excerpt(&output.reasoning, reasoning_chars);
        let ellipsis = if shown.len() < output.reasoning.len() {
            "..."
        } else {
            ""
        };
        section.push_str(&format!("*Reasoning: {}{}*\n\n", shown, ellipsis));
    }

    section.push_str("---\n\n");
    section
}
