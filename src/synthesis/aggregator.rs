//! Aggregation helpers over a sequence of agent outputs.

use crate::models::{AgentOutput, ConfidenceLevel, ExecutionTrace, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate confidence used when every output failed.
///
/// Total failure and neutral uncertainty share this value.
pub const ALL_FAILED_CONFIDENCE: f64 = 0.5;

/// Mean confidence over the outputs with confidence above zero.
///
/// Returns [`ALL_FAILED_CONFIDENCE`] when no output is usable.
pub fn aggregate_confidence(outputs: &[AgentOutput]) -> f64 {
    let usable: Vec<f64> = outputs
        .iter()
        .map(|o| o.confidence)
        .filter(|c| *c > 0.0)
        .collect();

    if usable.is_empty() {
        ALL_FAILED_CONFIDENCE
    } else {
        usable.iter().sum::<f64>() / usable.len() as f64
    }
}

/// Flatten every output's sources into one sequence, keeping order and duplicates.
pub fn collect_sources(outputs: &[AgentOutput]) -> Vec<Record> {
    outputs.iter().flat_map(|o| o.sources.clone()).collect()
}

/// The most recent `n` traces, oldest first.
pub fn recent_traces(traces: &[ExecutionTrace], n: usize) -> Vec<ExecutionTrace> {
    traces[traces.len().saturating_sub(n)..].to_vec()
}

/// Group outputs by their confidence level.
pub fn group_by_level(outputs: &[AgentOutput]) -> HashMap<ConfidenceLevel, Vec<&AgentOutput>> {
    let mut grouped: HashMap<ConfidenceLevel, Vec<&AgentOutput>> = HashMap::new();

    for output in outputs {
        grouped
            .entry(ConfidenceLevel::from_confidence(output.confidence))
            .or_default()
            .push(output);
    }

    grouped
}

/// Pass/warn/fail counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub pass: usize,
    pub warn: usize,
    pub fail: usize,
}

impl LevelSummary {
    pub fn from_outputs(outputs: &[AgentOutput]) -> Self {
        let grouped = group_by_level(outputs);
        let count = |level| grouped.get(&level).map_or(0, Vec::len);

        Self {
            pass: count(ConfidenceLevel::Pass),
            warn: count(ConfidenceLevel::Warn),
            fail: count(ConfidenceLevel::Fail),
        }
    }

    pub fn total(&self) -> usize {
        self.pass + self.warn + self.fail
    }
}

/// Total wall-clock time spent inside agents.
pub fn total_duration_ms(outputs: &[AgentOutput]) -> u64 {
    outputs.iter().map(|o| o.duration_ms).sum()
}
