//! Final synthesizer: weighs the other specialists' findings into a recommendation.

use crate::agent::{Agent, AgentSettings};
use crate::models::{excerpt, record, AgentInput, AgentOutput};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

const INSTRUCTIONS: &str = r#"You are a tax strategy advisor.
Combine the other specialists' analyses into the best decision for the client.

Rules:
- Review every analysis provided.
- Weigh pros and cons evenly.
- Give a concrete, ordered action plan.
- Make priorities explicit.

Output format:
## Strategy Recommendation
### Overall Assessment
### Options
| Option | Pros | Cons | Rating |
### Final Recommendation
### Action Plan
### Cautions
"#;

const PRIOR_CHARS: usize = 1500;

/// Confidence used when there is nothing to synthesize from.
const BASE_CONFIDENCE: f64 = 0.7;

pub struct StrategistAgent {
    settings: AgentSettings,
}

impl StrategistAgent {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    fn build_prompt(&self, input: &AgentInput) -> String {
        let analyses = if input.previous_results.is_empty() {
            "No earlier analyses.".to_string()
        } else {
            input
                .previous_results
                .iter()
                .map(|prev| {
                    format!(
                        "### {} (confidence: {:.0}%)\n{}\n",
                        prev.agent_name,
                        prev.confidence * 100.0,
                        excerpt(&prev.result, PRIOR_CHARS)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "Build an overall strategy for the following question.\n\n## Question\n{}\n\n## Specialist analyses\n{}\n\nCombine these findings into the best decision and a practical action plan.",
            input.query, analyses
        )
    }
}

/// Slightly above the mean of the usable prior confidences, capped at 0.95.
fn synthesized_confidence(previous: &[AgentOutput]) -> f64 {
    let usable: Vec<f64> = previous
        .iter()
        .map(|p| p.confidence)
        .filter(|c| *c > 0.0)
        .collect();

    let mean = if usable.is_empty() {
        BASE_CONFIDENCE
    } else {
        usable.iter().sum::<f64>() / usable.len() as f64
    };

    (mean + 0.05).min(0.95)
}

#[async_trait]
impl Agent for StrategistAgent {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn instructions(&self) -> &str {
        INSTRUCTIONS
    }

    async fn execute(&self, input: &AgentInput) -> Result<AgentOutput> {
        let prompt = self.build_prompt(input);
        let result = match self.settings.consult(self.instructions(), &prompt).await {
            Ok(text) => text,
            Err(degraded) => return Ok(degraded),
        };

        let based_on = input.previous_results.len();
        Ok(AgentOutput::new(&self.settings.name, result)
            .with_confidence(synthesized_confidence(&input.previous_results))
            .with_reasoning(format!(
                "Strategy built from {} earlier analyses",
                based_on
            ))
            .with_source(record([
                ("type", json!("strategy")),
                ("based_on", json!(based_on)),
            ]))
            .with_metadata("agent_type", json!("strategist"))
            .with_metadata("synthesized_from", json!(based_on)))
    }
}
