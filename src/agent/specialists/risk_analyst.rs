//! Tax audit risk assessment.

use super::{prior_block, CALCULATOR, LAW_EXPERT};
use crate::agent::{Agent, AgentSettings};
use crate::models::{record, AgentInput, AgentOutput, Visualization, VisualizationKind};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

const INSTRUCTIONS: &str = r#"You are a tax audit risk analyst.
Identify and rate the tax risks in the situation described.

Rules:
- Rate each risk high, medium or low.
- Describe concrete risk scenarios.
- Propose mitigations.
- Point out what typically triggers an audit.

Output format:
## Risk Analysis
### Identified Risks
| Risk | Level | Likelihood |
### Details
### Audit Triggers
### Mitigations
"#;

const PRIOR_CHARS: usize = 800;

pub struct RiskAnalystAgent {
    settings: AgentSettings,
}

impl RiskAnalystAgent {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    fn build_prompt(&self, input: &AgentInput) -> String {
        let relevant = input
            .previous_results
            .iter()
            .filter(|prev| prev.agent_name == LAW_EXPERT || prev.agent_name == CALCULATOR);
        let earlier = prior_block(relevant, PRIOR_CHARS);

        let mut prompt = format!(
            "Analyze the tax risks of the following situation.\n\nSituation: {}\n",
            input.query
        );
        if !earlier.is_empty() {
            prompt.push_str("\nEarlier findings:");
            prompt.push_str(&earlier);
            prompt.push('\n');
        }
        prompt.push_str("\nIdentify the risks, rate each one and propose mitigations.");
        prompt
    }
}

fn risk_heatmap() -> Visualization {
    let items = [
        ("Unreported revenue", "high", "high", 9),
        ("Overstated expenses", "high", "medium", 6),
        ("Missing tax invoices", "medium", "medium", 4),
        ("Unsettled shareholder loans", "medium", "low", 2),
        ("Incomplete documentation", "low", "low", 1),
    ];

    Visualization {
        kind: VisualizationKind::Heatmap,
        title: "Risk heatmap".to_string(),
        data: items
            .iter()
            .map(|(id, probability, impact, score)| {
                record([
                    ("id", json!(id)),
                    ("probability", json!(probability)),
                    ("impact", json!(impact)),
                    ("score", json!(score)),
                ])
            })
            .collect(),
        insight: "Check suspected unreported revenue first".to_string(),
    }
}

#[async_trait]
impl Agent for RiskAnalystAgent {
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

        Ok(AgentOutput::new(&self.settings.name, result)
            .with_confidence(0.80)
            .with_reasoning("Risk identification and rating complete")
            .with_source(record([
                ("type", json!("risk_analysis")),
                ("query", json!(input.query)),
            ]))
            .with_metadata("agent_type", json!("risk_analyst"))
            .with_visualization(risk_heatmap()))
    }
}
