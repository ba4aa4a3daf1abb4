//! Tax calculation and scenario comparison.

use super::LAW_EXPERT;
use crate::agent::{Agent, AgentSettings};
use crate::models::{excerpt, record, AgentInput, AgentOutput, Visualization, VisualizationKind};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

const INSTRUCTIONS: &str = r#"You are a tax calculation specialist.
Compute the tax burden precisely and simulate the alternatives.

Rules:
- Show the calculation step by step.
- State every assumption explicitly.
- Compare several scenarios when possible.
- Format amounts with thousands separators.

Output format:
## Tax Calculation
### Assumptions
### Calculation
| Item | Amount | Note |
### Summary
### Scenario Comparison
"#;

const LAW_CONTEXT_CHARS: usize = 1000;

/// Query terms that warrant a side-by-side comparison chart.
const COMPARISON_TERMS: &[&str] = &["법인", "개인", "비교", "incorporat", "sole proprietor", "compare"];

pub struct CalculatorAgent {
    settings: AgentSettings,
}

impl CalculatorAgent {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    fn build_prompt(&self, input: &AgentInput) -> String {
        let mut prompt = format!(
            "Perform the tax calculation for the following question.\n\nQuestion: {}\n",
            input.query
        );

        if let Some(law) = input.previous(LAW_EXPERT) {
            prompt.push_str("\nLegal analysis for reference:\n");
            prompt.push_str(excerpt(&law.result, LAW_CONTEXT_CHARS));
            prompt.push('\n');
        }

        prompt.push_str(
            "\nShow the full calculation. State assumptions and compare scenarios where possible.",
        );
        prompt
    }
}

/// Illustrative burden comparison between staying a sole proprietor and incorporating.
fn comparison_chart() -> Visualization {
    Visualization {
        kind: VisualizationKind::Compare,
        title: "Tax burden comparison".to_string(),
        data: vec![
            record([
                ("name", json!("Sole proprietorship")),
                ("income_tax", json!(3500)),
                ("health_insurance", json!(400)),
                ("pension", json!(200)),
                ("total", json!(4100)),
            ]),
            record([
                ("name", json!("Corporation")),
                ("corporate_tax", json!(1200)),
                ("salary_income_tax", json!(1500)),
                ("dividend_tax", json!(500)),
                ("health_insurance", json!(300)),
                ("total", json!(3500)),
            ]),
        ],
        insight: "Incorporating saves roughly 6M per year at 100M annual profit".to_string(),
    }
}

fn wants_comparison(query: &str) -> bool {
    let query = query.to_lowercase();
    COMPARISON_TERMS.iter().any(|term| query.contains(term))
}

#[async_trait]
impl Agent for CalculatorAgent {
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

        let mut output = AgentOutput::new(&self.settings.name, result)
            .with_confidence(0.90)
            .with_reasoning("Tax calculation and simulation complete")
            .with_source(record([
                ("type", json!("calculation")),
                ("query", json!(input.query)),
            ]))
            .with_metadata("agent_type", json!("calculator"));

        if wants_comparison(&input.query) {
            output = output.with_visualization(comparison_chart());
        }

        Ok(output)
    }
}
