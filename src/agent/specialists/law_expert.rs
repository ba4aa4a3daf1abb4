//! Statute search and interpretation.

use super::prior_block;
use crate::agent::{Agent, AgentSettings};
use crate::models::{record, AgentInput, AgentOutput};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

const INSTRUCTIONS: &str = r#"You are a tax-law specialist.
Find the statutes relevant to the question and cite the exact articles that support your answer.

Rules:
- Always name the legal basis (act and article number).
- Mark anything you are unsure about as "needs confirmation".
- Answer according to the law currently in force.
- Cite rulings or official interpretations when they exist.

Output format:
## Legal Analysis
### Relevant Statutes
### Key Points
### Conditions of Application
### Cautions
"#;

/// Prior results are quoted up to this many characters each.
const PRIOR_CHARS: usize = 500;

pub struct LawExpertAgent {
    settings: AgentSettings,
}

impl LawExpertAgent {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    fn build_prompt(&self, input: &AgentInput) -> String {
        let mut prompt = format!(
            "Analyze the statutes relevant to the following question.\n\nQuestion: {}\n",
            input.query
        );

        if !input.previous_results.is_empty() {
            prompt.push_str("\nEarlier findings:");
            prompt.push_str(&prior_block(&input.previous_results, PRIOR_CHARS));
            prompt.push('\n');
        }

        prompt.push_str("\nGive a detailed analysis with its legal basis.");
        prompt
    }
}

#[async_trait]
impl Agent for LawExpertAgent {
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
            .with_confidence(0.85)
            .with_reasoning("Statute search and article analysis complete")
            .with_source(record([
                ("type", json!("law_analysis")),
                ("query", json!(input.query)),
            ]))
            .with_metadata("agent_type", json!("law_expert")))
    }
}
