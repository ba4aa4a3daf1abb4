//! Built-in specialist agents and their registration table.
//!
//! Specialists differ only in instruction text and in how they build
//! their prompt and result; control flow lives in the coordinator.

pub mod calculator;
pub mod data_analyst;
pub mod law_expert;
pub mod risk_analyst;
pub mod strategist;

pub use calculator::CalculatorAgent;
pub use data_analyst::DataAnalystAgent;
pub use law_expert::LawExpertAgent;
pub use risk_analyst::RiskAnalystAgent;
pub use strategist::StrategistAgent;

use super::{Agent, AgentDescriptor};
use crate::models::{excerpt, record, AgentOutput, ConfigMap};
use serde_json::json;
use std::sync::Arc;

pub const LAW_EXPERT: &str = "law_expert";
pub const CALCULATOR: &str = "calculator";
pub const RISK_ANALYST: &str = "risk_analyst";
pub const STRATEGIST: &str = "strategist";
pub const DATA_ANALYST: &str = "data_analyst";

fn defaults(description: &str, temperature: f64) -> ConfigMap {
    record([
        ("description", json!(description)),
        ("temperature", json!(temperature)),
    ])
}

/// Registration table for the five built-in specialists, in priority order.
pub fn builtin_descriptors() -> Vec<AgentDescriptor> {
    vec![
        AgentDescriptor::new(
            LAW_EXPERT,
            |settings| Arc::new(LawExpertAgent::new(settings)) as Arc<dyn Agent>,
            defaults("Statute search and interpretation specialist", 0.2),
        ),
        AgentDescriptor::new(
            CALCULATOR,
            |settings| Arc::new(CalculatorAgent::new(settings)) as Arc<dyn Agent>,
            defaults("Tax calculation and scenario simulation specialist", 0.1),
        ),
        AgentDescriptor::new(
            RISK_ANALYST,
            |settings| Arc::new(RiskAnalystAgent::new(settings)) as Arc<dyn Agent>,
            defaults("Tax audit risk assessment specialist", 0.3),
        ),
        AgentDescriptor::new(
            STRATEGIST,
            |settings| Arc::new(StrategistAgent::new(settings)) as Arc<dyn Agent>,
            defaults("Strategy synthesis specialist", 0.4),
        ),
        AgentDescriptor::new(
            DATA_ANALYST,
            |settings| Arc::new(DataAnalystAgent::new(settings)) as Arc<dyn Agent>,
            defaults("Tabular data profiling specialist", 0.2),
        ),
    ]
}

/// Render prior outputs as a labelled block, each result capped at `max_chars`.
fn prior_block<'a>(outputs: impl IntoIterator<Item = &'a AgentOutput>, max_chars: usize) -> String {
    outputs
        .into_iter()
        .map(|prev| format!("\n[{}]:\n{}", prev.agent_name, excerpt(&prev.result, max_chars)))
        .collect()
}
