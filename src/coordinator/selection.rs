//! Agent selection: which agents run for a query, and in what order.

use crate::agent::specialists::{CALCULATOR, DATA_ANALYST, LAW_EXPERT, RISK_ANALYST, STRATEGIST};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Ordered agent names chosen for a query, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub agents: Vec<String>,
    pub reason: String,
}

/// Decides the agent sequence for a query.
///
/// Implementations must be deterministic for a given query and set of
/// available agents.
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    async fn select(&self, query: &str, available: &[String]) -> Selection;
}

/// Keyword set that pulls one agent into the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub agent: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(agent: &str, keywords: &[&str]) -> Self {
        Self {
            agent: agent.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, query_lower: &str) -> bool {
        self.keywords.iter().any(|kw| query_lower.contains(kw.as_str()))
    }
}

/// Rule-based selection by case-insensitive substring match.
///
/// Rules are evaluated in priority order. When nothing matches, the default
/// order is used. The final synthesizer is appended last whenever at least
/// two other agents were chosen without it.
#[derive(Debug, Clone)]
pub struct KeywordSelector {
    rules: Vec<KeywordRule>,
    default_order: Vec<String>,
    final_synthesizer: Option<String>,
}

impl Default for KeywordSelector {
    fn default() -> Self {
        Self::new(default_rules(), default_order())
    }
}

impl KeywordSelector {
    pub fn new(rules: Vec<KeywordRule>, default_order: Vec<String>) -> Self {
        Self {
            rules,
            default_order,
            final_synthesizer: Some(STRATEGIST.to_string()),
        }
    }

    /// Replace the fallback order used when no keyword matches.
    pub fn with_default_order(mut self, default_order: Vec<String>) -> Self {
        self.default_order = default_order;
        self
    }

    /// Synchronous core of the policy.
    pub fn select_agents(&self, query: &str, available: &[String]) -> Selection {
        if available.is_empty() {
            return Selection {
                agents: self.default_order.clone(),
                reason: "No agents registered; using default order".to_string(),
            };
        }

        let is_available = |name: &str| available.iter().any(|a| a == name);
        let query_lower = query.to_lowercase();

        let mut selected: Vec<String> = Vec::new();
        for rule in &self.rules {
            if is_available(&rule.agent)
                && !selected.contains(&rule.agent)
                && rule.matches(&query_lower)
            {
                selected.push(rule.agent.clone());
            }
        }

        let matched = !selected.is_empty();
        if !matched {
            selected = self
                .default_order
                .iter()
                .filter(|name| is_available(name))
                .cloned()
                .collect();
        }

        if let Some(synthesizer) = &self.final_synthesizer {
            if is_available(synthesizer) && !selected.contains(synthesizer) && selected.len() >= 2 {
                selected.push(synthesizer.clone());
            }
        }

        let reason = if matched {
            format!("Keyword match: {}", selected.join(", "))
        } else {
            format!("No keyword match; default order: {}", selected.join(", "))
        };

        Selection {
            agents: selected,
            reason,
        }
    }
}

#[async_trait]
impl SelectionStrategy for KeywordSelector {
    async fn select(&self, query: &str, available: &[String]) -> Selection {
        self.select_agents(query, available)
    }
}

/// Fallback order when no keyword matches.
pub fn default_order() -> Vec<String> {
    [LAW_EXPERT, CALCULATOR, RISK_ANALYST, STRATEGIST]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Keyword sets in role priority order.
pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new(
            LAW_EXPERT,
            &["법", "조문", "규정", "법령", "시행령", "세법", "statute", "legal", "regulation"],
        ),
        KeywordRule::new(
            CALCULATOR,
            &["계산", "세금", "세액", "얼마", "금액", "비교", "시뮬", "calculat", "how much", "amount", "compare"],
        ),
        KeywordRule::new(
            RISK_ANALYST,
            &["리스크", "위험", "조사", "문제", "주의", "감사", "risk", "audit", "penalt"],
        ),
        KeywordRule::new(
            DATA_ANALYST,
            &["데이터", "csv", "dataset", "spreadsheet"],
        ),
        KeywordRule::new(
            STRATEGIST,
            &["전략", "방법", "어떻게", "추천", "유리", "vs", "선택", "strateg", "recommend", "should i"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_agents() -> Vec<String> {
        [LAW_EXPERT, CALCULATOR, RISK_ANALYST, STRATEGIST, DATA_ANALYST]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_law_and_calculator_get_strategist() {
        let selection = KeywordSelector::default().select_agents("법인 전환시 세금 비교", &all_agents());
        assert_eq!(selection.agents, vec![LAW_EXPERT, CALCULATOR, STRATEGIST]);
        assert!(selection.reason.starts_with("Keyword match"));
    }

    #[test]
    fn test_no_match_uses_default_order() {
        let selection = KeywordSelector::default().select_agents("hello there", &all_agents());
        assert_eq!(
            selection.agents,
            vec![LAW_EXPERT, CALCULATOR, RISK_ANALYST, STRATEGIST]
        );
    }

    #[test]
    fn test_empty_registry_returns_unfiltered_default() {
        let selection = KeywordSelector::default().select_agents("세금", &[]);
        assert_eq!(selection.agents, default_order());
        assert!(selection.reason.contains("No agents registered"));
    }

    #[test]
    fn test_single_match_does_not_add_strategist() {
        let selection = KeywordSelector::default().select_agents("세금 얼마", &all_agents());
        assert_eq!(selection.agents, vec![CALCULATOR]);
    }

    #[test]
    fn test_strategist_keyword_keeps_single_occurrence() {
        let selection =
            KeywordSelector::default().select_agents("Legal RISK strategy", &all_agents());
        assert_eq!(selection.agents, vec![LAW_EXPERT, RISK_ANALYST, STRATEGIST]);
        assert_eq!(
            selection.agents.iter().filter(|a| *a == STRATEGIST).count(),
            1
        );
    }

    #[test]
    fn test_filtered_by_availability() {
        let available = vec![CALCULATOR.to_string(), RISK_ANALYST.to_string()];
        let selection = KeywordSelector::default().select_agents("법 세금 리스크", &available);
        assert_eq!(selection.agents, vec![CALCULATOR, RISK_ANALYST]);

        let selection = KeywordSelector::default().select_agents("nothing here", &available);
        assert_eq!(selection.agents, vec![CALCULATOR, RISK_ANALYST]);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let selector = KeywordSelector::default();
        let first = selector.select_agents("세무조사 위험과 전략", &all_agents());
        let second = selector.select_agents("세무조사 위험과 전략", &all_agents());
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_default_order() {
        let selector = KeywordSelector::default()
            .with_default_order(vec![RISK_ANALYST.to_string(), LAW_EXPERT.to_string()]);
        let selection = selector.select_agents("hi", &all_agents());
        assert_eq!(selection.agents, vec![RISK_ANALYST, LAW_EXPERT, STRATEGIST]);
    }

    #[tokio::test]
    async fn test_strategy_trait_delegates() {
        let selector: Box<dyn SelectionStrategy> = Box::new(KeywordSelector::default());
        let selection = selector.select("csv 데이터", &all_agents()).await;
        assert_eq!(selection.agents, vec![DATA_ANALYST]);
    }
}
