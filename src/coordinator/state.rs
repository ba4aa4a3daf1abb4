//! Per-request execution state.
//!
//! `Analyze -> ExecuteAgent -> Synthesize -> Done`. `ExecuteAgent` repeats
//! while the cursor has not reached the end of the selected order.

use crate::models::{AgentOutput, ExecutionTrace, Record};
use crate::synthesis::Synthesis;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyze,
    ExecuteAgent,
    Synthesize,
    Done,
}

/// Created once per request, mutated only by the coordinator, then discarded.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub query: String,
    pub session_id: Option<String>,
    /// Shared context, updated after every successful agent step.
    pub context: Record,
    /// Selected agent order.
    pub order: Vec<String>,
    pub selection_reason: String,
    /// Index of the next agent in `order` to run.
    pub cursor: usize,
    pub outputs: Vec<AgentOutput>,
    /// Execution history of this request only.
    pub traces: Vec<ExecutionTrace>,
    pub synthesis: Option<Synthesis>,
    pub phase: Phase,
    pub error: Option<String>,
}

impl ExecutionState {
    pub fn new(query: impl Into<String>, context: Record, session_id: Option<String>) -> Self {
        Self {
            query: query.into(),
            session_id,
            context,
            order: Vec::new(),
            selection_reason: String::new(),
            cursor: 0,
            outputs: Vec::new(),
            traces: Vec::new(),
            synthesis: None,
            phase: Phase::Analyze,
            error: None,
        }
    }

    /// State that skips selection and starts executing `order` directly.
    pub fn with_order(
        query: impl Into<String>,
        order: Vec<String>,
        context: Record,
        session_id: Option<String>,
    ) -> Self {
        let mut state = Self::new(query, context, session_id);
        state.order = order;
        state.phase = Phase::ExecuteAgent;
        state
    }

    /// Name of the agent the cursor points at.
    pub fn current_agent(&self) -> Option<&str> {
        self.order.get(self.cursor).map(String::as_str)
    }

    pub fn has_pending_agents(&self) -> bool {
        self.cursor < self.order.len()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Done
    }
}
