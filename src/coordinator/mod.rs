//! The coordinator: selects agents for a query, runs them in order with
//! shared context propagation, and hands the results to synthesis.
//!
//! Selection and execution are injected strategies. The coordinator itself
//! only drives the per-request [`ExecutionState`] through its phases.

pub mod execution;
pub mod selection;
pub mod state;

pub use execution::{ExecutionObserver, ExecutionStrategy, SequentialExecution};
pub use selection::{KeywordSelector, Selection, SelectionStrategy};
pub use state::{ExecutionState, Phase};

use crate::agent::{AgentRegistry, RegistryError};
use crate::models::{AgentOutput, ExecutionTrace, Record};
use crate::synthesis::{self, LevelSummary, Synthesis, SynthesisOptions};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Selection reason recorded when the caller supplies the agent order.
pub const EXPLICIT_ORDER_REASON: &str = "Explicit agent order";

/// Failures that escape the coordinator.
///
/// Agent failures never appear here; they are recorded as degraded outputs.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Outputs of running an explicit agent order.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub outputs: Vec<AgentOutput>,
    pub traces: Vec<ExecutionTrace>,
    /// Shared context after the last step.
    pub context: Record,
}

/// Everything a caller gets back from [`Coordinator::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub query: String,
    pub session_id: String,
    pub report: String,
    pub confidence: f64,
    pub agent_count: usize,
    pub agent_results: Vec<AgentOutput>,
    pub execution_order: Vec<String>,
    pub selection_reason: String,
    pub sources: Vec<Record>,
    pub traces: Vec<ExecutionTrace>,
    pub levels: LevelSummary,
}

pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    selector: Box<dyn SelectionStrategy>,
    execution: Box<dyn ExecutionStrategy>,
    synthesis: SynthesisOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl Coordinator {
    /// Keyword selection, sequential execution, default synthesis options.
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            selector: Box::new(KeywordSelector::default()),
            execution: Box::new(SequentialExecution::default()),
            synthesis: SynthesisOptions::default(),
            observer: None,
        }
    }

    pub fn with_selector(mut self, selector: impl SelectionStrategy + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn with_execution(mut self, execution: impl ExecutionStrategy + 'static) -> Self {
        self.execution = Box::new(execution);
        self
    }

    pub fn with_synthesis_options(mut self, options: SynthesisOptions) -> Self {
        self.synthesis = options;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Ordered agent names for `query`, filtered by what is registered.
    pub async fn analyze(&self, query: &str) -> Selection {
        let available = self.registry.list();
        let selection = self.selector.select(query, &available).await;
        info!("Selected agents: {:?} ({})", selection.agents, selection.reason);
        selection
    }

    /// Run `order` one agent at a time, threading context and prior outputs.
    pub async fn execute_agents(
        &self,
        query: &str,
        order: Vec<String>,
        context: Record,
        session_id: Option<String>,
    ) -> Result<ExecutionOutcome, CoordinatorError> {
        let mut state = ExecutionState::with_order(query, order, context, session_id);
        while state.has_pending_agents() {
            self.execution
                .step(&self.registry, &mut state, self.observer.as_deref())
                .await?;
        }

        Ok(ExecutionOutcome {
            outputs: state.outputs,
            traces: state.traces,
            context: state.context,
        })
    }

    /// Merge `outputs` into one report.
    pub fn synthesize(
        &self,
        query: &str,
        outputs: &[AgentOutput],
        traces: &[ExecutionTrace],
    ) -> Synthesis {
        synthesis::synthesize(query, outputs, traces, &self.synthesis)
    }

    /// Perform one state transition.
    pub async fn advance(&self, state: &mut ExecutionState) -> Result<(), CoordinatorError> {
        debug!("Coordinator phase: {:?}", state.phase);
        match state.phase {
            Phase::Analyze => {
                let selection = self.analyze(&state.query).await;
                state.order = selection.agents;
                state.selection_reason = selection.reason;
                state.phase = Phase::ExecuteAgent;
            }
            Phase::ExecuteAgent => {
                if state.has_pending_agents() {
                    let observer = self.observer.as_deref();
                    if let Err(e) = self.execution.step(&self.registry, state, observer).await {
                        state.error = Some(e.to_string());
                        return Err(e);
                    }
                }
                if !state.has_pending_agents() {
                    state.phase = Phase::Synthesize;
                }
            }
            Phase::Synthesize => {
                state.synthesis = Some(self.synthesize(&state.query, &state.outputs, &state.traces));
                state.phase = Phase::Done;
            }
            Phase::Done => {}
        }
        Ok(())
    }

    /// Answer `query` end to end.
    ///
    /// A missing session id is replaced with a fresh one.
    pub async fn run(
        &self,
        query: &str,
        context: Record,
        session_id: Option<String>,
    ) -> Result<RunResult, CoordinatorError> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut state = ExecutionState::new(query, context, Some(session_id.clone()));

        while !state.is_complete() {
            self.advance(&mut state).await?;
        }

        let synthesis = state
            .synthesis
            .take()
            .unwrap_or_else(|| self.synthesize(&state.query, &state.outputs, &state.traces));

        Ok(self.finish(
            state.query,
            session_id,
            state.order,
            state.selection_reason,
            state.outputs,
            synthesis,
        ))
    }

    /// Answer `query` with a caller-chosen agent order, skipping selection.
    pub async fn run_with_order(
        &self,
        query: &str,
        order: Vec<String>,
        context: Record,
        session_id: Option<String>,
    ) -> Result<RunResult, CoordinatorError> {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        info!("Running explicit agent order: {:?}", order);

        let outcome = self
            .execute_agents(query, order.clone(), context, Some(session_id.clone()))
            .await?;
        let synthesis = self.synthesize(query, &outcome.outputs, &outcome.traces);

        Ok(self.finish(
            query.to_string(),
            session_id,
            order,
            EXPLICIT_ORDER_REASON.to_string(),
            outcome.outputs,
            synthesis,
        ))
    }

    fn finish(
        &self,
        query: String,
        session_id: String,
        execution_order: Vec<String>,
        selection_reason: String,
        agent_results: Vec<AgentOutput>,
        synthesis: Synthesis,
    ) -> RunResult {
        info!(
            "Session {} finished: {} agents, confidence {:.2}",
            session_id, synthesis.agent_count, synthesis.confidence
        );

        RunResult {
            query,
            session_id,
            report: synthesis.report,
            confidence: synthesis.confidence,
            agent_count: synthesis.agent_count,
            agent_results,
            execution_order,
            selection_reason,
            sources: synthesis.sources,
            traces: synthesis.traces,
            levels: synthesis.levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::specialists::{
        builtin_descriptors, CALCULATOR, LAW_EXPERT, RISK_ANALYST, STRATEGIST,
    };
    use crate::agent::{Agent, AgentDescriptor};
    use crate::llm::{CompletionError, CompletionRequest, CompletionService};
    use crate::models::{AgentInput, AgentStatus, ConfigMap};
    use crate::synthesis::EMPTY_REPORT;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    /// Replies with the first instruction line; fails for matching instructions.
    struct ScriptedLlm {
        failures: Vec<(&'static str, &'static str)>,
        calls: Mutex<usize>,
    }

    impl ScriptedLlm {
        fn new(failures: Vec<(&'static str, &'static str)>) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedLlm {
        async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, CompletionError> {
            *self.calls.lock() += 1;
            for (marker, message) in &self.failures {
                if request.system.contains(marker) {
                    return Err(CompletionError::Timeout(message.to_string()));
                }
            }
            let role = request.system.lines().next().unwrap_or_default();
            Ok(format!("analysis from: {}", role))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Reply(f64),
        Fail,
        Panic,
        /// Reports the prior agents and context keys it saw.
        Inspect,
        Sleep,
    }

    struct ScriptAgent {
        name: String,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl Agent for ScriptAgent {
        fn name(&self) -> &str {
            &self.name
        }

        fn instructions(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, input: &AgentInput) -> Result<AgentOutput> {
            match self.behaviour {
                Behaviour::Reply(confidence) => {
                    Ok(AgentOutput::new(&self.name, format!("{} done", self.name))
                        .with_confidence(confidence))
                }
                Behaviour::Fail => bail!("TimeoutError: upstream slow"),
                Behaviour::Panic => panic!("agent exploded"),
                Behaviour::Inspect => {
                    let previous: Vec<&str> = input
                        .previous_results
                        .iter()
                        .map(|p| p.agent_name.as_str())
                        .collect();
                    let mut keys: Vec<&String> = input.context.keys().collect();
                    keys.sort();
                    Ok(AgentOutput::new(&self.name, previous.join(","))
                        .with_metadata("context_keys", json!(keys)))
                }
                Behaviour::Sleep => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(AgentOutput::new(&self.name, "late"))
                }
            }
        }
    }

    fn scripted(name: &str, behaviour: Behaviour) -> AgentDescriptor {
        AgentDescriptor::new(
            name,
            move |settings| {
                Arc::new(ScriptAgent {
                    name: settings.name,
                    behaviour,
                }) as Arc<dyn Agent>
            },
            ConfigMap::new(),
        )
    }

    fn scripted_registry(agents: Vec<(&str, Behaviour)>) -> Arc<AgentRegistry> {
        let descriptors = agents.into_iter().map(|(name, b)| scripted(name, b));
        Arc::new(AgentRegistry::with_descriptors(None, descriptors).unwrap())
    }

    fn builtin_registry(llm: Arc<ScriptedLlm>) -> Arc<AgentRegistry> {
        Arc::new(
            AgentRegistry::with_descriptors(
                Some(llm as Arc<dyn CompletionService>),
                builtin_descriptors(),
            )
            .unwrap(),
        )
    }

    fn names(outputs: &[AgentOutput]) -> Vec<&str> {
        outputs.iter().map(|o| o.agent_name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_scenario_keyword_selection_runs_pipeline() {
        let coordinator = Coordinator::new(builtin_registry(ScriptedLlm::new(vec![])));

        let result = coordinator
            .run("법인 전환시 세금 비교", Record::new(), None)
            .await
            .unwrap();

        assert_eq!(result.execution_order, vec![LAW_EXPERT, CALCULATOR, STRATEGIST]);
        assert_eq!(names(&result.agent_results), vec![LAW_EXPERT, CALCULATOR, STRATEGIST]);
        assert_eq!(result.agent_count, 3);
        assert_eq!(result.traces.len(), 3);
        assert!(result.confidence > 0.8 && result.confidence <= 0.95);
        assert!(result.report.contains("### ✅ strategist"));
        assert!(!result.session_id.is_empty());
    }

    #[tokio::test]
    async fn test_scenario_default_order() {
        let coordinator = Coordinator::new(builtin_registry(ScriptedLlm::new(vec![])));

        let selection = coordinator.analyze("hello there").await;
        assert_eq!(
            selection.agents,
            vec![LAW_EXPERT, CALCULATOR, RISK_ANALYST, STRATEGIST]
        );
    }

    #[tokio::test]
    async fn test_scenario_completion_timeout_does_not_abort() {
        let llm = ScriptedLlm::new(vec![("tax calculation specialist", "upstream slow")]);
        let coordinator = Coordinator::new(builtin_registry(llm.clone()));

        let result = coordinator
            .run("법인 전환시 세금 비교", Record::new(), Some("s-1".to_string()))
            .await
            .unwrap();

        assert_eq!(result.session_id, "s-1");
        assert_eq!(result.agent_results.len(), 3);

        let calc = &result.agent_results[1];
        assert_eq!(calc.agent_name, CALCULATOR);
        assert_eq!(calc.confidence, 0.0);
        assert!(calc.result.contains("TimeoutError"));
        assert_eq!(calc.metadata.get("error"), Some(&json!(true)));

        let strategist = &result.agent_results[2];
        assert!(strategist.confidence > 0.0);
        assert!(strategist.result.contains("tax strategy advisor"));
        assert_eq!(*llm.calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_scenario_empty_registry() {
        let coordinator = Coordinator::new(Arc::new(AgentRegistry::new(None)));

        let result = coordinator.run("세금", Record::new(), None).await.unwrap();

        assert_eq!(
            result.execution_order,
            vec![LAW_EXPERT, CALCULATOR, RISK_ANALYST, STRATEGIST]
        );
        assert!(result.selection_reason.contains("No agents registered"));
        assert!(result.agent_results.is_empty());
        assert_eq!(result.report, EMPTY_REPORT);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.agent_count, 0);
    }

    #[tokio::test]
    async fn test_one_output_per_agent_under_failures() {
        let registry = scripted_registry(vec![
            ("first", Behaviour::Reply(0.9)),
            ("broken", Behaviour::Fail),
            ("exploding", Behaviour::Panic),
            ("last", Behaviour::Reply(0.7)),
        ]);
        let coordinator = Coordinator::new(registry);
        let order: Vec<String> = ["first", "broken", "exploding", "last"]
            .into_iter()
            .map(String::from)
            .collect();

        let outcome = coordinator
            .execute_agents("q", order, Record::new(), None)
            .await
            .unwrap();

        assert_eq!(names(&outcome.outputs), vec!["first", "broken", "exploding", "last"]);
        assert_eq!(outcome.traces.len(), 4);

        let broken = &outcome.outputs[1];
        assert_eq!(broken.confidence, 0.0);
        assert!(broken.result.contains("TimeoutError: upstream slow"));

        let exploding = &outcome.outputs[2];
        assert_eq!(exploding.confidence, 0.0);
        assert!(exploding.result.contains("agent exploded"));

        assert_eq!(outcome.outputs[3].confidence, 0.7);
        assert!(outcome.context.contains_key("first"));
        assert!(outcome.context.contains_key("last"));
        assert!(!outcome.context.contains_key("broken"));
    }

    #[tokio::test]
    async fn test_panicking_factory_degrades_output() {
        let registry = scripted_registry(vec![("after", Behaviour::Reply(0.9))]);
        registry
            .register(AgentDescriptor::new(
                "unbuildable",
                |_settings| panic!("constructor exploded"),
                ConfigMap::new(),
            ))
            .unwrap();
        let observer = Arc::new(CountingObserver::default());
        let coordinator = Coordinator::new(registry.clone()).with_observer(observer.clone());

        let outcome = coordinator
            .execute_agents(
                "q",
                vec!["unbuildable".into(), "after".into()],
                Record::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(names(&outcome.outputs), vec!["unbuildable", "after"]);
        assert_eq!(outcome.traces.len(), 2);

        let unbuildable = &outcome.outputs[0];
        assert_eq!(unbuildable.confidence, 0.0);
        assert!(unbuildable.result.contains("constructor exploded"));
        assert_eq!(outcome.outputs[1].confidence, 0.9);
        assert_eq!(*observer.finished.lock(), 2);
        assert_eq!(registry.status("unbuildable"), Some(AgentStatus::Registered));
    }

    #[tokio::test]
    async fn test_previous_results_and_context_propagate() {
        let registry = scripted_registry(vec![
            ("first", Behaviour::Reply(0.9)),
            ("second", Behaviour::Reply(0.8)),
            ("inspector", Behaviour::Inspect),
        ]);
        let coordinator = Coordinator::new(registry);
        let mut context = Record::new();
        context.insert("user_note".to_string(), json!("hi"));

        let outcome = coordinator
            .execute_agents(
                "q",
                vec!["first".into(), "second".into(), "inspector".into()],
                context,
                None,
            )
            .await
            .unwrap();

        let inspector = &outcome.outputs[2];
        assert_eq!(inspector.result, "first,second");
        assert_eq!(
            inspector.metadata["context_keys"],
            json!(["first", "second", "user_note"])
        );
        assert_eq!(outcome.context["first"]["result"], json!("first done"));
        assert_eq!(outcome.context["second"]["confidence"], json!(0.8));
    }

    #[tokio::test]
    async fn test_unregistered_names_are_skipped() {
        let coordinator = Coordinator::new(scripted_registry(vec![("only", Behaviour::Reply(0.9))]));

        let outcome = coordinator
            .execute_agents("q", vec!["ghost".into(), "only".into()], Record::new(), None)
            .await
            .unwrap();

        assert_eq!(names(&outcome.outputs), vec!["only"]);
        assert_eq!(outcome.traces.len(), 1);
    }

    #[tokio::test]
    async fn test_agent_timeout_degrades_output() {
        let registry = scripted_registry(vec![
            ("slow", Behaviour::Sleep),
            ("after", Behaviour::Reply(0.9)),
        ]);
        let coordinator = Coordinator::new(registry).with_execution(SequentialExecution::with_timeout(
            Some(Duration::from_millis(20)),
        ));

        let outcome = coordinator
            .execute_agents("q", vec!["slow".into(), "after".into()], Record::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome.outputs[0].confidence, 0.0);
        assert!(outcome.outputs[0].result.contains("TimeoutError"));
        assert_eq!(outcome.outputs[1].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_history_is_scoped_per_request() {
        let registry = scripted_registry(vec![
            ("a", Behaviour::Reply(0.9)),
            ("b", Behaviour::Reply(0.8)),
        ]);
        let coordinator = Coordinator::new(registry)
            .with_selector(KeywordSelector::new(vec![], vec!["a".into(), "b".into()]));

        let first = coordinator.run("q", Record::new(), None).await.unwrap();
        let second = coordinator.run("q", Record::new(), None).await.unwrap();

        assert_eq!(first.traces.len(), 2);
        assert_eq!(second.traces.len(), 2);
        assert_ne!(first.session_id, second.session_id);
        assert!((second.confidence - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_advance_walks_phases() {
        let registry = scripted_registry(vec![
            ("a", Behaviour::Reply(0.9)),
            ("b", Behaviour::Reply(0.8)),
        ]);
        let coordinator = Coordinator::new(registry)
            .with_selector(KeywordSelector::new(vec![], vec!["a".into(), "b".into()]));
        let mut state = ExecutionState::new("q", Record::new(), None);

        coordinator.advance(&mut state).await.unwrap();
        assert_eq!(state.phase, Phase::ExecuteAgent);
        assert_eq!(state.order, vec!["a", "b"]);

        coordinator.advance(&mut state).await.unwrap();
        assert_eq!(state.phase, Phase::ExecuteAgent);
        assert_eq!(state.outputs.len(), 1);

        coordinator.advance(&mut state).await.unwrap();
        assert_eq!(state.phase, Phase::Synthesize);

        coordinator.advance(&mut state).await.unwrap();
        assert!(state.is_complete());
        assert_eq!(state.synthesis.as_ref().map(|s| s.agent_count), Some(2));
    }

    #[tokio::test]
    async fn test_run_with_explicit_order() {
        let registry = scripted_registry(vec![
            ("a", Behaviour::Reply(0.9)),
            ("b", Behaviour::Reply(0.7)),
        ]);
        let coordinator = Coordinator::new(registry);

        let result = coordinator
            .run_with_order(
                "q",
                vec!["b".into(), "ghost".into(), "a".into()],
                Record::new(),
                Some("fixed".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(result.session_id, "fixed");
        assert_eq!(result.execution_order, vec!["b", "ghost", "a"]);
        assert_eq!(result.selection_reason, EXPLICIT_ORDER_REASON);
        assert_eq!(names(&result.agent_results), vec!["b", "a"]);
        assert_eq!(result.agent_count, 2);
        assert!((result.confidence - 0.8).abs() < 1e-9);
        assert!(result.report.find("### ✅ b").unwrap() < result.report.find("### ✅ a").unwrap());
    }

    #[derive(Default)]
    struct CountingObserver {
        started: Mutex<Vec<(String, usize, usize)>>,
        finished: Mutex<usize>,
    }

    impl ExecutionObserver for CountingObserver {
        fn on_agent_start(&self, agent: &str, position: usize, total: usize) {
            self.started.lock().push((agent.to_string(), position, total));
        }

        fn on_agent_finish(&self, _output: &AgentOutput) {
            *self.finished.lock() += 1;
        }
    }

    #[tokio::test]
    async fn test_observer_is_notified() {
        let observer = Arc::new(CountingObserver::default());
        let registry = scripted_registry(vec![
            ("a", Behaviour::Reply(0.9)),
            ("b", Behaviour::Fail),
        ]);
        let coordinator = Coordinator::new(registry).with_observer(observer.clone());

        coordinator
            .execute_agents("q", vec!["a".into(), "b".into()], Record::new(), None)
            .await
            .unwrap();

        assert_eq!(
            *observer.started.lock(),
            vec![("a".to_string(), 0, 2), ("b".to_string(), 1, 2)]
        );
        assert_eq!(*observer.finished.lock(), 2);
    }
}
