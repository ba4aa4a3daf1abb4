//! Execution strategies: how the selected agents are run.

use super::state::ExecutionState;
use super::CoordinatorError;
use crate::agent::{Agent, AgentRegistry};
use crate::models::{clamp_confidence, AgentInput, AgentOutput, ExecutionTrace};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Progress hook notified around every agent step.
pub trait ExecutionObserver: Send + Sync {
    fn on_agent_start(&self, _agent: &str, _position: usize, _total: usize) {}

    fn on_agent_finish(&self, _output: &AgentOutput) {}
}

/// Runs the next unit of work for a state in the `ExecuteAgent` phase.
///
/// Each call must advance `state.cursor` by at least one, so that repeated
/// calls eventually exhaust the order.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    async fn step(
        &self,
        registry: &AgentRegistry,
        state: &mut ExecutionState,
        observer: Option<&dyn ExecutionObserver>,
    ) -> Result<(), CoordinatorError>;
}

/// One agent at a time, in order.
///
/// Each agent sees the shared context and every output produced before it,
/// so steps are never overlapped.
#[derive(Debug, Clone, Default)]
pub struct SequentialExecution {
    /// Per-agent limit; `None` waits for the agent however long it takes.
    pub agent_timeout: Option<Duration>,
}

impl SequentialExecution {
    pub fn with_timeout(agent_timeout: Option<Duration>) -> Self {
        Self { agent_timeout }
    }
}

#[async_trait]
impl ExecutionStrategy for SequentialExecution {
    async fn step(
        &self,
        registry: &AgentRegistry,
        state: &mut ExecutionState,
        observer: Option<&dyn ExecutionObserver>,
    ) -> Result<(), CoordinatorError> {
        let Some(name) = state.current_agent().map(str::to_string) else {
            return Ok(());
        };
        let position = state.cursor;
        state.cursor += 1;

        if !registry.is_registered(&name) {
            warn!("Skipping agent {}: not registered", name);
            return Ok(());
        }

        // A panicking factory is recorded like a panicking agent.
        let constructed = match std::panic::catch_unwind(AssertUnwindSafe(|| registry.get(&name))) {
            Ok(agent) => Ok(agent?),
            Err(panic) => Err(panic),
        };
        let input = AgentInput {
            query: state.query.clone(),
            context: state.context.clone(),
            previous_results: state.outputs.clone(),
            session_id: state.session_id.clone(),
        };

        if let Some(observer) = observer {
            observer.on_agent_start(&name, position, state.order.len());
        }
        debug!("Running agent {} ({}/{})", name, position + 1, state.order.len());

        let started = Instant::now();
        let outcome = match constructed {
            Ok(agent) => self.invoke(agent.as_ref(), &input).await,
            Err(panic) => Err(panic),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let output = match outcome {
            Ok(Ok(mut output)) => {
                output.confidence = clamp_confidence(output.confidence);
                output.duration_ms = duration_ms;
                state.context.insert(name.clone(), output.context_entry());
                info!(
                    "Agent {} finished in {}ms (confidence {:.2})",
                    name, duration_ms, output.confidence
                );
                output
            }
            Ok(Err(e)) => {
                warn!("Agent {} failed: {:#}", name, e);
                let mut output = AgentOutput::failed(&name, format!("{:#}", e));
                output.duration_ms = duration_ms;
                output
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("Agent {} panicked: {}", name, message);
                let mut output = AgentOutput::failed(&name, format!("panic: {}", message));
                output.duration_ms = duration_ms;
                output
            }
        };

        state.traces.push(ExecutionTrace {
            agent_name: name,
            timestamp: Utc::now(),
            duration_ms: output.duration_ms,
            confidence: output.confidence,
        });

        if let Some(observer) = observer {
            observer.on_agent_finish(&output);
        }
        state.outputs.push(output);

        Ok(())
    }
}

impl SequentialExecution {
    /// Run one agent under the panic guard and the optional time limit.
    async fn invoke(
        &self,
        agent: &dyn Agent,
        input: &AgentInput,
    ) -> std::thread::Result<anyhow::Result<AgentOutput>> {
        let call = AssertUnwindSafe(agent.execute(input)).catch_unwind();
        match self.agent_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(anyhow::anyhow!(
                    "TimeoutError: agent did not finish within {}s",
                    limit.as_secs_f64()
                ))),
            },
            None => call.await,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
