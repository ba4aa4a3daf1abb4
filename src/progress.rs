//! Terminal progress for agent runs.

use crate::coordinator::ExecutionObserver;
use crate::models::{AgentOutput, ConfidenceLevel};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::time::Duration;

/// One spinner per running agent, replaced by a summary line when it finishes.
#[derive(Default)]
pub struct SpinnerObserver {
    current: Mutex<Option<ProgressBar>>,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("   {spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl ExecutionObserver for SpinnerObserver {
    fn on_agent_start(&self, agent: &str, position: usize, total: usize) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(Self::style());
        pb.set_message(format!("[{}/{}] {} is working...", position + 1, total, agent));
        pb.enable_steady_tick(Duration::from_millis(120));

        if let Some(previous) = self.current.lock().replace(pb) {
            previous.finish_and_clear();
        }
    }

    fn on_agent_finish(&self, output: &AgentOutput) {
        let line = format!(
            "{} {} ({:.0}%, {}ms)",
            ConfidenceLevel::from_confidence(output.confidence).emoji(),
            output.agent_name,
            output.confidence * 100.0,
            output.duration_ms
        );

        match self.current.lock().take() {
            Some(pb) => pb.finish_with_message(line),
            None => println!("   {}", line),
        }
    }
}
