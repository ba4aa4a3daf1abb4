//! Configuration file handling.
//!
//! Settings are read from `.councilor.toml` and then overridden by any
//! explicit command-line arguments.

use crate::agent::registry::merge_config;
use crate::agent::AgentDescriptor;
use crate::coordinator::selection;
use crate::models::ConfigMap;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// File name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".councilor.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub report: ReportConfig,

    /// Per-agent tables merged over each agent's default configuration.
    #[serde(default)]
    pub agents: BTreeMap<String, ConfigMap>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Default report format (`markdown` or `json`).
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            format: default_format(),
        }
    }
}

fn default_output() -> String {
    "councilor_report.md".to_string()
}

fn default_format() -> String {
    "markdown".to_string()
}

/// Completion model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature used when an agent does not set its own.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in a response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<usize>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> Option<usize> {
    Some(4000)
}

fn default_timeout() -> u64 {
    300
}

/// Coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Agent order used when no keyword matches.
    #[serde(default = "default_order")]
    pub default_order: Vec<String>,

    /// Per-agent time limit; unset waits indefinitely.
    #[serde(default)]
    pub agent_timeout_seconds: Option<u64>,

    /// Built-in agents to register; unset registers all of them.
    #[serde(default)]
    pub enabled_agents: Option<Vec<String>>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_order: default_order(),
            agent_timeout_seconds: None,
            enabled_agents: None,
        }
    }
}

fn default_order() -> Vec<String> {
    selection::default_order()
}

impl CoordinatorConfig {
    pub fn agent_timeout(&self) -> Option<Duration> {
        self.agent_timeout_seconds.map(Duration::from_secs)
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Maximum characters of each agent's reasoning in the report.
    #[serde(default = "default_reasoning_chars")]
    pub reasoning_excerpt_chars: usize,

    /// Include the execution trace table.
    #[serde(default = "default_true")]
    pub include_traces: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            reasoning_excerpt_chars: default_reasoning_chars(),
            include_traces: true,
        }
    }
}

fn default_reasoning_chars() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(agent_timeout) = args.agent_timeout {
            self.coordinator.agent_timeout_seconds = Some(agent_timeout);
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.general.format = format.as_str().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Apply `enabled_agents` and the `[agents.<name>]` tables to a registration table.
    pub fn apply_to_descriptors(&self, descriptors: Vec<AgentDescriptor>) -> Vec<AgentDescriptor> {
        descriptors
            .into_iter()
            .filter(|d| match &self.coordinator.enabled_agents {
                Some(enabled) => enabled.iter().any(|name| name == &d.name),
                None => true,
            })
            .map(|mut d| {
                if let Some(overrides) = self.agents.get(&d.name) {
                    d.default_config = merge_config(&d.default_config, overrides);
                }
                d
            })
            .collect()
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::specialists::builtin_descriptors;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.report.reasoning_excerpt_chars, 200);
        assert_eq!(config.coordinator.default_order.len(), 4);
        assert!(config.coordinator.agent_timeout().is_none());
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.md"
verbose = true

[model]
name = "qwen2.5:14b"
temperature = 0.2

[coordinator]
default_order = ["risk_analyst", "law_expert"]
agent_timeout_seconds = 90
enabled_agents = ["law_expert", "risk_analyst", "strategist"]

[agents.law_expert]
temperature = 0.05
description = "Statute lookup"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.md");
        assert!(config.general.verbose);
        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.coordinator.default_order, vec!["risk_analyst", "law_expert"]);
        assert_eq!(config.coordinator.agent_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.agents["law_expert"]["temperature"], json!(0.05));
    }

    #[test]
    fn test_apply_to_descriptors() {
        let config: Config = toml::from_str(
            r#"
[coordinator]
enabled_agents = ["law_expert", "strategist"]

[agents.law_expert]
temperature = 0.05
"#,
        )
        .unwrap();

        let descriptors = config.apply_to_descriptors(builtin_descriptors());
        let names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["law_expert", "strategist"]);
        assert_eq!(descriptors[0].default_config["temperature"], json!(0.05));
        assert!(descriptors[0].default_config.contains_key("description"));
        assert_eq!(descriptors[1].default_config["temperature"], json!(0.4));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[report]\ninclude_traces = false\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.report.include_traces);
        assert_eq!(config.report.reasoning_excerpt_chars, 200);

        std::fs::write(&path, "[report\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[coordinator]"));
        assert!(toml_str.contains("[report]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.name, "llama3.2:latest");
    }
}
