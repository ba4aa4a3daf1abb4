//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Record;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

/// Councilor - a council of LLM specialists answering one question together
///
/// Selects the specialists relevant to a question, runs them in order so each
/// sees what the previous ones found, and merges their answers into one
/// report with an overall confidence score.
///
/// Examples:
///   councilor --query "법인 전환시 세금 비교"
///   councilor --query "Analyze this dataset" --context file_path=sales.csv
///   councilor --query "Is this a legal risk?" --format json --output result.json
///   councilor --query "How much tax?" --dry-run
///   councilor --query "Should I incorporate?" --agents law_expert,strategist
///   councilor --list-agents
///   councilor --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Question to put to the agents
    #[arg(
        short = 'Q',
        long,
        value_name = "TEXT",
        required_unless_present_any = ["init_config", "list_agents", "agent_info", "agent_status"]
    )]
    pub query: Option<String>,

    /// Shared context entry passed to every agent (repeatable)
    ///
    /// Values that parse as JSON are kept as JSON, anything else is a string.
    /// Example: --context file_path=data.csv --context year=2024
    #[arg(short = 'C', long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// Run these agents in this order instead of selecting by keyword
    ///
    /// Example: --agents law_expert,strategist
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub agents: Vec<String>,

    /// Session identifier; a random one is generated when omitted
    #[arg(long, value_name = "ID")]
    pub session_id: Option<String>,

    /// Ollama model to use
    ///
    /// Can also be set via COUNCILOR_MODEL env var or .councilor.toml config.
    #[arg(short, long, env = "COUNCILOR_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .councilor.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Default temperature for completions (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Completion request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Give up on a single agent after this many seconds
    #[arg(long, value_name = "SECS")]
    pub agent_timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// List registered agents and exit
    #[arg(long)]
    pub list_agents: bool,

    /// Show one agent's description and configuration, then exit
    #[arg(long, value_name = "NAME")]
    pub agent_info: Option<String>,

    /// Show whether an agent is registered or has a cached instance, then exit
    #[arg(long, value_name = "NAME")]
    pub agent_status: Option<String>,

    /// Dry run: show which agents would run, without calling the model
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .councilor.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
        }
    }

    /// Parse a format name from the config file, falling back to markdown.
    pub fn from_config(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Markdown,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// True when the invocation only inspects the registry.
    pub fn is_introspection(&self) -> bool {
        self.list_agents || self.agent_info.is_some() || self.agent_status.is_some()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref query) = self.query {
            if query.trim().is_empty() {
                return Err("Query must not be empty".to_string());
            }
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }
        if self.agent_timeout == Some(0) {
            return Err("Agent timeout must be at least 1 second".to_string());
        }

        if self.agents.iter().any(|name| name.trim().is_empty()) {
            return Err("Agent names in --agents must not be empty".to_string());
        }

        self.context_record().map(|_| ())
    }

    /// The `--agents` order, if one was given.
    pub fn agent_order(&self) -> Option<Vec<String>> {
        if self.agents.is_empty() {
            None
        } else {
            Some(self.agents.iter().map(|name| name.trim().to_string()).collect())
        }
    }

    /// The `--context` pairs as a record.
    pub fn context_record(&self) -> Result<Record, String> {
        let mut context = Record::new();

        for pair in &self.context {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| format!("Context entry must look like KEY=VALUE: {}", pair))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("Context key must not be empty: {}", pair));
            }

            let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            context.insert(key.to_string(), value);
        }

        Ok(context)
    }

    /// Returns the log level; `--quiet` beats verbosity from either source.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
