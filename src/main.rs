//! Councilor - multi-agent question answering on top of a local LLM
//!
//! Routes a question to a set of specialist agents, runs them one after
//! another with shared context, and merges their answers into a single
//! report with an overall confidence score.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Configuration or runtime error

mod agent;
mod cli;
mod config;
mod coordinator;
mod llm;
mod models;
mod progress;
mod report;
mod synthesis;

use agent::specialists::builtin_descriptors;
use agent::AgentRegistry;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use coordinator::{Coordinator, KeywordSelector, Selection, SequentialExecution, EXPLICIT_ORDER_REASON};
use llm::{CompletionService, OllamaClient, OllamaConfig};
use models::AgentOutput;
use progress::SpinnerObserver;
use report::{ReportMetadata, ReportOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use synthesis::SynthesisOptions;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // The config file can turn on verbose logging, so it is read first.
    let loaded = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    init_logging(args.log_level(loaded.config.general.verbose));

    info!("Councilor v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    info!("Configuration: {}", loaded.origin);
    if let Some(ref problem) = loaded.warning {
        warn!("Failed to load config: {}", problem);
    }

    match run(args, loaded.config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .councilor.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the model, agent order and per-agent settings.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn run(args: Args, mut config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.merge_with_args(&args);

    // Introspection and dry runs never call the model.
    let llm: Option<Arc<dyn CompletionService>> = if args.is_introspection() || args.dry_run {
        None
    } else {
        Some(Arc::new(build_client(&config)?))
    };

    let registry = Arc::new(
        AgentRegistry::with_descriptors(llm, config.apply_to_descriptors(builtin_descriptors()))
            .context("Failed to register agents")?,
    );

    if registry.is_empty() {
        warn!("No agents are registered; check coordinator.enabled_agents in the config");
    }

    if args.is_introspection() {
        return handle_introspection(&registry, &args, config.general.verbose);
    }

    let query = match args.query.as_deref() {
        Some(query) => query.to_string(),
        None => bail!("--query is required"),
    };
    let context = args.context_record().map_err(anyhow::Error::msg)?;

    let selector =
        KeywordSelector::default().with_default_order(config.coordinator.default_order.clone());
    let mut coordinator = Coordinator::new(registry.clone())
        .with_selector(selector)
        .with_execution(SequentialExecution::with_timeout(config.coordinator.agent_timeout()))
        .with_synthesis_options(SynthesisOptions {
            reasoning_excerpt_chars: config.report.reasoning_excerpt_chars,
        });

    let explicit_order = args.agent_order();

    if args.dry_run {
        return handle_dry_run(&coordinator, &query, explicit_order).await;
    }

    if !args.quiet {
        coordinator = coordinator.with_observer(Arc::new(SpinnerObserver::new()));
    }

    println!("🤖 Consulting agents...");
    println!("   Model: {}", config.model.name);
    println!("   Ollama: {}", config.model.ollama_url);
    println!("   Registered: {}", registry.list().join(", "));
    if let Some(timeout) = config.coordinator.agent_timeout_seconds {
        println!("   Agent timeout: {}s", timeout);
    }
    println!();

    let result = match explicit_order {
        Some(order) => {
            coordinator
                .run_with_order(&query, order, context, args.session_id.clone())
                .await
        }
        None => coordinator.run(&query, context, args.session_id.clone()).await,
    }
    .context("Coordinator failed")?;

    println!("\n📝 Generating report...");

    let metadata = ReportMetadata {
        model_used: config.model.name.clone(),
        generated_at: Utc::now(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let format = args
        .format
        .unwrap_or_else(|| OutputFormat::from_config(&config.general.format));
    let output = match format {
        OutputFormat::Json => report::generate_json_report(&result, &metadata)?,
        OutputFormat::Markdown => report::generate_markdown_report(
            &result,
            &metadata,
            &ReportOptions {
                include_traces: config.report.include_traces,
            },
        ),
    };

    let output_path = PathBuf::from(&config.general.output);
    report::write_report(&output, &output_path)?;

    println!("\n📊 Run Summary:");
    println!("   Session: {}", result.session_id);
    println!("   Agents: {}", result.execution_order.join(" → "));
    println!(
        "   - ✅ Pass: {} | ⚠️ Warn: {} | ❌ Fail: {}",
        result.levels.pass, result.levels.warn, result.levels.fail
    );
    println!("   Overall confidence: {:.0}%", result.confidence * 100.0);
    println!("   Duration: {:.1}s", metadata.duration_seconds);
    println!(
        "\n✅ Done! Report saved to: {}",
        output_path.display()
    );

    if !result.agent_results.is_empty() && result.agent_results.iter().all(AgentOutput::is_failed) {
        warn!("Every agent failed; the report carries no usable analysis");
    }

    Ok(0)
}

fn build_client(config: &Config) -> Result<OllamaClient> {
    let client = OllamaClient::new(OllamaConfig {
        ollama_url: config.model.ollama_url.clone(),
        model_name: config.model.name.clone(),
        temperature: config.model.temperature,
        max_tokens: config.model.max_tokens,
        timeout_seconds: config.model.timeout_seconds,
    })?;
    info!("Using model {}", client.model_name());
    Ok(client)
}

/// Handle --list-agents, --agent-info and --agent-status.
fn handle_introspection(registry: &AgentRegistry, args: &Args, verbose: bool) -> Result<i32> {
    if args.list_agents {
        println!("📋 Registered agents:\n");
        for info in registry.list().iter().filter_map(|name| registry.describe(name)) {
            println!("   • {:<14} {}", info.name, info.description);
        }

        if verbose {
            println!("\n⚙️  Default configuration:\n");
            for (name, config) in registry.configs() {
                println!("   {}: {}", name, serde_json::to_string(&config)?);
            }
        }
    }

    if let Some(ref name) = args.agent_info {
        let Some(info) = registry.describe(name) else {
            bail!("Unknown agent: {}. Available: {:?}", name, registry.list());
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
    }

    if let Some(ref name) = args.agent_status {
        let Some(status) = registry.status(name) else {
            bail!("Unknown agent: {}. Available: {:?}", name, registry.list());
        };
        println!("{}: {}", name, status);
    }

    Ok(0)
}

/// Handle --dry-run: print the order that would run, exit.
async fn handle_dry_run(
    coordinator: &Coordinator,
    query: &str,
    explicit_order: Option<Vec<String>>,
) -> Result<i32> {
    println!("\n🔍 Dry run: selecting agents (no model calls)...\n");

    let selection = match explicit_order {
        Some(agents) => Selection {
            agents,
            reason: EXPLICIT_ORDER_REASON.to_string(),
        },
        None => coordinator.analyze(query).await,
    };
    if selection.agents.is_empty() {
        println!("   No agents would run.");
    } else {
        for (i, name) in selection.agents.iter().enumerate() {
            let marker = if coordinator.registry().is_registered(name) {
                "🤖"
            } else {
                "⏭️ (not registered)"
            };
            println!("     {}. {} {}", i + 1, marker, name);
        }
    }
    println!("\n   Reason: {}", selection.reason);

    println!("\n✅ Dry run complete. No model calls were made.");
    Ok(0)
}

/// Configuration plus a note on where it came from, logged once logging is up.
struct LoadedConfig {
    config: Config,
    origin: String,
    warning: Option<String>,
}

/// Load configuration from file or use defaults.
///
/// An explicit `--config` path must load; a broken default file falls back
/// to the built-in defaults with a warning.
fn load_config(args: &Args) -> Result<LoadedConfig> {
    if let Some(ref config_path) = args.config {
        return Ok(LoadedConfig {
            config: Config::load(config_path)?,
            origin: format!("loaded from {}", config_path.display()),
            warning: None,
        });
    }

    let loaded = match Config::load_default() {
        Ok(Some(config)) => LoadedConfig {
            config,
            origin: format!("loaded from {}", DEFAULT_CONFIG_FILE),
            warning: None,
        },
        Ok(None) => LoadedConfig {
            config: Config::default(),
            origin: "no config file found, using defaults".to_string(),
            warning: None,
        },
        Err(e) => LoadedConfig {
            config: Config::default(),
            origin: "using defaults".to_string(),
            warning: Some(format!("{:#}", e)),
        },
    };
    Ok(loaded)
}
