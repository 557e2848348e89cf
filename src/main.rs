mod dry_run;
mod llm;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskgraph_core::config::AppConfig;
use taskgraph_core::event::EventBus;
use taskgraph_core::traits::CapabilityFactory;
use taskgraph_core::types::{WorkflowEvent, WorkflowStatus};
use taskgraph_engine::{WorkflowDefinition, WorkflowRunner};
use taskgraph_integrations::Integrations;

use crate::dry_run::EchoCapabilities;
use crate::llm::ModelCapabilities;

#[derive(Parser)]
#[command(name = "taskgraph", version, about = "Run declarative agent workflow graphs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "taskgraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow and print its summary
    Run {
        /// Workflow definition (.json or .toml)
        workflow: PathBuf,
        /// Initial parameter as key=value (value parsed as JSON when possible)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Use echo agents instead of the configured model
        #[arg(long)]
        dry_run: bool,
    },
    /// Check a workflow definition without running it
    Validate {
        /// Workflow definition (.json or .toml)
        workflow: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("taskgraph=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "taskgraph", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Validate { workflow } => {
            validate(&workflow)?;
        }
        Commands::Run {
            workflow,
            params,
            dry_run,
        } => {
            let status = run(&config, &workflow, &params, dry_run).await?;
            if status != WorkflowStatus::Completed {
                std::process::exit(1);
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        Ok(AppConfig::load(path)?)
    } else {
        info!(path = %path.display(), "No config file found, using defaults");
        Ok(AppConfig::default())
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let definition = WorkflowDefinition::load(path)?;
    println!(
        "Workflow '{}': {} steps",
        definition.name,
        definition.steps.len()
    );

    let unknown = definition.unknown_references();
    for (step, next) in &unknown {
        println!("  warning: step '{}' links to unknown step '{}'", step, next);
    }
    let unreachable = definition.unreachable_steps();
    for step in &unreachable {
        println!("  warning: step '{}' is unreachable from the entry step", step);
    }
    if unknown.is_empty() && unreachable.is_empty() {
        println!("  ok");
    }
    Ok(())
}

async fn run(
    config: &AppConfig,
    path: &Path,
    params: &[String],
    dry_run: bool,
) -> anyhow::Result<WorkflowStatus> {
    let mut definition = WorkflowDefinition::load(path)?;
    let params = parse_params(params)?;

    let factory: Arc<dyn CapabilityFactory> = if dry_run {
        Arc::new(EchoCapabilities)
    } else {
        match &config.model {
            Some(model) => Arc::new(ModelCapabilities::new(model.clone())?),
            None => anyhow::bail!("No [model] section in config; add one or pass --dry-run"),
        }
    };

    // Workflow globals override config globals.
    let mut globals = config.globals.clone();
    globals.extend(std::mem::take(&mut definition.globals));
    globals
        .entry("working_dir".to_string())
        .or_insert_with(|| serde_json::Value::String(config.working_dir().display().to_string()));
    definition.globals = globals;

    let integrations = Integrations::with_builtins(&config.http, config.working_dir())?;
    let event_bus = Arc::new(EventBus::new(config.engine.event_capacity));
    let mut runner = WorkflowRunner::new(definition, factory, integrations)?
        .with_event_bus(event_bus.clone())
        .with_summary_max_chars(config.engine.summary_max_chars);

    let mut rx = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                WorkflowEvent::StepStarted {
                    step_id, step_type, ..
                } => eprintln!("[step: {} ({})]", step_id, step_type),
                WorkflowEvent::StepSkipped { step_id, .. } => {
                    eprintln!("[skipped: {}]", step_id)
                }
                WorkflowEvent::StepFailed {
                    step_id,
                    error,
                    continued,
                    ..
                } => {
                    let suffix = if continued { " (continuing)" } else { "" };
                    eprintln!("[failed: {}{}] {}", step_id, suffix, error);
                }
                WorkflowEvent::RunCompleted { .. }
                | WorkflowEvent::RunFailed { .. }
                | WorkflowEvent::RunCancelled { .. } => break,
                _ => {}
            }
        }
    });

    let handle = runner.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling after the current step");
            handle.cancel().ok();
        }
    });

    let output = runner.run(params).await;
    printer.await.ok();
    println!("{}", output);

    Ok(runner.status().status)
}

/// Parse `key=value` pairs. Values that parse as JSON keep their type,
/// anything else becomes a string.
fn parse_params(params: &[String]) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    params
        .iter()
        .map(|param| {
            let (key, value) = param.split_once('=').ok_or_else(|| {
                anyhow::anyhow!("Invalid parameter '{}', expected KEY=VALUE", param)
            })?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
            Ok((key.trim().to_string(), value))
        })
        .collect()
}
