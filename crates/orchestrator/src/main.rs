use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cq_domain::config::{Config, ConfigSeverity};
use cq_domain::role::Role;
use cq_engine::DiscussionEngine;
use cq_orchestrator::cli::{Cli, Command, ConfigCommand};
use cq_orchestrator::orchestrate::{AskOutcome, Orchestrator};
use cq_orchestrator::supervisor::WorkerSupervisor;
use cq_providers::classifier::Classifier;
use cq_providers::{ModelRegistry, RateLimitCoordinator};
use cq_store::{FileRateLimitStore, FileTaskStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Ask {
            question,
            context,
            rounds,
        } => {
            let config = load_config(&cli.config)?;
            init_tracing(&config);
            run_ask(config, question, context, rounds).await
        }
        Command::Config {
            command: ConfigCommand::Validate,
        } => {
            let config = load_config(&cli.config)?;
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if config.has_errors() {
                std::process::exit(1);
            }
            println!("configuration OK");
            Ok(())
        }
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            let config = load_config(&cli.config)?;
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Command::Version => {
            println!("colloquy {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        eprintln!("config {} not found, using defaults", path.display());
        Ok(Config::default())
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_ask(
    mut config: Config,
    question: String,
    context: Option<String>,
    rounds: Option<u32>,
) -> anyhow::Result<()> {
    if let Some(rounds) = rounds {
        config.consensus.discussion_rounds = rounds.max(1);
    }

    // Fail fast on configuration errors before any model call.
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if config.has_errors() {
        anyhow::bail!("configuration errors, run `colloquy config validate`");
    }

    // Storage, rate limiting, models.
    let task_store = Arc::new(FileTaskStore::new(&config.storage.state_path)?);
    let limit_store = Arc::new(FileRateLimitStore::new(&config.storage.state_path)?);
    let limiter = Arc::new(RateLimitCoordinator::new(
        config.openrouter.requests_per_minute,
        Some(limit_store),
    ));
    let registry = ModelRegistry::from_config(&config, limiter)?;

    // Engine and workers.
    let engine = Arc::new(DiscussionEngine::new(&registry, &config, task_store.clone())?);
    let supervisor = Arc::new(WorkerSupervisor::new(task_store.clone(), engine));

    let classifier = Classifier::new(
        registry.for_role(Role::Classifier),
        config.agents.max_tokens_for(Role::Classifier),
    );
    let orchestrator = Orchestrator::new(
        task_store,
        supervisor.clone(),
        classifier,
        registry.default_model(),
        config.consensus.discussion_rounds,
        Duration::from_secs(config.consensus.specialist_timeout_seconds),
    );

    let session_id = uuid::Uuid::new_v4();
    tracing::info!(%session_id, "session opened");

    let outcome = orchestrator.ask(session_id, &question, context).await;
    supervisor.stop_all().await;

    match outcome? {
        AskOutcome::Direct(answer) => {
            println!("{answer}");
        }
        AskOutcome::Deliberated {
            task_id, summary, ..
        } => {
            println!("{summary}");
            tracing::info!(%task_id, "full transcript stored with the task");
        }
        AskOutcome::TimedOut { task_id } => {
            anyhow::bail!("deliberation still running after timeout (task {task_id})");
        }
    }

    Ok(())
}
