use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "colloquy", version, about = "Multi-agent deliberation orchestrator")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ask a question; complex ones get a full deliberation.
    Ask {
        question: String,
        /// Prior-conversation snapshot handed to the agents.
        #[arg(long)]
        context: Option<String>,
        /// Override the configured discussion-round budget.
        #[arg(long)]
        rounds: Option<u32>,
    },
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the configuration and report issues.
    Validate,
    /// Print the effective configuration.
    Show,
}
