//! heartwire CLI
//!
//! # Commands
//! - `heartwire discover --tree <json>` - list run-time channels found in a state tree
//! - `heartwire check --config <toml>` - validate a configuration and show the channels it yields
//! - `heartwire run --tree <json>` - run the engine against a captured state tree until Ctrl-C

mod check;
mod discover;
mod run;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use heartwire::runtime::EngineConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// heartwire - keeps silent run-time channels alive
#[derive(Parser)]
#[command(name = "heartwire")]
#[command(
    author,
    version,
    about = "Silence detection and synthetic republish for engine run-time channels"
)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List run-time channel candidates in a state tree
    Discover {
        /// State tree JSON file
        #[arg(short, long)]
        tree: PathBuf,

        /// Domain root to scan
        #[arg(short, long, default_value = heartwire::runtime::config::DEFAULT_DOMAIN_ROOT)]
        root: String,

        /// Print candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Check {
        /// Configuration TOML file
        #[arg(short, long)]
        config: PathBuf,

        /// Optional state tree, to preview which channels would be monitored
        #[arg(short, long)]
        tree: Option<PathBuf>,
    },

    /// Run the engine against an in-process bus seeded from a state tree
    Run {
        /// Configuration TOML file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// State tree JSON file
        #[arg(short, long)]
        tree: PathBuf,

        /// Print the engine status every N seconds (0 disables)
        #[arg(long, default_value = "30")]
        status_every: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = heartwire_observe::DEFAULT_DIRECTIVE;
    match cli.log_format {
        LogFormat::Text => heartwire_observe::init_stdout_tracing(directive)?,
        LogFormat::Json => heartwire_observe::init_json_tracing(directive)?,
    }

    match cli.command {
        Commands::Discover { tree, root, json } => {
            discover::run_discover_command(&tree, &root, json)
        }
        Commands::Check { config, tree } => check::run_check_command(&config, tree.as_deref()),
        Commands::Run {
            config,
            tree,
            status_every,
        } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(run::run_engine_command(config.as_deref(), &tree, status_every))
        }
    }
}

pub(crate) fn load_tree(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state tree: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state tree JSON: {}", path.display()))
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Invalid configuration: {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}
