//! provenance: command-line front end for the governance and change-log engine
//!
//! Replays YAML call scripts against an in-process engine and prints one
//! JSON line per call. Logs go to stderr so stdout stays machine-readable.

mod script;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use provenance::{DataHash, Engine, EngineConfig, RegistrySnapshot, ResourceRegistry};

#[derive(Parser)]
#[command(name = "provenance")]
#[command(about = "Per-resource governance and audit-trail engine")]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, env = "PROVENANCE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log filter (overrides RUST_LOG and the config file)
    #[arg(long, env = "PROVENANCE_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a call script and print one JSON result per step
    Replay {
        /// YAML list of steps
        script: PathBuf,

        /// Stop at the first failing step and exit non-zero
        #[arg(long)]
        fail_fast: bool,

        /// Start from a previously written snapshot
        #[arg(long)]
        snapshot_in: Option<PathBuf>,

        /// Write the final state as JSON
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },

    /// Print the default configuration as YAML
    InitConfig,

    /// Print the SHA-256 data hash of a text payload
    Hash {
        text: String,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            Ok(EngineConfig::from_yaml(&content)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn init_tracing(cli_level: Option<&str>, config: &EngineConfig) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(cli.log_level.as_deref(), &config);

    match cli.command {
        Command::Replay {
            script,
            fail_fast,
            snapshot_in,
            snapshot_out,
        } => {
            let steps = script::load_script(&script)?;
            info!(script = %script.display(), steps = steps.len(), "Replaying script");

            let registry = match snapshot_in {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
                    ResourceRegistry::restore(RegistrySnapshot::from_json(&json)?, config)?
                }
                None => ResourceRegistry::with_config(config),
            };
            let engine = Engine::from_registry(registry);

            let mut stdout = std::io::stdout().lock();
            let summary = script::replay(&engine, &steps, fail_fast, &mut stdout).await?;

            if let Some(path) = snapshot_out {
                let json = engine.snapshot().await.to_json()?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
                info!(path = %path.display(), "Snapshot written");
            }

            if fail_fast && summary.failed > 0 {
                anyhow::bail!("replay aborted at step {}", summary.executed - 1);
            }
        }
        Command::InitConfig => {
            print!("{}", EngineConfig::default().to_yaml()?);
        }
        Command::Hash { text } => {
            println!("{}", DataHash::digest(text));
        }
    }

    Ok(())
}
