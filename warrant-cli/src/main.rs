use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use warrant_config::{ConfigLoader, LogLevel, WarrantConfig};

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Load configuration from file or use defaults
fn load_config(config_path: Option<&PathBuf>) -> Result<WarrantConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Initialize logging, letting `--log-level` override the configured level
fn init_logging(config: &WarrantConfig, log_level: Option<&String>) -> Result<()> {
    let mut logging = config.logging.clone();
    if let Some(level) = log_level {
        logging.level = level
            .parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    warrant_logging::init_logging_from_config(&logging)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config, cli.log_level.as_ref())?;

    info!("Warrant CLI starting");

    match &cli.command {
        Some(Commands::Config { config_cmd }) => {
            commands::config::handle(config_cmd, &config)
        }
        Some(command) => commands::run(command, &config, &cli.scope).await,
        None => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            cmd.print_help().context("Failed to print help")?;
            println!();
            Ok(())
        }
    }
}
