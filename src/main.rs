use clap::Parser;
use gexdesk::cli::{self, Cli, Commands};
use gexdesk::config::AppConfig;
use tracing::{debug, error};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;

    // One-shot lookups stay quiet; data collection runs get full logging
    match cli.command {
        Commands::Market
        | Commands::Manage { .. }
        | Commands::Report { .. }
        | Commands::Watchlists => init_logging_simple(&config.logging),
        _ => init_logging(&config.logging),
    }

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }
    debug!("Loaded configuration from {}", cli.config_dir.display());

    cli::commands::run(cli, config).await
}
