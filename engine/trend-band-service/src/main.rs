//! # Trend Bands CLI Binary

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use trend_band_service::cli::{Cli, CliHandler};
use trend_band_service::{initialize_logging, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if !cli.metrics.is_empty() {
        config.pipeline.metrics = cli.metrics.clone();
    }

    initialize_logging(&config.logging)?;
    info!("Starting trend-bands v{}", env!("CARGO_PKG_VERSION"));
    match &cli.config {
        Some(path) => info!("Configuration loaded from {:?}", path),
        None => info!("Configuration loaded from defaults and environment"),
    }

    let handler = CliHandler::new(&config).await?;
    handler.handle_command(cli.command).await?;

    Ok(())
}
