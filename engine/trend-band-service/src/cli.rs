//! # Command Line Interface
//!
//! Runs snapshots, rebuilds and schema setup against Postgres.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use trend_bands::DateRange;

use crate::config::ServiceConfig;
use crate::pipeline::BandPipeline;
use crate::postgres::PgBandStore;

/// Trend band CLI
#[derive(Parser)]
#[command(name = "trend-bands")]
#[command(about = "Compute and store player trend bands")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Metrics to compute, comma separated (overrides configuration)
    #[arg(long, value_delimiter = ',', global = true)]
    pub metrics: Vec<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute bands for one player and date
    Snapshot {
        #[arg(long)]
        player: i64,
        /// Snapshot date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Recompute one snapshot per game date in a range
    Rebuild {
        #[arg(long)]
        player: i64,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Compute bands for many players concurrently
    Batch {
        /// Player ids, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        players: Vec<i64>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Create the stat and band tables if missing
    InitSchema,
}

/// CLI handler
pub struct CliHandler {
    store: Arc<PgBandStore>,
    pipeline: BandPipeline<PgBandStore, PgBandStore>,
}

impl CliHandler {
    pub async fn new(config: &ServiceConfig) -> Result<Self> {
        let store = Arc::new(
            PgBandStore::connect(&config.database)
                .await
                .context("Failed to connect to database")?,
        );
        let pipeline = BandPipeline::new(store.clone(), store.clone(), config.bands.clone(), &config.pipeline)?;
        Ok(Self { store, pipeline })
    }

    /// Handle CLI commands
    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Snapshot { player, date } => {
                let summary = self.pipeline.snapshot(player, date.unwrap_or_else(today)).await?;
                print_json(&summary)?;
            }
            Commands::Rebuild { player, start, end } => {
                let summary = self.pipeline.rebuild(player, DateRange::new(start, end)).await?;
                print_json(&summary)?;
            }
            Commands::Batch { players, date } => {
                let summary = self.pipeline.snapshot_many(&players, date.unwrap_or_else(today)).await;
                for snapshot in &summary.succeeded {
                    print_json(snapshot)?;
                }
                info!(
                    succeeded = summary.succeeded.len(),
                    failed = summary.failed.len(),
                    records = summary.records_written(),
                    "Batch complete"
                );
                if !summary.failed.is_empty() {
                    let ids: Vec<String> = summary.failed.iter().map(|(id, _)| id.to_string()).collect();
                    anyhow::bail!("Snapshots failed for players: {}", ids.join(", "));
                }
            }
            Commands::InitSchema => {
                self.store.ensure_schema().await?;
            }
        }
        Ok(())
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
