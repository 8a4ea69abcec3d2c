//! Trend Bands
//!
//! Computes "sustainability bands" for player metrics: a recency-weighted
//! estimate of a player's current rate, shrunk toward a season-history
//! baseline, with a credible interval around it. A short hot or cold streak
//! shows up as a wide band that still overlaps the baseline; a real change in
//! ability moves the whole band.
//!
//! The crate is pure computation. Fetching game rows and persisting records
//! live in `trend-band-service`.

pub mod band;
pub mod baseline;
pub mod config;
pub mod error;
pub mod models;
pub mod quantile;
pub mod rebuild;
pub mod registry;
pub mod samples;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use band::{blend, decay_weight, BandComputer, Blend};
pub use baseline::{baseline_for, estimate_baseline};
pub use config::BandConfig;
pub use error::{Result, TrendBandError};
pub use models::*;
pub use rebuild::{DateRange, GameBuffer, HistoricalRebuild, RebuildSnapshot};
pub use registry::{spec, DistributionFamily, ExposureKind, MetricKey, MetricSpec, WindowCode};
pub use samples::extract_samples;
pub use snapshot::{MetricRequest, SnapshotInput, SnapshotOrchestrator, SnapshotReport};

/// Default credible interval mass
pub const DEFAULT_CONFIDENCE: f64 = 0.80;

/// Default bound on games handed to one snapshot
pub const DEFAULT_RECENT_GAMES: usize = 40;

/// Default capacity of the rebuild game buffer
pub const DEFAULT_REBUILD_BUFFER_GAMES: usize = 40;

/// Season totals fetched per player for the baseline
pub const SEASON_HISTORY_LIMIT: usize = baseline::MAX_SEASONS;
