//! Error types for the trend band service

use thiserror::Error;
use trend_bands::TrendBandError;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by a game-history store or band sink
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while computing and persisting bands
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Fetching rows failed; aborts this player's snapshot only
    #[error("Failed to fetch history for player {player_id}: {source}")]
    UpstreamFetch { player_id: i64, source: StoreError },

    /// Writing a batch failed; batches are idempotent, so a retry is safe
    #[error("Failed to persist {records} band records: {source}")]
    Persistence { records: usize, source: StoreError },

    #[error("Band computation error: {0}")]
    Band(#[from] TrendBandError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamFetch { .. } | Self::Persistence { .. })
    }
}
