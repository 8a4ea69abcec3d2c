//! Error types for the trend band core

use thiserror::Error;

/// Result type for trend band operations
pub type Result<T> = std::result::Result<T, TrendBandError>;

/// Errors raised by the statistical core.
///
/// Missing or thin data is never an error: it falls back to the baseline or
/// omits the record. These variants cover lookups and misconfiguration only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrendBandError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown window code: {0}")]
    UnknownWindow(String),

    #[error("Invalid window size: {0} games")]
    InvalidWindow(usize),

    #[error("Malformed metric spec for {metric}: {reason}")]
    MalformedSpec { metric: String, reason: String },

    #[error("Confidence level must be in (0, 1), got {0}")]
    InvalidConfidence(f64),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

impl TrendBandError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub(crate) fn malformed(metric: &str, reason: impl Into<String>) -> Self {
        Self::MalformedSpec { metric: metric.to_string(), reason: reason.into() }
    }
}
