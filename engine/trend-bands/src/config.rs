use serde::{Deserialize, Serialize};

use crate::error::{Result, TrendBandError};
use crate::{DEFAULT_CONFIDENCE, DEFAULT_REBUILD_BUFFER_GAMES, DEFAULT_RECENT_GAMES};

/// Tunables for band computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    /// Credible interval mass (0.80 gives the 10th/90th percentiles)
    pub confidence: f64,

    /// Most recent games handed to a single snapshot
    pub recent_games: usize,

    /// Capacity of the sliding game buffer used by historical rebuilds
    pub rebuild_buffer_games: usize,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            recent_games: DEFAULT_RECENT_GAMES,
            rebuild_buffer_games: DEFAULT_REBUILD_BUFFER_GAMES,
        }
    }
}

impl BandConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(TrendBandError::InvalidConfidence(self.confidence));
        }
        if self.recent_games == 0 {
            return Err(TrendBandError::config("recent_games must be greater than 0"));
        }
        if self.rebuild_buffer_games == 0 {
            return Err(TrendBandError::config("rebuild_buffer_games must be greater than 0"));
        }
        Ok(())
    }
}
