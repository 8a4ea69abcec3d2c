use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::registry::{MetricKey, WindowCode};

/// Raw counting stats shared by game rows and season totals.
///
/// Every field is optional: a store may not carry on-ice or power-play data
/// for every row, and rows missing what a metric needs are skipped for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub goals: Option<f64>,
    pub points: Option<f64>,
    pub pp_points: Option<f64>,
    pub shots: Option<f64>,
    pub toi_minutes: Option<f64>,
    pub pp_toi_minutes: Option<f64>,
    pub on_ice_goals_for: Option<f64>,
    pub on_ice_shots_for: Option<f64>,
    pub on_ice_goals_against: Option<f64>,
    pub on_ice_shots_against: Option<f64>,
}

/// One player's line for one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRow {
    pub player_id: i64,
    pub game_id: i64,
    pub game_date: NaiveDate,
    pub season_id: i32,
    pub stats: StatLine,
}

/// One player's totals for one season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonRow {
    pub player_id: i64,
    /// e.g. 20242025
    pub season_id: i32,
    pub games_played: Option<f64>,
    pub stats: StatLine,
}

/// Family-shaped observation derived from a stat line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Observation {
    Beta { successes: f64, trials: f64 },
    Gamma { count: f64, exposure_minutes: f64 },
    Normal { value: f64, weight: f64 },
}

/// A per-game observation plus its recency position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameSample {
    /// 0 for the most recent row of the slice, counted before filtering
    pub games_ago: usize,
    pub observation: Observation,
}

/// Prior for a metric, derived from season history
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    /// Weighted denominator behind the mean; diagnostic only
    pub exposure: f64,
}

/// Posterior (or sampling) distribution behind a band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum DistributionParams {
    Beta { alpha: f64, beta: f64 },
    /// `rate` is per minute; intervals are reported per 60
    Gamma { shape: f64, rate: f64 },
    Normal { mean: f64, variance: f64, total_weight: f64 },
}

/// Band for one (metric, window) before it is attached to a player and date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandEstimate {
    pub ewma: f64,
    pub value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_eff: f64,
    pub prior_weight: f64,
    pub exposure: f64,
    pub params: DistributionParams,
}

/// Persisted band, unique on (player_id, snapshot_date, metric_key, window_code)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBandRecord {
    pub player_id: i64,
    pub season_id: Option<i32>,
    pub snapshot_date: NaiveDate,
    pub metric_key: MetricKey,
    pub window_code: WindowCode,
    pub baseline: f64,
    pub ewma: f64,
    pub value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_eff: f64,
    pub prior_weight: f64,
    pub exposure: f64,
    pub distribution_params: DistributionParams,
}

impl TrendBandRecord {
    /// Natural key used for idempotent upserts
    pub fn natural_key(&self) -> (i64, NaiveDate, MetricKey, WindowCode) {
        (self.player_id, self.snapshot_date, self.metric_key, self.window_code)
    }
}
