//! Snapshot orchestration: every requested (metric, window) band for one
//! player as of one date

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::band::BandComputer;
use crate::baseline::{baseline_for, is_informative};
use crate::config::BandConfig;
use crate::error::{Result, TrendBandError};
use crate::models::{
    BandEstimate, Baseline, DistributionParams, GameRow, GameSample, SeasonRow, TrendBandRecord,
};
use crate::registry::{MetricKey, WindowCode};
use crate::samples::extract_samples;

/// Decimal places kept for rates, ratios and distribution parameters
pub const RATIO_DECIMALS: i32 = 6;

/// Decimal places kept for exposure-like counts
pub const COUNT_DECIMALS: i32 = 3;

/// One metric to compute, optionally restricted to specific windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRequest {
    pub metric: String,
    /// `None` computes the metric's default windows
    pub windows: Option<Vec<WindowCode>>,
}

impl MetricRequest {
    pub fn new(metric: impl Into<String>) -> Self {
        Self { metric: metric.into(), windows: None }
    }

    pub fn with_windows(metric: impl Into<String>, windows: Vec<WindowCode>) -> Self {
        Self { metric: metric.into(), windows: Some(windows) }
    }

    /// Every registered metric with its default windows
    pub fn all_defaults() -> Vec<Self> {
        MetricKey::ALL.iter().map(|key| Self::new(key.as_str())).collect()
    }
}

/// Inputs for one snapshot
#[derive(Debug, Clone, Copy)]
pub struct SnapshotInput<'a> {
    pub player_id: i64,
    pub snapshot_date: NaiveDate,
    /// Games at or before `snapshot_date`, most recent first
    pub games: &'a [GameRow],
    pub seasons: &'a [SeasonRow],
}

/// Records produced for one snapshot, plus what was left out
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotReport {
    pub records: Vec<TrendBandRecord>,
    /// Requested keys missing from the registry
    pub unknown_metrics: Vec<String>,
    /// Metrics with no usable game in the slice
    pub insufficient_data: Vec<MetricKey>,
}

/// Runs the band computer over a metric x window request list
#[derive(Debug, Clone)]
pub struct SnapshotOrchestrator {
    config: BandConfig,
}

impl SnapshotOrchestrator {
    pub fn new(config: BandConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BandConfig {
        &self.config
    }

    /// Compute every requested band for one player and date.
    ///
    /// An unknown metric or a metric without data is reported on the result
    /// and does not stop the others; misconfiguration is an error.
    pub fn compute(
        &self,
        input: &SnapshotInput<'_>,
        requests: &[MetricRequest],
    ) -> Result<SnapshotReport> {
        let games = &input.games[..input.games.len().min(self.config.recent_games)];
        let season_id = games.first().map(|game| game.season_id);
        let mut report = SnapshotReport::default();
        let mut emitted: BTreeSet<(MetricKey, WindowCode)> = BTreeSet::new();

        for request in requests {
            let key = match request.metric.parse::<MetricKey>() {
                Ok(key) => key,
                Err(TrendBandError::UnknownMetric(name)) => {
                    warn!(player_id = input.player_id, metric = %name, "unknown metric requested");
                    report.unknown_metrics.push(name);
                    continue;
                }
                Err(other) => return Err(other),
            };
            let spec = key.spec();

            let samples: Vec<GameSample> = extract_samples(games, key).collect();
            if samples.is_empty() {
                debug!(player_id = input.player_id, metric = %key, "no usable games, skipping");
                if !report.insufficient_data.contains(&key) {
                    report.insufficient_data.push(key);
                }
                continue;
            }

            let baseline = baseline_for(spec, input.seasons);
            let mut computer = BandComputer::new(spec, baseline, self.config.confidence)?;
            if !is_informative(spec, &baseline) {
                // No season history for this metric: a zero baseline is not a zero rate.
                debug!(player_id = input.player_id, metric = %key, "no season baseline, using data only");
                computer = computer.without_prior();
            }
            let windows = request.windows.as_deref().unwrap_or(spec.default_windows);

            for &window in windows {
                if !emitted.insert((key, window)) {
                    continue;
                }
                let estimate = computer.compute(&samples, window.games())?;
                report.records.push(build_record(input, season_id, key, window, baseline, &estimate));
            }
        }

        debug!(
            player_id = input.player_id,
            snapshot_date = %input.snapshot_date,
            records = report.records.len(),
            "snapshot computed"
        );
        Ok(report)
    }
}

fn build_record(
    input: &SnapshotInput<'_>,
    season_id: Option<i32>,
    metric_key: MetricKey,
    window_code: WindowCode,
    baseline: Baseline,
    estimate: &BandEstimate,
) -> TrendBandRecord {
    TrendBandRecord {
        player_id: input.player_id,
        season_id,
        snapshot_date: input.snapshot_date,
        metric_key,
        window_code,
        baseline: round_ratio(baseline.mean),
        ewma: round_ratio(estimate.ewma),
        value: round_ratio(estimate.value),
        ci_lower: round_ratio(estimate.ci_lower),
        ci_upper: round_ratio(estimate.ci_upper),
        n_eff: round_count(estimate.n_eff),
        prior_weight: round_ratio(estimate.prior_weight),
        exposure: round_count(estimate.exposure),
        distribution_params: round_params(&estimate.params),
    }
}

/// Round to a fixed number of decimal places
pub fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round() / scale
}

fn round_ratio(x: f64) -> f64 {
    round_to(x, RATIO_DECIMALS)
}

fn round_count(x: f64) -> f64 {
    round_to(x, COUNT_DECIMALS)
}

fn round_params(params: &DistributionParams) -> DistributionParams {
    match *params {
        DistributionParams::Beta { alpha, beta } => {
            DistributionParams::Beta { alpha: round_ratio(alpha), beta: round_ratio(beta) }
        }
        DistributionParams::Gamma { shape, rate } => {
            DistributionParams::Gamma { shape: round_ratio(shape), rate: round_ratio(rate) }
        }
        DistributionParams::Normal { mean, variance, total_weight } => DistributionParams::Normal {
            mean: round_ratio(mean),
            variance: round_ratio(variance),
            total_weight: round_count(total_weight),
        },
    }
}
