//! Baseline estimation from season totals

use crate::models::{Baseline, Observation, SeasonRow};
use crate::registry::{DistributionFamily, MetricKey, MetricSpec};
use crate::samples::observe;

/// Weights for the most recent, second and third most recent seasons
pub const SEASON_WEIGHTS: [f64; 3] = [0.6, 0.3, 0.1];

/// Season rows considered; the fourth gets no weight from the table
pub const MAX_SEASONS: usize = 4;

/// Recency weights for `n` seasons, normalized to sum to 1.
///
/// Falls back to uniform weights if the table gives every season zero.
pub fn season_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let raw: Vec<f64> = (0..n).map(|i| SEASON_WEIGHTS.get(i).copied().unwrap_or(0.0)).collect();
    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        raw.into_iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / n as f64; n]
    }
}

/// Prior mean and exposure for `metric` from season history.
///
/// Rows may arrive in any order. With no rows the result is all zeros, which
/// callers must read as "no informative prior".
pub fn estimate_baseline(rows: &[SeasonRow], metric: MetricKey) -> Baseline {
    let mut recent: Vec<&SeasonRow> = rows.iter().collect();
    recent.sort_by(|a, b| b.season_id.cmp(&a.season_id));
    recent.truncate(MAX_SEASONS);

    let weights = season_weights(recent.len());
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut seasons = 0.0;

    for (row, w) in recent.iter().zip(&weights) {
        let games = row.games_played.unwrap_or(0.0);
        match observe(metric, &row.stats, games) {
            Some(Observation::Beta { successes, trials }) => {
                numerator += w * successes;
                denominator += w * trials;
            }
            Some(Observation::Gamma { count, exposure_minutes }) => {
                numerator += w * count;
                denominator += w * exposure_minutes;
            }
            Some(Observation::Normal { value, weight }) => {
                numerator += w * weight * value;
                denominator += w * weight;
                seasons += w;
            }
            None => {}
        }
    }

    let ratio = if denominator > 0.0 { numerator / denominator } else { 0.0 };
    match metric.spec().family {
        DistributionFamily::Beta => {
            Baseline { mean: ratio.clamp(0.0, 1.0), exposure: denominator }
        }
        DistributionFamily::Gamma => {
            Baseline { mean: ratio * 60.0, exposure: denominator }
        }
        DistributionFamily::Normal => Baseline { mean: ratio, exposure: seasons },
    }
}

/// Whether `baseline` carries information the band computer should shrink
/// toward. A fixed neutral value always does; an estimate only when some
/// season contributed exposure.
pub fn is_informative(spec: &MetricSpec, baseline: &Baseline) -> bool {
    spec.fixed_baseline.is_some() || baseline.exposure > 0.0
}

/// Baseline used by the band computer, honouring a metric's fixed neutral value
pub fn baseline_for(spec: &MetricSpec, rows: &[SeasonRow]) -> Baseline {
    let estimated = estimate_baseline(rows, spec.key);
    match spec.fixed_baseline {
        Some(mean) => Baseline { mean, ..estimated },
        None => estimated,
    }
}
