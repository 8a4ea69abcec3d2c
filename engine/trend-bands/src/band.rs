//! Windowed band computer
//!
//! For one metric and one trailing window: half-life weighting of the most
//! recent samples, an EWMA estimate, shrinkage toward the baseline, and a
//! credible interval from the conjugate posterior (Beta-Binomial for rates
//! with trials, Gamma-Poisson for per-60 rates) or a normal approximation.

use tracing::debug;

use crate::error::{Result, TrendBandError};
use crate::models::{BandEstimate, Baseline, DistributionParams, GameSample, Observation};
use crate::quantile::credible_interval;
use crate::registry::{DistributionFamily, MetricSpec};

/// Floor added to posterior parameters so they stay strictly positive
pub const PARAM_FLOOR: f64 = 1e-6;

/// Smallest variance used for normal-family intervals
pub const NORMAL_VARIANCE_FLOOR: f64 = 1e-4;

/// Weight of a sample `games_ago` games back: 1 at zero, halving every
/// `half_life` games
pub fn decay_weight(games_ago: usize, half_life: f64) -> f64 {
    (-(games_ago as f64) / half_life).exp2()
}

/// Result of shrinking an estimate toward a prior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blend {
    pub value: f64,
    /// Evidence plus prior strength actually used
    pub weight: f64,
    /// Prior strength actually used
    pub prior_weight: f64,
}

impl Blend {
    /// Fraction of the blend carried by the prior
    pub fn prior_share(&self) -> f64 {
        if self.weight > 0.0 {
            self.prior_weight / self.weight
        } else {
            0.0
        }
    }
}

/// Shrink `estimate` (backed by `n_eff`) toward `prior_mean` (backed by `k`)
pub fn blend(n_eff: f64, estimate: f64, k: f64, prior_mean: f64) -> Blend {
    if n_eff <= 0.0 && k <= 0.0 {
        Blend { value: estimate, weight: 0.0, prior_weight: 0.0 }
    } else if k <= 0.0 {
        Blend { value: estimate, weight: n_eff, prior_weight: 0.0 }
    } else if n_eff <= 0.0 {
        Blend { value: prior_mean, weight: k, prior_weight: k }
    } else {
        Blend {
            value: (n_eff * estimate + k * prior_mean) / (n_eff + k),
            weight: n_eff + k,
            prior_weight: k,
        }
    }
}

/// Computes bands for one metric against a fixed baseline
#[derive(Debug, Clone)]
pub struct BandComputer<'a> {
    spec: &'a MetricSpec,
    baseline: Baseline,
    prior_strength: f64,
    confidence: f64,
}

impl<'a> BandComputer<'a> {
    /// Create a computer, rejecting malformed specs and confidence levels
    pub fn new(spec: &'a MetricSpec, baseline: Baseline, confidence: f64) -> Result<Self> {
        spec.validate()?;
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(TrendBandError::InvalidConfidence(confidence));
        }
        Ok(Self { spec, baseline, prior_strength: spec.prior_strength, confidence })
    }

    /// Drop the prior: bands follow the data alone, with posterior
    /// parameters from observations plus the floor
    pub fn without_prior(mut self) -> Self {
        self.prior_strength = 0.0;
        self
    }

    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    /// Band over the first `window_games` samples of `samples`, which must be
    /// ordered most-recent-first
    pub fn compute(&self, samples: &[GameSample], window_games: usize) -> Result<BandEstimate> {
        if window_games == 0 {
            return Err(TrendBandError::InvalidWindow(window_games));
        }
        let window = &samples[..samples.len().min(window_games)];

        let estimate = match self.spec.family {
            DistributionFamily::Beta => self.beta_band(window)?,
            DistributionFamily::Gamma => self.gamma_band(window)?,
            DistributionFamily::Normal => self.normal_band(window)?,
        };

        debug!(
            metric = %self.spec.key,
            window_games,
            samples = window.len(),
            ewma = estimate.ewma,
            value = estimate.value,
            ci_lower = estimate.ci_lower,
            ci_upper = estimate.ci_upper,
            n_eff = estimate.n_eff,
            "computed band"
        );
        Ok(estimate)
    }

    fn weight(&self, sample: &GameSample) -> f64 {
        decay_weight(sample.games_ago, self.spec.half_life_games)
    }

    fn mismatch(&self, observation: &Observation) -> TrendBandError {
        TrendBandError::malformed(
            self.spec.key.as_str(),
            format!("{:?} metric received {:?}", self.spec.family, observation),
        )
    }

    fn beta_band(&self, window: &[GameSample]) -> Result<BandEstimate> {
        let mut successes = 0.0;
        let mut trials = 0.0;
        let mut raw_trials = 0.0;
        for sample in window {
            match sample.observation {
                Observation::Beta { successes: s, trials: t } => {
                    let w = self.weight(sample);
                    successes += w * s;
                    trials += w * t;
                    raw_trials += t;
                }
                ref other => return Err(self.mismatch(other)),
            }
        }

        let prior_mean = self.baseline.mean;
        let k = self.prior_strength;
        let ewma = if trials > 0.0 { successes / trials } else { prior_mean };
        let blended = blend(trials, ewma, k, prior_mean);

        let params = DistributionParams::Beta {
            alpha: (prior_mean * k + successes + PARAM_FLOOR).max(PARAM_FLOOR),
            beta: ((1.0 - prior_mean) * k + (trials - successes) + PARAM_FLOOR).max(PARAM_FLOOR),
        };
        let (lower, upper) = credible_interval(self.confidence, &params);

        let value = blended.value.clamp(0.0, 1.0);
        Ok(BandEstimate {
            ewma,
            value,
            ci_lower: lower.min(value).max(0.0),
            ci_upper: upper.max(value).min(1.0),
            n_eff: trials,
            prior_weight: blended.prior_share(),
            exposure: raw_trials,
            params,
        })
    }

    fn gamma_band(&self, window: &[GameSample]) -> Result<BandEstimate> {
        let mut count = 0.0;
        let mut minutes = 0.0;
        let mut raw_minutes = 0.0;
        for sample in window {
            match sample.observation {
                Observation::Gamma { count: c, exposure_minutes: e } => {
                    let w = self.weight(sample);
                    count += w * c;
                    minutes += w * e;
                    raw_minutes += e;
                }
                ref other => return Err(self.mismatch(other)),
            }
        }

        let prior_mean = self.baseline.mean;
        let k = self.prior_strength;
        let ewma = if minutes > 0.0 { count / minutes * 60.0 } else { prior_mean };
        let blended = blend(minutes, ewma, k, prior_mean);

        // Parameters are per minute; the reported band is per 60.
        let params = DistributionParams::Gamma {
            shape: (prior_mean / 60.0) * k + count + PARAM_FLOOR,
            rate: k + minutes + PARAM_FLOOR,
        };
        let (lower, upper) = credible_interval(self.confidence, &params);

        let value = blended.value.max(0.0);
        Ok(BandEstimate {
            ewma,
            value,
            ci_lower: (lower * 60.0).min(value).max(0.0),
            ci_upper: (upper * 60.0).max(value),
            n_eff: minutes,
            prior_weight: blended.prior_share(),
            exposure: raw_minutes,
            params,
        })
    }

    fn normal_band(&self, window: &[GameSample]) -> Result<BandEstimate> {
        let mut total_weight = 0.0;
        let mut weighted_sum = 0.0;
        let mut raw_weight = 0.0;
        let mut points = Vec::with_capacity(window.len());
        for sample in window {
            match sample.observation {
                Observation::Normal { value, weight } => {
                    let w = self.weight(sample) * weight;
                    total_weight += w;
                    weighted_sum += w * value;
                    raw_weight += weight;
                    points.push((w, value));
                }
                ref other => return Err(self.mismatch(other)),
            }
        }

        let prior_mean = self.baseline.mean;
        let k = self.prior_strength;
        let (ewma, variance) = if total_weight > 0.0 {
            let mean = weighted_sum / total_weight;
            let second_moment =
                points.iter().map(|(w, v)| w * (v - mean).powi(2)).sum::<f64>() / total_weight;
            (mean, second_moment.max(NORMAL_VARIANCE_FLOOR))
        } else {
            (prior_mean, NORMAL_VARIANCE_FLOOR)
        };
        let blended = blend(total_weight, ewma, k, prior_mean);

        // The interval is centred on the shrunk value, with the sampling
        // spread of the window.
        let params =
            DistributionParams::Normal { mean: blended.value, variance, total_weight };
        let (lower, upper) = credible_interval(self.confidence, &params);

        Ok(BandEstimate {
            ewma,
            value: blended.value,
            ci_lower: lower.min(blended.value),
            ci_upper: upper.max(blended.value),
            n_eff: total_weight,
            prior_weight: blended.prior_share(),
            exposure: raw_weight,
            params,
        })
    }
}
