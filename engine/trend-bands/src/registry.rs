//! Metric registry and window codes
//!
//! The registry is a fixed table built into the binary. Each metric names its
//! distribution family, what one unit of exposure means, the half-life used for
//! recency decay, the prior strength used for shrinkage, and the windows that
//! are computed when a caller does not ask for specific ones.

use crate::error::{Result, TrendBandError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conjugate family used to model a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionFamily {
    /// Successes out of trials (Beta-Binomial)
    Beta,
    /// Event counts over ice time (Gamma-Poisson)
    Gamma,
    /// Per-game continuous values
    Normal,
}

/// What one unit of exposure (and of prior strength) measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureKind {
    Shots,
    OnIceShotsFor,
    OnIceShotsAgainst,
    Minutes,
    PowerPlayMinutes,
    Games,
}

/// Registered metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    /// Goals per shot
    ShPct,
    /// On-ice goals for per on-ice shot for
    OiShPct,
    /// On-ice saves per on-ice shot against
    OiSvPct,
    ShotsPer60,
    PointsPer60,
    /// Power-play points per 60 power-play minutes
    PpPointsPer60,
    /// On-ice shooting % plus on-ice save %
    Pdo,
    /// Minutes played per game
    ToiPerGame,
}

impl MetricKey {
    pub const ALL: [MetricKey; 8] = [
        MetricKey::ShPct,
        MetricKey::OiShPct,
        MetricKey::OiSvPct,
        MetricKey::ShotsPer60,
        MetricKey::PointsPer60,
        MetricKey::PpPointsPer60,
        MetricKey::Pdo,
        MetricKey::ToiPerGame,
    ];

    /// Key under which the metric is persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::ShPct => "sh_pct",
            MetricKey::OiShPct => "oi_sh_pct",
            MetricKey::OiSvPct => "oi_sv_pct",
            MetricKey::ShotsPer60 => "shots_per_60",
            MetricKey::PointsPer60 => "points_per_60",
            MetricKey::PpPointsPer60 => "pp_points_per_60",
            MetricKey::Pdo => "pdo",
            MetricKey::ToiPerGame => "toi_per_game",
        }
    }

    /// Registry entry for this metric
    pub fn spec(&self) -> &'static MetricSpec {
        // The table is indexed in the same order as `ALL`.
        &METRIC_SPECS[*self as usize]
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = TrendBandError;

    fn from_str(s: &str) -> Result<Self> {
        MetricKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| TrendBandError::UnknownMetric(s.to_string()))
    }
}

/// Trailing game windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowCode {
    L3,
    L5,
    L10,
    L20,
}

impl WindowCode {
    pub const ALL: [WindowCode; 4] = [WindowCode::L3, WindowCode::L5, WindowCode::L10, WindowCode::L20];

    /// Number of games covered by the window
    pub fn games(&self) -> usize {
        match self {
            WindowCode::L3 => 3,
            WindowCode::L5 => 5,
            WindowCode::L10 => 10,
            WindowCode::L20 => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowCode::L3 => "l3",
            WindowCode::L5 => "l5",
            WindowCode::L10 => "l10",
            WindowCode::L20 => "l20",
        }
    }
}

impl fmt::Display for WindowCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowCode {
    type Err = TrendBandError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        WindowCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == lowered)
            .ok_or_else(|| TrendBandError::UnknownWindow(s.to_string()))
    }
}

/// Immutable description of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSpec {
    pub key: MetricKey,
    pub family: DistributionFamily,
    pub exposure: ExposureKind,
    /// Games after which a sample's weight has halved
    pub half_life_games: f64,
    /// Prior pseudo-exposure, in the metric's exposure unit
    pub prior_strength: f64,
    pub default_windows: &'static [WindowCode],
    /// Baseline used instead of season history, for metrics whose neutral
    /// value is defined rather than learned
    pub fixed_baseline: Option<f64>,
}

impl MetricSpec {
    /// Check the spec is usable by the band computer
    pub fn validate(&self) -> Result<()> {
        let metric = self.key.as_str();
        if !(self.half_life_games.is_finite() && self.half_life_games > 0.0) {
            return Err(TrendBandError::malformed(
                metric,
                format!("half-life must be positive, got {}", self.half_life_games),
            ));
        }
        if !(self.prior_strength.is_finite() && self.prior_strength >= 0.0) {
            return Err(TrendBandError::malformed(
                metric,
                format!("prior strength must be non-negative, got {}", self.prior_strength),
            ));
        }
        if self.default_windows.is_empty() {
            return Err(TrendBandError::malformed(metric, "no default windows"));
        }
        if let Some(fixed) = self.fixed_baseline {
            if !fixed.is_finite() {
                return Err(TrendBandError::malformed(metric, "fixed baseline is not finite"));
            }
        }
        Ok(())
    }
}

static METRIC_SPECS: [MetricSpec; 8] = [
    MetricSpec {
        key: MetricKey::ShPct,
        family: DistributionFamily::Beta,
        exposure: ExposureKind::Shots,
        half_life_games: 11.0,
        prior_strength: 100.0,
        default_windows: &[WindowCode::L5, WindowCode::L10, WindowCode::L20],
        fixed_baseline: None,
    },
    MetricSpec {
        key: MetricKey::OiShPct,
        family: DistributionFamily::Beta,
        exposure: ExposureKind::OnIceShotsFor,
        half_life_games: 15.0,
        prior_strength: 250.0,
        default_windows: &[WindowCode::L10, WindowCode::L20],
        fixed_baseline: None,
    },
    MetricSpec {
        key: MetricKey::OiSvPct,
        family: DistributionFamily::Beta,
        exposure: ExposureKind::OnIceShotsAgainst,
        half_life_games: 15.0,
        prior_strength: 250.0,
        default_windows: &[WindowCode::L10, WindowCode::L20],
        fixed_baseline: None,
    },
    MetricSpec {
        key: MetricKey::ShotsPer60,
        family: DistributionFamily::Gamma,
        exposure: ExposureKind::Minutes,
        half_life_games: 8.0,
        prior_strength: 120.0,
        default_windows: &[WindowCode::L3, WindowCode::L5, WindowCode::L10, WindowCode::L20],
        fixed_baseline: None,
    },
    MetricSpec {
        key: MetricKey::PointsPer60,
        family: DistributionFamily::Gamma,
        exposure: ExposureKind::Minutes,
        half_life_games: 10.0,
        prior_strength: 240.0,
        default_windows: &[WindowCode::L5, WindowCode::L10, WindowCode::L20],
        fixed_baseline: None,
    },
    MetricSpec {
        key: MetricKey::PpPointsPer60,
        family: DistributionFamily::Gamma,
        exposure: ExposureKind::PowerPlayMinutes,
        half_life_games: 10.0,
        prior_strength: 60.0,
        default_windows: &[WindowCode::L10, WindowCode::L20],
        fixed_baseline: None,
    },
    MetricSpec {
        key: MetricKey::Pdo,
        family: DistributionFamily::Normal,
        exposure: ExposureKind::Games,
        half_life_games: 10.0,
        prior_strength: 20.0,
        default_windows: &[WindowCode::L10, WindowCode::L20],
        fixed_baseline: Some(1.0),
    },
    MetricSpec {
        key: MetricKey::ToiPerGame,
        family: DistributionFamily::Normal,
        exposure: ExposureKind::Games,
        half_life_games: 6.0,
        prior_strength: 10.0,
        default_windows: &[WindowCode::L3, WindowCode::L5, WindowCode::L10],
        fixed_baseline: None,
    },
];

/// Look up a metric by its persisted key
pub fn spec(metric_key: &str) -> Result<&'static MetricSpec> {
    metric_key.parse::<MetricKey>().map(|key| key.spec())
}

/// All registered metric specs, in registry order
pub fn all_specs() -> &'static [MetricSpec] {
    &METRIC_SPECS
}
