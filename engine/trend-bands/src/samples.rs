//! Sample extraction: raw stat lines to family-shaped observations

use crate::models::{GameRow, GameSample, Observation, StatLine};
use crate::registry::MetricKey;

/// Observation for `metric` from a stat line covering `games` games.
///
/// Returns `None` when a required field is absent, or when the exposure
/// (trials, minutes, games) is not strictly positive.
pub fn observe(metric: MetricKey, stats: &StatLine, games: f64) -> Option<Observation> {
    match metric {
        MetricKey::ShPct => beta(stats.goals?, stats.shots?),
        MetricKey::OiShPct => beta(stats.on_ice_goals_for?, stats.on_ice_shots_for?),
        MetricKey::OiSvPct => {
            let against = stats.on_ice_shots_against?;
            let saves = against - stats.on_ice_goals_against?;
            beta(saves.max(0.0), against)
        }
        MetricKey::ShotsPer60 => gamma(stats.shots?, stats.toi_minutes?),
        MetricKey::PointsPer60 => gamma(stats.points?, stats.toi_minutes?),
        MetricKey::PpPointsPer60 => gamma(stats.pp_points?, stats.pp_toi_minutes?),
        MetricKey::Pdo => {
            let shots_for = positive(stats.on_ice_shots_for?)?;
            let shots_against = positive(stats.on_ice_shots_against?)?;
            let sh_pct = stats.on_ice_goals_for? / shots_for;
            let sv_pct = 1.0 - stats.on_ice_goals_against? / shots_against;
            normal(sh_pct + sv_pct, games)
        }
        MetricKey::ToiPerGame => {
            let games = positive(games)?;
            let minutes = positive(stats.toi_minutes?)?;
            normal(minutes / games, games)
        }
    }
}

/// Samples for `metric` from rows ordered most-recent-first.
///
/// `games_ago` is the row's position in `rows`, so skipped rows still use up
/// a decay slot.
pub fn extract_samples(
    rows: &[GameRow],
    metric: MetricKey,
) -> impl Iterator<Item = GameSample> + '_ {
    rows.iter().enumerate().filter_map(move |(games_ago, row)| {
        observe(metric, &row.stats, 1.0).map(|observation| GameSample { games_ago, observation })
    })
}

fn positive(x: f64) -> Option<f64> {
    (x.is_finite() && x > 0.0).then_some(x)
}

fn count(x: f64) -> Option<f64> {
    (x.is_finite() && x >= 0.0).then_some(x)
}

fn beta(successes: f64, trials: f64) -> Option<Observation> {
    let trials = positive(trials)?;
    let successes = count(successes)?.min(trials);
    Some(Observation::Beta { successes, trials })
}

fn gamma(events: f64, minutes: f64) -> Option<Observation> {
    let exposure_minutes = positive(minutes)?;
    Some(Observation::Gamma { count: count(events)?, exposure_minutes })
}

fn normal(value: f64, weight: f64) -> Option<Observation> {
    let weight = positive(weight)?;
    value.is_finite().then_some(Observation::Normal { value, weight })
}
