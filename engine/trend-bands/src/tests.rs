//! Property tests for band invariants

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use crate::band::{decay_weight, BandComputer};
use crate::config::BandConfig;
use crate::models::{Baseline, DistributionParams, GameRow, GameSample, Observation, StatLine};
use crate::quantile::credible_interval;
use crate::rebuild::{DateRange, HistoricalRebuild};
use crate::registry::{MetricKey, WindowCode};
use crate::snapshot::{MetricRequest, SnapshotInput, SnapshotOrchestrator};
use crate::estimate_baseline;

fn arb_beta_samples() -> impl Strategy<Value = Vec<GameSample>> {
    prop::collection::vec((0.0f64..1.0, 1.0f64..40.0, 0usize..3), 0..25).prop_map(|rows| {
        let mut games_ago = 0;
        rows.into_iter()
            .map(|(rate, trials, gap)| {
                games_ago += gap;
                let trials = trials.round();
                let sample = GameSample {
                    games_ago,
                    observation: Observation::Beta { successes: (rate * trials).round(), trials },
                };
                games_ago += 1;
                sample
            })
            .collect()
    })
}

fn arb_gamma_samples() -> impl Strategy<Value = Vec<GameSample>> {
    prop::collection::vec((0u32..8, 0.5f64..30.0), 0..25).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(games_ago, (count, minutes))| GameSample {
                games_ago,
                observation: Observation::Gamma { count: count as f64, exposure_minutes: minutes },
            })
            .collect()
    })
}

fn arb_normal_samples() -> impl Strategy<Value = Vec<GameSample>> {
    prop::collection::vec((0.0f64..30.0, 0.5f64..3.0), 0..25).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(games_ago, (value, weight))| GameSample {
                games_ago,
                observation: Observation::Normal { value, weight },
            })
            .collect()
    })
}

fn arb_games() -> impl Strategy<Value = Vec<GameRow>> {
    prop::collection::vec((0i64..3, 0u32..3, 0u32..9, 0.0f64..24.0), 1..30).prop_map(|rows| {
        let start = NaiveDate::from_ymd_opt(2024, 10, 8).unwrap();
        let mut offset = 0;
        rows.into_iter()
            .enumerate()
            .map(|(i, (gap, goals, shots, toi))| {
                offset += gap;
                GameRow {
                    player_id: 8478402,
                    game_id: i as i64,
                    game_date: start + Duration::days(offset),
                    season_id: 20242025,
                    stats: StatLine {
                        goals: Some(goals.min(shots) as f64),
                        points: Some(goals as f64),
                        shots: Some(shots as f64),
                        toi_minutes: Some(toi),
                        ..Default::default()
                    },
                }
            })
            .collect()
    })
}

fn window() -> impl Strategy<Value = usize> {
    prop_oneof![Just(3usize), Just(5), Just(10), Just(20), 1usize..40]
}

proptest! {
    #[test]
    fn beta_band_stays_in_unit_interval(
        samples in arb_beta_samples(),
        mean in 0.0f64..1.0,
        k in 0.0f64..500.0,
        window_games in window(),
    ) {
        let mut spec = MetricKey::ShPct.spec().clone();
        spec.prior_strength = k;
        let computer = BandComputer::new(&spec, Baseline { mean, exposure: 0.0 }, 0.8).unwrap();
        let band = computer.compute(&samples, window_games).unwrap();
        prop_assert!(0.0 <= band.ci_lower);
        prop_assert!(band.ci_lower <= band.value);
        prop_assert!(band.value <= band.ci_upper);
        prop_assert!(band.ci_upper <= 1.0);
        prop_assert!(band.n_eff >= 0.0);
    }

    #[test]
    fn gamma_band_is_non_negative(
        samples in arb_gamma_samples(),
        mean in 0.0f64..30.0,
        k in 0.0f64..400.0,
        window_games in window(),
    ) {
        let mut spec = MetricKey::ShotsPer60.spec().clone();
        spec.prior_strength = k;
        let computer = BandComputer::new(&spec, Baseline { mean, exposure: 0.0 }, 0.8).unwrap();
        let band = computer.compute(&samples, window_games).unwrap();
        prop_assert!(band.value >= 0.0);
        prop_assert!(band.ci_lower >= 0.0);
        prop_assert!(band.ci_lower <= band.value && band.value <= band.ci_upper);
    }

    #[test]
    fn normal_band_contains_value(
        samples in arb_normal_samples(),
        mean in -5.0f64..30.0,
        k in 0.0f64..100.0,
        window_games in window(),
    ) {
        for key in [MetricKey::ToiPerGame, MetricKey::Pdo] {
            let mut spec = key.spec().clone();
            spec.prior_strength = k;
            let computer = BandComputer::new(&spec, Baseline { mean, exposure: 0.0 }, 0.8).unwrap();
            let band = computer.compute(&samples, window_games).unwrap();
            prop_assert!(band.ci_lower.is_finite() && band.ci_upper.is_finite());
            prop_assert!(band.ci_lower <= band.value && band.value <= band.ci_upper);
            prop_assert!(band.n_eff >= 0.0);
        }
    }

    #[test]
    fn no_season_history_reports_raw_ewma(games in arb_games()) {
        let orchestrator = SnapshotOrchestrator::new(BandConfig::default()).unwrap();
        let mut recent = games.clone();
        recent.sort_by(|a, b| b.game_date.cmp(&a.game_date).then(b.game_id.cmp(&a.game_id)));
        let input = SnapshotInput {
            player_id: 8478402,
            snapshot_date: recent[0].game_date,
            games: &recent,
            seasons: &[],
        };
        let report = orchestrator.compute(&input, &MetricRequest::all_defaults()).unwrap();
        for record in &report.records {
            if record.metric_key.spec().fixed_baseline.is_none() {
                prop_assert_eq!(record.value, record.ewma);
                prop_assert_eq!(record.prior_weight, 0.0);
            }
            prop_assert!(record.ci_lower <= record.value && record.value <= record.ci_upper);
        }
    }

    #[test]
    fn no_evidence_returns_baseline(mean in 0.0f64..1.0, k in 0.0f64..500.0) {
        for key in [MetricKey::ShPct, MetricKey::PointsPer60, MetricKey::ToiPerGame] {
            let mut spec = key.spec().clone();
            spec.prior_strength = k;
            let computer = BandComputer::new(&spec, Baseline { mean, exposure: 0.0 }, 0.8).unwrap();
            let band = computer.compute(&[], 10).unwrap();
            prop_assert_eq!(band.n_eff, 0.0);
            prop_assert_eq!(band.value, mean);
        }
    }

    #[test]
    fn zero_prior_strength_is_raw_ewma(samples in arb_beta_samples(), mean in 0.0f64..1.0) {
        let mut spec = MetricKey::ShPct.spec().clone();
        spec.prior_strength = 0.0;
        let computer = BandComputer::new(&spec, Baseline { mean, exposure: 0.0 }, 0.8).unwrap();
        let band = computer.compute(&samples, 20).unwrap();
        prop_assert_eq!(band.value, band.ewma);
    }

    #[test]
    fn wider_confidence_gives_wider_interval(
        alpha in 0.5f64..400.0,
        beta in 0.5f64..400.0,
        shape in 0.1f64..300.0,
        rate in 1.0f64..2000.0,
        low in 0.5f64..0.9,
        extra in 0.01f64..0.09,
    ) {
        let high = low + extra;
        for params in [DistributionParams::Beta { alpha, beta }, DistributionParams::Gamma { shape, rate }] {
            let (lo_a, hi_a) = credible_interval(low, &params);
            let (lo_b, hi_b) = credible_interval(high, &params);
            prop_assert!(lo_b <= lo_a);
            prop_assert!(hi_a <= hi_b);
        }
    }

    #[test]
    fn decay_is_monotone(half_life in 0.5f64..40.0, games_ago in 0usize..200) {
        prop_assert_eq!(decay_weight(0, half_life), 1.0);
        prop_assert!(decay_weight(games_ago + 1, half_life) < decay_weight(games_ago, half_life));
    }

    #[test]
    fn rebuild_matches_direct_snapshots(games in arb_games(), buffer in 1usize..12) {
        let config = BandConfig { rebuild_buffer_games: buffer, ..Default::default() };
        let orchestrator = SnapshotOrchestrator::new(config).unwrap();
        let requests = vec![
            MetricRequest::new("sh_pct"),
            MetricRequest::with_windows("shots_per_60", vec![WindowCode::L3, WindowCode::L10]),
        ];
        let first = games[0].game_date;
        let range = DateRange::new(Some(first + Duration::days(2)), None);

        let snapshots = HistoricalRebuild::new(&orchestrator, 8478402, games.clone(), &[], &requests, range)
            .collect::<crate::Result<Vec<_>>>()
            .unwrap();

        let mut chronological = games.clone();
        chronological.sort_by(|a, b| a.game_date.cmp(&b.game_date).then(a.game_id.cmp(&b.game_id)));
        let fetched = &chronological[chronological.len().saturating_sub(buffer)..];

        for snapshot in &snapshots {
            prop_assert!(range.contains(snapshot.snapshot_date));
            let mut slice: Vec<GameRow> = fetched
                .iter()
                .filter(|g| g.game_date <= snapshot.snapshot_date)
                .cloned()
                .collect();
            slice.reverse();
            let input = SnapshotInput {
                player_id: 8478402,
                snapshot_date: snapshot.snapshot_date,
                games: &slice,
                seasons: &[],
            };
            let direct = orchestrator.compute(&input, &requests).unwrap();
            prop_assert_eq!(&snapshot.report, &direct);
        }

        let mut dates: Vec<_> = snapshots.iter().map(|s| s.snapshot_date).collect();
        let emitted = dates.len();
        dates.dedup();
        prop_assert_eq!(dates.len(), emitted);
    }
}

#[test]
fn empty_season_history_is_zero_baseline() {
    let baseline = estimate_baseline(&[], MetricKey::ShPct);
    assert_eq!(baseline, Baseline { mean: 0.0, exposure: 0.0 });
}

#[test]
fn hot_first_game_is_shrunk_toward_baseline() {
    let computer =
        BandComputer::new(MetricKey::ShPct.spec(), Baseline { mean: 0.10, exposure: 0.0 }, 0.8).unwrap();
    let sample = GameSample { games_ago: 0, observation: Observation::Beta { successes: 2.0, trials: 10.0 } };
    let band = computer.compute(&[sample], 1).unwrap();
    assert_eq!(band.ewma, 0.2);
    assert!(band.value > 0.10 && band.value < 0.15);
}
