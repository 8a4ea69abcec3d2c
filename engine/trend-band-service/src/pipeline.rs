//! Fetch → compute → persist pipeline
//!
//! Each player is independent: a failed fetch or write aborts that player's
//! run only. Writes go out in chunks of `persist_batch_size` records and are
//! idempotent upserts, so an interrupted run can simply be repeated.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use trend_bands::{
    BandConfig, DateRange, HistoricalRebuild, MetricKey, MetricRequest, SnapshotInput, SnapshotOrchestrator,
    TrendBandRecord, SEASON_HISTORY_LIMIT,
};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::store::{BandSink, GameHistoryStore};

/// Outcome of one player's snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub player_id: i64,
    pub snapshot_date: NaiveDate,
    pub records_written: usize,
    pub unknown_metrics: Vec<String>,
    pub insufficient_data: Vec<MetricKey>,
}

/// Outcome of one player's historical rebuild
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RebuildSummary {
    pub player_id: i64,
    pub snapshots: usize,
    pub records_written: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// Outcome of a multi-player snapshot run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<SnapshotSummary>,
    pub failed: Vec<(i64, PipelineError)>,
}

impl BatchSummary {
    pub fn records_written(&self) -> usize {
        self.succeeded.iter().map(|s| s.records_written).sum()
    }
}

pub struct BandPipeline<S, K> {
    store: Arc<S>,
    sink: Arc<K>,
    orchestrator: SnapshotOrchestrator,
    requests: Vec<MetricRequest>,
    batch_size: usize,
    concurrency: usize,
}

impl<S, K> BandPipeline<S, K>
where
    S: GameHistoryStore,
    K: BandSink,
{
    pub fn new(store: Arc<S>, sink: Arc<K>, bands: BandConfig, pipeline: &PipelineConfig) -> Result<Self> {
        if pipeline.persist_batch_size == 0 {
            return Err(PipelineError::config("persist_batch_size must be greater than 0"));
        }
        if pipeline.player_concurrency == 0 {
            return Err(PipelineError::config("player_concurrency must be greater than 0"));
        }

        let requests = if pipeline.metrics.is_empty() {
            MetricRequest::all_defaults()
        } else {
            pipeline.metrics.iter().map(MetricRequest::new).collect()
        };

        Ok(Self {
            store,
            sink,
            orchestrator: SnapshotOrchestrator::new(bands)?,
            requests,
            batch_size: pipeline.persist_batch_size,
            concurrency: pipeline.player_concurrency,
        })
    }

    /// Replace the metric/window requests computed per snapshot
    pub fn with_requests(mut self, requests: Vec<MetricRequest>) -> Self {
        self.requests = requests;
        self
    }

    pub fn requests(&self) -> &[MetricRequest] {
        &self.requests
    }

    /// Compute and persist every requested band for one player and date
    #[instrument(skip(self))]
    pub async fn snapshot(&self, player_id: i64, snapshot_date: NaiveDate) -> Result<SnapshotSummary> {
        let limit = self.orchestrator.config().recent_games;
        let games = self
            .store
            .recent_games(player_id, Some(snapshot_date), limit)
            .await
            .map_err(|source| PipelineError::UpstreamFetch { player_id, source })?;
        let seasons = self
            .store
            .season_totals(player_id, SEASON_HISTORY_LIMIT)
            .await
            .map_err(|source| PipelineError::UpstreamFetch { player_id, source })?;

        let input = SnapshotInput { player_id, snapshot_date, games: &games, seasons: &seasons };
        let report = self.orchestrator.compute(&input, &self.requests)?;
        self.persist(&report.records).await?;

        info!(
            player_id,
            %snapshot_date,
            records = report.records.len(),
            insufficient = report.insufficient_data.len(),
            "Snapshot persisted"
        );

        Ok(SnapshotSummary {
            player_id,
            snapshot_date,
            records_written: report.records.len(),
            unknown_metrics: report.unknown_metrics,
            insufficient_data: report.insufficient_data,
        })
    }

    /// Recompute one snapshot per game date in `range`, flushing records as
    /// full batches accumulate
    #[instrument(skip(self))]
    pub async fn rebuild(&self, player_id: i64, range: DateRange) -> Result<RebuildSummary> {
        let limit = self.orchestrator.config().rebuild_buffer_games;
        let games = self
            .store
            .recent_games(player_id, range.end, limit)
            .await
            .map_err(|source| PipelineError::UpstreamFetch { player_id, source })?;
        let seasons = self
            .store
            .season_totals(player_id, SEASON_HISTORY_LIMIT)
            .await
            .map_err(|source| PipelineError::UpstreamFetch { player_id, source })?;

        let mut summary = RebuildSummary { player_id, ..Default::default() };
        let mut pending: Vec<TrendBandRecord> = Vec::with_capacity(self.batch_size);
        let rebuild = HistoricalRebuild::new(&self.orchestrator, player_id, games, &seasons, &self.requests, range);

        for snapshot in rebuild {
            let snapshot = snapshot?;
            summary.snapshots += 1;
            summary.first_date.get_or_insert(snapshot.snapshot_date);
            summary.last_date = Some(snapshot.snapshot_date);
            pending.extend(snapshot.report.records);

            if pending.len() >= self.batch_size {
                let full = pending.len() - pending.len() % self.batch_size;
                let batch: Vec<_> = pending.drain(..full).collect();
                self.persist(&batch).await?;
                summary.records_written += batch.len();
            }
        }

        self.persist(&pending).await?;
        summary.records_written += pending.len();

        info!(
            player_id,
            snapshots = summary.snapshots,
            records = summary.records_written,
            "Rebuild complete"
        );
        Ok(summary)
    }

    /// Snapshot many players concurrently; one player's failure does not
    /// stop the others
    pub async fn snapshot_many(&self, player_ids: &[i64], snapshot_date: NaiveDate) -> BatchSummary {
        let results: Vec<(i64, Result<SnapshotSummary>)> = stream::iter(player_ids.iter().copied())
            .map(|player_id| async move { (player_id, self.snapshot(player_id, snapshot_date).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary::default();
        for (player_id, result) in results {
            match result {
                Ok(snapshot) => summary.succeeded.push(snapshot),
                Err(e) => {
                    warn!(player_id, error = %e, "Snapshot failed");
                    summary.failed.push((player_id, e));
                }
            }
        }
        summary.succeeded.sort_by_key(|s| s.player_id);
        summary.failed.sort_by_key(|(player_id, _)| *player_id);
        summary
    }

    async fn persist(&self, records: &[TrendBandRecord]) -> Result<()> {
        for chunk in records.chunks(self.batch_size) {
            self.sink
                .upsert_bands(chunk)
                .await
                .map_err(|source| PipelineError::Persistence { records: chunk.len(), source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use trend_bands::{GameRow, SeasonRow, StatLine, WindowCode};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, day).unwrap()
    }

    fn game(player_id: i64, id: i64, day: u32, goals: f64, shots: f64) -> GameRow {
        GameRow {
            player_id,
            game_id: id,
            game_date: date(day),
            season_id: 20242025,
            stats: StatLine {
                goals: Some(goals),
                points: Some(goals + 1.0),
                shots: Some(shots),
                toi_minutes: Some(18.5),
                ..Default::default()
            },
        }
    }

    fn season(player_id: i64) -> SeasonRow {
        SeasonRow {
            player_id,
            season_id: 20232024,
            games_played: Some(82.0),
            stats: StatLine {
                goals: Some(30.0),
                points: Some(60.0),
                shots: Some(250.0),
                toi_minutes: Some(1500.0),
                ..Default::default()
            },
        }
    }

    fn seeded_store(players: &[i64]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for &player_id in players {
            store.insert_games((1..=6).map(|d| game(player_id, d as i64, d * 2, (d % 2) as f64, 3.0)));
            store.insert_seasons(vec![season(player_id)]);
        }
        store
    }

    fn pipeline(store: &Arc<MemoryStore>, batch_size: usize) -> BandPipeline<MemoryStore, MemoryStore> {
        let config = PipelineConfig { persist_batch_size: batch_size, ..Default::default() };
        BandPipeline::new(store.clone(), store.clone(), BandConfig::default(), &config).unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_persists_records() {
        let store = seeded_store(&[11]);
        let pipeline = pipeline(&store, 400);

        let summary = pipeline.snapshot(11, date(12)).await.unwrap();
        assert!(summary.records_written > 0);
        assert_eq!(store.band_count(), summary.records_written);
        assert!(summary.insufficient_data.contains(&MetricKey::OiSvPct));

        let record = store.band((11, date(12), MetricKey::ShPct, WindowCode::L5)).unwrap();
        assert_eq!(record.season_id, Some(20242025));
        assert!(record.ci_lower <= record.value && record.value <= record.ci_upper);
    }

    #[tokio::test]
    async fn test_snapshot_is_idempotent() {
        let store = seeded_store(&[11]);
        let pipeline = pipeline(&store, 400);

        pipeline.snapshot(11, date(12)).await.unwrap();
        let first = store.bands();
        pipeline.snapshot(11, date(12)).await.unwrap();
        assert_eq!(store.bands(), first);
    }

    #[tokio::test]
    async fn test_writes_are_chunked() {
        let store = seeded_store(&[11]);
        let pipeline = pipeline(&store, 4);

        let summary = pipeline.snapshot(11, date(12)).await.unwrap();
        let expected_calls = (summary.records_written + 3) / 4;
        assert_eq!(store.upsert_calls(), expected_calls);
    }

    #[tokio::test]
    async fn test_snapshot_ignores_future_games() {
        let store = seeded_store(&[11]);
        let pipeline = pipeline(&store, 400).with_requests(vec![MetricRequest::with_windows(
            "sh_pct",
            vec![WindowCode::L20],
        )]);

        pipeline.snapshot(11, date(4)).await.unwrap();
        let record = store.band((11, date(4), MetricKey::ShPct, WindowCode::L20)).unwrap();
        // Games on 2/2 and 2/4 only: 6 shots
        assert_eq!(record.exposure, 6.0);
    }

    #[tokio::test]
    async fn test_unknown_metric_reported() {
        let store = seeded_store(&[11]);
        let config = PipelineConfig { metrics: vec!["sh_pct".into(), "corsi".into()], ..Default::default() };
        let pipeline = BandPipeline::new(store.clone(), store.clone(), BandConfig::default(), &config).unwrap();

        let summary = pipeline.snapshot(11, date(12)).await.unwrap();
        assert_eq!(summary.unknown_metrics, vec!["corsi".to_string()]);
        assert_eq!(summary.records_written, MetricKey::ShPct.spec().default_windows.len());
    }

    #[tokio::test]
    async fn test_rebuild_writes_one_snapshot_per_date() {
        let store = seeded_store(&[11]);
        let pipeline = pipeline(&store, 5);

        let range = DateRange::new(Some(date(4)), Some(date(10)));
        let summary = pipeline.rebuild(11, range).await.unwrap();
        assert_eq!(summary.snapshots, 4);
        assert_eq!(summary.first_date, Some(date(4)));
        assert_eq!(summary.last_date, Some(date(10)));
        assert_eq!(store.band_count(), summary.records_written);

        let dates: std::collections::BTreeSet<_> = store.bands().iter().map(|r| r.snapshot_date).collect();
        assert_eq!(dates.len(), 4);
    }

    #[tokio::test]
    async fn test_rebuild_matches_snapshot() {
        let store = seeded_store(&[11]);
        let pipeline = pipeline(&store, 400);

        pipeline.rebuild(11, DateRange::default()).await.unwrap();
        let rebuilt = store.bands();
        pipeline.snapshot(11, date(8)).await.unwrap();
        assert_eq!(store.bands(), rebuilt);
    }

    #[tokio::test]
    async fn test_snapshot_many_isolates_failures() {
        let store = seeded_store(&[1, 2, 3]);
        store.mark_unavailable(2);
        let pipeline = pipeline(&store, 400);

        let summary = pipeline.snapshot_many(&[1, 2, 3], date(12)).await;
        let ok: Vec<_> = summary.succeeded.iter().map(|s| s.player_id).collect();
        assert_eq!(ok, vec![1, 3]);
        assert_eq!(summary.failed.len(), 1);
        assert!(matches!(summary.failed[0], (2, PipelineError::UpstreamFetch { player_id: 2, .. })));
        assert!(summary.failed[0].1.is_retryable());
        assert_eq!(store.band_count(), summary.records_written());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let store = Arc::new(MemoryStore::new());
        let config = PipelineConfig { persist_batch_size: 0, ..Default::default() };
        let result = BandPipeline::new(store.clone(), store, BandConfig::default(), &config);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
