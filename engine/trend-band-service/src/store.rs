//! Storage seams for game history and band output

use async_trait::async_trait;
use chrono::NaiveDate;
use trend_bands::{GameRow, SeasonRow, TrendBandRecord};

use crate::error::StoreResult;

/// Read side: per-game and per-season stat rows for a player
#[async_trait]
pub trait GameHistoryStore: Send + Sync {
    /// Up to `limit` games on or before `as_of` (all dates when `None`),
    /// most recent first
    async fn recent_games(
        &self,
        player_id: i64,
        as_of: Option<NaiveDate>,
        limit: usize,
    ) -> StoreResult<Vec<GameRow>>;

    /// Up to `limit` season totals, most recent season first
    async fn season_totals(&self, player_id: i64, limit: usize) -> StoreResult<Vec<SeasonRow>>;
}

/// Write side: idempotent upsert keyed on
/// (player_id, snapshot_date, metric_key, window_code)
#[async_trait]
pub trait BandSink: Send + Sync {
    /// Insert or replace the given records; returns rows written
    async fn upsert_bands(&self, records: &[TrendBandRecord]) -> StoreResult<u64>;
}
