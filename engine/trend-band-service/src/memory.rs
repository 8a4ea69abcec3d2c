//! In-process store, used by tests and dry runs

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use trend_bands::{GameRow, MetricKey, SeasonRow, TrendBandRecord, WindowCode};

use crate::error::{StoreError, StoreResult};
use crate::store::{BandSink, GameHistoryStore};

type BandKey = (i64, NaiveDate, MetricKey, WindowCode);

/// Thread-safe in-memory implementation of both storage seams
#[derive(Debug, Default)]
pub struct MemoryStore {
    games: RwLock<HashMap<i64, Vec<GameRow>>>,
    seasons: RwLock<HashMap<i64, Vec<SeasonRow>>>,
    bands: RwLock<BTreeMap<BandKey, TrendBandRecord>>,
    unavailable_players: RwLock<HashSet<i64>>,
    upsert_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_games(&self, rows: impl IntoIterator<Item = GameRow>) {
        let mut games = self.games.write();
        for row in rows {
            games.entry(row.player_id).or_default().push(row);
        }
    }

    pub fn insert_seasons(&self, rows: impl IntoIterator<Item = SeasonRow>) {
        let mut seasons = self.seasons.write();
        for row in rows {
            seasons.entry(row.player_id).or_default().push(row);
        }
    }

    /// Make reads for a player fail, as if the upstream were down
    pub fn mark_unavailable(&self, player_id: i64) {
        self.unavailable_players.write().insert(player_id);
    }

    /// Stored records in natural-key order
    pub fn bands(&self) -> Vec<TrendBandRecord> {
        self.bands.read().values().cloned().collect()
    }

    pub fn band(&self, key: BandKey) -> Option<TrendBandRecord> {
        self.bands.read().get(&key).cloned()
    }

    pub fn band_count(&self) -> usize {
        self.bands.read().len()
    }

    /// Number of `upsert_bands` calls received
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::Relaxed)
    }

    fn check_available(&self, player_id: i64) -> StoreResult<()> {
        if self.unavailable_players.read().contains(&player_id) {
            return Err(StoreError::Unavailable(format!("history for player {} is unavailable", player_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl GameHistoryStore for MemoryStore {
    async fn recent_games(
        &self,
        player_id: i64,
        as_of: Option<NaiveDate>,
        limit: usize,
    ) -> StoreResult<Vec<GameRow>> {
        self.check_available(player_id)?;
        let games = self.games.read();
        let mut rows: Vec<GameRow> = games
            .get(&player_id)
            .map(|rows| {
                rows.iter()
                    .filter(|row| as_of.map_or(true, |date| row.game_date <= date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.game_date.cmp(&a.game_date).then(b.game_id.cmp(&a.game_id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn season_totals(&self, player_id: i64, limit: usize) -> StoreResult<Vec<SeasonRow>> {
        self.check_available(player_id)?;
        let mut rows = self.seasons.read().get(&player_id).cloned().unwrap_or_default();
        rows.sort_by(|a, b| b.season_id.cmp(&a.season_id));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl BandSink for MemoryStore {
    async fn upsert_bands(&self, records: &[TrendBandRecord]) -> StoreResult<u64> {
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        let mut bands = self.bands.write();
        for record in records {
            bands.insert(record.natural_key(), record.clone());
        }
        Ok(records.len() as u64)
    }
}
