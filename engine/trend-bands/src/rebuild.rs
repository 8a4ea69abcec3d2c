//! Historical rebuild: one snapshot per game date across a range
//!
//! Games are scanned oldest to newest through a bounded buffer, so each
//! snapshot reuses the previous snapshot's games instead of re-fetching and
//! re-sorting a window per date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::iter::Peekable;
use std::vec::IntoIter;
use tracing::debug;

use crate::error::Result;
use crate::models::{GameRow, SeasonRow};
use crate::snapshot::{MetricRequest, SnapshotInput, SnapshotOrchestrator, SnapshotReport};

/// Inclusive date range; either end may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

/// Fixed-capacity game buffer kept newest first
#[derive(Debug, Clone)]
pub struct GameBuffer {
    games: VecDeque<GameRow>,
    capacity: usize,
}

impl GameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { games: VecDeque::with_capacity(capacity + 1), capacity }
    }

    /// Add the next game in chronological order, evicting the oldest when full
    pub fn push(&mut self, game: GameRow) -> Option<GameRow> {
        self.games.push_front(game);
        if self.games.len() > self.capacity {
            self.games.pop_back()
        } else {
            None
        }
    }

    /// Buffered games, most recent first
    pub fn recent_first(&mut self) -> &[GameRow] {
        self.games.make_contiguous()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A snapshot emitted by a rebuild
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildSnapshot {
    pub snapshot_date: NaiveDate,
    pub games_in_window: usize,
    pub report: SnapshotReport,
}

/// Lazy sequence of snapshots for one player.
///
/// Dropping the iterator stops the rebuild; snapshots already handed out
/// stay valid.
pub struct HistoricalRebuild<'a> {
    orchestrator: &'a SnapshotOrchestrator,
    player_id: i64,
    seasons: &'a [SeasonRow],
    requests: &'a [MetricRequest],
    range: DateRange,
    games: Peekable<IntoIter<GameRow>>,
    buffer: GameBuffer,
    last_snapshot: Option<NaiveDate>,
}

impl<'a> HistoricalRebuild<'a> {
    /// Prepare a rebuild from the player's most recent games at or before
    /// `range.end`, in any order. Only the newest `rebuild_buffer_games` of
    /// them are scanned.
    pub fn new(
        orchestrator: &'a SnapshotOrchestrator,
        player_id: i64,
        games: Vec<GameRow>,
        seasons: &'a [SeasonRow],
        requests: &'a [MetricRequest],
        range: DateRange,
    ) -> Self {
        let capacity = orchestrator.config().rebuild_buffer_games;
        let mut games: Vec<GameRow> =
            games.into_iter().filter(|game| range.end.map_or(true, |end| game.game_date <= end)).collect();
        games.sort_by(|a, b| a.game_date.cmp(&b.game_date).then(a.game_id.cmp(&b.game_id)));
        if games.len() > capacity {
            games.drain(..games.len() - capacity);
        }

        Self {
            orchestrator,
            player_id,
            seasons,
            requests,
            range,
            games: games.into_iter().peekable(),
            buffer: GameBuffer::new(capacity),
            last_snapshot: None,
        }
    }
}

impl Iterator for HistoricalRebuild<'_> {
    type Item = Result<RebuildSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let game = self.games.next()?;
            let date = game.game_date;
            self.buffer.push(game);

            // The last game on a date closes that date's window.
            if self.games.peek().is_some_and(|next| next.game_date == date) {
                continue;
            }
            if !self.range.contains(date) || self.last_snapshot == Some(date) {
                continue;
            }
            self.last_snapshot = Some(date);

            let games_in_window = self.buffer.len();
            let input = SnapshotInput {
                player_id: self.player_id,
                snapshot_date: date,
                games: self.buffer.recent_first(),
                seasons: self.seasons,
            };
            debug!(player_id = self.player_id, snapshot_date = %date, games_in_window, "rebuilding snapshot");

            let result = self
                .orchestrator
                .compute(&input, self.requests)
                .map(|report| RebuildSnapshot { snapshot_date: date, games_in_window, report });
            return Some(result);
        }
    }
}
