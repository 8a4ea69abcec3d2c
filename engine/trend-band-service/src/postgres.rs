//! PostgreSQL-backed history store and band sink

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::BTreeMap;
use tracing::{debug, info};
use trend_bands::{GameRow, MetricKey, SeasonRow, StatLine, TrendBandRecord, WindowCode};

use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::{BandSink, GameHistoryStore};

const STAT_COLUMNS: &str = "goals, points, pp_points, shots, toi_minutes, pp_toi_minutes, \
     on_ice_goals_for, on_ice_shots_for, on_ice_goals_against, on_ice_shots_against";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS player_game_stats (
        player_id BIGINT NOT NULL,
        game_id BIGINT NOT NULL,
        game_date DATE NOT NULL,
        season_id INTEGER NOT NULL,
        goals DOUBLE PRECISION,
        points DOUBLE PRECISION,
        pp_points DOUBLE PRECISION,
        shots DOUBLE PRECISION,
        toi_minutes DOUBLE PRECISION,
        pp_toi_minutes DOUBLE PRECISION,
        on_ice_goals_for DOUBLE PRECISION,
        on_ice_shots_for DOUBLE PRECISION,
        on_ice_goals_against DOUBLE PRECISION,
        on_ice_shots_against DOUBLE PRECISION,
        PRIMARY KEY (player_id, game_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_player_game_stats_date ON player_game_stats (player_id, game_date DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS player_season_stats (
        player_id BIGINT NOT NULL,
        season_id INTEGER NOT NULL,
        games_played DOUBLE PRECISION,
        goals DOUBLE PRECISION,
        points DOUBLE PRECISION,
        pp_points DOUBLE PRECISION,
        shots DOUBLE PRECISION,
        toi_minutes DOUBLE PRECISION,
        pp_toi_minutes DOUBLE PRECISION,
        on_ice_goals_for DOUBLE PRECISION,
        on_ice_shots_for DOUBLE PRECISION,
        on_ice_goals_against DOUBLE PRECISION,
        on_ice_shots_against DOUBLE PRECISION,
        PRIMARY KEY (player_id, season_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS player_trend_bands (
        player_id BIGINT NOT NULL,
        season_id INTEGER,
        snapshot_date DATE NOT NULL,
        metric_key TEXT NOT NULL,
        window_code TEXT NOT NULL,
        baseline DOUBLE PRECISION NOT NULL,
        ewma DOUBLE PRECISION NOT NULL,
        value DOUBLE PRECISION NOT NULL,
        ci_lower DOUBLE PRECISION NOT NULL,
        ci_upper DOUBLE PRECISION NOT NULL,
        n_eff DOUBLE PRECISION NOT NULL,
        prior_weight DOUBLE PRECISION NOT NULL,
        exposure DOUBLE PRECISION NOT NULL,
        distribution_params JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (player_id, snapshot_date, metric_key, window_code)
    )
    "#,
];

/// Postgres store over `player_game_stats`, `player_season_stats` and
/// `player_trend_bands`
#[derive(Debug, Clone)]
pub struct PgBandStore {
    pool: PgPool,
}

impl PgBandStore {
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!("Connected to database with {} max connections", config.max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes that do not exist yet
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Trend band schema is ready");
        Ok(())
    }
}

fn stat_line(row: &PgRow) -> StoreResult<StatLine> {
    Ok(StatLine {
        goals: row.try_get("goals")?,
        points: row.try_get("points")?,
        pp_points: row.try_get("pp_points")?,
        shots: row.try_get("shots")?,
        toi_minutes: row.try_get("toi_minutes")?,
        pp_toi_minutes: row.try_get("pp_toi_minutes")?,
        on_ice_goals_for: row.try_get("on_ice_goals_for")?,
        on_ice_shots_for: row.try_get("on_ice_shots_for")?,
        on_ice_goals_against: row.try_get("on_ice_goals_against")?,
        on_ice_shots_against: row.try_get("on_ice_shots_against")?,
    })
}

fn sql_limit(limit: usize) -> StoreResult<i64> {
    i64::try_from(limit).map_err(|_| StoreError::Decode(format!("limit {} out of range", limit)))
}

#[async_trait]
impl GameHistoryStore for PgBandStore {
    async fn recent_games(
        &self,
        player_id: i64,
        as_of: Option<NaiveDate>,
        limit: usize,
    ) -> StoreResult<Vec<GameRow>> {
        let sql = format!(
            "SELECT player_id, game_id, game_date, season_id, {STAT_COLUMNS} \
             FROM player_game_stats \
             WHERE player_id = $1 AND ($2::date IS NULL OR game_date <= $2) \
             ORDER BY game_date DESC, game_id DESC \
             LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(player_id)
            .bind(as_of)
            .bind(sql_limit(limit)?)
            .fetch_all(&self.pool)
            .await?;

        debug!(player_id, fetched = rows.len(), "fetched recent games");
        rows.iter()
            .map(|row| -> StoreResult<GameRow> {
                Ok(GameRow {
                    player_id: row.try_get("player_id")?,
                    game_id: row.try_get("game_id")?,
                    game_date: row.try_get("game_date")?,
                    season_id: row.try_get("season_id")?,
                    stats: stat_line(row)?,
                })
            })
            .collect()
    }

    async fn season_totals(&self, player_id: i64, limit: usize) -> StoreResult<Vec<SeasonRow>> {
        let sql = format!(
            "SELECT player_id, season_id, games_played, {STAT_COLUMNS} \
             FROM player_season_stats \
             WHERE player_id = $1 \
             ORDER BY season_id DESC \
             LIMIT $2"
        );
        let rows = sqlx::query(&sql).bind(player_id).bind(sql_limit(limit)?).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> StoreResult<SeasonRow> {
                Ok(SeasonRow {
                    player_id: row.try_get("player_id")?,
                    season_id: row.try_get("season_id")?,
                    games_played: row.try_get("games_played")?,
                    stats: stat_line(row)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl BandSink for PgBandStore {
    async fn upsert_bands(&self, records: &[TrendBandRecord]) -> StoreResult<u64> {
        // One statement cannot touch the same key twice; the last record wins.
        let mut unique: BTreeMap<(i64, NaiveDate, MetricKey, WindowCode), &TrendBandRecord> = BTreeMap::new();
        for record in records {
            unique.insert(record.natural_key(), record);
        }
        if unique.is_empty() {
            return Ok(0);
        }

        let rows = unique
            .into_values()
            .map(|record| -> StoreResult<_> { Ok((record, serde_json::to_value(&record.distribution_params)?)) })
            .collect::<StoreResult<Vec<_>>>()?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO player_trend_bands (player_id, season_id, snapshot_date, metric_key, window_code, \
             baseline, ewma, value, ci_lower, ci_upper, n_eff, prior_weight, exposure, distribution_params) ",
        );
        builder.push_values(rows, |mut b, (record, params)| {
            b.push_bind(record.player_id)
                .push_bind(record.season_id)
                .push_bind(record.snapshot_date)
                .push_bind(record.metric_key.as_str())
                .push_bind(record.window_code.as_str())
                .push_bind(record.baseline)
                .push_bind(record.ewma)
                .push_bind(record.value)
                .push_bind(record.ci_lower)
                .push_bind(record.ci_upper)
                .push_bind(record.n_eff)
                .push_bind(record.prior_weight)
                .push_bind(record.exposure)
                .push_bind(params);
        });
        builder.push(
            " ON CONFLICT (player_id, snapshot_date, metric_key, window_code) DO UPDATE SET \
             season_id = EXCLUDED.season_id, baseline = EXCLUDED.baseline, ewma = EXCLUDED.ewma, \
             value = EXCLUDED.value, ci_lower = EXCLUDED.ci_lower, ci_upper = EXCLUDED.ci_upper, \
             n_eff = EXCLUDED.n_eff, prior_weight = EXCLUDED.prior_weight, exposure = EXCLUDED.exposure, \
             distribution_params = EXCLUDED.distribution_params, updated_at = NOW()",
        );

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
