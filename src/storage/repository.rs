//! Tick repository
//!
//! Data access over the `ticks` hypertable: the conflict-safe batch
//! upsert, ordered range reads, latest-price reads, and per-symbol stats.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::DatabaseSettings;
use crate::schema::Tick;

use super::writer::TickSink;

/// Store-level failures. Dedup-key conflicts are not errors; they are
/// silently skipped by the upsert.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Tick store repository
pub struct TickRepository {
    pool: PgPool,
    batch_size: usize,
}

impl TickRepository {
    /// Create a repository over an existing pool.
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self { pool, batch_size }
    }

    /// Connect a pool from settings.
    pub async fn from_settings(settings: &DatabaseSettings) -> PersistenceResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&settings.url)
            .await?;

        Ok(Self::new(pool, settings.batch_insert_size))
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Idempotent batch upsert keyed by `(symbol, event_time, source)`.
    ///
    /// Conflicting keys are skipped, never overwritten (first-write-wins).
    /// If one batch carries two rows with the same key, the first VALUES
    /// row wins; Postgres resolves duplicates in list order. Each chunk is
    /// one statement and therefore one implicit transaction: a chunk is
    /// applied whole or not at all, never as a half-written row.
    ///
    /// Returns the number of rows actually inserted after dedup.
    pub async fn upsert_ticks(&self, ticks: &[Tick]) -> PersistenceResult<u64> {
        if ticks.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0u64;
        for chunk in ticks.chunks(self.batch_size) {
            total_inserted += self.upsert_chunk(chunk).await?;
        }

        debug!(
            submitted = ticks.len(),
            inserted = total_inserted,
            "Upserted tick batch"
        );
        Ok(total_inserted)
    }

    async fn upsert_chunk(&self, ticks: &[Tick]) -> PersistenceResult<u64> {
        let mut query = String::from(
            "INSERT INTO ticks (symbol, event_time, price, volume, source) VALUES ",
        );

        let mut param = 1;
        for i in 0..ticks.len() {
            if i > 0 {
                query.push_str(", ");
            }
            query.push_str(&format!(
                "(${}, ${}, ${}, ${}, ${})",
                param,
                param + 1,
                param + 2,
                param + 3,
                param + 4,
            ));
            param += 5;
        }

        query.push_str(" ON CONFLICT (symbol, event_time, source) DO NOTHING");

        let mut sqlx_query = sqlx::query(&query);
        for tick in ticks {
            sqlx_query = sqlx_query
                .bind(&tick.symbol)
                .bind(tick.event_time)
                .bind(tick.price)
                .bind(tick.volume)
                .bind(&tick.source);
        }

        let result = sqlx_query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Ticks for one symbol within `[start, end)`, ordered by event time
    /// ascending.
    pub async fn get_ticks(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<i64>,
    ) -> PersistenceResult<Vec<Tick>> {
        let limit = limit.unwrap_or(100_000);

        let rows = sqlx::query(
            r#"
            SELECT symbol, event_time, price, volume, source
            FROM ticks
            WHERE symbol = $1
              AND event_time >= $2 AND event_time < $3
            ORDER BY event_time ASC
            LIMIT $4
            "#,
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tick_from_row).collect())
    }

    /// Latest tick per symbol, for the live-price read.
    pub async fn latest_ticks(&self, symbols: &[String]) -> PersistenceResult<Vec<Tick>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (symbol)
                symbol, event_time, price, volume, source
            FROM ticks
            WHERE symbol = ANY($1)
            ORDER BY symbol, event_time DESC
            "#,
        )
        .bind(symbols)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tick_from_row).collect())
    }

    /// Coverage statistics for one symbol.
    pub async fn symbol_stats(&self, symbol: &str) -> PersistenceResult<SymbolStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_ticks,
                MIN(event_time) AS earliest,
                MAX(event_time) AS latest
            FROM ticks
            WHERE symbol = $1
            "#,
        )
        .bind(symbol)
        .fetch_one(&self.pool)
        .await?;

        Ok(SymbolStats {
            symbol: symbol.to_string(),
            total_ticks: row.get::<i64, _>("total_ticks") as u64,
            earliest: row.get("earliest"),
            latest: row.get("latest"),
        })
    }
}

fn tick_from_row(row: &sqlx::postgres::PgRow) -> Tick {
    Tick {
        symbol: row.get("symbol"),
        event_time: row.get("event_time"),
        price: row.get::<Decimal, _>("price"),
        volume: row.get::<Option<Decimal>, _>("volume"),
        source: row.get("source"),
    }
}

#[async_trait]
impl TickSink for TickRepository {
    async fn write_ticks(&self, ticks: &[Tick]) -> Result<u64, PersistenceError> {
        self.upsert_ticks(ticks).await
    }
}

/// Stored-series statistics for one symbol
#[derive(Debug, Clone)]
pub struct SymbolStats {
    pub symbol: String,
    pub total_ticks: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}
