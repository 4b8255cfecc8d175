//! TimescaleDB-specific operations
//!
//! Schema management for the tick store: hypertable creation, the dedup
//! index the idempotent upsert relies on, and the minute OHLCV continuous
//! aggregate with its refresh and compression policies.

use sqlx::PgPool;
use tracing::{debug, info, warn};

use super::PersistenceResult;

/// TimescaleDB operations
pub struct TimescaleOperations {
    pool: PgPool,
}

impl TimescaleOperations {
    /// Create a new TimescaleDB operations helper
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> PersistenceResult<()> {
        info!("Running TimescaleDB migrations...");

        // Create TimescaleDB extension if not exists
        sqlx::query("CREATE EXTENSION IF NOT EXISTS timescaledb CASCADE")
            .execute(&self.pool)
            .await?;

        // Create ticks table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ticks (
                symbol VARCHAR(32) NOT NULL,
                event_time TIMESTAMPTZ NOT NULL,
                price NUMERIC(20, 8) NOT NULL,
                volume NUMERIC(28, 8),
                source VARCHAR(16) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Convert to hypertable (will fail gracefully if already a hypertable)
        let result = sqlx::query(
            r#"
            SELECT create_hypertable(
                'ticks',
                'event_time',
                chunk_time_interval => INTERVAL '1 day',
                if_not_exists => TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => info!("Created ticks hypertable"),
            Err(e) => {
                if e.to_string().contains("already a hypertable") {
                    debug!("ticks is already a hypertable");
                } else {
                    warn!("Failed to create hypertable: {}", e);
                }
            }
        }

        // The dedup index. ON CONFLICT in the upsert targets exactly these
        // columns, so this index must exist before any write.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS uq_ticks_identity
            ON ticks (symbol, event_time, source)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_ticks_symbol_time
            ON ticks (symbol, event_time DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("TimescaleDB migrations completed");
        Ok(())
    }

    /// Create the 1-minute OHLCV continuous aggregate
    pub async fn create_ohlcv_aggregate(&self) -> PersistenceResult<()> {
        info!("Creating continuous aggregate ohlcv_1m...");

        sqlx::query(
            r#"
            CREATE MATERIALIZED VIEW IF NOT EXISTS ohlcv_1m WITH (timescaledb.continuous) AS
            SELECT
                time_bucket(INTERVAL '1 minute', event_time) AS bucket,
                symbol,
                FIRST(price, event_time) AS open,
                MAX(price) AS high,
                MIN(price) AS low,
                LAST(price, event_time) AS close,
                SUM(COALESCE(volume, 0)) AS volume
            FROM ticks
            GROUP BY bucket, symbol
            WITH NO DATA
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Created continuous aggregate ohlcv_1m");
        Ok(())
    }

    /// Add a refresh policy so recent buckets materialize automatically
    pub async fn add_refresh_policy(&self) -> PersistenceResult<()> {
        let result = sqlx::query(
            r#"
            SELECT add_continuous_aggregate_policy(
                'ohlcv_1m',
                start_offset => INTERVAL '1 hour',
                end_offset => INTERVAL '1 minute',
                schedule_interval => INTERVAL '1 minute',
                if_not_exists => TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => info!("Refresh policy added for ohlcv_1m"),
            Err(e) => {
                if e.to_string().contains("already exists") {
                    debug!("Refresh policy already exists for ohlcv_1m");
                } else {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Enable compression on ticks
    pub async fn enable_compression(&self) -> PersistenceResult<()> {
        info!("Enabling compression on ticks...");

        sqlx::query(
            r#"
            ALTER TABLE ticks SET (
                timescaledb.compress,
                timescaledb.compress_segmentby = 'symbol,source',
                timescaledb.compress_orderby = 'event_time DESC'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Compression enabled");
        Ok(())
    }

    /// Add compression policy
    pub async fn add_compression_policy(&self, after_days: i32) -> PersistenceResult<()> {
        info!(
            "Adding compression policy (compress after {} days)...",
            after_days
        );

        let query = format!(
            r#"
            SELECT add_compression_policy(
                'ticks',
                INTERVAL '{} days',
                if_not_exists => TRUE
            )
            "#,
            after_days
        );

        sqlx::query(&query).execute(&self.pool).await?;

        info!("Compression policy added");
        Ok(())
    }

    /// Refresh the aggregate over an explicit time range
    pub async fn refresh_aggregate(&self, start: &str, end: &str) -> PersistenceResult<()> {
        let query = format!(
            r#"
            CALL refresh_continuous_aggregate('ohlcv_1m', '{}', '{}')
            "#,
            start, end
        );

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}

/// SQL migration script
pub const MIGRATION_SQL: &str = r#"
-- CryptoPulse tick store schema
-- Run this to initialize the database

-- Enable TimescaleDB
CREATE EXTENSION IF NOT EXISTS timescaledb CASCADE;

-- Ticks table (main time-series data)
CREATE TABLE IF NOT EXISTS ticks (
    symbol VARCHAR(32) NOT NULL,
    event_time TIMESTAMPTZ NOT NULL,
    price NUMERIC(20, 8) NOT NULL,
    volume NUMERIC(28, 8),
    source VARCHAR(16) NOT NULL
);

-- Convert to hypertable with 1-day chunks
SELECT create_hypertable(
    'ticks',
    'event_time',
    chunk_time_interval => INTERVAL '1 day',
    if_not_exists => TRUE
);

-- Dedup index: the upsert's ON CONFLICT target
CREATE UNIQUE INDEX IF NOT EXISTS uq_ticks_identity
ON ticks (symbol, event_time, source);

CREATE INDEX IF NOT EXISTS idx_ticks_symbol_time
ON ticks (symbol, event_time DESC);

-- 1-minute OHLCV continuous aggregate
CREATE MATERIALIZED VIEW IF NOT EXISTS ohlcv_1m WITH (timescaledb.continuous) AS
SELECT
    time_bucket(INTERVAL '1 minute', event_time) AS bucket,
    symbol,
    FIRST(price, event_time) AS open,
    MAX(price) AS high,
    MIN(price) AS low,
    LAST(price, event_time) AS close,
    SUM(COALESCE(volume, 0)) AS volume
FROM ticks
GROUP BY bucket, symbol
WITH NO DATA;

SELECT add_continuous_aggregate_policy(
    'ohlcv_1m',
    start_offset => INTERVAL '1 hour',
    end_offset => INTERVAL '1 minute',
    schedule_interval => INTERVAL '1 minute',
    if_not_exists => TRUE
);

-- Enable compression
ALTER TABLE ticks SET (
    timescaledb.compress,
    timescaledb.compress_segmentby = 'symbol,source',
    timescaledb.compress_orderby = 'event_time DESC'
);

-- Add compression policy (compress after 7 days)
SELECT add_compression_policy('ticks', INTERVAL '7 days', if_not_exists => TRUE);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_sql_syntax() {
        // Just verify the SQL constant is valid
        assert!(MIGRATION_SQL.contains("create_hypertable"));
        assert!(MIGRATION_SQL.contains("uq_ticks_identity"));
        assert!(MIGRATION_SQL.contains("ohlcv_1m"));
    }
}
