//! OHLCV aggregate reads
//!
//! Query helpers over the `ohlcv_1m` continuous aggregate. The aggregate
//! itself is materialized by TimescaleDB (see `timescale.rs`); this crate
//! only reads it on behalf of the query API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use super::{PersistenceError, PersistenceResult};

/// The minute-bucket continuous aggregate view
pub const OHLCV_1M_VIEW: &str = "ohlcv_1m";

/// One minute bucket from the continuous aggregate
#[derive(Debug, Clone, FromRow)]
pub struct OhlcvBar {
    pub bucket: DateTime<Utc>,
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Query helper for the OHLCV continuous aggregate
pub struct OhlcvQuery {
    pool: PgPool,
}

impl OhlcvQuery {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Minute bars for one symbol within `[start, end)`, ordered by bucket
    /// ascending.
    pub async fn get_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PersistenceResult<Vec<OhlcvBar>> {
        let query = format!(
            r#"
            SELECT bucket, symbol, open, high, low, close, volume
            FROM {OHLCV_1M_VIEW}
            WHERE symbol = $1
              AND bucket >= $2 AND bucket < $3
            ORDER BY bucket ASC
            "#,
        );

        let bars = sqlx::query_as::<_, OhlcvBar>(&query)
            .bind(symbol)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(PersistenceError::Database)?;

        debug!(symbol, bars = bars.len(), "Fetched OHLCV bars");
        Ok(bars)
    }

    /// Most recent bar for one symbol.
    pub async fn latest_bar(&self, symbol: &str) -> PersistenceResult<Option<OhlcvBar>> {
        let query = format!(
            r#"
            SELECT bucket, symbol, open, high, low, close, volume
            FROM {OHLCV_1M_VIEW}
            WHERE symbol = $1
            ORDER BY bucket DESC
            LIMIT 1
            "#,
        );

        let bar = sqlx::query_as::<_, OhlcvBar>(&query)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(PersistenceError::Database)?;

        Ok(bar)
    }
}
