//! Canonical tick and candle types
//!
//! A `Tick` is one observed price/volume at an instant, identified by
//! `(symbol, event_time, source)`. Both the backfill engine and the stream
//! ingester produce ticks; the store enforces the identity key so the two
//! sources can overlap safely.

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One canonical price/volume observation.
///
/// `(symbol, event_time, source)` is the identity key: a later write with
/// the same key is a no-op, never an overwrite. `event_time` is second
/// resolution; use [`truncate_to_second`] before constructing a tick from a
/// sub-second timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Canonical uppercase pair identifier (e.g. `BTCUSD`)
    pub symbol: String,
    /// Event timestamp on the authoritative UTC time axis
    pub event_time: DateTime<Utc>,
    /// Last/close price at `event_time`; always positive
    pub price: Decimal,
    /// Traded volume; absent for feeds that do not report it
    pub volume: Option<Decimal>,
    /// Provenance tag (e.g. `coinbase`), part of the identity key
    pub source: String,
}

impl Tick {
    pub fn new(
        symbol: impl Into<String>,
        event_time: DateTime<Utc>,
        price: Decimal,
        volume: Option<Decimal>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            event_time: truncate_to_second(event_time),
            price,
            volume,
            source: source.into(),
        }
    }

    /// The identity key used for store-level deduplication.
    pub fn key(&self) -> (&str, DateTime<Utc>, &str) {
        (&self.symbol, self.event_time, &self.source)
    }
}

/// Drop sub-second precision from a timestamp.
pub fn truncate_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// One provider-native OHLCV summary for a time bucket.
///
/// Consumed only as backfill input; converted to exactly one tick and never
/// persisted in this shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    /// Bucket open time (unix-second resolution)
    pub open_time: DateTime<Utc>,
    pub low: Decimal,
    pub high: Decimal,
    pub open: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Convert to a tick: close price at the candle's open time.
    pub fn into_tick(self, symbol: &str, source: &str) -> Tick {
        Tick::new(
            symbol,
            self.open_time,
            self.close,
            Some(self.volume),
            source,
        )
    }
}
