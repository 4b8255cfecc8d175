//! Coinbase message normalizer
//!
//! Converts raw candle arrays and ticker frames to the canonical types.
//! All decode paths are pure functions so they can be exercised without a
//! connection.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::provider::SourceError;
use crate::schema::{truncate_to_second, Candle, Tick};

use super::symbol::product_to_symbol;
use super::types::{CoinbaseTickerMessage, RawCandle};
use super::SOURCE_TAG;

/// Convert one raw candle array to a [`Candle`].
pub fn candle_from_raw(raw: &RawCandle) -> Result<Candle, SourceError> {
    let open_time = DateTime::from_timestamp(raw.0, 0)
        .ok_or_else(|| SourceError::Decode(format!("Invalid candle timestamp: {}", raw.0)))?;

    let decimal = |value: f64, field: &str| {
        Decimal::from_f64_retain(value)
            .ok_or_else(|| SourceError::Decode(format!("Invalid candle {field}: {value}")))
    };

    let close = decimal(raw.4, "close")?;
    if close <= Decimal::ZERO {
        return Err(SourceError::Decode(format!(
            "Candle close must be positive, got {close}"
        )));
    }

    let volume = decimal(raw.5, "volume")?;
    if volume < Decimal::ZERO {
        return Err(SourceError::Decode(format!(
            "Candle volume must be non-negative, got {volume}"
        )));
    }

    Ok(Candle {
        open_time,
        low: decimal(raw.1, "low")?,
        high: decimal(raw.2, "high")?,
        open: decimal(raw.3, "open")?,
        close,
        volume,
    })
}

/// Decode one WebSocket text frame.
///
/// Returns `Ok(None)` for anything that is not a ticker event
/// (subscription acks, heartbeats, error frames carry no price and are
/// ignored by the caller).
pub fn decode_ticker(text: &str) -> Result<Option<Tick>, SourceError> {
    let msg: CoinbaseTickerMessage = serde_json::from_str(text)
        .map_err(|e| SourceError::Decode(format!("Unparseable frame: {e}")))?;

    if msg.kind != "ticker" {
        return Ok(None);
    }

    let product_id = msg
        .product_id
        .as_deref()
        .ok_or_else(|| SourceError::Decode("Ticker without product_id".to_string()))?;
    let symbol = product_to_symbol(product_id)?;

    let price_str = msg
        .price
        .as_deref()
        .ok_or_else(|| SourceError::Decode("Ticker without price".to_string()))?;
    let price = Decimal::from_str(price_str)
        .map_err(|e| SourceError::Decode(format!("Invalid price '{price_str}': {e}")))?;
    if price <= Decimal::ZERO {
        return Err(SourceError::Decode(format!(
            "Price must be positive, got {price}"
        )));
    }

    let volume = match msg.last_size.as_deref() {
        Some(size) => {
            let size = Decimal::from_str(size)
                .map_err(|e| SourceError::Decode(format!("Invalid last_size '{size}': {e}")))?;
            if size < Decimal::ZERO {
                return Err(SourceError::Decode(format!(
                    "Volume must be non-negative, got {size}"
                )));
            }
            Some(size)
        }
        None => None,
    };

    // The initial ticker snapshot has no trade time; fall back to receive
    // time. Either way the series axis is whole seconds.
    let event_time = match msg.time.as_deref() {
        Some(t) => DateTime::parse_from_rfc3339(t)
            .map_err(|e| SourceError::Decode(format!("Invalid time '{t}': {e}")))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    Ok(Some(Tick::new(
        symbol,
        truncate_to_second(event_time),
        price,
        volume,
        SOURCE_TAG,
    )))
}
