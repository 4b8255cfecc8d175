//! Binance message normalizer

use chrono::DateTime;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::provider::SourceError;
use crate::schema::{truncate_to_second, Tick};

use super::types::BinanceStreamMessage;
use super::SOURCE_TAG;

/// Decode one combined-stream text frame into a tick.
///
/// Returns `Ok(None)` for frames that are valid JSON but not miniTicker
/// data (subscription responses carry `result`/`id` instead of `data`).
pub fn decode_mini_ticker(text: &str) -> Result<Option<Tick>, SourceError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| SourceError::Decode(format!("Unparseable frame: {e}")))?;

    if value.get("data").is_none() {
        return Ok(None);
    }

    let msg: BinanceStreamMessage = serde_json::from_value(value)
        .map_err(|e| SourceError::Decode(format!("miniTicker frame: {e}")))?;

    let price = Decimal::from_str(&msg.data.close)
        .map_err(|e| SourceError::Decode(format!("Invalid close '{}': {e}", msg.data.close)))?;
    if price <= Decimal::ZERO {
        return Err(SourceError::Decode(format!(
            "Price must be positive, got {price}"
        )));
    }

    let volume = Decimal::from_str(&msg.data.volume)
        .map_err(|e| SourceError::Decode(format!("Invalid volume '{}': {e}", msg.data.volume)))?;
    if volume < Decimal::ZERO {
        return Err(SourceError::Decode(format!(
            "Volume must be non-negative, got {volume}"
        )));
    }

    let event_time = DateTime::from_timestamp_millis(msg.data.event_time as i64)
        .ok_or_else(|| SourceError::Decode(format!("Invalid timestamp {}", msg.data.event_time)))?;

    Ok(Some(Tick::new(
        msg.data.symbol.to_uppercase(),
        truncate_to_second(event_time),
        price,
        Some(volume),
        SOURCE_TAG,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FRAME: &str = r#"{
        "stream": "btcusdt@miniTicker",
        "data": {"E": 1672515782136, "s": "BTCUSDT", "c": "42000.50", "v": "12345.678"}
    }"#;

    #[test]
    fn test_decode_mini_ticker() {
        let tick = decode_mini_ticker(FRAME).unwrap().unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, dec!(42000.50));
        assert_eq!(tick.volume, Some(dec!(12345.678)));
        assert_eq!(tick.source, "binance");
        // Millisecond event time truncated to the second axis
        assert_eq!(tick.event_time.timestamp(), 1672515782);
        assert_eq!(tick.event_time.timestamp_subsec_millis(), 0);
    }

    #[test]
    fn test_control_frame_ignored() {
        let ack = r#"{"result": null, "id": 1}"#;
        assert!(decode_mini_ticker(ack).unwrap().is_none());
    }

    #[test]
    fn test_decode_failures() {
        assert!(decode_mini_ticker("not json").is_err());

        let bad = r#"{"stream": "x", "data": {"E": 1, "s": "BTCUSDT", "c": "oops", "v": "1"}}"#;
        assert!(matches!(
            decode_mini_ticker(bad),
            Err(SourceError::Decode(_))
        ));

        let negative_volume =
            r#"{"stream": "x", "data": {"E": 1, "s": "BTCUSDT", "c": "42000", "v": "-1"}}"#;
        assert!(matches!(
            decode_mini_ticker(negative_volume),
            Err(SourceError::Decode(_))
        ));
    }
}
