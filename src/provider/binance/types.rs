//! Binance message types

use serde::Deserialize;

/// `@miniTicker` event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceMiniTicker {
    /// Symbol, already uppercase (e.g. `BTCUSDT`)
    #[serde(rename = "s")]
    pub symbol: String,

    /// Close price
    #[serde(rename = "c")]
    pub close: String,

    /// Total traded base asset volume over the rolling window
    #[serde(rename = "v")]
    pub volume: String,

    /// Event time (unix milliseconds)
    #[serde(rename = "E")]
    pub event_time: u64,
}

/// Combined-stream wrapper: `{"stream": "...", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceStreamMessage {
    #[allow(dead_code)]
    pub stream: String,
    pub data: BinanceMiniTicker,
}
