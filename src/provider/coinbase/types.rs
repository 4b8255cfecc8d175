//! Coinbase message types
//!
//! Raw shapes as they come off the wire; conversion to canonical types
//! lives in the normalizer.

use serde::{Deserialize, Serialize};

/// One candle as returned by `GET /products/{id}/candles`:
/// `[ time, low, high, open, close, volume ]`, time in unix seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandle(pub i64, pub f64, pub f64, pub f64, pub f64, pub f64);

/// Ticker channel message. Non-ticker frames (subscription acks,
/// heartbeats, errors) are matched by `kind` and ignored upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinbaseTickerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    /// e.g. `BTC-USD`
    pub product_id: Option<String>,
    pub price: Option<String>,
    /// Size of the last trade; absent on the initial snapshot
    pub last_size: Option<String>,
    /// RFC3339 trade time; absent on the initial snapshot
    pub time: Option<String>,
}

/// Subscription request for the ticker channel.
#[derive(Debug, Serialize)]
pub struct CoinbaseSubscribeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub product_ids: Vec<String>,
    pub channels: Vec<String>,
}

impl CoinbaseSubscribeMessage {
    pub fn ticker(product_ids: Vec<String>) -> Self {
        Self {
            kind: "subscribe".to_string(),
            product_ids,
            channels: vec!["ticker".to_string()],
        }
    }
}
