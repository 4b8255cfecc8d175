//! Binance live adapter
//!
//! Subscribes to `@miniTicker` combined streams. Binance selects streams
//! through the connection URL, so there is no subscribe frame; the first
//! inbound message is already data. Historical backfill is served by the
//! Coinbase adapter; Binance participates as an independent live source
//! under the `binance` provenance tag.

mod live;
mod normalizer;
mod types;

pub use live::{BinanceFeed, BinanceLive, DEFAULT_WS_URL};
pub use normalizer::decode_mini_ticker;
pub use types::{BinanceMiniTicker, BinanceStreamMessage};

/// Provenance tag for all Binance-sourced ticks.
pub const SOURCE_TAG: &str = "binance";
