//! Coinbase Exchange adapters
//!
//! Two independent adapters share one output contract:
//! - [`CoinbaseHistorical`]: paginated candle history over REST
//!   (`GET /products/{id}/candles`)
//! - [`CoinbaseLive`]: the `ticker` channel on the public WebSocket feed
//!
//! Both stamp ticks with the `coinbase` source tag.

mod historical;
mod live;
mod normalizer;
mod symbol;
mod types;

pub use historical::{CoinbaseHistorical, DEFAULT_REST_URL};
pub use live::{CoinbaseFeed, CoinbaseLive, DEFAULT_WS_URL};
pub use normalizer::{candle_from_raw, decode_ticker};
pub use symbol::product_to_symbol;
pub use types::{CoinbaseSubscribeMessage, CoinbaseTickerMessage, RawCandle};

/// Provenance tag for all Coinbase-sourced ticks.
pub const SOURCE_TAG: &str = "coinbase";
