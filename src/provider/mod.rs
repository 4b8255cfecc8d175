//! Quote source adapters
//!
//! Each provider translates its native historical-candle API and/or live
//! ticker feed into the canonical tick shape. The backfill engine and the
//! stream ingester only ever program against the traits in [`traits`].

pub mod binance;
pub mod coinbase;
pub mod traits;

pub use traits::{
    CandleRequest, FeedMessage, HistoricalCandleProvider, LiveTickProvider, SourceError,
    SourceResult, TickFeed,
};
