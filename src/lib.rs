//! # CryptoPulse Ingest
//!
//! Cryptocurrency tick ingestion: historical backfill and live streaming
//! into one TimescaleDB tick store.
//!
//! ## Features
//!
//! - **Historical backfill**: paginated candle history fetched in
//!   provider-sized windows with bounded retry; every candle becomes one
//!   tick
//! - **Live streaming**: long-lived WebSocket feeds with unbounded
//!   self-healing reconnect
//! - **Idempotent writes**: both paths converge on one conflict-safe
//!   upsert keyed by `(symbol, event_time, source)`, so overlapping
//!   backfills and streams never duplicate data
//!
//! ## Architecture
//!
//! Exchange specifics live behind the provider traits in [`provider`];
//! the [`backfill`] engine and [`stream`] ingester are generic over them
//! and over the [`storage::TickSink`] write seam. A 1-minute OHLCV
//! continuous aggregate is maintained downstream of the tick store.

pub mod backfill;
pub mod cli;
pub mod config;
pub mod provider;
pub mod schema;
pub mod storage;
pub mod stream;

// Re-export commonly used types
pub use backfill::{BackfillEngine, BackfillOutcome, BackfillRequest, WindowPlanner};
pub use config::Settings;
pub use provider::{
    HistoricalCandleProvider, LiveTickProvider, SourceError, SourceResult, TickFeed,
};
pub use schema::{Candle, Tick};
pub use storage::{PersistenceError, TickRepository, TickSink};
pub use stream::StreamIngester;
