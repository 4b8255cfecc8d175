//! Storage layer for the tick store
//!
//! TimescaleDB-backed persistence: the idempotent upsert that both
//! ingestion engines write through, the ordered range reads the query API
//! consumes, and schema/aggregate management.

mod ohlcv;
mod repository;
mod timescale;
mod writer;

pub use ohlcv::*;
pub use repository::*;
pub use timescale::*;
pub use writer::*;
