//! The idempotent write path
//!
//! [`TickSink`] is the sole write seam into the tick store. Both the
//! backfill engine and the stream ingester submit batches through it and
//! may do so concurrently without coordination: uniqueness is enforced by
//! the store's `(symbol, event_time, source)` index, not by any lock here.

use async_trait::async_trait;

use crate::schema::Tick;

use super::PersistenceError;

/// Batch tick writer with at-most-once durable effect per identity key.
///
/// Submitting the same batch any number of times leaves the store in the
/// same state as submitting it once; the first write for a key wins and
/// later conflicting writes are silently skipped. The returned count is
/// the number of rows actually inserted, so `0` for a non-empty batch is
/// valid (fully-duplicate replay) and not an error.
#[async_trait]
pub trait TickSink: Send + Sync {
    async fn write_ticks(&self, ticks: &[Tick]) -> Result<u64, PersistenceError>;
}
