//! Provider trait definitions
//!
//! These traits are the seam between the ingestion engines and the
//! exchange-specific adapters. A provider implements
//! [`HistoricalCandleProvider`] for paginated candle history,
//! [`LiveTickProvider`] for a live ticker feed, or both.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::schema::{Candle, Tick};

/// Errors surfaced by quote source adapters.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SourceError {
    /// Non-success HTTP status from a historical fetch
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level failure (connect, read, protocol) on REST or WebSocket
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single message or response body that could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Provider signalled rate limiting (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Request timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Subscription request rejected or malformed
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Caller misuse: bad product id, empty symbol list
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SourceError {
    /// Whether a retry with backoff is worthwhile.
    ///
    /// 5xx, rate limits, timeouts and transport failures are transient;
    /// other 4xx responses, decode failures and configuration errors are
    /// permanent for the current input.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http { status, .. } => *status >= 500,
            SourceError::Transport(_) => true,
            SourceError::RateLimited(_) => true,
            SourceError::Timeout(_) => true,
            SourceError::Decode(_) => false,
            SourceError::Subscription(_) => false,
            SourceError::Configuration(_) => false,
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// One historical fetch: a product, a half-open time window, a granularity.
#[derive(Debug, Clone)]
pub struct CandleRequest {
    /// Provider-native product identifier (e.g. `BTC-USD`)
    pub product_id: String,
    /// Window start (inclusive)
    pub start: DateTime<Utc>,
    /// Window end (exclusive)
    pub end: DateTime<Utc>,
    /// Candle duration in seconds
    pub granularity_secs: u32,
}

impl CandleRequest {
    pub fn new(
        product_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity_secs: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            start,
            end,
            granularity_secs,
        }
    }

    /// Providers require `end > start`; bump a degenerate window by one
    /// granularity unit rather than failing the whole fetch.
    pub fn effective_end(&self) -> DateTime<Utc> {
        if self.end > self.start {
            self.end
        } else {
            self.start + Duration::seconds(self.granularity_secs as i64)
        }
    }
}

/// Paginated historical candle source.
#[async_trait]
pub trait HistoricalCandleProvider: Send + Sync {
    /// Provenance tag stamped on every tick from this source.
    fn source_tag(&self) -> &str;

    /// Fetch candles for one window, ordered by open time ascending.
    ///
    /// An empty response is valid: quiet markets produce no candles.
    async fn fetch_candles(&self, request: &CandleRequest) -> SourceResult<Vec<Candle>>;
}

/// One decoded inbound message from a live feed.
#[derive(Debug, Clone)]
pub enum FeedMessage {
    /// A price observation
    Tick(Tick),
    /// Acks, heartbeats, snapshots without a price: ignored by the ingester
    Control,
}

/// A live connection's message stream.
///
/// Non-restartable: once the transport drops, the feed is dead and the
/// ingester reconnects via [`LiveTickProvider::connect`].
#[async_trait]
pub trait TickFeed: Send {
    /// Next inbound message.
    ///
    /// `Ok(None)` means the connection closed cleanly. A
    /// [`SourceError::Decode`] is recoverable (the caller logs and keeps
    /// reading); any other error is a transport failure.
    async fn next_message(&mut self) -> SourceResult<Option<FeedMessage>>;

    /// Close the transport gracefully. Best effort.
    async fn close(&mut self);
}

/// Live streaming tick source.
#[async_trait]
pub trait LiveTickProvider: Send + Sync {
    type Feed: TickFeed;

    /// Provenance tag stamped on every tick from this source.
    fn source_tag(&self) -> &str;

    /// Open the transport and subscribe to the given products.
    ///
    /// Fails with [`SourceError::Configuration`] on an empty product list.
    async fn connect(&self, product_ids: &[String]) -> SourceResult<Self::Feed>;
}
