//! Coinbase historical candle client
//!
//! Fetches one window of candles per call via
//! `GET /products/{product_id}/candles`. Coinbase caps a response at 300
//! candles and returns newest first; the response is re-sorted ascending.
//! Request pacing is enforced here with a direct rate limiter so callers
//! cannot accidentally hammer the API.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::provider::{CandleRequest, HistoricalCandleProvider, SourceError, SourceResult};
use crate::schema::Candle;

use super::normalizer::candle_from_raw;
use super::types::RawCandle;
use super::SOURCE_TAG;

/// Coinbase Exchange REST base URL
pub const DEFAULT_REST_URL: &str = "https://api.exchange.coinbase.com";

const USER_AGENT: &str = "cryptopulse-ingest/0.1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies are truncated to this length in error messages
const MAX_ERROR_BODY: usize = 400;

/// Coinbase historical candle provider
pub struct CoinbaseHistorical {
    http: reqwest::Client,
    base_url: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl CoinbaseHistorical {
    /// Create a client against the production API.
    pub fn new(requests_per_second: u32) -> SourceResult<Self> {
        Self::with_base_url(DEFAULT_REST_URL, requests_per_second)
    }

    /// Create a client against a custom base URL (tests, proxies).
    pub fn with_base_url(base_url: &str, requests_per_second: u32) -> SourceResult<Self> {
        let rps = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            SourceError::Configuration("requests_per_second must be > 0".to_string())
        })?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }
}

/// UTC RFC3339 with `Z` suffix and no sub-second digits, the format the
/// candles endpoint expects.
fn iso_z(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Clip an error body to [`MAX_ERROR_BODY`] bytes, cutting only on a
/// char boundary so multi-byte bodies cannot panic the truncation.
fn truncate_error_body(body: &mut String) {
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
}

#[async_trait]
impl HistoricalCandleProvider for CoinbaseHistorical {
    fn source_tag(&self) -> &str {
        SOURCE_TAG
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> SourceResult<Vec<Candle>> {
        self.limiter.until_ready().await;

        let url = format!("{}/products/{}/candles", self.base_url, request.product_id);
        let end = request.effective_end();

        debug!(
            product_id = %request.product_id,
            start = %iso_z(request.start),
            end = %iso_z(end),
            granularity = request.granularity_secs,
            "Fetching candle window"
        );

        let response = self
            .http
            .get(&url)
            .query(&[
                ("start", iso_z(request.start)),
                ("end", iso_z(end)),
                ("granularity", request.granularity_secs.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(format!("GET {url}: {e}"))
                } else {
                    SourceError::Transport(format!("GET {url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_error_body(&mut body);

            if status.as_u16() == 429 {
                return Err(SourceError::RateLimited(body));
            }
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Vec<RawCandle> = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(format!("Candle response: {e}")))?;

        let mut candles = raw
            .iter()
            .map(candle_from_raw)
            .collect::<Result<Vec<_>, _>>()?;

        // Coinbase returns newest first; normalize to oldest first.
        candles.sort_by_key(|c| c.open_time);

        Ok(candles)
    }
}
