//! Binance live miniTicker feed

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::provider::{FeedMessage, LiveTickProvider, SourceError, SourceResult, TickFeed};

use super::normalizer::decode_mini_ticker;
use super::SOURCE_TAG;

/// Binance combined-stream WebSocket base URL
pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/stream";

/// Binance live miniTicker provider
pub struct BinanceLive {
    ws_base_url: String,
}

impl BinanceLive {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_WS_URL)
    }

    pub fn with_url(ws_base_url: &str) -> Self {
        Self {
            ws_base_url: ws_base_url.to_string(),
        }
    }

    /// Build the combined-stream URL for a set of products.
    ///
    /// Stream names are lowercase: `btcusdt@miniTicker`.
    fn stream_url(&self, product_ids: &[String]) -> String {
        let streams: Vec<String> = product_ids
            .iter()
            .map(|p| format!("{}@miniTicker", p.to_lowercase()))
            .collect();
        format!("{}?streams={}", self.ws_base_url, streams.join("/"))
    }
}

impl Default for BinanceLive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveTickProvider for BinanceLive {
    type Feed = BinanceFeed;

    fn source_tag(&self) -> &str {
        SOURCE_TAG
    }

    async fn connect(&self, product_ids: &[String]) -> SourceResult<Self::Feed> {
        if product_ids.is_empty() {
            return Err(SourceError::Configuration(
                "No product ids to subscribe".to_string(),
            ));
        }

        let url = self.stream_url(product_ids);
        let (ws, _) = connect_async(&url)
            .await
            .map_err(|e| SourceError::Transport(format!("Connect {url}: {e}")))?;

        info!(products = product_ids.len(), "Connected to Binance miniTicker streams");

        Ok(BinanceFeed { inner: ws })
    }
}

/// One live WebSocket connection's message stream.
pub struct BinanceFeed {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TickFeed for BinanceFeed {
    async fn next_message(&mut self) -> SourceResult<Option<FeedMessage>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(match decode_mini_ticker(&text)? {
                        Some(tick) => FeedMessage::Tick(tick),
                        None => FeedMessage::Control,
                    }));
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = self.inner.send(Message::Pong(payload)).await {
                        warn!("Failed to send pong: {e}");
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Server closed the feed");
                    return Ok(None);
                }
                Some(Ok(_)) => return Ok(Some(FeedMessage::Control)),
                Some(Err(e)) => return Err(SourceError::Transport(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.send(Message::Close(None)).await {
            debug!("Close frame not sent: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url() {
        let live = BinanceLive::new();
        let url = live.stream_url(&["btcusdt".to_string(), "ETHUSDT".to_string()]);
        assert_eq!(
            url,
            "wss://stream.binance.com:9443/stream?streams=btcusdt@miniTicker/ethusdt@miniTicker"
        );
    }
}
