//! Coinbase live ticker feed
//!
//! Opens the public WebSocket feed and subscribes to the `ticker` channel.
//! The feed is non-restartable: the stream ingester owns the reconnect
//! loop and calls [`CoinbaseLive::connect`] again after any transport
//! failure.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::provider::{FeedMessage, LiveTickProvider, SourceError, SourceResult, TickFeed};

use super::normalizer::decode_ticker;
use super::types::CoinbaseSubscribeMessage;
use super::SOURCE_TAG;

/// Coinbase Exchange public WebSocket feed URL
pub const DEFAULT_WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

/// Coinbase live ticker provider
pub struct CoinbaseLive {
    ws_url: String,
}

impl CoinbaseLive {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_WS_URL)
    }

    pub fn with_url(ws_url: &str) -> Self {
        Self {
            ws_url: ws_url.to_string(),
        }
    }
}

impl Default for CoinbaseLive {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LiveTickProvider for CoinbaseLive {
    type Feed = CoinbaseFeed;

    fn source_tag(&self) -> &str {
        SOURCE_TAG
    }

    async fn connect(&self, product_ids: &[String]) -> SourceResult<Self::Feed> {
        if product_ids.is_empty() {
            return Err(SourceError::Configuration(
                "No product ids to subscribe".to_string(),
            ));
        }

        let (mut ws, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| SourceError::Transport(format!("Connect {}: {e}", self.ws_url)))?;

        let subscribe = CoinbaseSubscribeMessage::ticker(product_ids.to_vec());
        let payload = serde_json::to_string(&subscribe)
            .map_err(|e| SourceError::Subscription(format!("Serialize subscribe: {e}")))?;

        ws.send(Message::Text(payload))
            .await
            .map_err(|e| SourceError::Transport(format!("Send subscribe: {e}")))?;

        info!(products = product_ids.len(), "Subscribed to Coinbase ticker");

        Ok(CoinbaseFeed { inner: ws })
    }
}

/// One live WebSocket connection's message stream.
pub struct CoinbaseFeed {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl TickFeed for CoinbaseFeed {
    async fn next_message(&mut self) -> SourceResult<Option<FeedMessage>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(match decode_ticker(&text)? {
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
                Some(Ok(_)) => {
                    // Pong/binary frames carry nothing for us
                    return Ok(Some(FeedMessage::Control));
                }
                Some(Err(e)) => {
                    return Err(SourceError::Transport(e.to_string()));
                }
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
