//! Stream ingester
//!
//! State machine: `Connecting -> Streaming -> (Disconnected ->
//! Connecting)*`, terminal `Stopped` only on cancellation. The reconnect
//! loop is unbounded: live feeds drop routinely and must self-heal, so
//! only an unrecoverable configuration error ends the run on its own.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::provider::{FeedMessage, LiveTickProvider, SourceError, TickFeed};
use crate::storage::TickSink;

/// Why one connection ended
enum Disconnect {
    /// Server closed or transport failed; reconnect after the delay
    Transport,
    /// Cancellation signal; stop without reconnecting
    Shutdown,
}

/// Live tick ingester, generic over the feed provider and tick sink
pub struct StreamIngester<P: LiveTickProvider, S: TickSink> {
    provider: Arc<P>,
    sink: Arc<S>,
    product_ids: Vec<String>,
    reconnect_delay: Duration,
}

impl<P: LiveTickProvider, S: TickSink> StreamIngester<P, S> {
    pub fn new(
        provider: Arc<P>,
        sink: Arc<S>,
        product_ids: Vec<String>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            provider,
            sink,
            product_ids,
            reconnect_delay,
        }
    }

    /// Run until cancelled.
    ///
    /// Returns `Ok(())` on shutdown. Returns an error only for
    /// configuration failures that no amount of reconnecting can fix
    /// (e.g. an empty product list).
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), SourceError> {
        let source = self.provider.source_tag().to_string();

        loop {
            info!(source = %source, products = self.product_ids.len(), "Connecting to live feed");

            let feed = tokio::select! {
                result = self.provider.connect(&self.product_ids) => match result {
                    Ok(feed) => feed,
                    Err(e @ SourceError::Configuration(_)) => {
                        error!(source = %source, "Unrecoverable feed configuration: {e}");
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(source = %source, "Connect failed: {e}");
                        match self.wait_reconnect(&mut shutdown).await {
                            Disconnect::Transport => continue,
                            Disconnect::Shutdown => break,
                        }
                    }
                },
                _ = shutdown.recv() => break,
            };

            info!(source = %source, "Streaming live ticks");

            match self.stream(feed, &mut shutdown).await {
                Disconnect::Shutdown => break,
                Disconnect::Transport => {
                    warn!(
                        source = %source,
                        delay_secs = self.reconnect_delay.as_secs(),
                        "Feed disconnected, reconnecting"
                    );
                    match self.wait_reconnect(&mut shutdown).await {
                        Disconnect::Transport => continue,
                        Disconnect::Shutdown => break,
                    }
                }
            }
        }

        info!(source = %source, "Stream ingester stopped");
        Ok(())
    }

    /// Drain one connection until it drops or shutdown arrives.
    async fn stream(&self, mut feed: P::Feed, shutdown: &mut broadcast::Receiver<()>) -> Disconnect {
        loop {
            let message = tokio::select! {
                msg = feed.next_message() => msg,
                _ = shutdown.recv() => {
                    feed.close().await;
                    return Disconnect::Shutdown;
                }
            };

            match message {
                Ok(Some(FeedMessage::Tick(tick))) => {
                    // One failed write is not worth dropping the feed.
                    if let Err(e) = self.sink.write_ticks(std::slice::from_ref(&tick)).await {
                        warn!(symbol = %tick.symbol, "Tick write failed, skipping: {e}");
                    }
                }
                Ok(Some(FeedMessage::Control)) => {}
                Ok(None) => return Disconnect::Transport,
                Err(SourceError::Decode(e)) => {
                    debug!("Undecodable message skipped: {e}");
                }
                Err(e) => {
                    warn!("Feed read failed: {e}");
                    return Disconnect::Transport;
                }
            }
        }
    }

    async fn wait_reconnect(&self, shutdown: &mut broadcast::Receiver<()>) -> Disconnect {
        tokio::select! {
            _ = tokio::time::sleep(self.reconnect_delay) => Disconnect::Transport,
            _ = shutdown.recv() => Disconnect::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::schema::Tick;
    use crate::storage::PersistenceError;

    fn tick(n: i64) -> Tick {
        Tick::new(
            "BTCUSD",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(n),
            dec!(42000),
            None,
            "coinbase",
        )
    }

    type Script = VecDeque<Result<Option<FeedMessage>, SourceError>>;

    /// Feed that replays a scripted message sequence, then reports a clean
    /// close.
    struct ScriptedFeed {
        script: Script,
        closed: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TickFeed for ScriptedFeed {
        async fn next_message(&mut self) -> Result<Option<FeedMessage>, SourceError> {
            match self.script.pop_front() {
                Some(msg) => msg,
                None => Ok(None),
            }
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Provider that hands out one scripted feed per connect call. When
    /// the scripts run out, every further connection yields an endless
    /// quiet feed (control messages only).
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Script>>,
        connects: AtomicU32,
        closed: Arc<AtomicU32>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                connects: AtomicU32::new(0),
                closed: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    struct QuietOrScripted {
        inner: Option<ScriptedFeed>,
    }

    #[async_trait]
    impl TickFeed for QuietOrScripted {
        async fn next_message(&mut self) -> Result<Option<FeedMessage>, SourceError> {
            match &mut self.inner {
                Some(feed) => feed.next_message().await,
                // Endless heartbeats; paced so shutdown can win the select
                None => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(Some(FeedMessage::Control))
                }
            }
        }

        async fn close(&mut self) {
            if let Some(feed) = &mut self.inner {
                feed.close().await;
            }
        }
    }

    #[async_trait]
    impl LiveTickProvider for ScriptedProvider {
        type Feed = QuietOrScripted;

        fn source_tag(&self) -> &str {
            "coinbase"
        }

        async fn connect(&self, product_ids: &[String]) -> Result<Self::Feed, SourceError> {
            if product_ids.is_empty() {
                return Err(SourceError::Configuration("No product ids".to_string()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().unwrap().pop_front();
            Ok(QuietOrScripted {
                inner: script.map(|script| ScriptedFeed {
                    script,
                    closed: self.closed.clone(),
                }),
            })
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        ticks: Mutex<Vec<Tick>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl TickSink for CollectingSink {
        async fn write_ticks(&self, ticks: &[Tick]) -> Result<u64, PersistenceError> {
            if self.fail_writes {
                return Err(PersistenceError::Configuration("down".to_string()));
            }
            self.ticks.lock().unwrap().extend_from_slice(ticks);
            Ok(ticks.len() as u64)
        }
    }

    fn ingester(
        provider: Arc<ScriptedProvider>,
        sink: Arc<CollectingSink>,
        products: Vec<String>,
    ) -> StreamIngester<ScriptedProvider, CollectingSink> {
        StreamIngester::new(provider, sink, products, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_flow_to_sink_and_cancel_stops() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::from([
            Ok(Some(FeedMessage::Tick(tick(0)))),
            Ok(Some(FeedMessage::Control)),
            Ok(Some(FeedMessage::Tick(tick(1)))),
        ])]));
        let sink = Arc::new(CollectingSink::default());
        let ing = ingester(provider.clone(), sink.clone(), vec!["BTC-USD".to_string()]);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { ing.run(rx).await });

        // Let the script drain and one reconnect cycle pass.
        tokio::time::sleep(Duration::from_secs(12)).await;
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        let ticks = sink.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].event_time, tick(0).event_time);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_errors_do_not_disconnect() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::from([
            Ok(Some(FeedMessage::Tick(tick(0)))),
            Err(SourceError::Decode("garbled frame".to_string())),
            Ok(Some(FeedMessage::Tick(tick(1)))),
        ])]));
        let sink = Arc::new(CollectingSink::default());
        let ing = ingester(provider.clone(), sink.clone(), vec!["BTC-USD".to_string()]);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { ing.run(rx).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        // Both ticks made it despite the bad frame between them, on the
        // same connection.
        assert_eq!(sink.ticks.lock().unwrap().len(), 2);
        assert_eq!(provider.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_transport_failures_until_cancelled() {
        // Three connections in a row die with transport errors; the
        // ingester must come back each time and keep streaming.
        let dying = || {
            Script::from([
                Ok(Some(FeedMessage::Tick(tick(0)))),
                Err(SourceError::Transport("connection reset".to_string())),
            ])
        };
        let provider = Arc::new(ScriptedProvider::new(vec![dying(), dying(), dying()]));
        let sink = Arc::new(CollectingSink::default());
        let ing = ingester(provider.clone(), sink.clone(), vec!["BTC-USD".to_string()]);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { ing.run(rx).await });

        // Three failures at 5s reconnect delay each fit well within 60s.
        tokio::time::sleep(Duration::from_secs(60)).await;
        let connects_before_cancel = provider.connects.load(Ordering::SeqCst);
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        assert!(connects_before_cancel >= 4, "got {connects_before_cancel}");
        assert_eq!(provider.connects.load(Ordering::SeqCst), connects_before_cancel);
        assert_eq!(sink.ticks.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failures_are_skipped_not_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![Script::from([
            Ok(Some(FeedMessage::Tick(tick(0)))),
            Ok(Some(FeedMessage::Tick(tick(1)))),
        ])]));
        let sink = Arc::new(CollectingSink {
            ticks: Mutex::new(Vec::new()),
            fail_writes: true,
        });
        let ing = ingester(provider.clone(), sink, vec!["BTC-USD".to_string()]);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { ing.run(rx).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(()).unwrap();
        // Still a clean stop: failed writes never kill the stream.
        handle.await.unwrap().unwrap();
        assert_eq!(provider.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_product_list_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let sink = Arc::new(CollectingSink::default());
        let ing = ingester(provider, sink, Vec::new());

        let (_tx, rx) = broadcast::channel(1);
        let err = ing.run(rx).await.unwrap_err();
        assert!(matches!(err, SourceError::Configuration(_)));
    }
}
