//! Backfill engine
//!
//! Drives the window planner and a historical provider over one requested
//! range: fetch each window with bounded retry, convert candles to ticks,
//! write through the idempotent sink. A run that aborts mid-plan keeps
//! everything already written; re-running the same range is safe because
//! the sink deduplicates on the tick identity key.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use chrono::{DateTime, Utc};

use crate::provider::{CandleRequest, HistoricalCandleProvider, SourceError};
use crate::schema::Tick;
use crate::storage::{PersistenceError, TickSink};

use super::{PlanError, RetryPolicy, TimeWindow, WindowPlanner};

/// Failures that abort a backfill run
#[derive(Error, Debug)]
pub enum BackfillError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Window {window} failed after {attempts} attempts: {source}")]
    Chunk {
        window: TimeWindow,
        attempts: u32,
        source: SourceError,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// What one run accomplished. Reported even on cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillOutcome {
    /// Windows fully fetched and written
    pub windows_completed: usize,
    /// Ticks handed to the sink
    pub ticks_submitted: u64,
    /// Ticks actually inserted after dedup
    pub ticks_inserted: u64,
    /// The run stopped on a shutdown signal before covering the full
    /// range. Callers driving several runs off one signal must stop
    /// scheduling further runs when this is set.
    pub cancelled: bool,
}

/// One invocation's parameters
#[derive(Debug, Clone)]
pub struct BackfillRequest {
    /// Canonical symbol stamped on stored ticks (e.g. `BTCUSD`)
    pub symbol: String,
    /// Provider-native product id (e.g. `BTC-USD`)
    pub product_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity_secs: u32,
}

/// Backfill engine, generic over the candle source and tick sink
pub struct BackfillEngine<P: HistoricalCandleProvider, S: TickSink> {
    provider: Arc<P>,
    sink: Arc<S>,
    planner: WindowPlanner,
    retry: RetryPolicy,
    /// Pause between windows to respect provider rate limits
    inter_request_delay: Duration,
}

impl<P: HistoricalCandleProvider, S: TickSink> BackfillEngine<P, S> {
    pub fn new(
        provider: Arc<P>,
        sink: Arc<S>,
        planner: WindowPlanner,
        retry: RetryPolicy,
        inter_request_delay: Duration,
    ) -> Self {
        Self {
            provider,
            sink,
            planner,
            retry,
            inter_request_delay,
        }
    }

    /// Run one backfill.
    ///
    /// Windows are processed in chronological order. A window whose fetch
    /// keeps failing aborts the rest of the plan; prior windows stay
    /// written. A shutdown signal stops the run at the next window
    /// boundary or backoff wait and returns the partial outcome as `Ok`
    /// with `cancelled` set.
    pub async fn run(
        &self,
        request: &BackfillRequest,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<BackfillOutcome, BackfillError> {
        let windows = self
            .planner
            .plan(request.start, request.end, request.granularity_secs)?;

        info!(
            symbol = %request.symbol,
            product = %request.product_id,
            windows = windows.len(),
            start = %request.start,
            end = %request.end,
            granularity = request.granularity_secs,
            "Starting backfill"
        );

        let mut outcome = BackfillOutcome::default();

        for (idx, window) in windows.iter().enumerate() {
            if shutdown.try_recv().is_ok() {
                info!(
                    completed = outcome.windows_completed,
                    "Backfill cancelled before window {}", idx
                );
                outcome.cancelled = true;
                return Ok(outcome);
            }

            let candles = match self.fetch_with_retry(request, window, shutdown).await? {
                Some(candles) => candles,
                // Shutdown during a backoff wait
                None => {
                    outcome.cancelled = true;
                    return Ok(outcome);
                }
            };

            if candles.is_empty() {
                info!(%window, "No candles in window, continuing");
                outcome.windows_completed += 1;
            } else {
                let ticks: Vec<Tick> = candles
                    .into_iter()
                    .map(|c| c.into_tick(&request.symbol, self.provider.source_tag()))
                    .collect();

                let submitted = ticks.len() as u64;
                let inserted = self.sink.write_ticks(&ticks).await?;

                outcome.windows_completed += 1;
                outcome.ticks_submitted += submitted;
                outcome.ticks_inserted += inserted;

                debug!(
                    %window,
                    submitted,
                    inserted,
                    window_index = idx + 1,
                    windows = windows.len(),
                    "Window written"
                );
            }

            // Rate-limit pause after every window, quiet ones included,
            // interruptible by shutdown
            if idx + 1 < windows.len() {
                tokio::select! {
                    _ = tokio::time::sleep(self.inter_request_delay) => {}
                    _ = shutdown.recv() => {
                        info!(completed = outcome.windows_completed, "Backfill cancelled");
                        outcome.cancelled = true;
                        return Ok(outcome);
                    }
                }
            }
        }

        info!(
            windows = outcome.windows_completed,
            submitted = outcome.ticks_submitted,
            inserted = outcome.ticks_inserted,
            "Backfill completed"
        );

        Ok(outcome)
    }

    /// Fetch one window, retrying transient failures with increasing
    /// backoff. Returns `Ok(None)` if shutdown arrived during a wait.
    async fn fetch_with_retry(
        &self,
        request: &BackfillRequest,
        window: &TimeWindow,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Option<Vec<crate::schema::Candle>>, BackfillError> {
        let fetch = CandleRequest::new(
            &request.product_id,
            window.start,
            window.end,
            request.granularity_secs,
        );

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.fetch_candles(&fetch).await {
                Ok(candles) => return Ok(Some(candles)),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        %window,
                        attempt,
                        max = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, retrying: {e}"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => return Ok(None),
                    }
                }
                Err(e) => {
                    return Err(BackfillError::Chunk {
                        window: *window,
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::schema::Candle;

    fn utc(h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, mi, 0).unwrap()
    }

    fn candle_at(open_time: DateTime<Utc>) -> Candle {
        Candle {
            open_time,
            low: dec!(99),
            high: dec!(101),
            open: dec!(100),
            close: dec!(100.5),
            volume: dec!(3.25),
        }
    }

    /// Serves one candle per window; optionally fails every fetch of one
    /// window with a configured error.
    struct FakeProvider {
        fail_window_start: Option<DateTime<Utc>>,
        error: fn() -> SourceError,
        attempts: AtomicU32,
    }

    impl FakeProvider {
        fn healthy() -> Self {
            Self {
                fail_window_start: None,
                error: || SourceError::Transport(String::new()),
                attempts: AtomicU32::new(0),
            }
        }

        fn failing_at(start: DateTime<Utc>, error: fn() -> SourceError) -> Self {
            Self {
                fail_window_start: Some(start),
                error,
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl HistoricalCandleProvider for FakeProvider {
        fn source_tag(&self) -> &str {
            "coinbase"
        }

        async fn fetch_candles(&self, request: &CandleRequest) -> Result<Vec<Candle>, SourceError> {
            if self.fail_window_start == Some(request.start) {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                return Err((self.error)());
            }
            Ok(vec![candle_at(request.start)])
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        ticks: Mutex<Vec<Tick>>,
    }

    #[async_trait]
    impl TickSink for CollectingSink {
        async fn write_ticks(&self, ticks: &[Tick]) -> Result<u64, PersistenceError> {
            self.ticks.lock().unwrap().extend_from_slice(ticks);
            Ok(ticks.len() as u64)
        }
    }

    fn engine<P: HistoricalCandleProvider>(
        provider: Arc<P>,
        sink: Arc<CollectingSink>,
    ) -> BackfillEngine<P, CollectingSink> {
        BackfillEngine::new(
            provider,
            sink,
            WindowPlanner::new([60], 300),
            RetryPolicy::new(5, Duration::from_millis(1500)),
            Duration::from_millis(200),
        )
    }

    fn request(start: DateTime<Utc>, end: DateTime<Utc>) -> BackfillRequest {
        BackfillRequest {
            symbol: "BTCUSD".to_string(),
            product_id: "BTC-USD".to_string(),
            start,
            end,
            granularity_secs: 60,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_writes_every_window() {
        let provider = Arc::new(FakeProvider::healthy());
        let sink = Arc::new(CollectingSink::default());
        let engine = engine(provider, sink.clone());
        let (_tx, mut shutdown) = broadcast::channel(1);

        let outcome = engine
            .run(&request(utc(0, 0), utc(6, 0)), &mut shutdown)
            .await
            .unwrap();

        assert_eq!(outcome.windows_completed, 2);
        assert_eq!(outcome.ticks_submitted, 2);
        assert_eq!(outcome.ticks_inserted, 2);
        assert!(!outcome.cancelled);

        let ticks = sink.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].symbol, "BTCUSD");
        assert_eq!(ticks[0].source, "coinbase");
        assert_eq!(ticks[0].event_time, utc(0, 0));
        assert_eq!(ticks[0].price, dec!(100.5));
        assert_eq!(ticks[1].event_time, utc(5, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_aborts_and_keeps_prior_windows() {
        // Second window fails every time with a transient error.
        let provider = Arc::new(FakeProvider::failing_at(utc(5, 0), || {
            SourceError::Http {
                status: 503,
                body: "unavailable".to_string(),
            }
        }));
        let sink = Arc::new(CollectingSink::default());
        let engine = engine(provider.clone(), sink.clone());
        let (_tx, mut shutdown) = broadcast::channel(1);

        let err = engine
            .run(&request(utc(0, 0), utc(6, 0)), &mut shutdown)
            .await
            .unwrap_err();

        match err {
            BackfillError::Chunk {
                window, attempts, ..
            } => {
                assert_eq!(window.start, utc(5, 0));
                assert_eq!(attempts, 5);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 5);

        // The first window's tick survives the abort.
        let ticks = sink.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].event_time, utc(0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let provider = Arc::new(FakeProvider::failing_at(utc(0, 0), || {
            SourceError::Http {
                status: 404,
                body: "no such product".to_string(),
            }
        }));
        let sink = Arc::new(CollectingSink::default());
        let engine = engine(provider.clone(), sink);
        let (_tx, mut shutdown) = broadcast::channel(1);

        let err = engine
            .run(&request(utc(0, 0), utc(1, 0)), &mut shutdown)
            .await
            .unwrap_err();

        assert!(matches!(err, BackfillError::Chunk { attempts: 1, .. }));
        assert_eq!(provider.attempts.load(Ordering::SeqCst), 1);
    }

    /// Quiet market: every window comes back empty, fetch instants are
    /// recorded to check request pacing.
    #[derive(Default)]
    struct EmptyProvider {
        fetches: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl HistoricalCandleProvider for EmptyProvider {
        fn source_tag(&self) -> &str {
            "coinbase"
        }

        async fn fetch_candles(
            &self,
            _request: &CandleRequest,
        ) -> Result<Vec<Candle>, SourceError> {
            self.fetches.lock().unwrap().push(tokio::time::Instant::now());
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_window_is_not_an_error() {
        let sink = Arc::new(CollectingSink::default());
        let engine = BackfillEngine::new(
            Arc::new(EmptyProvider::default()),
            sink.clone(),
            WindowPlanner::new([60], 300),
            RetryPolicy::default(),
            Duration::from_millis(200),
        );
        let (_tx, mut shutdown) = broadcast::channel(1);

        let outcome = engine
            .run(&request(utc(0, 0), utc(6, 0)), &mut shutdown)
            .await
            .unwrap();

        assert_eq!(outcome.windows_completed, 2);
        assert_eq!(outcome.ticks_submitted, 0);
        assert!(sink.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_windows_keep_request_pacing() {
        let provider = Arc::new(EmptyProvider::default());
        let sink = Arc::new(CollectingSink::default());
        let delay = Duration::from_millis(200);
        let engine = BackfillEngine::new(
            provider.clone(),
            sink,
            WindowPlanner::new([60], 300),
            RetryPolicy::default(),
            delay,
        );
        let (_tx, mut shutdown) = broadcast::channel(1);

        // 15 hours of one-minute candles: three empty windows.
        engine
            .run(&request(utc(0, 0), utc(15, 0)), &mut shutdown)
            .await
            .unwrap();

        let fetches = provider.fetches.lock().unwrap();
        assert_eq!(fetches.len(), 3);
        // Empty responses must still be paced by the inter-request delay.
        for pair in fetches.windows(2) {
            assert_eq!(pair[1] - pair[0], delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_partial_outcome() {
        let provider = Arc::new(FakeProvider::healthy());
        let sink = Arc::new(CollectingSink::default());
        let engine = engine(provider, sink.clone());
        let (tx, mut shutdown) = broadcast::channel(1);

        // Signal before the run: the first window-boundary check stops it.
        tx.send(()).unwrap();

        let outcome = engine
            .run(&request(utc(0, 0), utc(6, 0)), &mut shutdown)
            .await
            .unwrap();

        assert_eq!(outcome.windows_completed, 0);
        assert!(outcome.cancelled);
        assert!(sink.ticks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_window_pause_is_reported() {
        let provider = Arc::new(FakeProvider::healthy());
        let sink = Arc::new(CollectingSink::default());
        let engine = engine(provider, sink.clone());
        let (tx, mut shutdown) = broadcast::channel(1);

        // Fire the signal while the engine sits in the inter-window pause.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(());
        });

        let outcome = engine
            .run(&request(utc(0, 0), utc(6, 0)), &mut shutdown)
            .await
            .unwrap();

        // First window landed, the signal stopped the rest, and the
        // outcome says so rather than looking like a completed run.
        assert_eq!(outcome.windows_completed, 1);
        assert!(outcome.cancelled);
        assert_eq!(sink.ticks.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_plan_propagates() {
        let provider = Arc::new(FakeProvider::healthy());
        let sink = Arc::new(CollectingSink::default());
        let engine = engine(provider, sink);
        let (_tx, mut shutdown) = broadcast::channel(1);

        let mut bad = request(utc(0, 0), utc(6, 0));
        bad.granularity_secs = 42;
        let err = engine.run(&bad, &mut shutdown).await.unwrap_err();
        assert!(matches!(err, BackfillError::Plan(PlanError::InvalidGranularity { .. })));
    }

    #[test]
    fn test_rerun_over_same_range_is_safe_by_dedup() {
        // Idempotency lives in the sink's identity key, not in engine
        // state. Two runs submit the same ticks; the real store inserts
        // them once. The collecting sink here just demonstrates both runs
        // produce identical batches.
        let a = candle_at(utc(0, 0)).into_tick("BTCUSD", "coinbase");
        let b = candle_at(utc(0, 0)).into_tick("BTCUSD", "coinbase");
        assert_eq!(a.key(), b.key());
    }
}
