//! Backfill command - load historical candles into the tick store

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::backfill::{BackfillEngine, BackfillRequest, RetryPolicy, WindowPlanner};
use crate::config::Settings;
use crate::provider::coinbase::CoinbaseHistorical;
use crate::storage::TickRepository;

/// Arguments for the backfill command
#[derive(Args)]
pub struct BackfillArgs {
    /// Symbols to backfill (comma-separated canonical symbols, e.g. BTCUSD,ETHUSD).
    /// Defaults to every configured symbol.
    #[arg(long, short, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Lookback in days from now (shorthand for --start/--end)
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub days: Option<u32>,

    /// Start date (YYYY-MM-DD). Defaults to the configured lookback.
    #[arg(long)]
    pub start: Option<String>,

    /// End date (YYYY-MM-DD, exclusive). Defaults to now.
    #[arg(long)]
    pub end: Option<String>,

    /// Candle granularity in seconds
    #[arg(long)]
    pub granularity: Option<u32>,
}

/// Execute the backfill command
pub async fn execute(args: BackfillArgs) -> Result<()> {
    let settings = Settings::load().unwrap_or_else(|_| Settings::default_settings());

    let end = match &args.end {
        Some(d) => parse_date(d)?,
        None => Utc::now(),
    };
    let lookback_days = args.days.unwrap_or(settings.backfill.days);
    let start = match &args.start {
        Some(d) => parse_date(d)?,
        None => end - Duration::days(i64::from(lookback_days)),
    };
    let granularity = args.granularity.unwrap_or(settings.backfill.granularity_secs);

    let symbols: Vec<String> = if args.symbols.is_empty() {
        settings.symbols.iter().map(|m| m.symbol.clone()).collect()
    } else {
        args.symbols.clone()
    };

    let repository = Arc::new(TickRepository::from_settings(&settings.database).await?);
    let provider = Arc::new(CoinbaseHistorical::with_base_url(
        &settings.coinbase.rest_url,
        settings.coinbase.requests_per_second,
    )?);

    let planner = WindowPlanner::new(
        settings.coinbase.granularities.iter().copied(),
        settings.coinbase.max_candles_per_request,
    );
    let retry = RetryPolicy::new(
        settings.backfill.retry_max_attempts,
        StdDuration::from_millis(settings.backfill.retry_base_delay_ms),
    );
    let engine = BackfillEngine::new(
        provider,
        repository,
        planner,
        retry,
        StdDuration::from_millis(settings.coinbase.rate_limit_delay_ms),
    );

    // One receiver for the whole run, subscribed before the signal
    // handler can fire: a signal between symbols stays queued and stops
    // the next engine run immediately.
    let (shutdown_tx, mut shutdown) = broadcast::channel(1);
    spawn_ctrl_c_handler(shutdown_tx);

    let mut total_submitted = 0u64;
    let mut total_inserted = 0u64;

    for symbol in &symbols {
        let mapping = settings
            .symbol_mapping(symbol)
            .ok_or_else(|| anyhow!("Unknown symbol: {symbol}"))?;

        let request = BackfillRequest {
            symbol: mapping.symbol.clone(),
            product_id: mapping.coinbase.clone(),
            start,
            end,
            granularity_secs: granularity,
        };

        match engine.run(&request, &mut shutdown).await {
            Ok(outcome) => {
                info!(
                    symbol = %mapping.symbol,
                    windows = outcome.windows_completed,
                    submitted = outcome.ticks_submitted,
                    inserted = outcome.ticks_inserted,
                    "Backfill finished"
                );
                total_submitted += outcome.ticks_submitted;
                total_inserted += outcome.ticks_inserted;
                if outcome.cancelled {
                    info!("Backfill interrupted; remaining symbols skipped");
                    break;
                }
            }
            Err(e) => {
                // Already-written windows stay; a re-run over the same
                // range is safe and picks up the remainder.
                error!(symbol = %mapping.symbol, "Backfill aborted: {e}");
                return Err(e.into());
            }
        }
    }

    info!(
        symbols = symbols.len(),
        submitted = total_submitted,
        inserted = total_inserted,
        "All backfills finished"
    );
    Ok(())
}

fn parse_date(date: &str) -> Result<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")?;
    Ok(day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid date: {date}"))?
        .and_utc())
}

fn spawn_ctrl_c_handler(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    });
}
