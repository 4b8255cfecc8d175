//! Stream command - run the live ingesters until interrupted

use anyhow::Result;
use clap::{Args, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::{Settings, SymbolMapping};
use crate::provider::{binance::BinanceLive, coinbase::CoinbaseLive};
use crate::storage::TickRepository;
use crate::stream::StreamIngester;

/// Which live feeds to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderChoice {
    Coinbase,
    Binance,
    All,
}

/// Arguments for the stream command
#[derive(Args)]
pub struct StreamArgs {
    /// Symbols to stream (comma-separated canonical symbols).
    /// Defaults to every configured symbol.
    #[arg(long, short, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Live feed provider(s) to run
    #[arg(long, short, value_enum, default_value_t = ProviderChoice::All)]
    pub provider: ProviderChoice,
}

/// Execute the stream command
pub async fn execute(args: StreamArgs) -> Result<()> {
    let settings = Settings::load().unwrap_or_else(|_| Settings::default_settings());

    let mappings = resolve_mappings(&settings, &args.symbols)?;

    let repository = Arc::new(TickRepository::from_settings(&settings.database).await?);
    let reconnect_delay = Duration::from_secs(settings.stream.reconnect_delay_secs);

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut tasks = Vec::new();

    if args.provider != ProviderChoice::Binance {
        let products: Vec<String> = mappings.iter().map(|m| m.coinbase.clone()).collect();
        let ingester = StreamIngester::new(
            Arc::new(CoinbaseLive::with_url(&settings.coinbase.ws_url)),
            repository.clone(),
            products,
            reconnect_delay,
        );
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move { ingester.run(shutdown).await }));
    }

    if args.provider != ProviderChoice::Coinbase && settings.binance.enabled {
        let products: Vec<String> = mappings.iter().map(|m| m.binance.clone()).collect();
        let ingester = StreamIngester::new(
            Arc::new(BinanceLive::with_url(&settings.binance.ws_url)),
            repository.clone(),
            products,
            reconnect_delay,
        );
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move { ingester.run(shutdown).await }));
    }

    if tasks.is_empty() {
        anyhow::bail!("No live feed enabled for the requested provider");
    }

    info!(
        symbols = mappings.len(),
        ingesters = tasks.len(),
        "Streaming live ticks (Ctrl-C to stop)"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Ingester ended with error: {e}"),
            Err(e) => error!("Ingester task panicked: {e}"),
        }
    }

    Ok(())
}

/// Resolve requested symbols against the configured mappings.
///
/// An empty request means every configured symbol; any unknown symbol is
/// an error, never silently skipped.
fn resolve_mappings(settings: &Settings, symbols: &[String]) -> Result<Vec<SymbolMapping>> {
    if symbols.is_empty() {
        if settings.symbols.is_empty() {
            anyhow::bail!("No symbols configured");
        }
        return Ok(settings.symbols.clone());
    }

    let unknown: Vec<&str> = symbols
        .iter()
        .filter(|s| settings.symbol_mapping(s).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        anyhow::bail!("Unknown symbols: {}", unknown.join(", "));
    }

    Ok(symbols
        .iter()
        .filter_map(|s| settings.symbol_mapping(s).cloned())
        .collect())
}
