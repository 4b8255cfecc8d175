//! Database management commands

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::info;

use crate::config::Settings;
use crate::storage::{TickRepository, TimescaleOperations};

/// Database subcommands
#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate(MigrateArgs),
    /// Show database statistics
    Stats(StatsArgs),
}

/// Arguments for migrate command
#[derive(Args)]
pub struct MigrateArgs {
    /// Enable compression after migration
    #[arg(long)]
    pub enable_compression: bool,

    /// Compress chunks older than N days
    #[arg(long, default_value = "7")]
    pub compress_after: i32,
}

/// Arguments for stats command
#[derive(Args)]
pub struct StatsArgs {
    /// Symbols to report (comma-separated). Defaults to every configured
    /// symbol.
    #[arg(long, short, value_delimiter = ',')]
    pub symbols: Vec<String>,
}

/// Execute a database command
pub async fn execute(command: DbCommands) -> Result<()> {
    let settings = Settings::load().unwrap_or_else(|_| Settings::default_settings());
    let repository = TickRepository::from_settings(&settings.database).await?;

    match command {
        DbCommands::Migrate(args) => {
            let ops = TimescaleOperations::new(repository.pool().clone());
            ops.run_migrations().await?;
            ops.create_ohlcv_aggregate().await?;
            ops.add_refresh_policy().await?;

            if args.enable_compression {
                ops.enable_compression().await?;
                ops.add_compression_policy(args.compress_after).await?;
            }

            info!("Database ready");
        }
        DbCommands::Stats(args) => {
            let symbols: Vec<String> = if args.symbols.is_empty() {
                settings.symbols.iter().map(|m| m.symbol.clone()).collect()
            } else {
                args.symbols
            };

            for symbol in &symbols {
                let stats = repository.symbol_stats(symbol).await?;
                println!(
                    "{}: {} ticks, {} .. {}",
                    stats.symbol,
                    stats.total_ticks,
                    stats
                        .earliest
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                    stats
                        .latest
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
    }

    Ok(())
}
