//! CryptoPulse Ingest CLI
//!
//! Provides commands for:
//! - `backfill`: Load historical candles into the tick store
//! - `stream`: Run the live ingesters until interrupted
//! - `db`: Database operations

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cryptopulse_ingest::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("cryptopulse_ingest=info".parse()?))
        .init();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    match cli.command {
        Commands::Backfill(args) => {
            cryptopulse_ingest::cli::backfill::execute(args).await?;
        }
        Commands::Stream(args) => {
            cryptopulse_ingest::cli::stream::execute(args).await?;
        }
        Commands::Db(cmd) => {
            cryptopulse_ingest::cli::db::execute(cmd).await?;
        }
    }

    Ok(())
}
