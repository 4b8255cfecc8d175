//! Command-line interface
//!
//! Provides CLI commands for the tick ingester.

pub mod backfill;
pub mod db;
pub mod stream;

use clap::{Parser, Subcommand};

/// CryptoPulse ingest CLI
#[derive(Parser)]
#[command(name = "cryptopulse-ingest")]
#[command(about = "Crypto tick ingestion: historical backfill and live streaming")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Backfill historical candles into the tick store
    Backfill(backfill::BackfillArgs),
    /// Stream live ticks into the tick store
    Stream(stream::StreamArgs),
    /// Database operations
    #[command(subcommand)]
    Db(db::DbCommands),
}
