//! Application settings and configuration
//!
//! Everything the engines need is injected from here: connection string,
//! tracked symbols and their provider product ids, backfill range and
//! retry tuning, and the rate-limit delays. Nothing is hard-coded in the
//! engine logic.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::provider::{binance, coinbase};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Database configuration
    pub database: DatabaseSettings,
    /// Symbols to track
    #[serde(default = "default_symbols")]
    pub symbols: Vec<SymbolMapping>,
    /// Coinbase provider configuration
    #[serde(default)]
    pub coinbase: CoinbaseSettings,
    /// Binance provider configuration
    #[serde(default)]
    pub binance: BinanceSettings,
    /// Backfill configuration
    #[serde(default)]
    pub backfill: BackfillSettings,
    /// Streaming configuration
    #[serde(default)]
    pub stream: StreamSettings,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Rows per INSERT statement in the batch upsert
    #[serde(default = "default_batch_insert_size")]
    pub batch_insert_size: usize,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_batch_insert_size() -> usize {
    500
}

/// One tracked symbol and its provider-native product ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMapping {
    /// Canonical symbol stored on ticks (e.g. `BTCUSD`)
    pub symbol: String,
    /// Coinbase product id (e.g. `BTC-USD`)
    pub coinbase: String,
    /// Binance stream symbol (e.g. `btcusdt`)
    pub binance: String,
}

fn default_symbols() -> Vec<SymbolMapping> {
    vec![
        SymbolMapping {
            symbol: "BTCUSD".to_string(),
            coinbase: "BTC-USD".to_string(),
            binance: "btcusdt".to_string(),
        },
        SymbolMapping {
            symbol: "ETHUSD".to_string(),
            coinbase: "ETH-USD".to_string(),
            binance: "ethusdt".to_string(),
        },
        SymbolMapping {
            symbol: "SOLUSD".to_string(),
            coinbase: "SOL-USD".to_string(),
            binance: "solusdt".to_string(),
        },
    ]
}

/// Coinbase provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinbaseSettings {
    /// REST base URL for historical candles
    #[serde(default = "default_coinbase_rest_url")]
    pub rest_url: String,
    /// WebSocket feed URL
    #[serde(default = "default_coinbase_ws_url")]
    pub ws_url: String,
    /// Candle granularities the REST API accepts, in seconds
    #[serde(default = "default_granularities")]
    pub granularities: Vec<u32>,
    /// Maximum candles per REST request
    #[serde(default = "default_max_candles")]
    pub max_candles_per_request: u32,
    /// Pause between paginated requests, in milliseconds
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    /// REST request budget per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_coinbase_rest_url() -> String {
    coinbase::DEFAULT_REST_URL.to_string()
}

fn default_coinbase_ws_url() -> String {
    coinbase::DEFAULT_WS_URL.to_string()
}

fn default_granularities() -> Vec<u32> {
    vec![60, 300, 900, 3600, 21600, 86400]
}

fn default_max_candles() -> u32 {
    300
}

fn default_rate_limit_delay_ms() -> u64 {
    200
}

fn default_requests_per_second() -> u32 {
    3
}

impl Default for CoinbaseSettings {
    fn default() -> Self {
        Self {
            rest_url: default_coinbase_rest_url(),
            ws_url: default_coinbase_ws_url(),
            granularities: default_granularities(),
            max_candles_per_request: default_max_candles(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// Binance provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceSettings {
    /// Enable the Binance live feed
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Combined-stream WebSocket base URL
    #[serde(default = "default_binance_ws_url")]
    pub ws_url: String,
}

fn default_true() -> bool {
    true
}

fn default_binance_ws_url() -> String {
    binance::DEFAULT_WS_URL.to_string()
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_url: default_binance_ws_url(),
        }
    }
}

/// Backfill settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillSettings {
    /// Default lookback when no explicit range is given, in days
    #[serde(default = "default_backfill_days")]
    pub days: u32,
    /// Candle granularity, in seconds
    #[serde(default = "default_granularity_secs")]
    pub granularity_secs: u32,
    /// Attempts per window before the run aborts
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Base backoff between attempts, in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_backfill_days() -> u32 {
    1
}

fn default_granularity_secs() -> u32 {
    60
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    1500
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            days: default_backfill_days(),
            granularity_secs: default_granularity_secs(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// Streaming settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Wait between reconnect attempts, in seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("CRYPTOPULSE")
    }

    /// Load settings with a custom environment variable prefix
    pub fn load_with_prefix(env_prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config_dir = Self::config_dir();

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // Add environment-specific configuration
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Add local overrides (not checked into git)
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // Add environment variables (e.g., CRYPTOPULSE__DATABASE__URL)
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Get the configuration directory path
    fn config_dir() -> String {
        std::env::var("CRYPTOPULSE_CONFIG_DIR").unwrap_or_else(|_| "config".into())
    }

    /// Create default settings (useful for testing)
    pub fn default_settings() -> Self {
        Settings {
            database: DatabaseSettings {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/cryptopulse".into()),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                batch_insert_size: default_batch_insert_size(),
            },
            symbols: default_symbols(),
            coinbase: CoinbaseSettings::default(),
            binance: BinanceSettings::default(),
            backfill: BackfillSettings::default(),
            stream: StreamSettings::default(),
        }
    }

    /// Resolve a canonical symbol to its mapping.
    pub fn symbol_mapping(&self, symbol: &str) -> Option<&SymbolMapping> {
        self.symbols
            .iter()
            .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
    }
}
