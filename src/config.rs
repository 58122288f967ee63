use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config, File};
pub use config::ConfigError;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::grid::config::FEE_RATE;
use crate::grid::types::Market;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Strategy configuration (type, params)
    pub strategy: StrategyConfig,
    /// Traded market metadata
    pub market: Market,
    /// Paper session configuration
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Strategy type name (e.g., "grid")
    #[serde(rename = "type")]
    pub type_name: String,
    /// Strategy-specific parameters
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    /// JSON array of closed klines to replay
    #[serde(default)]
    pub klines_file: Option<PathBuf>,
    #[serde(default)]
    pub base_balance: Decimal,
    #[serde(default)]
    pub quote_balance: Decimal,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            klines_file: None,
            base_balance: Decimal::ZERO,
            quote_balance: Decimal::ZERO,
            fee_rate: default_fee_rate(),
        }
    }
}

fn default_fee_rate() -> Decimal {
    FEE_RATE
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PersistenceConfig {
    /// Directory for per-instance snapshots; in-memory when unset
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a configuration file
    pub fn new(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            // Environment variables override the file
            // e.g. APP_PAPER__QUOTE_BALANCE=5000
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
