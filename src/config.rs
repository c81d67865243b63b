//! Process-start configuration
//!
//! Credentials and endpoints are fixed at process start; trading thresholds
//! and cadence live in the persisted store and are re-read every cycle (see
//! [`crate::store::LoopConfig`]), so nothing here needs a restart to change
//! except keys and hosts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub trading: TradingConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file, then override secrets and hosts
    /// from the environment (`BINANCE_KEY`, `BINANCE_SECRET`, `HOST`, `PORT`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: AppConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        Ok(config)
    }

    /// Build a configuration purely from environment variables
    pub fn from_env() -> Self {
        let mut config = AppConfig::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(api_key) = std::env::var("BINANCE_KEY") {
            self.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BINANCE_SECRET") {
            self.exchange.api_secret = Some(api_secret);
        }
        if let Ok(host) = std::env::var("HOST") {
            self.store.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.store.port = port;
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            exchange: ExchangeConfig::default(),
            store: StoreConfig::default(),
            trading: TradingConfig::default(),
        }
    }
}

/// Exchange connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Total attempts per call, shared between the rate-limit sleep path and
    /// the transport retry path
    pub try_counts: u32,
    /// recvWindow parameter bounding acceptable clock skew, milliseconds
    pub recv_window: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            api_key: None,
            api_secret: None,
            timeout_secs: 60,
            try_counts: 3,
            recv_window: 5000,
        }
    }
}

/// Persisted-store (reporting proxy) connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
}

impl StoreConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Trading defaults fixed at process start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Stable reference asset used to value all holdings
    pub quote_asset: String,
    /// Minimum regression fit for a coin to enter the allowlist
    pub significance_threshold: f64,
    /// Directory holding the trade and error journals
    pub journal_dir: String,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            quote_asset: "USDT".to_string(),
            significance_threshold: 0.1,
            journal_dir: "logs".to_string(),
        }
    }
}
