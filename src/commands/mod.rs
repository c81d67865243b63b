//! Command implementations for the CLI binary
//!
//! Each command wires the exchange gateway, store client, and journal from
//! one loaded configuration, then drives its worker until Ctrl+C.

pub mod all;
pub mod price;
pub mod rank;
pub mod trade;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use elo_trader::binance::BinanceClient;
use elo_trader::config::AppConfig;
use elo_trader::journal::Journal;
use elo_trader::store::StoreClient;

/// Load configuration from a file if given, else from the environment
pub(crate) fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    match config_path {
        Some(path) => AppConfig::from_file(path)
            .context(format!("Failed to load config from {}", path)),
        None => Ok(AppConfig::from_env()),
    }
}

/// Shared wiring for every worker
pub(crate) struct Services {
    pub client: BinanceClient,
    pub store: StoreClient,
    pub journal: Arc<Journal>,
}

pub(crate) fn build_services(config: &AppConfig) -> Result<Services> {
    let journal = Arc::new(
        Journal::open(&config.trading.journal_dir).context("Failed to open journal directory")?,
    );
    let api_key = config.exchange.api_key.clone().unwrap_or_default();
    let api_secret = config.exchange.api_secret.clone().unwrap_or_default();
    let client = BinanceClient::with_config(api_key, api_secret, Arc::clone(&journal), &config.exchange);
    let store = StoreClient::new(config.store.base_url());

    Ok(Services {
        client,
        store,
        journal,
    })
}

pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

/// Drive a worker future until Ctrl+C
pub(crate) async fn run_until_shutdown<F>(name: &str, worker: F) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    info!("{} worker started", name);

    tokio::select! {
        _ = worker => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Error setting up signal handler")?;
            info!("Received Ctrl+C, shutting down {} worker", name);
        }
    }

    Ok(())
}
