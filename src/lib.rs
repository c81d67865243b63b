//! Elo Trader
//!
//! An automated basket-trading system for Binance spot markets. Coin
//! popularity is tracked as an Elo-style rating by an external producer;
//! this crate consumes those rankings from a persisted store, keeps the
//! whole portfolio in whichever coin currently ranks strongest, and feeds
//! the producer with trade-volume and price data.
//!
//! Three long-running workers share no memory and coordinate only through
//! the store:
//! - **trade**: the decision loop that converts holdings between coins
//! - **rank**: trade-volume imbalance ingestion for the ranking producer
//! - **price**: quote-asset price snapshots for charting and analysis
//!
//! ## Example (Market Data)
//! ```no_run
//! use std::sync::Arc;
//! use elo_trader::binance::BinanceClient;
//! use elo_trader::journal::Journal;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let journal = Arc::new(Journal::open("logs")?);
//!     let client = BinanceClient::new("api_key", "api_secret", journal);
//!     let ticker = client.latest_price("BTCUSDT").await?;
//!     println!("Price: {}", ticker.price());
//!     Ok(())
//! }
//! ```

pub mod binance;
pub mod config;
pub mod decision;
pub mod error;
pub mod execution;
pub mod ingest;
pub mod journal;
pub mod store;
pub mod types;
pub mod universe;
pub mod valuation;

pub use config::AppConfig;
pub use error::ExchangeError;
pub use types::{round8, Coin, Holding, OrderResult, Pair};
