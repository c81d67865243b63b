//! Binance API wire types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl OrderSide {
    /// BUY <-> SELL, applied when a symbol direction is flipped
    pub fn inverted(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One symbol entry from the exchange-metadata listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "baseAsset")]
    pub base_asset: String,
    #[serde(rename = "quoteAsset")]
    pub quote_asset: String,
}

impl SymbolInfo {
    /// Exchange status value for actively tradable symbols
    pub const TRADING: &'static str = "TRADING";

    pub fn is_trading(&self) -> bool {
        self.status == Self::TRADING
    }
}

/// Exchange-metadata listing (`/api/v3/exchangeInfo`)
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

/// Free/locked balance of one asset
#[derive(Debug, Clone, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

impl AssetBalance {
    pub fn free_amount(&self) -> f64 {
        self.free.parse().unwrap_or(0.0)
    }
}

/// Account balances (`/api/v3/account`)
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
}

/// Latest ticker price (`/api/v3/ticker/price`)
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: String,
}

impl TickerPrice {
    pub fn price(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }
}

/// One aggregate trade (`/api/v3/aggTrades`)
///
/// `m` is true when the buyer was the maker, i.e. the aggressor sold.
#[derive(Debug, Clone, Deserialize)]
pub struct AggTrade {
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub time: i64,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl AggTrade {
    pub fn quantity(&self) -> f64 {
        self.quantity.parse().unwrap_or(0.0)
    }
}

/// Error body returned by the exchange on non-200 responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}
