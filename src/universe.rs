//! Tradable-universe selection
//!
//! The universe is derived from the exchange-metadata listing: only symbols
//! whose status is TRADING count. A coin is "wanted" when it appears in at
//! least `min_pairs_per_coin` distinct pairs, a liquidity/connectivity
//! filter that makes the downstream ranking statistically reliable. Wanted
//! pairs are the cross-product of wanted coins, filtered to combinations the
//! exchange actually lists (not merely string-constructed).

use itertools::Itertools;
use std::collections::{BTreeMap, HashSet};

use crate::binance::{BinanceClient, SymbolInfo};
use crate::error::ExchangeError;
use crate::types::{Coin, Pair};

/// A snapshot of the exchange's live TRADING pairs and symbols
#[derive(Debug, Clone)]
pub struct Universe {
    pairs: Vec<Pair>,
    symbols: HashSet<String>,
}

impl Universe {
    /// Fetch the current universe from the exchange
    pub async fn fetch(client: &BinanceClient) -> Result<Self, ExchangeError> {
        let info = client.exchange_info().await?;
        Ok(Self::from_symbol_infos(&info.symbols))
    }

    /// Build from an exchange-metadata listing, keeping TRADING symbols only
    pub fn from_symbol_infos(infos: &[SymbolInfo]) -> Self {
        let mut pairs = Vec::new();
        let mut symbols = HashSet::new();

        for info in infos {
            if info.is_trading() {
                pairs.push(Pair::new(&info.base_asset, &info.quote_asset));
                symbols.insert(info.symbol.clone());
            }
        }

        Universe { pairs, symbols }
    }

    /// Canonical `BASE-QUOTE` strings of all live pairs
    pub fn list_pairs(&self) -> Vec<String> {
        self.pairs.iter().map(Pair::to_string).collect()
    }

    /// The exchange's live TRADING symbol set
    pub fn symbols(&self) -> &HashSet<String> {
        &self.symbols
    }

    /// True when the exchange lists `symbol` as TRADING
    pub fn is_tradable(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// For every coin appearing as either leg of any pair, the number of
    /// distinct pairs referencing it. More pairs means a more reliable
    /// ranking for the coin.
    pub fn pairs_per_coin(&self) -> BTreeMap<Coin, usize> {
        let mut counts: BTreeMap<Coin, usize> = BTreeMap::new();
        let distinct: HashSet<&Pair> = self.pairs.iter().collect();

        for pair in distinct {
            *counts.entry(pair.base.clone()).or_default() += 1;
            *counts.entry(pair.quote.clone()).or_default() += 1;
        }

        counts
    }

    /// Coins whose pair count meets the liquidity limit
    pub fn wanted_coins(&self, limit: usize) -> Vec<Coin> {
        self.pairs_per_coin()
            .into_iter()
            .filter(|(_, count)| *count >= limit)
            .map(|(coin, _)| coin)
            .collect()
    }

    /// The cross-product of wanted coins, filtered to combinations that
    /// exist as live symbols on the exchange
    pub fn wanted_pairs(&self, pairs_per_coin: &BTreeMap<Coin, usize>, limit: usize) -> Vec<Pair> {
        let wanted: Vec<&Coin> = pairs_per_coin
            .iter()
            .filter(|(_, count)| **count >= limit)
            .map(|(coin, _)| coin)
            .collect();

        wanted
            .iter()
            .cartesian_product(wanted.iter())
            .map(|(a, b)| Pair::new(a.as_str(), b.as_str()))
            .filter(|pair| self.is_tradable(&pair.direct_symbol()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(symbol: &str, status: &str, base: &str, quote: &str) -> SymbolInfo {
        SymbolInfo {
            symbol: symbol.to_string(),
            status: status.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
        }
    }

    fn sample_universe() -> Universe {
        Universe::from_symbol_infos(&[
            info("BTCUSDT", "TRADING", "BTC", "USDT"),
            info("ETHUSDT", "TRADING", "ETH", "USDT"),
            info("XRPBTC", "BREAK", "XRP", "BTC"),
        ])
    }

    #[test]
    fn test_list_pairs_excludes_non_trading() {
        let universe = sample_universe();
        assert_eq!(universe.list_pairs(), vec!["BTC-USDT", "ETH-USDT"]);
        assert!(!universe.is_tradable("XRPBTC"));
    }

    #[test]
    fn test_pairs_per_coin_counts_legs() {
        let universe = Universe::from_symbol_infos(&[
            info("BTCUSDT", "TRADING", "BTC", "USDT"),
            info("ETHUSDT", "TRADING", "ETH", "USDT"),
            info("BTCETH", "TRADING", "BTC", "ETH"),
        ]);
        let counts = universe.pairs_per_coin();
        assert_eq!(counts["BTC"], 2);
        assert_eq!(counts["USDT"], 2);
        assert_eq!(counts["ETH"], 2);
    }

    #[test]
    fn test_wanted_pairs_cross_product_filtered_to_live_symbols() {
        let universe = Universe::from_symbol_infos(&[
            info("BTCUSDT", "TRADING", "BTC", "USDT"),
            info("ETHUSDT", "TRADING", "ETH", "USDT"),
            info("BTCETH", "TRADING", "BTC", "ETH"),
        ]);
        let counts = universe.pairs_per_coin();
        let wanted = universe.wanted_coins(2);
        assert_eq!(wanted, vec!["BTC", "ETH", "USDT"]);

        let pairs = universe.wanted_pairs(&counts, 2);
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&Pair::new("BTC", "USDT")));
        assert!(pairs.contains(&Pair::new("ETH", "USDT")));
        assert!(pairs.contains(&Pair::new("BTC", "ETH")));
        // ETH-BTC is not listed, only BTC-ETH is
        assert!(!pairs.contains(&Pair::new("ETH", "BTC")));
    }

    #[test]
    fn test_selection_is_idempotent() {
        let universe = sample_universe();
        let counts = universe.pairs_per_coin();
        assert_eq!(universe.wanted_coins(2), universe.wanted_coins(2));
        assert_eq!(
            universe.wanted_pairs(&counts, 2),
            universe.wanted_pairs(&counts, 2)
        );
    }

    #[test]
    fn test_substring_coin_not_overcounted() {
        // "ETH" must not pick up pairs belonging to "TETH"
        let universe = Universe::from_symbol_infos(&[
            info("TETHUSDT", "TRADING", "TETH", "USDT"),
            info("ETHBTC", "TRADING", "ETH", "BTC"),
        ]);
        let counts = universe.pairs_per_coin();
        assert_eq!(counts["ETH"], 1);
        assert_eq!(counts["TETH"], 1);
    }
}
