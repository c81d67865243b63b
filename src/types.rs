//! Core domain types shared across the system

use serde::{Deserialize, Serialize};
use std::fmt;

/// An exchange asset ticker, e.g. "BTC"
pub type Coin = String;

/// An ordered (base, quote) coin tuple with canonical textual form `BASE-QUOTE`.
///
/// A pair may map to zero, one or two exchange symbols (direct and/or
/// inverted) depending on which concatenation the exchange lists as TRADING.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub base: Coin,
    pub quote: Coin,
}

impl Pair {
    pub fn new(base: impl Into<Coin>, quote: impl Into<Coin>) -> Self {
        Pair {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Parse from canonical `BASE-QUOTE` form
    pub fn parse(s: &str) -> Option<Self> {
        let (base, quote) = s.split_once('-')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Pair::new(base, quote))
    }

    /// Exchange-native symbol for the direct direction: `BASEQUOTE`
    pub fn direct_symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Exchange-native symbol for the inverted direction: `QUOTEBASE`
    pub fn inverted_symbol(&self) -> String {
        format!("{}{}", self.quote, self.base)
    }

    /// True when either leg of the pair equals `coin`
    pub fn references(&self, coin: &str) -> bool {
        self.base == coin || self.quote == coin
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// Spendable balance of a single coin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub coin: Coin,
    pub free_amount: f64,
}

/// Terminal outcome of one order submission attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub accepted: bool,
    pub exchange_code: i64,
    pub exchange_message: String,
    pub http_status: u16,
    pub http_reason: String,
}

/// Round to 8 decimal places, the exchange's quantity/price precision
pub fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_canonical_form() {
        let pair = Pair::new("BTC", "USDT");
        assert_eq!(pair.to_string(), "BTC-USDT");
        assert_eq!(Pair::parse("BTC-USDT"), Some(pair));
    }

    #[test]
    fn test_pair_parse_rejects_malformed() {
        assert_eq!(Pair::parse("BTCUSDT"), None);
        assert_eq!(Pair::parse("-USDT"), None);
        assert_eq!(Pair::parse("BTC-"), None);
    }

    #[test]
    fn test_pair_symbols_both_directions() {
        let pair = Pair::new("BTC", "USDT");
        assert_eq!(pair.direct_symbol(), "BTCUSDT");
        assert_eq!(pair.inverted_symbol(), "USDTBTC");
    }

    #[test]
    fn test_pair_references_is_leg_match() {
        let pair = Pair::new("TETH", "USDT");
        assert!(pair.references("TETH"));
        assert!(pair.references("USDT"));
        // a substring of a leg is not a reference
        assert!(!pair.references("ETH"));
    }

    #[test]
    fn test_round8() {
        assert_eq!(round8(0.123456789), 0.12345679);
        assert_eq!(round8(100.0), 100.0);
        assert_eq!(round8(99.9 * (1.0 - 2.0 / 1000.0)), 99.7002);
    }
}
