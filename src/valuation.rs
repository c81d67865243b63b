//! Holdings valuation in quote-asset terms
//!
//! Every non-quote balance is converted by looking up the direct pair price,
//! or the inverted pair's price with the rate inverted; balances with
//! neither direction tradable value at 0. The "current coin" is the holding
//! with maximal converted value, ties resolved by the natural ordering over
//! (value, coin).

use tracing::warn;

use crate::binance::BinanceClient;
use crate::error::ExchangeError;
use crate::types::{round8, Coin, Holding};
use crate::universe::Universe;

/// Convert a free balance into quote-asset terms.
///
/// `direct_price` is the last-trade price of `COIN+QUOTE`, `inverted_price`
/// of `QUOTE+COIN`; pass `None` for a direction the exchange does not list.
pub fn value_in_quote(free: f64, direct_price: Option<f64>, inverted_price: Option<f64>) -> f64 {
    match (direct_price, inverted_price) {
        (Some(price), _) => round8(price) * free,
        (None, Some(price)) if price != 0.0 => round8(1.0 / price) * free,
        _ => 0.0,
    }
}

/// The maximal element of (value, coin) tuples, compared lexicographically
pub fn pick_current(values: &[(Coin, f64)]) -> Option<Coin> {
    values
        .iter()
        .max_by(|(coin_a, value_a), (coin_b, value_b)| {
            value_a
                .partial_cmp(value_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| coin_a.cmp(coin_b))
        })
        .map(|(coin, _)| coin.clone())
}

/// Account valuation backed by the gateway and a universe snapshot
pub struct Valuation<'a> {
    client: &'a BinanceClient,
    universe: &'a Universe,
    quote_asset: &'a str,
}

impl<'a> Valuation<'a> {
    pub fn new(client: &'a BinanceClient, universe: &'a Universe, quote_asset: &'a str) -> Self {
        Valuation {
            client,
            universe,
            quote_asset,
        }
    }

    /// Free amount of one coin, 0 when the account holds none of it
    pub async fn holdings(&self, coin: &str) -> Result<f64, ExchangeError> {
        let account = self.client.account_info().await?;
        Ok(account
            .balances
            .iter()
            .find(|balance| balance.asset == coin)
            .map(|balance| round8(balance.free_amount()))
            .unwrap_or(0.0))
    }

    /// Every balance converted to quote-asset terms
    pub async fn valued_holdings(&self) -> Result<Vec<(Coin, f64)>, ExchangeError> {
        let account = self.client.account_info().await?;
        let mut values = Vec::with_capacity(account.balances.len());

        for balance in &account.balances {
            let holding = Holding {
                coin: balance.asset.clone(),
                free_amount: round8(balance.free_amount()),
            };
            let value = self.convert(&holding).await;
            values.push((holding.coin, value));
        }

        Ok(values)
    }

    /// Total account value in quote-asset terms
    pub async fn total_value(&self) -> Result<f64, ExchangeError> {
        Ok(self.valued_holdings().await?.iter().map(|(_, v)| v).sum())
    }

    /// The coin with maximal converted value
    pub async fn current_coin(&self) -> Result<Coin, ExchangeError> {
        let values = self.valued_holdings().await?;
        pick_current(&values).ok_or_else(|| ExchangeError::Payload {
            path: "/api/v3/account".to_string(),
            detail: "account has no balances".to_string(),
        })
    }

    async fn convert(&self, holding: &Holding) -> f64 {
        if holding.coin == self.quote_asset {
            return holding.free_amount;
        }

        let direct = format!("{}{}", holding.coin, self.quote_asset);
        let inverted = format!("{}{}", self.quote_asset, holding.coin);

        let direct_price = if self.universe.is_tradable(&direct) {
            self.fetch_price(&direct).await
        } else {
            None
        };
        let inverted_price = if direct_price.is_none() && self.universe.is_tradable(&inverted) {
            self.fetch_price(&inverted).await
        } else {
            None
        };

        value_in_quote(holding.free_amount, direct_price, inverted_price)
    }

    async fn fetch_price(&self, symbol: &str) -> Option<f64> {
        match self.client.latest_price(symbol).await {
            Ok(ticker) => Some(ticker.price()),
            Err(e) => {
                warn!("failed to price {}: {}", symbol, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_value_direct_pair() {
        assert_relative_eq!(value_in_quote(2.0, Some(100.0), None), 200.0);
    }

    #[test]
    fn test_value_inverted_pair_inverts_rate() {
        // 4 units held, quote trades at 0.25 per unit of the held coin
        assert_relative_eq!(value_in_quote(4.0, None, Some(0.25)), 16.0);
    }

    #[test]
    fn test_value_untradable_is_zero() {
        assert_eq!(value_in_quote(10.0, None, None), 0.0);
        assert_eq!(value_in_quote(10.0, None, Some(0.0)), 0.0);
    }

    #[test]
    fn test_pick_current_max_value() {
        let values = vec![
            ("BTC".to_string(), 350.0),
            ("ETH".to_string(), 900.0),
            ("USDT".to_string(), 12.5),
        ];
        assert_eq!(pick_current(&values), Some("ETH".to_string()));
    }

    #[test]
    fn test_pick_current_tie_breaks_on_coin() {
        let values = vec![
            ("ADA".to_string(), 100.0),
            ("XRP".to_string(), 100.0),
        ];
        assert_eq!(pick_current(&values), Some("XRP".to_string()));
    }

    #[test]
    fn test_pick_current_nonzero_wins_over_unpriceable() {
        let values = vec![
            ("OBSCURE".to_string(), 0.0),
            ("BTC".to_string(), 0.001),
        ];
        assert_eq!(pick_current(&values), Some("BTC".to_string()));
    }

    #[test]
    fn test_pick_current_empty() {
        assert_eq!(pick_current(&[]), None);
    }
}
