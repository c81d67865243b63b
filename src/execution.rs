//! Order execution engine
//!
//! State machine per logical order:
//! resolve direction -> compute size -> submit -> accepted, or rejected and
//! resubmitted with a reduced quantity, up to nine attempts -> terminal
//! (success or silent give-up).
//!
//! Direction resolution prefers the `held+target` symbol; when the exchange
//! lists only the other concatenation the order is "flipped": the side is
//! inverted and the quantity semantics change from holdings expressed in
//! quote terms (holdings x price) to the raw held amount. Every attempt is
//! appended to the durable trade journal and every rejection to the error
//! journal; an exhausted retry loop surfaces as [`Outcome::GaveUp`], never
//! as an error.

use chrono::Local;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::binance::{BinanceClient, OrderSide};
use crate::error::ExchangeError;
use crate::journal::{Journal, TradeRecord};
use crate::types::{round8, OrderResult};
use crate::universe::Universe;
use crate::valuation::Valuation;

/// Maximum submissions of one logical order before giving up
const MAX_SUBMIT_ATTEMPTS: u32 = 9;

/// Delay after an accepted conversion before acting on its proceeds
const SETTLE_DELAY_SECS: u64 = 20;

/// Stop price offset of the protective stop, as a fraction of the fill price
const PROTECTIVE_STOP_OFFSET: f64 = 0.02;

/// Order type with the parameters each variant requires
#[derive(Debug, Clone, PartialEq)]
pub enum OrderSpec {
    /// Execute at market; the request carries no price
    Market,
    /// Rest at a price; requires a time-in-force
    Limit { time_in_force: String },
    /// Trigger at a stop price, which must be positive
    Stop { stop_price: f64 },
}

impl OrderSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            OrderSpec::Market => "MARKET",
            OrderSpec::Limit { .. } => "LIMIT",
            OrderSpec::Stop { .. } => "STOP_LOSS",
        }
    }

    /// Reject malformed orders before any network call
    pub fn validate(&self) -> Result<(), ExchangeError> {
        match self {
            OrderSpec::Market => Ok(()),
            OrderSpec::Limit { time_in_force } => {
                if time_in_force.is_empty() {
                    Err(ExchangeError::Validation(
                        "LIMIT order requires a time-in-force".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            OrderSpec::Stop { stop_price } => {
                if *stop_price > 0.0 {
                    Ok(())
                } else {
                    Err(ExchangeError::Validation(
                        "stopPrice must be greater than 0".to_string(),
                    ))
                }
            }
        }
    }
}

/// A resolved trade direction
#[derive(Debug, Clone, PartialEq)]
pub struct Direction {
    pub symbol: String,
    pub side: OrderSide,
    /// The symbol is the inverse of the requested (held, target) order;
    /// quantity is sized as the raw held amount instead of held x price
    pub flipped: bool,
}

/// Resolve the symbol and side for converting `held` into `target`.
///
/// Both concatenation orders are attempted because the exchange lists only
/// one direction per pair.
pub fn resolve_direction(
    universe: &Universe,
    held: &str,
    target: &str,
) -> Result<Direction, ExchangeError> {
    let direct = format!("{}{}", held, target);
    if universe.is_tradable(&direct) {
        return Ok(Direction {
            symbol: direct,
            side: OrderSide::Sell,
            flipped: false,
        });
    }

    let flipped = format!("{}{}", target, held);
    if universe.is_tradable(&flipped) {
        return Ok(Direction {
            symbol: flipped,
            side: OrderSide::Buy,
            flipped: true,
        });
    }

    Err(ExchangeError::NoTradableSymbol {
        held: held.to_string(),
        target: target.to_string(),
    })
}

/// Quantity after one more rejection: reduced by `attempt/1000`
pub fn reduced_quantity(quantity: f64, attempt: u32) -> f64 {
    round8(quantity * (1.0 - attempt as f64 / 1000.0))
}

/// Terminal state of one logical order
#[derive(Debug, Clone)]
pub enum Outcome {
    Accepted(OrderResult),
    /// Retry budget exhausted; nothing propagates upward, the journals
    /// carry the full attempt history
    GaveUp,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }
}

/// Order execution engine over the gateway, a universe snapshot, and the
/// account's holdings
pub struct ExecutionEngine<'a> {
    client: &'a BinanceClient,
    universe: &'a Universe,
    journal: &'a Journal,
    quote_asset: &'a str,
    /// Liquidity limit bounding the wanted universe, from the cycle's
    /// live config
    pair_limit: usize,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(
        client: &'a BinanceClient,
        universe: &'a Universe,
        journal: &'a Journal,
        quote_asset: &'a str,
        pair_limit: usize,
    ) -> Self {
        ExecutionEngine {
            client,
            universe,
            journal,
            quote_asset,
            pair_limit,
        }
    }

    fn valuation(&self) -> Valuation<'a> {
        Valuation::new(self.client, self.universe, self.quote_asset)
    }

    /// Convert the entire spendable holding of `held` into `target` at
    /// market, then place a protective stop on the proceeds.
    ///
    /// This is the direct path: it fails with
    /// [`ExchangeError::NoTradableSymbol`] when the exchange lists neither
    /// concatenation of the two coins; callers fall back to
    /// [`Self::convert_via_quote`].
    pub async fn convert_at_market(
        &self,
        held: &str,
        target: &str,
        reason: &str,
        expected_change: f64,
    ) -> Result<Outcome, ExchangeError> {
        self.cancel_open_orders().await;

        let direction = resolve_direction(self.universe, held, target)?;
        let holdings = self.valuation().holdings(held).await?;
        let price = round8(self.client.latest_price(&direction.symbol).await?.price());
        let quantity = sized_quantity(holdings, price, direction.flipped);

        info!(
            "converting {} -> {} via {} ({}), holdings {}, price {}, qty {}",
            held, target, direction.symbol, direction.side, holdings, price, quantity
        );

        let outcome = self
            .place_order(
                &direction.symbol,
                direction.side,
                OrderSpec::Market,
                quantity,
                price,
                holdings,
                reason,
            )
            .await?;

        if outcome.is_accepted() && target != self.quote_asset {
            sleep(Duration::from_secs(SETTLE_DELAY_SECS)).await;
            if let Err(e) = self.protective_stop(target, price, expected_change).await {
                warn!("protective stop for {} not placed: {}", target, e);
                self.journal
                    .record_error(&format!("protective stop for {} not placed: {}", target, e));
            }
        }

        Ok(outcome)
    }

    /// Two-hop fallback: liquidate `held` into the quote asset, then buy
    /// `target` from the quote asset.
    ///
    /// There is no compensating action when only the first hop succeeds;
    /// the account is then left in the quote asset until a later cycle.
    pub async fn convert_via_quote(
        &self,
        held: &str,
        target: &str,
        reason: &str,
        expected_change: f64,
    ) -> Result<Outcome, ExchangeError> {
        self.convert_at_market(held, self.quote_asset, reason, expected_change)
            .await?;
        sleep(Duration::from_secs(SETTLE_DELAY_SECS)).await;
        self.convert_at_market(self.quote_asset, target, reason, expected_change)
            .await
    }

    /// Submit one logical order, retrying rejections with a reduced
    /// quantity.
    ///
    /// The client order id is generated once for the logical order and kept
    /// across attempts. Gateway-level failures (transport, rate-limit budget
    /// exhausted) propagate; exchange rejections trigger the back-off and,
    /// after the attempt budget, a silent [`Outcome::GaveUp`].
    #[allow(clippy::too_many_arguments)]
    pub async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        spec: OrderSpec,
        quantity: f64,
        price: f64,
        holdings: f64,
        reason: &str,
    ) -> Result<Outcome, ExchangeError> {
        spec.validate()?;

        let client_order_id = next_client_order_id();
        let mut quantity = round8(quantity);

        for attempt in 1..=MAX_SUBMIT_ATTEMPTS {
            self.journal.record_trade(&TradeRecord {
                timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                symbol: symbol.to_string(),
                side: side.to_string(),
                order_type: spec.type_name().to_string(),
                holdings,
                quantity,
                price,
                reason: reason.to_string(),
            });

            let params = order_params(symbol, side, &spec, quantity, price, &client_order_id);
            let result = self.client.submit_order("/api/v3/order", params).await?;

            if result.accepted {
                info!("order accepted: {} {} qty {}", side, symbol, quantity);
                return Ok(Outcome::Accepted(result));
            }

            warn!(
                "order rejected (attempt {}/{}): {} {} qty {} -> code {} {}",
                attempt,
                MAX_SUBMIT_ATTEMPTS,
                side,
                symbol,
                quantity,
                result.exchange_code,
                result.exchange_message
            );
            self.journal.record_order_error(&result);
            quantity = reduced_quantity(quantity, attempt);
        }

        Ok(Outcome::GaveUp)
    }

    /// Dry-run variant: one submission to the non-executing validation
    /// endpoint, no retry loop.
    #[allow(clippy::too_many_arguments)]
    pub async fn place_order_test(
        &self,
        symbol: &str,
        side: OrderSide,
        spec: OrderSpec,
        quantity: f64,
        price: f64,
        holdings: f64,
        reason: &str,
    ) -> Result<OrderResult, ExchangeError> {
        spec.validate()?;

        let client_order_id = next_client_order_id();
        let quantity = round8(quantity);

        self.journal.record_trade(&TradeRecord {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            symbol: symbol.to_string(),
            side: side.to_string(),
            order_type: spec.type_name().to_string(),
            holdings,
            quantity,
            price,
            reason: reason.to_string(),
        });

        let params = order_params(symbol, side, &spec, quantity, price, &client_order_id);
        let result = self.client.submit_order("/api/v3/order/test", params).await?;
        if !result.accepted {
            self.journal.record_order_error(&result);
        }
        Ok(result)
    }

    /// Place a stop sell of `coin` against the quote asset at the price the
    /// external statistics expect it to reach.
    async fn protective_stop(
        &self,
        coin: &str,
        fill_price: f64,
        expected_change: f64,
    ) -> Result<Outcome, ExchangeError> {
        let direction = resolve_direction(self.universe, coin, self.quote_asset)?;
        let holdings = self.valuation().holdings(coin).await?;
        let stop_price = round8(fill_price * (1.0 - PROTECTIVE_STOP_OFFSET));

        // A flipped stop buys the quote symbol back below the expected move
        // instead of selling above it
        let target_price = if direction.flipped {
            round8(fill_price * (1.0 - expected_change / 100.0))
        } else {
            round8(fill_price * (1.0 + expected_change / 100.0))
        };
        let quantity = sized_quantity(holdings, target_price, direction.flipped);
        let reason = format!(
            "Protective stop for {} at expected price {}",
            direction.symbol, target_price
        );

        self.place_order(
            &direction.symbol,
            direction.side,
            OrderSpec::Stop { stop_price },
            quantity,
            target_price,
            holdings,
            &reason,
        )
        .await
    }

    /// Cancel resting orders on every wanted symbol before converting.
    /// Failures are logged per symbol and do not block the conversion.
    async fn cancel_open_orders(&self) {
        for symbol in sweep_symbols(self.universe, self.pair_limit) {
            if let Err(e) = self.client.cancel_open_orders(&symbol).await {
                if !matches!(&e, ExchangeError::Api { code, .. } if *code == -2011) {
                    warn!("failed to cancel open orders on {}: {}", symbol, e);
                }
            }
        }
    }
}

/// Symbols swept for resting orders before a conversion: the wanted
/// universe at the configured liquidity limit, never the whole exchange
fn sweep_symbols(universe: &Universe, pair_limit: usize) -> Vec<String> {
    let counts = universe.pairs_per_coin();
    universe
        .wanted_pairs(&counts, pair_limit)
        .into_iter()
        .map(|pair| pair.direct_symbol())
        .collect()
}

/// Unflipped orders size in quote terms (holdings x price); flipped orders
/// size as the raw held amount
pub fn sized_quantity(holdings: f64, price: f64, flipped: bool) -> f64 {
    if flipped {
        round8(holdings)
    } else {
        round8(holdings * price)
    }
}

fn next_client_order_id() -> String {
    format!("elo-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn order_params(
    symbol: &str,
    side: OrderSide,
    spec: &OrderSpec,
    quantity: f64,
    price: f64,
    client_order_id: &str,
) -> Vec<(String, String)> {
    let mut params = vec![
        ("symbol".to_string(), symbol.to_string()),
        ("side".to_string(), side.as_str().to_string()),
        ("type".to_string(), spec.type_name().to_string()),
        ("quantity".to_string(), quantity.to_string()),
        ("newClientOrderId".to_string(), client_order_id.to_string()),
    ];

    match spec {
        // market orders omit the price entirely
        OrderSpec::Market => {}
        OrderSpec::Limit { time_in_force } => {
            params.push(("price".to_string(), price.to_string()));
            params.push(("timeInForce".to_string(), time_in_force.clone()));
        }
        OrderSpec::Stop { stop_price } => {
            params.push(("price".to_string(), price.to_string()));
            params.push(("stopPrice".to_string(), stop_price.to_string()));
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binance::SymbolInfo;
    use approx::assert_relative_eq;

    fn universe(symbols: &[(&str, &str, &str)]) -> Universe {
        let infos: Vec<SymbolInfo> = symbols
            .iter()
            .map(|(symbol, base, quote)| SymbolInfo {
                symbol: symbol.to_string(),
                status: "TRADING".to_string(),
                base_asset: base.to_string(),
                quote_asset: quote.to_string(),
            })
            .collect();
        Universe::from_symbol_infos(&infos)
    }

    #[test]
    fn test_resolve_direct_direction() {
        let universe = universe(&[("BTCUSDT", "BTC", "USDT")]);
        let direction = resolve_direction(&universe, "BTC", "USDT").unwrap();
        assert_eq!(direction.symbol, "BTCUSDT");
        assert_eq!(direction.side, OrderSide::Sell);
        assert!(!direction.flipped);
    }

    #[test]
    fn test_resolve_flipped_direction_inverts_side() {
        let universe = universe(&[("BTCUSDT", "BTC", "USDT")]);
        let direction = resolve_direction(&universe, "USDT", "BTC").unwrap();
        assert_eq!(direction.symbol, "BTCUSDT");
        assert_eq!(direction.side, OrderSide::Buy);
        assert!(direction.flipped);
    }

    #[test]
    fn test_resolve_direction_neither_listed() {
        let universe = universe(&[("BTCUSDT", "BTC", "USDT")]);
        let err = resolve_direction(&universe, "XRP", "ADA").unwrap_err();
        assert!(matches!(err, ExchangeError::NoTradableSymbol { .. }));
    }

    #[test]
    fn test_sized_quantity_semantics() {
        // unflipped: holdings expressed in quote terms
        assert_relative_eq!(sized_quantity(2.0, 150.0, false), 300.0);
        // flipped: the raw held amount
        assert_relative_eq!(sized_quantity(2.0, 150.0, true), 2.0);
    }

    #[test]
    fn test_reduced_quantity_sequence() {
        let mut quantity = 100.0;
        quantity = reduced_quantity(quantity, 1);
        assert_relative_eq!(quantity, 99.9);
        quantity = reduced_quantity(quantity, 2);
        assert_relative_eq!(quantity, 99.7002);
        quantity = reduced_quantity(quantity, 3);
        assert_relative_eq!(quantity, 99.4010994);
    }

    #[test]
    fn test_reduced_quantity_never_negative() {
        let mut quantity = 0.00000001;
        for attempt in 1..=MAX_SUBMIT_ATTEMPTS {
            quantity = reduced_quantity(quantity, attempt);
            assert!(quantity >= 0.0);
        }
    }

    #[test]
    fn test_cancel_sweep_bounded_by_pair_limit() {
        let universe = universe(&[
            ("BTCUSDT", "BTC", "USDT"),
            ("ETHUSDT", "ETH", "USDT"),
            ("BTCETH", "BTC", "ETH"),
            ("XRPBTC", "XRP", "BTC"),
            ("ADAXRP", "ADA", "XRP"),
        ]);

        // at the configured limit the sweep stays inside the wanted
        // universe; ADA has a single pair and its symbol is not touched
        let swept = sweep_symbols(&universe, 2);
        assert_eq!(swept.len(), 4);
        assert!(swept.iter().any(|s| s == "BTCUSDT"));
        assert!(swept.iter().any(|s| s == "XRPBTC"));
        assert!(!swept.iter().any(|s| s == "ADAXRP"));

        // a limit of 1 would cover every live symbol on the exchange
        assert_eq!(sweep_symbols(&universe, 1).len(), 5);
    }

    #[test]
    fn test_stop_without_stop_price_fails_validation() {
        assert!(OrderSpec::Stop { stop_price: 0.0 }.validate().is_err());
        assert!(OrderSpec::Stop { stop_price: -1.0 }.validate().is_err());
        assert!(OrderSpec::Stop { stop_price: 0.5 }.validate().is_ok());
    }

    #[test]
    fn test_limit_requires_time_in_force() {
        assert!(OrderSpec::Limit {
            time_in_force: String::new()
        }
        .validate()
        .is_err());
        assert!(OrderSpec::Limit {
            time_in_force: "GTC".to_string()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_market_order_omits_price() {
        let params = order_params("BTCUSDT", OrderSide::Sell, &OrderSpec::Market, 1.0, 9.0, "id");
        assert!(!params.iter().any(|(k, _)| k == "price"));
        assert!(params.iter().any(|(k, v)| k == "type" && v == "MARKET"));
    }

    #[test]
    fn test_limit_order_carries_time_in_force() {
        let spec = OrderSpec::Limit {
            time_in_force: "GTC".to_string(),
        };
        let params = order_params("BTCUSDT", OrderSide::Buy, &spec, 1.0, 9.0, "id");
        assert!(params.iter().any(|(k, v)| k == "timeInForce" && v == "GTC"));
        assert!(params.iter().any(|(k, v)| k == "price" && v == "9"));
    }

    #[test]
    fn test_stop_order_carries_stop_price() {
        let spec = OrderSpec::Stop { stop_price: 8.5 };
        let params = order_params("BTCUSDT", OrderSide::Sell, &spec, 1.0, 9.0, "id");
        assert!(params.iter().any(|(k, v)| k == "stopPrice" && v == "8.5"));
        assert!(params.iter().any(|(k, v)| k == "type" && v == "STOP_LOSS"));
    }
}
