//! Signal-to-action decision loop
//!
//! Each cycle re-reads the live configuration from the store, derives the
//! allowlist of statistically significant coins, fetches the latest ranking
//! snapshot and the current coin, and scans the snapshot in order acting on
//! the FIRST entry that satisfies a rule: a first-match scan with early
//! exit, not a best-match selection.
//!
//! Liveness is prioritized over correctness: any failure while processing
//! one coin is logged and the scan continues; any failure of the whole cycle
//! is logged and the loop still sleeps and runs again.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::binance::BinanceClient;
use crate::config::TradingConfig;
use crate::error::log_and_continue;
use crate::execution::ExecutionEngine;
use crate::journal::Journal;
use crate::store::{CoinStatistics, LoopConfig, RangeFilter, RankingStat, StoreClient};
use crate::types::Coin;
use crate::universe::Universe;
use crate::valuation::Valuation;

/// Sleep between cycles when the store's config cannot be read
const FALLBACK_INTERVAL_MINUTES: u32 = 1;

/// What a ranking entry asks the engine to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Rating above the upper limit on a coin we do not hold: buy it,
    /// financed by selling the current coin
    Buy { target: Coin },
    /// Rating below the lower limit on the coin we hold: sell it into the
    /// quote asset
    SellCurrent,
}

/// Apply the decision rules to one ranking entry.
///
/// Entries for coins outside the allowlist never produce an action.
pub fn evaluate(
    stat: &RankingStat,
    current_coin: &str,
    allowlist: &HashSet<Coin>,
) -> Option<Action> {
    if !allowlist.contains(&stat.coin) {
        return None;
    }

    if stat.rating > stat.upper_limit && stat.coin != current_coin {
        Some(Action::Buy {
            target: stat.coin.clone(),
        })
    } else if stat.rating < stat.lower_limit && stat.coin == current_coin {
        Some(Action::SellCurrent)
    } else {
        None
    }
}

/// Coins whose externally supplied regression fit beats the significance
/// threshold, restricted to the wanted universe
pub fn allowlist(
    wanted_coins: &[Coin],
    statistics: &[CoinStatistics],
    threshold: f64,
) -> HashSet<Coin> {
    wanted_coins
        .iter()
        .filter(|coin| {
            best_fit(statistics, coin)
                .map(|row| row.change_at_3sd > threshold)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// The strongest regression row for a coin: minimal p-value
fn best_fit<'a>(statistics: &'a [CoinStatistics], coin: &str) -> Option<&'a CoinStatistics> {
    statistics
        .iter()
        .filter(|row| row.coin == coin)
        .min_by(|a, b| a.p.partial_cmp(&b.p).unwrap_or(std::cmp::Ordering::Equal))
}

/// Expected percent change for a coin, falling back to the configured
/// threshold when no statistics exist
pub fn expected_change(statistics: &[CoinStatistics], coin: &str, fallback: f64) -> f64 {
    best_fit(statistics, coin)
        .map(|row| row.change_at_3sd)
        .unwrap_or(fallback)
}

/// The long-running trading decision worker
pub struct DecisionLoop {
    client: BinanceClient,
    store: StoreClient,
    journal: Arc<Journal>,
    trading: TradingConfig,
}

impl DecisionLoop {
    pub fn new(
        client: BinanceClient,
        store: StoreClient,
        journal: Arc<Journal>,
        trading: TradingConfig,
    ) -> Self {
        DecisionLoop {
            client,
            store,
            journal,
            trading,
        }
    }

    /// Run until externally terminated. Never returns on error.
    pub async fn run(&self) {
        let mut interval_minutes = FALLBACK_INTERVAL_MINUTES;

        loop {
            info!("starting decision cycle");

            // Constants are re-read every cycle so the system can be
            // reconfigured live without a restart
            match self.store.loop_config().await {
                Ok(config) => {
                    interval_minutes = config.poll_interval_minutes.max(1);
                    if let Err(e) = self.run_cycle(&config).await {
                        error!("decision cycle failed: {}", e);
                        self.journal
                            .record_error(&format!("decision cycle failed: {}", e));
                    }
                }
                Err(e) => {
                    error!("failed to read loop config: {}", e);
                    self.journal
                        .record_error(&format!("failed to read loop config: {}", e));
                }
            }

            info!("decision cycle complete, sleeping {} minutes", interval_minutes);
            sleep(Duration::from_secs(60 * interval_minutes as u64)).await;
        }
    }

    /// One full pass: allowlist, ranking snapshot, current coin, scan.
    pub async fn run_cycle(&self, config: &LoopConfig) -> anyhow::Result<()> {
        let universe = Universe::fetch(&self.client).await?;
        let wanted = universe.wanted_coins(config.min_pairs_per_coin as usize);

        let statistics = self.store.statistics().await?;
        let allowed = allowlist(&wanted, &statistics, self.trading.significance_threshold);

        let ranking = self.store.ranking_stats(&RangeFilter::default()).await?;
        if ranking.is_empty() {
            info!("no ranking snapshot available, skipping cycle");
            return Ok(());
        }

        let valuation = Valuation::new(&self.client, &universe, &self.trading.quote_asset);
        let current_coin = valuation.current_coin().await?;
        info!(
            "current coin {}, {} ranking entries, {} allowed coins",
            current_coin,
            ranking.len(),
            allowed.len()
        );

        let engine = ExecutionEngine::new(
            &self.client,
            &universe,
            &self.journal,
            &self.trading.quote_asset,
            config.min_pairs_per_coin as usize,
        );

        for stat in &ranking {
            let action = match evaluate(stat, &current_coin, &allowed) {
                Some(action) => action,
                None => continue,
            };

            let change = expected_change(&statistics, &stat.coin, config.percent_change_threshold);

            let acted = match action {
                Action::Buy { ref target } => {
                    let reason = format!(
                        "Rating for {} is {} which is above upper limit of {}",
                        target, stat.rating, stat.upper_limit
                    );
                    info!("{}", reason);
                    self.buy(&engine, &current_coin, target, &reason, change).await
                }
                Action::SellCurrent => {
                    let reason = format!(
                        "Rating for {} is {} which is below lower limit of {}",
                        current_coin, stat.rating, stat.lower_limit
                    );
                    info!("{}", reason);
                    log_and_continue(
                        "sell into quote asset",
                        engine
                            .convert_at_market(
                                &current_coin,
                                &self.trading.quote_asset,
                                &reason,
                                change,
                            )
                            .await,
                    )
                    .is_some()
                }
            };

            // first match acts and ends the scan; a failed attempt moves on
            // to the next entry
            if acted {
                break;
            }
        }

        Ok(())
    }

    /// Direct-pair buy with the two-hop fallback when the direct path fails
    async fn buy(
        &self,
        engine: &ExecutionEngine<'_>,
        current_coin: &str,
        target: &str,
        reason: &str,
        change: f64,
    ) -> bool {
        match engine
            .convert_at_market(current_coin, target, reason, change)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                // likely no direct symbol between the two coins; most coins
                // trade against the quote asset, so go through it
                warn!("direct conversion {} -> {} failed: {}", current_coin, target, e);
                self.journal.record_error(&format!(
                    "direct conversion {} -> {} failed: {}",
                    current_coin, target, e
                ));
                log_and_continue(
                    "two-hop conversion",
                    engine
                        .convert_via_quote(current_coin, target, reason, change)
                        .await,
                )
                .is_some()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(coin: &str, rating: f64, lower: f64, upper: f64) -> RankingStat {
        RankingStat {
            coin: coin.to_string(),
            rating,
            lower_limit: lower,
            upper_limit: upper,
            moving_average: rating,
            window_end: 0,
        }
    }

    fn allow(coins: &[&str]) -> HashSet<Coin> {
        coins.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_buy_signal_above_upper_limit() {
        let stat = stat("BTC", 1600.0, 1450.0, 1550.0);
        let action = evaluate(&stat, "ETH", &allow(&["BTC"]));
        assert_eq!(
            action,
            Some(Action::Buy {
                target: "BTC".to_string()
            })
        );
    }

    #[test]
    fn test_no_buy_of_coin_already_held() {
        let stat = stat("BTC", 1600.0, 1450.0, 1550.0);
        assert_eq!(evaluate(&stat, "BTC", &allow(&["BTC"])), None);
    }

    #[test]
    fn test_sell_signal_below_lower_limit_on_current_coin() {
        let stat = stat("BTC", 1400.0, 1450.0, 1550.0);
        assert_eq!(
            evaluate(&stat, "BTC", &allow(&["BTC"])),
            Some(Action::SellCurrent)
        );
        // the same rating on a coin we do not hold is not a signal
        assert_eq!(evaluate(&stat, "ETH", &allow(&["BTC"])), None);
    }

    #[test]
    fn test_never_acts_outside_allowlist() {
        let stat = stat("BTC", 1600.0, 1450.0, 1550.0);
        assert_eq!(evaluate(&stat, "ETH", &allow(&["ETH"])), None);
        assert_eq!(evaluate(&stat, "ETH", &HashSet::new()), None);
    }

    #[test]
    fn test_rating_inside_band_is_no_action() {
        let stat = stat("BTC", 1500.0, 1450.0, 1550.0);
        assert_eq!(evaluate(&stat, "ETH", &allow(&["BTC"])), None);
    }

    fn stats_row(coin: &str, p: f64, change: f64) -> CoinStatistics {
        CoinStatistics {
            coin: coin.to_string(),
            minutes_forward: 5,
            p,
            change_at_3sd: change,
            datapoints: 2000,
        }
    }

    #[test]
    fn test_allowlist_filters_on_fit() {
        let wanted = vec!["BTC".to_string(), "ETH".to_string(), "XRP".to_string()];
        let statistics = vec![
            stats_row("BTC", 0.01, 0.5),
            stats_row("ETH", 0.02, 0.05),
            // no XRP statistics at all
        ];
        let allowed = allowlist(&wanted, &statistics, 0.1);
        assert!(allowed.contains("BTC"));
        assert!(!allowed.contains("ETH"));
        assert!(!allowed.contains("XRP"));
    }

    #[test]
    fn test_expected_change_prefers_strongest_fit() {
        let statistics = vec![stats_row("BTC", 0.04, 1.0), stats_row("BTC", 0.01, 2.5)];
        assert_eq!(expected_change(&statistics, "BTC", 9.9), 2.5);
        assert_eq!(expected_change(&statistics, "ETH", 9.9), 9.9);
    }

    #[test]
    fn test_first_match_scan_order() {
        let ranking = vec![
            stat("ADA", 1500.0, 1450.0, 1550.0),
            stat("BTC", 1600.0, 1450.0, 1550.0),
            stat("ETH", 1700.0, 1450.0, 1550.0),
        ];
        let allowed = allow(&["ADA", "BTC", "ETH"]);

        // first entry satisfying a rule wins, even when a later entry is
        // further above its limit
        let first = ranking
            .iter()
            .find_map(|s| evaluate(s, "USDT", &allowed))
            .unwrap();
        assert_eq!(
            first,
            Action::Buy {
                target: "BTC".to_string()
            }
        );
    }
}
