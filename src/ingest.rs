//! Ranking and price ingestion workers
//!
//! Two of the three long-running workers. They share no memory with the
//! decision loop; everything flows through the persisted store. Each cycle
//! re-reads the store's live configuration, derives the wanted-pair universe
//! fresh, ingests one window of data, and sleeps the configured interval.
//!
//! The ranking worker posts per-pair trade-volume imbalances (`VolumeDiff`
//! rows); turning those into ratings and band limits is the external
//! producer's job. The price worker posts quote-asset price snapshots
//! (`Price` rows) for the same universe.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::binance::{AggTrade, BinanceClient};
use crate::config::TradingConfig;
use crate::journal::Journal;
use crate::store::{PriceRow, StoreClient, VolumeDiffRow};
use crate::types::Pair;
use crate::universe::Universe;

const MILLIS_PER_MINUTE: i64 = 60 * 1000;
const AGG_TRADE_LIMIT: u32 = 1000;
const FALLBACK_INTERVAL_MINUTES: u32 = 1;

/// Net taker-side volume imbalance of one batch of aggregate trades.
///
/// Trades where the buyer was the maker count toward the first leg, the
/// rest toward the second; a positive difference marks the pair's base coin
/// as the more popular side of the window.
pub fn volume_imbalance(trades: &[AggTrade]) -> f64 {
    let mut maker_buy = 0.0;
    let mut taker_buy = 0.0;
    for trade in trades {
        if trade.buyer_is_maker {
            maker_buy += trade.quantity();
        } else {
            taker_buy += trade.quantity();
        }
    }
    maker_buy - taker_buy
}

/// The ingestion window ending now: `minutes` long, floored to the minute
pub fn window_bounds(now_ms: i64, minutes: u32) -> (i64, i64) {
    let end = (now_ms / MILLIS_PER_MINUTE) * MILLIS_PER_MINUTE;
    let start = end - minutes as i64 * MILLIS_PER_MINUTE;
    (start, end)
}

/// Worker that ingests per-pair volume imbalances for the ranking producer
pub struct RankWorker {
    client: BinanceClient,
    store: StoreClient,
    journal: Arc<Journal>,
}

impl RankWorker {
    pub fn new(client: BinanceClient, store: StoreClient, journal: Arc<Journal>) -> Self {
        RankWorker {
            client,
            store,
            journal,
        }
    }

    /// Run until externally terminated
    pub async fn run(&self) {
        let mut interval_minutes = FALLBACK_INTERVAL_MINUTES;

        loop {
            info!("starting ranking-ingestion cycle");

            match self.store.loop_config().await {
                Ok(config) => {
                    interval_minutes = config.poll_interval_minutes.max(1);
                    if let Err(e) = self
                        .ingest_window(interval_minutes, config.min_pairs_per_coin as usize)
                        .await
                    {
                        error!("ranking-ingestion cycle failed: {}", e);
                        self.journal
                            .record_error(&format!("ranking-ingestion cycle failed: {}", e));
                    }
                }
                Err(e) => {
                    error!("failed to read loop config: {}", e);
                    self.journal
                        .record_error(&format!("failed to read loop config: {}", e));
                }
            }

            sleep(Duration::from_secs(60 * interval_minutes as u64)).await;
        }
    }

    async fn ingest_window(&self, minutes: u32, pair_limit: usize) -> anyhow::Result<()> {
        let universe = Universe::fetch(&self.client).await?;
        let counts = universe.pairs_per_coin();
        let pairs = universe.wanted_pairs(&counts, pair_limit);
        let (start_time, end_time) =
            window_bounds(BinanceClient::current_timestamp(), minutes);

        let mut inserted = 0usize;
        for pair in &pairs {
            match self.ingest_pair(pair, start_time, end_time).await {
                Ok(()) => inserted += 1,
                Err(e) => {
                    warn!("volume ingestion for {} failed: {}", pair, e);
                    self.journal
                        .record_error(&format!("volume ingestion for {} failed: {}", pair, e));
                }
            }
        }

        info!(
            "ranking ingestion complete: {}/{} pairs for window ending {}",
            inserted,
            pairs.len(),
            end_time
        );
        Ok(())
    }

    async fn ingest_pair(&self, pair: &Pair, start_time: i64, end_time: i64) -> anyhow::Result<()> {
        let trades = self
            .client
            .agg_trades(&pair.direct_symbol(), start_time, end_time, AGG_TRADE_LIMIT)
            .await?;

        self.store
            .insert_volume_diff(&VolumeDiffRow {
                pair: pair.to_string(),
                start_time,
                end_time,
                vol_diff: volume_imbalance(&trades),
            })
            .await
    }
}

/// Worker that ingests quote-asset price snapshots for the wanted universe
pub struct PriceWorker {
    client: BinanceClient,
    store: StoreClient,
    journal: Arc<Journal>,
    trading: TradingConfig,
}

impl PriceWorker {
    pub fn new(
        client: BinanceClient,
        store: StoreClient,
        journal: Arc<Journal>,
        trading: TradingConfig,
    ) -> Self {
        PriceWorker {
            client,
            store,
            journal,
            trading,
        }
    }

    /// Run until externally terminated
    pub async fn run(&self) {
        let mut interval_minutes = FALLBACK_INTERVAL_MINUTES;

        loop {
            info!("starting price-ingestion cycle");

            match self.store.loop_config().await {
                Ok(config) => {
                    interval_minutes = config.poll_interval_minutes.max(1);
                    if let Err(e) = self
                        .ingest_window(interval_minutes, config.min_pairs_per_coin as usize)
                        .await
                    {
                        error!("price-ingestion cycle failed: {}", e);
                        self.journal
                            .record_error(&format!("price-ingestion cycle failed: {}", e));
                    }
                }
                Err(e) => {
                    error!("failed to read loop config: {}", e);
                    self.journal
                        .record_error(&format!("failed to read loop config: {}", e));
                }
            }

            sleep(Duration::from_secs(60 * interval_minutes as u64)).await;
        }
    }

    async fn ingest_window(&self, minutes: u32, pair_limit: usize) -> anyhow::Result<()> {
        let universe = Universe::fetch(&self.client).await?;
        let counts = universe.pairs_per_coin();
        let (start_time, end_time) =
            window_bounds(BinanceClient::current_timestamp(), minutes);

        // only pairs against the reference asset are worth charting
        let pairs: Vec<Pair> = universe
            .wanted_pairs(&counts, pair_limit)
            .into_iter()
            .filter(|pair| pair.quote == self.trading.quote_asset)
            .collect();

        let mut inserted = 0usize;
        for pair in &pairs {
            let result = async {
                let ticker = self.client.latest_price(&pair.direct_symbol()).await?;
                self.store
                    .insert_price(&PriceRow {
                        pair: pair.to_string(),
                        start_time,
                        end_time,
                        open_price: ticker.price(),
                        close_price: ticker.price(),
                    })
                    .await
            }
            .await;

            match result {
                Ok(()) => inserted += 1,
                Err(e) => {
                    warn!("price ingestion for {} failed: {}", pair, e);
                    self.journal
                        .record_error(&format!("price ingestion for {} failed: {}", pair, e));
                }
            }
        }

        info!(
            "price ingestion complete: {}/{} pairs for window ending {}",
            inserted,
            pairs.len(),
            end_time
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn trade(quantity: &str, buyer_is_maker: bool) -> AggTrade {
        serde_json::from_value(serde_json::json!({
            "q": quantity,
            "T": 1_700_000_000_000i64,
            "m": buyer_is_maker,
        }))
        .unwrap()
    }

    #[test]
    fn test_volume_imbalance_signs() {
        let trades = vec![trade("5.0", true), trade("2.0", false), trade("1.5", true)];
        assert_relative_eq!(volume_imbalance(&trades), 4.5);
    }

    #[test]
    fn test_volume_imbalance_empty() {
        assert_eq!(volume_imbalance(&[]), 0.0);
    }

    #[test]
    fn test_window_bounds_floor_to_minute() {
        // 2023-11-14T22:13:27.500Z
        let now = 1_700_000_007_500;
        let (start, end) = window_bounds(now, 5);
        assert_eq!(end % MILLIS_PER_MINUTE, 0);
        assert!(end <= now);
        assert_eq!(end - start, 5 * MILLIS_PER_MINUTE);
    }
}
