//! Client for the persisted-state/reporting proxy
//!
//! The store is an external collaborator: a thin CRUD layer over a
//! relational database, exposed as REST resources. Each resource supports a
//! range-filtered read (start/end time plus a key) and a single-record
//! insert; the `Config` read returns only the most recently inserted row.
//!
//! Inserts are idempotent: the client POSTs unconditionally and treats an
//! HTTP 409 (uniqueness violation on the row's natural key) as success, so
//! overlapping worker cycles cannot create duplicates by racing a
//! check-then-insert. Readers still de-duplicate, since rows written before
//! the uniqueness constraint existed may repeat.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::types::Coin;

/// Live-tunable trading parameters, one immutable snapshot per loop cycle.
///
/// Fetched fresh every iteration and threaded through calls so the system
/// can be reconfigured without a restart; never cached beyond one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub standard_deviations: f64,
    #[serde(rename = "minutes")]
    pub poll_interval_minutes: u32,
    #[serde(rename = "percent_change")]
    pub percent_change_threshold: f64,
    #[serde(rename = "pairs_per_coin")]
    pub min_pairs_per_coin: u32,
    #[serde(rename = "moving_average_n")]
    pub moving_average_window: u32,
}

/// One coin's ranking snapshot for a completed time window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingStat {
    pub coin: Coin,
    #[serde(rename = "elo_rating")]
    pub rating: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub moving_average: f64,
    #[serde(rename = "end_time")]
    pub window_end: i64,
}

/// Regression fit between ranking deviation and subsequent price change,
/// produced externally per coin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinStatistics {
    pub coin: Coin,
    #[serde(default)]
    pub minutes_forward: i64,
    #[serde(default)]
    pub p: f64,
    #[serde(default)]
    pub change_at_3sd: f64,
    #[serde(default)]
    pub datapoints: i64,
}

/// Trade-volume imbalance of one pair over one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDiffRow {
    pub pair: String,
    pub start_time: i64,
    pub end_time: i64,
    pub vol_diff: f64,
}

/// Price snapshot of one pair over one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRow {
    pub pair: String,
    pub start_time: i64,
    pub end_time: i64,
    pub open_price: f64,
    pub close_price: f64,
}

/// Optional read filter: a time range and/or a key (coin or pair)
#[derive(Debug, Clone, Default)]
pub struct RangeFilter {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub key: Option<String>,
}

impl RangeFilter {
    fn to_query(&self, key_name: &str) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(start) = self.start_time {
            params.push(("start_time".to_string(), start.to_string()));
        }
        if let Some(end) = self.end_time {
            params.push(("end_time".to_string(), end.to_string()));
        }
        if let Some(key) = &self.key {
            params.push((key_name.to_string(), key.clone()));
        }
        params
    }
}

/// REST client for the persisted store
#[derive(Debug, Clone)]
pub struct StoreClient {
    http_client: Client,
    base_url: String,
}

impl StoreClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        StoreClient {
            http_client,
            base_url: base_url.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, resource);
        let response = self
            .http_client
            .get(&url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("Failed to reach store resource {}", resource))?;

        let status = response.status();
        let text = response.text().await.context("Failed to read store response")?;
        if !status.is_success() {
            return Err(anyhow!("store error on {} ({}): {}", resource, status, text));
        }
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse store response from {}", resource))
    }

    /// Insert one record, treating a uniqueness-constraint rejection (409)
    /// as already-present success.
    async fn insert<T: Serialize>(&self, resource: &str, row: &T) -> Result<()> {
        let url = format!("{}/{}", self.base_url, resource);
        let response = self
            .http_client
            .post(&url)
            .form(row)
            .send()
            .await
            .with_context(|| format!("Failed to reach store resource {}", resource))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(anyhow!("store insert on {} failed ({}): {}", resource, status, text))
    }

    /// The most recently inserted configuration row
    pub async fn loop_config(&self) -> Result<LoopConfig> {
        self.get_json("Config", &[]).await
    }

    /// Latest ranking snapshot, de-duplicated on (coin, window end), order
    /// preserved; the decision loop's first-match scan depends on it.
    pub async fn ranking_stats(&self, filter: &RangeFilter) -> Result<Vec<RankingStat>> {
        let rows = self
            .get_json("RankingStats", &filter.to_query("coin"))
            .await?;
        Ok(dedup_ranking(rows))
    }

    /// Per-coin regression statistics from the external producer
    pub async fn statistics(&self) -> Result<Vec<CoinStatistics>> {
        self.get_json("Statistics", &[]).await
    }

    /// Volume-imbalance rows for the ranking producer
    pub async fn volume_diffs(&self, filter: &RangeFilter) -> Result<Vec<VolumeDiffRow>> {
        self.get_json("VolumeDiff", &filter.to_query("pair")).await
    }

    pub async fn insert_volume_diff(&self, row: &VolumeDiffRow) -> Result<()> {
        self.insert("VolumeDiff", row).await
    }

    pub async fn insert_price(&self, row: &PriceRow) -> Result<()> {
        self.insert("Price", row).await
    }
}

/// Keep the first row per (coin, window end), preserving snapshot order
fn dedup_ranking(rows: Vec<RankingStat>) -> Vec<RankingStat> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert((row.coin.clone(), row.window_end)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_config_wire_names() {
        let json = r#"{
            "standard_deviations": 3.0,
            "minutes": 60,
            "percent_change": 1.5,
            "pairs_per_coin": 8,
            "moving_average_n": 5
        }"#;
        let config: LoopConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.poll_interval_minutes, 60);
        assert_eq!(config.min_pairs_per_coin, 8);
        assert_eq!(config.percent_change_threshold, 1.5);
        assert_eq!(config.moving_average_window, 5);
    }

    #[test]
    fn test_ranking_stat_wire_names() {
        let json = r#"{
            "coin": "BTC",
            "elo_rating": 1600.0,
            "lower_limit": 1450.0,
            "upper_limit": 1550.0,
            "moving_average": 1580.0,
            "end_time": 1700000000000
        }"#;
        let stat: RankingStat = serde_json::from_str(json).unwrap();
        assert_eq!(stat.rating, 1600.0);
        assert_eq!(stat.window_end, 1700000000000);
    }

    #[test]
    fn test_dedup_preserves_first_and_order() {
        let stat = |coin: &str, end: i64, rating: f64| RankingStat {
            coin: coin.to_string(),
            rating,
            lower_limit: 0.0,
            upper_limit: 0.0,
            moving_average: 0.0,
            window_end: end,
        };
        let rows = vec![
            stat("BTC", 1, 1500.0),
            stat("ETH", 1, 1490.0),
            stat("BTC", 1, 1600.0),
            stat("BTC", 2, 1700.0),
        ];
        let deduped = dedup_ranking(rows);
        assert_eq!(deduped.len(), 3);
        assert_eq!(deduped[0].rating, 1500.0);
        assert_eq!(deduped[1].coin, "ETH");
        assert_eq!(deduped[2].window_end, 2);
    }

    #[test]
    fn test_range_filter_query() {
        let filter = RangeFilter {
            start_time: Some(1),
            end_time: Some(2),
            key: Some("BTC".to_string()),
        };
        let query = filter.to_query("coin");
        assert_eq!(query.len(), 3);
        assert!(query.contains(&("coin".to_string(), "BTC".to_string())));

        assert!(RangeFilter::default().to_query("pair").is_empty());
    }
}
