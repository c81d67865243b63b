//! Binance REST client, the exchange gateway
//!
//! All exchange traffic flows through [`BinanceClient::call`], which signs
//! authenticated requests, enforces the request timeout, classifies
//! responses, and honors the exchange's rate-limit protocol: a 429 or 418
//! (soft-ban warning) is retried after the `Retry-After` delay, consuming one
//! attempt of a fixed budget. Any other non-200 is a structured error with no
//! retry. Transport failures are logged and the attempt loop continues.
//!
//! Every terminal failure is appended to the durable error journal, the
//! gateway's only observability channel beyond console tracing.
//!
//! # Example
//! ```no_run
//! use elo_trader::binance::BinanceClient;
//! use elo_trader::journal::Journal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let journal = Arc::new(Journal::open("logs")?);
//!     let client = BinanceClient::new("api_key", "api_secret", journal);
//!     let ticker = client.latest_price("BTCUSDT").await?;
//!     println!("BTC/USDT price: {}", ticker.price());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::{build_query, sign_query, Credentials};
use super::types::*;
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::journal::Journal;
use crate::types::OrderResult;

/// Base URL for the Binance REST API
pub const API_BASE_URL: &str = "https://api.binance.com";

/// Fallback sleep when a rate-limit response carries no Retry-After header
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Binance exchange gateway
#[derive(Clone)]
pub struct BinanceClient {
    credentials: Credentials,
    http_client: Client,
    journal: Arc<Journal>,
    base_url: String,
    try_counts: u32,
    recv_window: u64,
}

impl BinanceClient {
    /// Create a client with default connection settings
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        journal: Arc<Journal>,
    ) -> Self {
        Self::with_config(api_key, api_secret, journal, &ExchangeConfig::default())
    }

    /// Create a client with explicit timeout / retry-budget settings
    pub fn with_config(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        journal: Arc<Journal>,
        config: &ExchangeConfig,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            credentials: Credentials::new(api_key, api_secret),
            http_client,
            journal,
            base_url: API_BASE_URL.to_string(),
            try_counts: config.try_counts.max(1),
            recv_window: config.recv_window,
        }
    }

    /// Point the client at a different host (test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Milliseconds since the epoch, the exchange's timestamp format
    pub fn current_timestamp() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Send one exchange request and classify the response.
    ///
    /// Authenticated calls get `timestamp` and `recvWindow` appended and the
    /// whole query string HMAC-signed. The request is built once; rate-limit
    /// retries resubmit the identical request.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(String, String)>,
        authenticated: bool,
    ) -> Result<serde_json::Value, ExchangeError> {
        let mut url = format!("{}{}", self.base_url, path);

        if authenticated {
            params.push(("recvWindow".to_string(), self.recv_window.to_string()));
            params.push(("timestamp".to_string(), Self::current_timestamp().to_string()));
            let query = build_query(&params);
            let signature = sign_query(&query, &self.credentials.api_secret);
            url.push_str(&format!("?{}&signature={}", query, signature));
        } else if !params.is_empty() {
            url.push_str(&format!("?{}", build_query(&params)));
        }

        let mut rate_limited = false;
        let mut last_transport: Option<reqwest::Error> = None;

        for attempt in 0..self.try_counts {
            debug!("{} {} (attempt {}/{})", method, path, attempt + 1, self.try_counts);

            let response = self
                .http_client
                .request(method.clone(), &url)
                .header("X-MBX-APIKEY", &self.credentials.api_key)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    // Transport failure: log and keep trying, no inserted delay
                    warn!("transport failure on {}: {}", path, e);
                    self.journal
                        .record_error(&format!("transport failure on {}: {}", path, e));
                    last_transport = Some(e);
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
                rate_limited = true;
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

                let body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody {
                    code: 0,
                    msg: String::new(),
                });
                warn!(
                    "rate limited on {} (code {}): sleeping {}s",
                    path, body.code, retry_after
                );
                self.journal.record_error(&format!(
                    "rate limited on {}: code = {}, msg = {}, http = {}, retry after {}s",
                    path, body.code, body.msg, status, retry_after
                ));

                sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            if status.is_success() {
                return response.json().await.map_err(|e| ExchangeError::Payload {
                    path: path.to_string(),
                    detail: e.to_string(),
                });
            }

            // Any other non-200: structured error, no retry
            let http_reason = status.canonical_reason().unwrap_or("").to_string();
            let body: ApiErrorBody = response.json().await.unwrap_or(ApiErrorBody {
                code: 0,
                msg: String::new(),
            });
            self.journal.record_error(&format!(
                "exchange error on {}: code = {}, msg = {}, http = {} {}",
                path, body.code, body.msg, status.as_u16(), http_reason
            ));
            return Err(ExchangeError::Api {
                code: body.code,
                message: body.msg,
                http_status: status.as_u16(),
                http_reason,
            });
        }

        let terminal = if rate_limited {
            ExchangeError::RateLimited {
                path: path.to_string(),
                budget: self.try_counts,
            }
        } else if let Some(source) = last_transport {
            ExchangeError::Transport {
                path: path.to_string(),
                source,
            }
        } else {
            ExchangeError::RetriesExhausted {
                path: path.to_string(),
                attempts: self.try_counts,
            }
        };
        self.journal.record_error(&terminal.to_string());
        Err(terminal)
    }

    // ==================== PUBLIC ENDPOINTS ====================

    /// Exchange-metadata listing: every symbol with its status
    pub async fn exchange_info(&self) -> Result<ExchangeInfo, ExchangeError> {
        let payload = self
            .call(Method::GET, "/api/v3/exchangeInfo", Vec::new(), false)
            .await?;
        parse_payload("/api/v3/exchangeInfo", payload)
    }

    /// Latest ticker price for one symbol
    pub async fn latest_price(&self, symbol: &str) -> Result<TickerPrice, ExchangeError> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        let payload = self
            .call(Method::GET, "/api/v3/ticker/price", params, false)
            .await?;
        parse_payload("/api/v3/ticker/price", payload)
    }

    /// Aggregate trades for a symbol between two timestamps
    pub async fn agg_trades(
        &self,
        symbol: &str,
        start_time: i64,
        end_time: i64,
        limit: u32,
    ) -> Result<Vec<AggTrade>, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), symbol.to_string()),
            ("startTime".to_string(), start_time.to_string()),
            ("endTime".to_string(), end_time.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let payload = self
            .call(Method::GET, "/api/v3/aggTrades", params, false)
            .await?;
        parse_payload("/api/v3/aggTrades", payload)
    }

    // ==================== AUTHENTICATED ENDPOINTS ====================

    /// Account balances
    pub async fn account_info(&self) -> Result<AccountInfo, ExchangeError> {
        let payload = self
            .call(Method::GET, "/api/v3/account", Vec::new(), true)
            .await?;
        parse_payload("/api/v3/account", payload)
    }

    /// Cancel all resting orders on one symbol
    pub async fn cancel_open_orders(
        &self,
        symbol: &str,
    ) -> Result<serde_json::Value, ExchangeError> {
        let params = vec![("symbol".to_string(), symbol.to_string())];
        self.call(Method::DELETE, "/api/v3/openOrders", params, true)
            .await
    }

    /// Submit an order, mapping an exchange rejection into a non-accepted
    /// [`OrderResult`] instead of an error.
    ///
    /// The execution engine's quantity back-off loop needs the classified
    /// rejection to decide whether to resubmit; only rate-limit exhaustion
    /// and transport failures surface as `Err`.
    pub async fn submit_order(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<OrderResult, ExchangeError> {
        match self.call(Method::POST, path, params, true).await {
            Ok(payload) => Ok(OrderResult {
                accepted: true,
                exchange_code: 0,
                exchange_message: payload.to_string(),
                http_status: 200,
                http_reason: "OK".to_string(),
            }),
            Err(ExchangeError::Api {
                code,
                message,
                http_status,
                http_reason,
            }) => Ok(OrderResult {
                accepted: false,
                exchange_code: code,
                exchange_message: message,
                http_status,
                http_reason,
            }),
            Err(e) => Err(e),
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    path: &str,
    payload: serde_json::Value,
) -> Result<T, ExchangeError> {
    serde_json::from_value(payload).map_err(|e| ExchangeError::Payload {
        path: path.to_string(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> BinanceClient {
        let dir = std::env::temp_dir().join("elo_trader_client_tests");
        let journal = Arc::new(Journal::open(dir).unwrap());
        BinanceClient::new("test_key", "test_secret", journal)
    }

    #[test]
    fn test_client_defaults() {
        let client = test_client();
        assert_eq!(client.try_counts, 3);
        assert_eq!(client.recv_window, 5000);
        assert_eq!(client.base_url, API_BASE_URL);
    }

    #[test]
    fn test_base_url_override() {
        let client = test_client().with_base_url("http://127.0.0.1:9999");
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
    }

    #[test]
    fn test_try_counts_floor() {
        let dir = std::env::temp_dir().join("elo_trader_client_tests");
        let journal = Arc::new(Journal::open(dir).unwrap());
        let config = ExchangeConfig {
            try_counts: 0,
            ..ExchangeConfig::default()
        };
        let client = BinanceClient::with_config("k", "s", journal, &config);
        assert_eq!(client.try_counts, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_after_budget() {
        let dir = std::env::temp_dir().join("elo_trader_client_tests");
        let journal = Arc::new(Journal::open(dir).unwrap());
        let config = ExchangeConfig {
            try_counts: 1,
            timeout_secs: 2,
            ..ExchangeConfig::default()
        };
        // nothing listens on the discard port, so every attempt is a
        // connection-level failure
        let client = BinanceClient::with_config("k", "s", journal, &config)
            .with_base_url("http://127.0.0.1:9");

        let err = client.latest_price("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, ExchangeError::Transport { .. }));
    }

    #[test]
    fn test_parse_payload_shape_mismatch() {
        let err = parse_payload::<ExchangeInfo>("/api/v3/exchangeInfo", serde_json::json!([]))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Payload { .. }));
    }
}
