//! Authentication utilities for the Binance REST API

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

/// Sign the canonical query string for authenticated endpoints.
///
/// Binance expects `signature=HMAC_SHA256(query)` appended to the query, with
/// the signature hex-encoded and the secret key as HMAC key.
pub fn sign_query(query: &str, api_secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(api_secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build the canonical `k=v&k=v` query string in parameter order
pub fn build_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_creation() {
        let creds = Credentials::new("test_key", "test_secret");
        assert_eq!(creds.api_key, "test_key");
        assert_eq!(creds.api_secret, "test_secret");
    }

    #[test]
    fn test_build_query_preserves_order() {
        let params = vec![
            ("symbol".to_string(), "BTCUSDT".to_string()),
            ("timestamp".to_string(), "1700000000000".to_string()),
        ];
        assert_eq!(build_query(&params), "symbol=BTCUSDT&timestamp=1700000000000");
    }

    #[test]
    fn test_sign_query_known_vector() {
        // Vector from the Binance API documentation
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1\
                     &recvWindow=5000&timestamp=1499827319559";
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        assert_eq!(
            sign_query(query, secret),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_sign_query_is_deterministic() {
        let a = sign_query("timestamp=1", "secret");
        let b = sign_query("timestamp=1", "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
