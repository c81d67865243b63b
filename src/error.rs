//! Error taxonomy for exchange and store interactions
//!
//! The philosophy throughout is fail-soft: workers log structured detail and
//! rely on the next poll cycle rather than terminating. Errors that must not
//! be retried (validation) are distinguished from those that are (rate
//! limits) and those that are abandoned for the cycle (transport).

use thiserror::Error;
use tracing::error;

/// Classified failure of an exchange call
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// HTTP 429/418 observed and the retry budget ran out before a 200
    #[error("rate limited on {path}: retry budget of {budget} exhausted")]
    RateLimited { path: String, budget: u32 },

    /// Request rejected locally before any network call
    #[error("validation failed: {0}")]
    Validation(String),

    /// Exchange answered with a non-200 status and a structured error body
    #[error("exchange error {code} ({http_status} {http_reason}): {message}")]
    Api {
        code: i64,
        message: String,
        http_status: u16,
        http_reason: String,
    },

    /// DNS failure, timeout, connection refused and friends
    #[error("transport failure on {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// All attempts consumed without a classifiable response
    #[error("{path}: no response after {attempts} attempts")]
    RetriesExhausted { path: String, attempts: u32 },

    /// Neither concatenation order of a pair is listed as TRADING
    #[error("no tradable symbol for {held} <-> {target}")]
    NoTradableSymbol { held: String, target: String },

    #[error("unexpected payload shape from {path}: {detail}")]
    Payload { path: String, detail: String },
}

impl ExchangeError {
    /// True for failures caused by the request itself rather than the
    /// transport, i.e. those that the quantity back-off loop reacts to.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ExchangeError::Api { .. })
    }
}

/// Log an operation's failure and carry on, yielding `None`.
///
/// Used at loop call sites where the contract is catch-log-continue: the
/// record is structured, nothing is silently swallowed, and the caller moves
/// to the next coin or the next cycle.
pub fn log_and_continue<T, E: std::fmt::Display>(context: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!("{}: {}", context, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let api = ExchangeError::Api {
            code: -2010,
            message: "insufficient balance".into(),
            http_status: 400,
            http_reason: "Bad Request".into(),
        };
        assert!(api.is_rejection());

        let validation = ExchangeError::Validation("stopPrice must be greater than 0".into());
        assert!(!validation.is_rejection());
    }

    #[test]
    fn test_log_and_continue_passes_ok() {
        let ok: Result<i32, ExchangeError> = Ok(7);
        assert_eq!(log_and_continue("test", ok), Some(7));

        let err: Result<i32, ExchangeError> =
            Err(ExchangeError::Validation("bad order".into()));
        assert_eq!(log_and_continue("test", err), None);
    }
}
