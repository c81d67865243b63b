//! Binance exchange gateway: request signing, rate-limit compliance,
//! response classification, and typed endpoint wrappers.

pub mod auth;
mod client;
mod types;

pub use auth::Credentials;
pub use client::{BinanceClient, API_BASE_URL};
pub use types::*;
