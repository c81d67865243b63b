//! Durable trade and error journals
//!
//! Two append-only files under the logs directory. The trade journal records
//! every order attempt, accepted or not, as a CSV row; the error journal
//! records every terminal gateway failure and every rejected order attempt.
//! The error journal is the gateway's only observability channel beyond
//! console tracing, so appends never panic: a journal write failure is
//! reported via `tracing` and otherwise ignored.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use serde::Serialize;
use tracing::warn;

use crate::types::OrderResult;

const TRADE_LOG: &str = "trade_log.csv";
const ERROR_LOG: &str = "error_log.txt";

/// One row of the trade journal
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub timestamp: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub holdings: f64,
    pub quantity: f64,
    pub price: f64,
    pub reason: String,
}

/// Append-only journals shared by the gateway and the execution engine
#[derive(Debug)]
pub struct Journal {
    dir: PathBuf,
    // serializes appends from concurrent tasks within one worker
    lock: Mutex<()>,
}

impl Journal {
    /// Open (creating if needed) the journal directory
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Journal {
            dir: dir.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// Record an order attempt in the trade journal
    pub fn record_trade(&self, record: &TradeRecord) {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let path = self.dir.join(TRADE_LOG);
        let write_header = !path.exists();

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|file| {
                let mut writer = csv::WriterBuilder::new()
                    .has_headers(write_header)
                    .from_writer(file);
                writer.serialize(record)?;
                writer.flush()?;
                Ok(())
            });

        if let Err(e) = result {
            warn!("failed to append trade journal: {}", e);
        }
    }

    /// Record a classified order rejection or gateway failure
    pub fn record_order_error(&self, result: &OrderResult) {
        self.record_error(&format!(
            "exchange code = {}, message = {}, http = {} {}",
            result.exchange_code, result.exchange_message, result.http_status, result.http_reason
        ));
    }

    /// Record a terminal failure in the error journal
    pub fn record_error(&self, message: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let path = self.dir.join(ERROR_LOG);
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{} {}", now, message));

        if let Err(e) = result {
            warn!("failed to append error journal: {}", e);
        }
    }
}
