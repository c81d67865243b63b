//! Trade command: the decision worker
//!
//! Runs the ranking-driven decision loop against the live exchange. The
//! loop itself never exits; only Ctrl+C ends the process.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use elo_trader::decision::DecisionLoop;

use super::{build_runtime, build_services, load_config, run_until_shutdown};

pub fn run(config_path: Option<String>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let services = build_services(&config)?;
        info!(
            "trading against {} with store at {}",
            config.trading.quote_asset,
            config.store.base_url()
        );

        let worker = DecisionLoop::new(
            services.client,
            services.store,
            Arc::clone(&services.journal),
            config.trading.clone(),
        );

        run_until_shutdown("decision", worker.run()).await
    })
}
