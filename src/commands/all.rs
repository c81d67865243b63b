//! All command: every worker in one process
//!
//! The workers still share no memory. Each gets its own exchange client,
//! store client, and journal handle, exactly as if it ran standalone.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use elo_trader::decision::DecisionLoop;
use elo_trader::ingest::{PriceWorker, RankWorker};

use super::{build_runtime, build_services, load_config, run_until_shutdown};

pub fn run(config_path: Option<String>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        info!("starting all workers");

        let trade_services = build_services(&config)?;
        let rank_services = build_services(&config)?;
        let price_services = build_services(&config)?;

        let decision = DecisionLoop::new(
            trade_services.client,
            trade_services.store,
            Arc::clone(&trade_services.journal),
            config.trading.clone(),
        );
        let rank = RankWorker::new(
            rank_services.client,
            rank_services.store,
            Arc::clone(&rank_services.journal),
        );
        let price = PriceWorker::new(
            price_services.client,
            price_services.store,
            Arc::clone(&price_services.journal),
            config.trading.clone(),
        );

        let workers = async {
            tokio::join!(decision.run(), rank.run(), price.run());
        };

        run_until_shutdown("all", workers).await
    })
}
