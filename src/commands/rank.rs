//! Rank command: the volume-imbalance ingestion worker

use anyhow::Result;
use std::sync::Arc;

use elo_trader::ingest::RankWorker;

use super::{build_runtime, build_services, load_config, run_until_shutdown};

pub fn run(config_path: Option<String>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let services = build_services(&config)?;
        let worker = RankWorker::new(
            services.client,
            services.store,
            Arc::clone(&services.journal),
        );

        run_until_shutdown("ranking-ingestion", worker.run()).await
    })
}
