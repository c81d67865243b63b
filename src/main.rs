//! Elo trader - main entry point
//!
//! This binary provides four subcommands:
//! - trade: Run the ranking-driven decision worker
//! - rank: Run the volume-imbalance ingestion worker
//! - price: Run the price-snapshot ingestion worker
//! - all: Run every worker in one process

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "elo-trader")]
#[command(about = "Automated basket trading driven by Elo-style popularity rankings", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the trading decision worker (CAUTION - REAL MONEY!)
    Trade {
        /// Path to configuration file; environment variables are used when omitted
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Run the volume-imbalance ingestion worker
    Rank {
        /// Path to configuration file; environment variables are used when omitted
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Run the price-snapshot ingestion worker
    Price {
        /// Path to configuration file; environment variables are used when omitted
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Run all three workers in one process
    All {
        /// Path to configuration file; environment variables are used when omitted
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Log file naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // File layer, same format without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Trade { .. } => "trade",
        Commands::Rank { .. } => "rank",
        Commands::Price { .. } => "price",
        Commands::All { .. } => "all",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Trade { config } => commands::trade::run(config),
        Commands::Rank { config } => commands::rank::run(config),
        Commands::Price { config } => commands::price::run(config),
        Commands::All { config } => commands::all::run(config),
    }
}
