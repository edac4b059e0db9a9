//! Countdown Trader - Threshold Countdown Entry/Exit Decision Engine
//!
//! Tracks buy targets and held positions per ticker, with countdowns that
//! must mature before an action is confirmed unless the price crosses an
//! immediate threshold.

mod application;
mod config;
mod domain;
mod engine;
mod store;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::application::{ReplayDriver, Tick, TickOutcome};
use crate::config::{load_config, Config, StoreBackend};
use crate::store::{CountdownStore, MemoryStore, SqliteStore, StoredRecord};

#[derive(Parser)]
#[command(name = "countdown-trader", about = "Threshold countdown entry/exit decision engine")]
struct CliApp {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log at info level
    #[arg(short, long)]
    verbose: bool,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines tick file through the decision engine
    Replay {
        /// File with one {"ticker": ..., "price": ...} object per line
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Evaluate a single price observation
    Tick {
        #[arg(long)]
        ticker: String,
        #[arg(long)]
        price: f64,
    },
    /// Show stored targets and positions
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (store path overrides go here)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config = load_config(&app.config)
        .with_context(|| format!("Failed to load configuration from {}", app.config.display()))?;
    init_logging(&config, app.verbose, app.debug);

    let store = build_store(&config)?;
    let driver = ReplayDriver::new(&config, store);

    match app.command {
        Command::Replay { file } => replay_command(&driver, &file).await,
        Command::Tick { ticker, price } => tick_command(&driver, ticker, price).await,
        Command::Status => status_command(&driver).await,
    }
}

fn init_logging(config: &Config, verbose: bool, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new(config.logging.level.clone())
    };

    fmt().with_env_filter(filter).init();
}

fn build_store(config: &Config) -> Result<Arc<dyn CountdownStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Memory store selected - countdown state will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = config.store.resolved_path();
            let store = SqliteStore::open(&path)
                .with_context(|| format!("Failed to open countdown database at {}", path))?;
            Ok(Arc::new(store))
        }
    }
}

async fn replay_command(driver: &ReplayDriver, file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read tick file {}", file.display()))?;

    let mut ticks = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tick: Tick = serde_json::from_str(line)
            .with_context(|| format!("Invalid tick on line {}", number + 1))?;
        ticks.push(tick);
    }

    if ticks.is_empty() {
        bail!("Tick file {} contains no observations", file.display());
    }

    tracing::info!("Replaying {} observations from {}", ticks.len(), file.display());
    let summary = driver.replay(ticks).await;

    println!("Processed: {}", summary.processed);
    println!("Bought:    {}", summary.bought);
    println!("Sold:      {}", summary.sold);
    println!("Rejected:  {}", summary.rejected);
    println!("Errors:    {}", summary.errors);
    Ok(())
}

async fn tick_command(driver: &ReplayDriver, ticker: String, price: f64) -> Result<()> {
    let tick = Tick {
        ticker,
        price,
        age_secs: None,
    };
    let outcome = driver.process(&tick).await?;

    let verdict = match outcome {
        TickOutcome::Bought => "BUY",
        TickOutcome::Sold => "SELL",
        TickOutcome::NoAction => "no action",
        TickOutcome::TooYoung => "rejected (market too young)",
    };
    println!("{} @ {}: {}", tick.ticker, tick.price, verdict);
    Ok(())
}

async fn status_command(driver: &ReplayDriver) -> Result<()> {
    let (targets, positions) = driver.status().await?;

    println!("Targets ({}):", targets.len());
    print_records(&targets);
    println!("Positions ({}):", positions.len());
    print_records(&positions);
    Ok(())
}

fn print_records(records: &[StoredRecord]) {
    for record in records {
        let countdown = record
            .countdown
            .map(|c| format!("{}s", c))
            .unwrap_or_else(|| "-".to_string());
        let age = record
            .last_checked_age_secs
            .map(|a| format!("checked {}s ago", a))
            .unwrap_or_else(|| "never checked".to_string());
        println!("  {:<24} countdown {:<8} {}", record.ticker, countdown, age);
    }
}
