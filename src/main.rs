//! Replay harness: drive the trading engine from a JSON-lines tick file.

use anyhow::Context;
use clap::Parser;
use papertrade::{Config, SqliteLedger, Tick, TradingEngine};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "papertrade",
    about = "Replay a tick feed through the paper trading engine"
)]
struct Cli {
    /// Tick feed: one JSON tick object per line
    #[arg(long)]
    ticks: PathBuf,

    /// Strategy to trade with (e.g. SMA_CROSSOVER); omit to record prices only
    #[arg(long)]
    strategy: Option<String>,

    /// Strategy parameters as a JSON object
    #[arg(long, default_value = "{}")]
    params: String,

    /// SQLite ledger path; overrides PAPERTRADE_DB
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "papertrade=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db_path = cli.db.unwrap_or(config.db_path);
    info!("Opening ledger at {}", db_path);

    let ledger = Arc::new(
        SqliteLedger::new(&db_path, config.trading.starting_balance).context("opening ledger")?,
    );
    let engine = TradingEngine::new(ledger, config.trading);

    if let Some(name) = cli.strategy.as_deref() {
        let params: HashMap<String, serde_json::Value> =
            serde_json::from_str(&cli.params).context("parsing --params")?;
        engine.configure_strategy(name, &params)?;
        engine.start();
    }

    let feed = std::fs::read_to_string(&cli.ticks)
        .with_context(|| format!("reading {}", cli.ticks.display()))?;

    let (tx, rx) = mpsc::channel(256);
    let consumer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(rx).await })
    };

    let mut sent = 0usize;
    for (line_no, line) in feed.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Tick>(line) {
            Ok(mut tick) => {
                tick.symbol = papertrade::symbol::to_display(&tick.symbol);
                if tx.send(tick).await.is_err() {
                    break;
                }
                sent += 1;
            }
            Err(e) => warn!("Skipping malformed tick on line {}: {}", line_no + 1, e),
        }
    }
    drop(tx);
    consumer.await?;

    engine.stop();
    info!("Replayed {} ticks", sent);

    let snapshot = engine.get_performance_snapshot()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
