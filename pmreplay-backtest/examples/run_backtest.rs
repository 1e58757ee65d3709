//! Backtest runner over the recorded SQLite tick history.
//!
//! Replays every selected market through the built-in price sum and depth
//! scanner evaluators,
//! writes results to the `backtest_results` table of the same database, and
//! prints the run summary as JSON.
//!
//! Usage:
//!   # Optionally set in .env
//!   REPLAY_SPEED=jump_to_events        # real_time | fast_10x | jump_to_events | <multiplier>
//!   REPLAY_LIMIT_PER_MARKET=10000
//!   REPLAY_START=2024-01-01T00:00:00Z
//!   REPLAY_END=2024-02-01T00:00:00Z
//!   REPLAY_MARKETS=market_a,market_b   # default: all recorded markets
//!   REPLAY_DB_PATH=data/market_history.db
//!
//!   cargo run -p pmreplay-backtest --example run_backtest
//!
//! Press Ctrl+C to stop the replay early; the partial summary is still printed.

use pmreplay_backtest::{
    BacktestConfig, BacktestEngine,
    store::sqlite::SqliteResultsStore,
    strategy::{
        depth::DepthScannerEvaluator,
        price_sum::{PriceSumConfig, PriceSumEvaluator},
    },
};
use pmreplay_data::SqliteTickStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = BacktestConfig::from_env()?;
    let request = config.request()?;
    info!(?config, "Loaded backtest configuration");

    let history = SqliteTickStore::open(&config.db_path)?;
    let results = SqliteResultsStore::open(&config.db_path)?;

    let mut engine = BacktestEngine::new(history, results);
    engine.register_strategy(
        "price_sum",
        PriceSumEvaluator::new(PriceSumConfig {
            fee_bps: 50,
            ..Default::default()
        }),
    );
    engine.register_strategy("depth_scanner", DepthScannerEvaluator::default());

    let handle = engine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stopping replay...");
            handle.stop();
        }
    });

    let summary = engine.start(request).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(cfg!(debug_assertions))
        .init()
}
