//! Historical Replay & Backtest Scheduling Engine for the PmReplay Ecosystem
//!
//! This crate takes recorded prediction market ticks and re-emits them to
//! pluggable strategy evaluators, reproducing the original (or scaled)
//! timing, while supporting pause/resume/stop. Every signal an evaluator
//! produces is classified and persisted, leaving a trail of what each
//! strategy would have done.
//!
//! # Architecture
//!
//! ```text
//! TickSource ──fetch──▶ MarketSequencer ──▶ PlaybackScheduler ──▶ StrategyRouter ──▶ ResultSink ──▶ ResultsStore
//!                         (per market)      (delay + control)     (evaluators)       (records)
//! ```
//!
//! # Key Components
//!
//! - [`BacktestEngine`]: Control surface (`start`, `pause`, `resume`, `stop`, `set_speed`)
//! - [`PlaybackScheduler`]: Idle/Playing/Paused/Stopped state machine driving emission
//! - [`PlaybackSpeed`]: Presets (`RealTime`, `Fast10x`, `JumpToEvents`) or a custom multiplier
//! - [`MarketSequencer`]: Replays one bounded tick batch per market through a session
//! - [`StrategyRouter`]: Dispatches each tick to every registered [`StrategyEvaluator`]
//! - [`ResultSink`]: Persists [`BacktestResult`]s, counting failed writes
//! - [`BacktestConfig`]: Run configuration, loadable from the environment
//!
//! # Example
//!
//! ```rust,ignore
//! use pmreplay_backtest::{
//!     BacktestEngine, BacktestRequest, MarketSelector, PlaybackSpeed,
//!     store::memory::InMemoryResultsStore,
//!     strategy::price_sum::PriceSumEvaluator,
//! };
//! use pmreplay_data::SqliteTickStore;
//!
//! let source = SqliteTickStore::open("data/market_history.db")?;
//! let mut engine = BacktestEngine::new(source, InMemoryResultsStore::new());
//! engine.register_strategy("price_sum", PriceSumEvaluator::default());
//!
//! let summary = engine
//!     .start(BacktestRequest::new(MarketSelector::All, PlaybackSpeed::JumpToEvents))
//!     .await?;
//! println!("{} ticks, {} signals", summary.ticks_processed, summary.total_signals());
//! ```
//!
//! # Timing Model
//!
//! The wait before each tick is the gap to the previous tick of the same
//! market divided by the speed multiplier:
//!
//! ```text
//! delay = (t_n - t_{n-1}) / speed     first tick, out-of-order tick, JumpToEvents => 0
//! ```
//!
//! Time spent paused does not count towards the wait.

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod result;
pub mod router;
pub mod scheduler;
pub mod sequencer;
pub mod sink;
pub mod speed;
pub mod store;
pub mod strategy;
pub mod summary;

// Re-exports for convenience
pub use config::{BacktestConfig, BacktestRequest, MarketSelector};
pub use engine::BacktestEngine;
pub use error::{BacktestError, ConfigError, EvaluatorError, SchedulerError, StoreError};
pub use result::{BacktestResult, OutcomeClassifier, SimulatedOutcome};
pub use router::{StrategyRouter, StrategyStats};
pub use scheduler::{
    PlaybackHandle, PlaybackOutcome, PlaybackScheduler, PlaybackSnapshot, PlaybackState,
    TickHandler,
};
pub use sequencer::{MarketReplay, MarketSequencer, SequenceReport};
pub use sink::{ResultRecord, ResultSink};
pub use speed::{PlaybackSpeed, SpeedMultiplier};
pub use store::{ResultFilter, ResultsStore};
pub use strategy::{Signal, StrategyEvaluator, StrategyId};
pub use summary::RunSummary;
