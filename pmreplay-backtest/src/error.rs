//! Error types surfaced by the replay and backtest engine.

use chrono::{DateTime, Utc};
use pmreplay_data::{DataError, MarketId};
use thiserror::Error;

/// Invalid replay or backtest configuration.
///
/// Always reported before any tick is emitted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid playback speed {0}: multiplier must be a finite number > 0")]
    InvalidSpeed(f64),

    #[error("unknown playback speed preset: {0}")]
    UnknownSpeedPreset(String),

    #[error("invalid time range: end {end} is before start {start}")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("unknown market id: {0}")]
    UnknownMarket(MarketId),

    #[error("limit per market must be greater than zero")]
    ZeroLimit,

    #[error("invalid value for {key}: {reason}")]
    InvalidEnv { key: &'static str, reason: String },
}

/// Failure raised by a strategy evaluator for one tick.
///
/// Caught at the router and treated as "no signal" for that evaluator.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("malformed tick for {market_id}: {reason}")]
    MalformedTick { market_id: MarketId, reason: String },

    #[error("signal payload could not be encoded: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("evaluator panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

/// Results store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("malformed result record: {0}")]
    Malformed(String),

    #[error("results store unavailable: {0}")]
    Unavailable(String),
}

/// Invalid transition of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("playback session is stopped and must be recreated")]
    Stopped,

    #[error("playback session is already active")]
    AlreadyActive,
}

/// Top level failure of a replay or backtest run.
///
/// Per-market source failures, evaluator failures and persistence failures do
/// not abort a run; they are reported in the run summary instead.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("tick source error: {0}")]
    Source(#[from] DataError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}
