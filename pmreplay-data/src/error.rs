use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when reading or writing recorded market data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid stored timestamp: {0}")]
    Timestamp(String),

    #[error("corrupt tick for market {market_id}: {reason}")]
    Corrupt { market_id: String, reason: String },

    #[error("tick source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid time range: end {end} is before start {start}")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
