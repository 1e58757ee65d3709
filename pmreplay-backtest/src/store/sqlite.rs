//! SQLite results store: one `backtest_results` table indexed on
//! `(strategy, market_id, timestamp)`.

use super::{ResultFilter, ResultsStore};
use crate::{error::StoreError, sink::ResultRecord, strategy::StrategyId};
use async_trait::async_trait;
use parking_lot::Mutex;
use pmreplay_data::{MarketId, timestamp::format_timestamp};
use rusqlite::{Connection, OpenFlags, Row, params, params_from_iter, types::Value};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS backtest_results (
    id INTEGER PRIMARY KEY,
    strategy TEXT NOT NULL,
    market_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    signal TEXT NOT NULL,
    simulated_outcome TEXT NOT NULL,
    notes TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_strategy_market_timestamp
    ON backtest_results(strategy, market_id, timestamp);
"#;

/// Persistent results store backed by SQLite.
pub struct SqliteResultsStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteResultsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteResultsStore").finish_non_exhaustive()
    }
}

impl SqliteResultsStore {
    /// Open (or create) the results table in the database at `path`.
    ///
    /// May share a file with the tick history.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|error| StoreError::Unavailable(error.to_string()))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let store = Self::with_connection(Connection::open_with_flags(path, flags)?)?;

        info!(?path, results = store.count()?, "SqliteResultsStore opened");
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert(&self, record: &ResultRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO backtest_results
                (strategy, market_id, timestamp, signal, simulated_outcome, notes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            record.strategy.as_str(),
            record.market_id.as_str(),
            record.timestamp,
            record.signal,
            record.simulated_outcome,
            record.notes,
        ])?;
        Ok(())
    }

    pub fn select(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, StoreError> {
        let mut sql = String::from(
            "SELECT strategy, market_id, timestamp, signal, simulated_outcome, notes
             FROM backtest_results WHERE 1=1",
        );
        let mut values: Vec<Value> = Vec::new();

        if let Some(strategy_id) = &filter.strategy_id {
            sql.push_str(" AND strategy = ?");
            values.push(Value::Text(strategy_id.to_string()));
        }
        if let Some(market_id) = &filter.market_id {
            sql.push_str(" AND market_id = ?");
            values.push(Value::Text(market_id.to_string()));
        }
        if let Some(start) = &filter.start {
            sql.push_str(" AND timestamp >= ?");
            values.push(Value::Text(format_timestamp(start)));
        }
        if let Some(end) = &filter.end {
            sql.push_str(" AND timestamp <= ?");
            values.push(Value::Text(format_timestamp(end)));
        }
        sql.push_str(" ORDER BY timestamp ASC, id ASC LIMIT ?");
        values.push(Value::Integer(i64::try_from(filter.limit).unwrap_or(i64::MAX)));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = records.len(), "Retrieved backtest results");
        Ok(records)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM backtest_results", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    Ok(ResultRecord {
        strategy: StrategyId::from(row.get::<_, String>(0)?),
        market_id: MarketId::from(row.get::<_, String>(1)?),
        timestamp: row.get(2)?,
        signal: row.get(3)?,
        simulated_outcome: row.get(4)?,
        notes: row.get(5)?,
    })
}

#[async_trait]
impl ResultsStore for SqliteResultsStore {
    async fn append(&self, record: &ResultRecord) -> Result<(), StoreError> {
        self.insert(record)
    }

    async fn query(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, StoreError> {
        self.select(filter)
    }
}
