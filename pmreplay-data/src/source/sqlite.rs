//! SQLite history store for recorded market ticks.
//!
//! One `market_ticks` table indexed on `(market_id, timestamp)`. Prices and
//! volume are stored as REAL, the depth summary as JSON text and the
//! timestamp as fixed-width RFC 3339 text (see [`crate::timestamp`]).
//! Rows written in other timestamp encodings are rewritten on open, so range
//! filters and pruning compare like with like.

use super::{TickQuery, TickSource};
use crate::{
    error::DataError,
    market::MarketId,
    tick::Tick,
    timestamp::{TIMESTAMP_WIDTH, format_timestamp, parse_timestamp},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use rusqlite::{Connection, OpenFlags, Row, Statement, params, params_from_iter, types::Value};
use std::path::Path;
use tracing::{debug, info, warn};

/// Default location of the history database.
pub const DEFAULT_HISTORY_DB_PATH: &str = "data/market_history.db";

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS market_ticks (
    id INTEGER PRIMARY KEY,
    market_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    yes_price REAL NOT NULL,
    no_price REAL NOT NULL,
    volume REAL NOT NULL,
    depth_summary TEXT
);

CREATE INDEX IF NOT EXISTS idx_market_timestamp
    ON market_ticks(market_id, timestamp);
"#;

const NON_CANONICAL_SQL: &str = "SELECT id, timestamp FROM market_ticks
    WHERE length(timestamp) != ?1
       OR substr(timestamp, 11, 1) != 'T'
       OR substr(timestamp, -1) != 'Z'";

const INSERT_SQL: &str = "INSERT INTO market_ticks
    (market_id, timestamp, yes_price, no_price, volume, depth_summary)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

/// Persistent tick history backed by SQLite.
pub struct SqliteTickStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteTickStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTickStore").finish_non_exhaustive()
    }
}

impl SqliteTickStore {
    /// Open (or create) the history database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        let store = Self::with_connection(conn)?;

        info!(?path, ticks = store.tick_count(None)?, "SqliteTickStore opened");
        Ok(store)
    }

    /// Open a private in-memory history database.
    pub fn in_memory() -> Result<Self, DataError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DataError> {
        conn.execute_batch(SCHEMA_SQL)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.normalise_timestamps()?;
        Ok(store)
    }

    /// Rewrite timestamps stored in any other encoding (naive ISO, `+00:00`
    /// offsets, shorter fractions) into the fixed-width form, returning the
    /// number of rows rewritten. Unparseable rows are left untouched.
    pub fn normalise_timestamps(&self) -> Result<usize, DataError> {
        let mut conn = self.conn.lock();
        let stale = {
            let mut stmt = conn.prepare(NON_CANONICAL_SQL)?;
            stmt.query_map(params![TIMESTAMP_WIDTH as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?
        };
        if stale.is_empty() {
            return Ok(0);
        }

        let tx = conn.transaction()?;
        let mut normalised = 0;
        {
            let mut stmt = tx.prepare("UPDATE market_ticks SET timestamp = ?1 WHERE id = ?2")?;
            for (id, raw) in &stale {
                match parse_timestamp(raw) {
                    Ok(timestamp) => {
                        normalised += stmt.execute(params![format_timestamp(&timestamp), id])?;
                    }
                    Err(error) => warn!(id, %error, "Leaving unparseable tick timestamp"),
                }
            }
        }
        tx.commit()?;

        if normalised > 0 {
            info!(normalised, "Normalised stored tick timestamps");
        }
        Ok(normalised)
    }

    /// Append a single tick.
    pub fn append(&self, tick: &Tick) -> Result<(), DataError> {
        let row = TickRow::encode(tick)?;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(INSERT_SQL)?;
        row.insert(&mut stmt)?;
        debug!(market_id = %tick.market_id, timestamp = %row.timestamp, "Appended tick");
        Ok(())
    }

    /// Append a batch of ticks in one transaction, returning the number inserted.
    pub fn append_batch(&self, ticks: &[Tick]) -> Result<usize, DataError> {
        if ticks.is_empty() {
            return Ok(0);
        }

        // Serialise outside the lock
        let rows = ticks
            .iter()
            .map(TickRow::encode)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(INSERT_SQL)?;
            for row in &rows {
                inserted += row.insert(&mut stmt)?;
            }
        }
        tx.commit()?;

        debug!(inserted, "Batch appended ticks");
        Ok(inserted)
    }

    /// Read ticks for one market, oldest first.
    pub fn ticks(&self, query: &TickQuery) -> Result<Vec<Tick>, DataError> {
        let mut sql = String::from(
            "SELECT market_id, timestamp, yes_price, no_price, volume, depth_summary
             FROM market_ticks WHERE market_id = ?",
        );
        let mut values: Vec<Value> = vec![Value::Text(query.market_id.to_string())];

        if let Some(start) = query.range.start() {
            sql.push_str(" AND timestamp >= ?");
            values.push(Value::Text(format_timestamp(&start)));
        }
        if let Some(end) = query.range.end() {
            sql.push_str(" AND timestamp <= ?");
            values.push(Value::Text(format_timestamp(&end)));
        }
        sql.push_str(" ORDER BY timestamp ASC, id ASC LIMIT ?");
        values.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), TickRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let ticks = rows
            .into_iter()
            .map(TickRow::decode)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(market_id = %query.market_id, count = ticks.len(), "Retrieved ticks");
        Ok(ticks)
    }

    /// Distinct market ids in sorted order.
    pub fn market_ids(&self) -> Result<Vec<MarketId>, DataError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT DISTINCT market_id FROM market_ticks ORDER BY market_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|id| id.map(MarketId::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Count stored ticks, optionally for a single market.
    pub fn tick_count(&self, market_id: Option<&MarketId>) -> Result<u64, DataError> {
        let conn = self.conn.lock();
        let count: i64 = match market_id {
            Some(market_id) => conn.query_row(
                "SELECT COUNT(*) FROM market_ticks WHERE market_id = ?1",
                params![market_id.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM market_ticks", [], |row| row.get(0))?,
        };
        Ok(count.max(0) as u64)
    }

    /// Delete ticks strictly older than `cutoff`, returning the number removed.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, DataError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM market_ticks WHERE timestamp < ?1",
            params![format_timestamp(&cutoff)],
        )?;
        if deleted > 0 {
            info!(deleted, %cutoff, "Pruned old ticks");
        }
        Ok(deleted)
    }
}

#[async_trait]
impl TickSource for SqliteTickStore {
    async fn fetch(&self, query: &TickQuery) -> Result<Vec<Tick>, DataError> {
        self.ticks(query)
    }

    async fn list_market_ids(&self) -> Result<Vec<MarketId>, DataError> {
        self.market_ids()
    }
}

/// Storage representation of a [`Tick`].
struct TickRow {
    market_id: String,
    timestamp: String,
    yes_price: f64,
    no_price: f64,
    volume: f64,
    depth_summary: Option<String>,
}

impl TickRow {
    fn encode(tick: &Tick) -> Result<Self, DataError> {
        let real = |value: Decimal, field: &str| {
            value.to_f64().ok_or_else(|| DataError::Corrupt {
                market_id: tick.market_id.to_string(),
                reason: format!("{field} {value} is not representable as REAL"),
            })
        };

        Ok(Self {
            market_id: tick.market_id.to_string(),
            timestamp: format_timestamp(&tick.timestamp),
            yes_price: real(tick.yes_price, "yes_price")?,
            no_price: real(tick.no_price, "no_price")?,
            volume: real(tick.volume, "volume")?,
            depth_summary: tick
                .depth_summary
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        })
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.market_id,
            self.timestamp,
            self.yes_price,
            self.no_price,
            self.volume,
            self.depth_summary,
        ])
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            market_id: row.get(0)?,
            timestamp: row.get(1)?,
            yes_price: row.get(2)?,
            no_price: row.get(3)?,
            volume: row.get(4)?,
            depth_summary: row.get(5)?,
        })
    }

    fn decode(self) -> Result<Tick, DataError> {
        let decimal = |value: f64, field: &str| {
            Decimal::from_f64(value).ok_or_else(|| DataError::Corrupt {
                market_id: self.market_id.clone(),
                reason: format!("{field} {value} is not a finite number"),
            })
        };

        let yes_price = decimal(self.yes_price, "yes_price")?;
        let no_price = decimal(self.no_price, "no_price")?;
        let volume = decimal(self.volume, "volume")?;

        // Rows that are not valid JSON are passed through as a JSON string
        let depth_summary = self.depth_summary.as_deref().map(|raw| {
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_owned()))
        });

        Ok(Tick {
            timestamp: parse_timestamp(&self.timestamp)?,
            market_id: MarketId::from(self.market_id),
            yes_price,
            no_price,
            volume,
            depth_summary,
        })
    }
}
