//! Recorded Prediction Market Data for the PmReplay Ecosystem
//!
//! This crate holds the normalised market price observations ([`Tick`]s) that
//! the replay engine re-emits, and the [`TickSource`] capability the engine
//! reads them through.
//!
//! # Key Components
//!
//! - [`Tick`]: One timestamped YES/NO price observation for a market
//! - [`MarketId`]: Opaque, stable market identifier
//! - [`TimeRange`]: Validated, optionally open-ended inclusive time range
//! - [`TickSource`]: Async capability returning ordered tick batches per market
//! - [`InMemoryTickSource`]: Tick source for tests and embedding
//! - [`SqliteTickStore`]: Persistent history store backed by SQLite
//!
//! # Example
//!
//! ```rust,ignore
//! use pmreplay_data::{MarketId, SqliteTickStore, TickQuery, TickSource, TimeRange};
//!
//! let store = SqliteTickStore::open("data/market_history.db")?;
//! let ticks = store
//!     .fetch(&TickQuery::new(MarketId::new("market_123"), TimeRange::unbounded(), 500))
//!     .await?;
//! ```

pub mod error;
pub mod market;
pub mod range;
pub mod source;
pub mod tick;
pub mod timestamp;

// Re-exports for convenience
pub use error::DataError;
pub use market::MarketId;
pub use range::TimeRange;
pub use source::{TickQuery, TickSource, memory::InMemoryTickSource, sqlite::SqliteTickStore};
pub use tick::Tick;
