use crate::{error::DataError, market::MarketId, range::TimeRange, tick::Tick};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// [`TickSource`] holding ticks in memory.
pub mod memory;

/// [`TickSource`] backed by the SQLite history store.
pub mod sqlite;

/// Request for one ordered batch of ticks for a single market.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TickQuery {
    pub market_id: MarketId,
    pub range: TimeRange,
    /// Maximum number of ticks returned, oldest first.
    pub limit: usize,
}

impl TickQuery {
    pub fn new(market_id: impl Into<MarketId>, range: TimeRange, limit: usize) -> Self {
        Self {
            market_id: market_id.into(),
            range,
            limit,
        }
    }
}

/// Source of recorded ticks consumed by the replay engine.
///
/// Implementations must return ticks sorted by timestamp ascending; the
/// engine never re-sorts. Each call is a self-contained request, and any
/// serialisation of concurrent access is the implementation's concern.
#[async_trait]
pub trait TickSource: Send + Sync {
    /// Fetch up to `query.limit` ticks for one market within `query.range`, oldest first.
    async fn fetch(&self, query: &TickQuery) -> Result<Vec<Tick>, DataError>;

    /// All market ids with recorded ticks, in a stable order.
    async fn list_market_ids(&self) -> Result<Vec<MarketId>, DataError>;
}

#[async_trait]
impl<T> TickSource for std::sync::Arc<T>
where
    T: TickSource + ?Sized,
{
    async fn fetch(&self, query: &TickQuery) -> Result<Vec<Tick>, DataError> {
        (**self).fetch(query).await
    }

    async fn list_market_ids(&self) -> Result<Vec<MarketId>, DataError> {
        (**self).list_market_ids().await
    }
}
