//! Results store capability and its implementations.

use crate::{error::StoreError, sink::ResultRecord, strategy::StrategyId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pmreplay_data::{MarketId, timestamp::format_timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod memory;
pub mod sqlite;

/// Default maximum number of records returned by a query.
pub const DEFAULT_QUERY_LIMIT: usize = 1000;

/// Destination of persisted backtest results.
///
/// Implementations serialise concurrent calls internally.
#[async_trait]
pub trait ResultsStore: Send + Sync {
    async fn append(&self, record: &ResultRecord) -> Result<(), StoreError>;

    /// Records matching `filter`, oldest first.
    async fn query(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, StoreError>;
}

#[async_trait]
impl<T> ResultsStore for Arc<T>
where
    T: ResultsStore + ?Sized,
{
    async fn append(&self, record: &ResultRecord) -> Result<(), StoreError> {
        self.as_ref().append(record).await
    }

    async fn query(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, StoreError> {
        self.as_ref().query(filter).await
    }
}

/// Filter for [`ResultsStore::query`]. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResultFilter {
    pub strategy_id: Option<StrategyId>,
    pub market_id: Option<MarketId>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for ResultFilter {
    fn default() -> Self {
        Self {
            strategy_id: None,
            market_id: None,
            start: None,
            end: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl ResultFilter {
    pub fn strategy(mut self, strategy_id: impl Into<StrategyId>) -> Self {
        self.strategy_id = Some(strategy_id.into());
        self
    }

    pub fn market(mut self, market_id: impl Into<MarketId>) -> Self {
        self.market_id = Some(market_id.into());
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// True if `record` satisfies every criterion except the limit.
    pub fn matches(&self, record: &ResultRecord) -> bool {
        let after_start = || {
            self.start
                .is_none_or(|start| record.timestamp >= format_timestamp(&start))
        };
        let before_end = || {
            self.end
                .is_none_or(|end| record.timestamp <= format_timestamp(&end))
        };

        self.strategy_id
            .as_ref()
            .is_none_or(|strategy_id| &record.strategy == strategy_id)
            && self
                .market_id
                .as_ref()
                .is_none_or(|market_id| &record.market_id == market_id)
            && after_start()
            && before_end()
    }
}
