use super::{TickQuery, TickSource};
use crate::{error::DataError, market::MarketId, tick::Tick};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

/// Tick source holding per-market tick vectors in memory.
///
/// Ticks are kept sorted by timestamp on insert (stable for equal
/// timestamps) and markets are listed in sorted id order.
#[derive(Debug, Default)]
pub struct InMemoryTickSource {
    markets: RwLock<IndexMap<MarketId, Vec<Tick>>>,
}

impl InMemoryTickSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from an arbitrary collection of ticks.
    pub fn from_ticks(ticks: impl IntoIterator<Item = Tick>) -> Self {
        let source = Self::new();
        source.extend(ticks);
        source
    }

    pub fn insert(&self, tick: Tick) {
        self.extend(std::iter::once(tick));
    }

    pub fn extend(&self, ticks: impl IntoIterator<Item = Tick>) {
        let mut markets = self.markets.write();
        for tick in ticks {
            markets.entry(tick.market_id.clone()).or_default().push(tick);
        }
        for ticks in markets.values_mut() {
            ticks.sort_by_key(|tick| tick.timestamp);
        }
        markets.sort_keys();
    }

    /// Total ticks held across all markets.
    pub fn len(&self) -> usize {
        self.markets.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TickSource for InMemoryTickSource {
    async fn fetch(&self, query: &TickQuery) -> Result<Vec<Tick>, DataError> {
        let markets = self.markets.read();
        let Some(ticks) = markets.get(&query.market_id) else {
            return Ok(Vec::new());
        };

        Ok(ticks
            .iter()
            .filter(|tick| query.range.contains(&tick.timestamp))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn list_market_ids(&self) -> Result<Vec<MarketId>, DataError> {
        Ok(self.markets.read().keys().cloned().collect())
    }
}
