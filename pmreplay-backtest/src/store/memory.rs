use super::{ResultFilter, ResultsStore};
use crate::{error::StoreError, sink::ResultRecord};
use async_trait::async_trait;
use parking_lot::RwLock;

/// Results store holding records in memory, in append order.
#[derive(Debug, Default)]
pub struct InMemoryResultsStore {
    records: RwLock<Vec<ResultRecord>>,
}

impl InMemoryResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record appended so far.
    pub fn records(&self) -> Vec<ResultRecord> {
        self.records.read().clone()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

#[async_trait]
impl ResultsStore for InMemoryResultsStore {
    async fn append(&self, record: &ResultRecord) -> Result<(), StoreError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn query(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, StoreError> {
        let mut matching: Vec<_> = self
            .records
            .read()
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();

        // Stable, so equal timestamps keep append order
        matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        matching.truncate(filter.limit);
        Ok(matching)
    }
}
