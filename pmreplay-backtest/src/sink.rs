//! Result sink: normalises classified results into persistable records.

use crate::{
    error::StoreError,
    result::{BacktestResult, SimulatedOutcome},
    store::ResultsStore,
    strategy::StrategyId,
};
use pmreplay_data::{
    MarketId,
    timestamp::{format_timestamp, parse_timestamp},
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Persistable form of a [`BacktestResult`].
///
/// `signal` holds JSON text and `timestamp` fixed-width RFC 3339 UTC text, so
/// records sort chronologically as strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResultRecord {
    pub strategy: StrategyId,
    pub market_id: MarketId,
    pub timestamp: String,
    pub signal: String,
    pub simulated_outcome: String,
    pub notes: String,
}

impl ResultRecord {
    pub fn from_result(result: &BacktestResult) -> Result<Self, StoreError> {
        Ok(Self {
            strategy: result.strategy_id.clone(),
            market_id: result.market_id.clone(),
            timestamp: format_timestamp(&result.timestamp),
            signal: serde_json::to_string(&result.signal)?,
            simulated_outcome: result.simulated_outcome.to_string(),
            notes: result.notes.clone(),
        })
    }

    pub fn into_result(self) -> Result<BacktestResult, StoreError> {
        Ok(BacktestResult {
            timestamp: parse_timestamp(&self.timestamp)?,
            signal: serde_json::from_str(&self.signal)?,
            simulated_outcome: self
                .simulated_outcome
                .parse::<SimulatedOutcome>()
                .map_err(StoreError::Malformed)?,
            strategy_id: self.strategy,
            market_id: self.market_id,
            notes: self.notes,
        })
    }
}

/// Forwards results to a [`ResultsStore`], counting rather than propagating
/// write failures so replay continues.
#[derive(Debug)]
pub struct ResultSink<Store> {
    store: Store,
    written: u64,
    failed_writes: u64,
}

impl<Store> ResultSink<Store>
where
    Store: ResultsStore,
{
    pub fn new(store: Store) -> Self {
        Self {
            store,
            written: 0,
            failed_writes: 0,
        }
    }

    /// Persist one result. Returns `false` if the write failed.
    pub async fn persist(&mut self, result: &BacktestResult) -> bool {
        let outcome = match ResultRecord::from_result(result) {
            Ok(record) => self.store.append(&record).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(()) => {
                self.written += 1;
                true
            }
            Err(error) => {
                self.failed_writes += 1;
                error!(
                    strategy_id = %result.strategy_id,
                    market_id = %result.market_id,
                    %error,
                    failed_writes = self.failed_writes,
                    "Failed to persist backtest result"
                );
                false
            }
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes
    }

    /// Zero the counters at the start of a run.
    pub fn reset_counters(&mut self) {
        self.written = 0;
        self.failed_writes = 0;
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        store::{ResultFilter, memory::InMemoryResultsStore},
        strategy::Signal,
    };
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use pmreplay_data::Tick;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn result() -> BacktestResult {
        let tick = Tick::new(
            "m1",
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            dec!(0.4),
            dec!(0.5),
            dec!(1),
        );
        BacktestResult::new(
            StrategyId::new("s1"),
            &tick,
            Signal::new(json!({ "edge": "0.1" })).with_notes("note"),
            SimulatedOutcome::WouldTrigger,
        )
    }

    struct FailingStore;

    #[async_trait]
    impl ResultsStore for FailingStore {
        async fn append(&self, _: &ResultRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }

        async fn query(&self, _: &ResultFilter) -> Result<Vec<ResultRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_record_encoding() {
        let record = ResultRecord::from_result(&result()).unwrap();
        assert_eq!(record.timestamp, "2024-03-01T12:00:00.000000000Z");
        assert_eq!(record.signal, r#"{"edge":"0.1"}"#);
        assert_eq!(record.simulated_outcome, "would_trigger");
        assert_eq!(record.into_result().unwrap(), result());
    }

    #[test]
    fn test_record_keeps_nanosecond_timestamps() {
        let mut precise = result();
        precise.timestamp += chrono::Duration::nanoseconds(123_456_789);

        let record = ResultRecord::from_result(&precise).unwrap();
        assert_eq!(record.timestamp, "2024-03-01T12:00:00.123456789Z");
        assert_eq!(record.into_result().unwrap(), precise);
    }

    #[test]
    fn test_malformed_record_is_rejected() {
        let mut record = ResultRecord::from_result(&result()).unwrap();
        record.simulated_outcome = "triggered".into();
        assert!(matches!(
            record.into_result(),
            Err(StoreError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_sink_counts_writes_and_failures() {
        let mut sink = ResultSink::new(InMemoryResultsStore::new());
        assert!(sink.persist(&result()).await);
        assert_eq!(sink.written(), 1);
        assert_eq!(sink.store().len(), 1);

        let mut failing = ResultSink::new(FailingStore);
        assert!(!failing.persist(&result()).await);
        assert!(!failing.persist(&result()).await);
        assert_eq!(failing.failed_writes(), 2);
        assert_eq!(failing.written(), 0);

        failing.reset_counters();
        assert_eq!(failing.failed_writes(), 0);
    }
}
