//! Market sequencer: replays one tick batch per market through a single
//! playback session, aggregating per-market outcomes.

use crate::{
    config::MarketSelector,
    error::{BacktestError, ConfigError, SchedulerError},
    scheduler::{PlaybackOutcome, PlaybackScheduler, TickHandler},
};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use pmreplay_data::{MarketId, TickQuery, TickSource, TimeRange};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How the replay of one market ended.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarketReplay {
    Completed { processed: u64 },
    Stopped { processed: u64 },
    /// The tick source failed; nothing was emitted for this market.
    Failed { reason: String },
}

impl MarketReplay {
    pub fn processed(&self) -> u64 {
        match self {
            MarketReplay::Completed { processed } | MarketReplay::Stopped { processed } => {
                *processed
            }
            MarketReplay::Failed { .. } => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MarketReplay::Failed { .. })
    }
}

impl From<PlaybackOutcome> for MarketReplay {
    fn from(outcome: PlaybackOutcome) -> Self {
        match outcome {
            PlaybackOutcome::Completed(processed) => MarketReplay::Completed { processed },
            PlaybackOutcome::Stopped(processed) => MarketReplay::Stopped { processed },
        }
    }
}

/// Per-market outcomes of a sequenced run, in replay order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SequenceReport {
    pub markets: IndexMap<MarketId, MarketReplay>,
    /// True if a stop halted the sequence.
    pub stopped: bool,
}

impl SequenceReport {
    pub fn total_processed(&self) -> u64 {
        self.markets.values().map(MarketReplay::processed).sum()
    }

    /// `market_id → processed` counts.
    pub fn counts(&self) -> IndexMap<MarketId, u64> {
        self.markets
            .iter()
            .map(|(market_id, replay)| (market_id.clone(), replay.processed()))
            .collect()
    }
}

/// Resolve a selector against the markets known to `source`.
///
/// Explicit ids are de-duplicated in order and must all be known; otherwise
/// the run fails before any tick is emitted.
pub async fn resolve_markets<Source>(
    source: &Source,
    selector: &MarketSelector,
) -> Result<Vec<MarketId>, BacktestError>
where
    Source: TickSource + ?Sized,
{
    let known = source.list_market_ids().await?;

    match selector {
        MarketSelector::All => Ok(known),
        MarketSelector::Markets(requested) => {
            let known: IndexSet<MarketId> = known.into_iter().collect();
            let requested = requested.iter().unique().cloned().collect::<Vec<_>>();

            match requested.iter().find(|market_id| !known.contains(*market_id)) {
                Some(unknown) => Err(ConfigError::UnknownMarket(unknown.clone()).into()),
                None => Ok(requested),
            }
        }
    }
}

/// Iterates markets through one [`PlaybackScheduler`] session.
#[derive(Debug)]
pub struct MarketSequencer<'a, Source: ?Sized> {
    source: &'a Source,
    range: TimeRange,
    limit_per_market: usize,
}

impl<'a, Source> MarketSequencer<'a, Source>
where
    Source: TickSource + ?Sized,
{
    pub fn new(source: &'a Source, range: TimeRange, limit_per_market: usize) -> Self {
        Self {
            source,
            range,
            limit_per_market,
        }
    }

    /// Replay `markets` in order as a single session.
    ///
    /// A source failure is recorded against its market and the sequence moves
    /// on. A stop halts the whole sequence; markets not yet reached are absent
    /// from the report.
    pub async fn run<H>(
        &self,
        scheduler: &PlaybackScheduler,
        markets: &[MarketId],
        handler: &mut H,
    ) -> Result<SequenceReport, SchedulerError>
    where
        H: TickHandler + ?Sized,
    {
        scheduler.start()?;
        let handle = scheduler.handle();
        let mut report = SequenceReport::default();

        for market_id in markets {
            if handle.is_stopped() {
                report.stopped = true;
                break;
            }
            scheduler.enter_market(market_id);

            let query = TickQuery::new(market_id.clone(), self.range, self.limit_per_market);
            let ticks = match self.source.fetch(&query).await {
                Ok(ticks) => ticks,
                Err(error) => {
                    warn!(%market_id, %error, "Tick source failed, skipping market");
                    report.markets.insert(
                        market_id.clone(),
                        MarketReplay::Failed {
                            reason: error.to_string(),
                        },
                    );
                    continue;
                }
            };

            info!(%market_id, ticks = ticks.len(), speed = %handle.speed(), "Replaying market");
            let outcome = scheduler.play(&ticks, handler).await;
            info!(%market_id, processed = outcome.processed(), stopped = outcome.is_stopped(), "Market replay finished");

            report.markets.insert(market_id.clone(), outcome.into());
            if outcome.is_stopped() {
                report.stopped = true;
                break;
            }
        }

        // A stop during the final tick's handler still halts the session
        report.stopped |= handle.is_stopped();
        scheduler.finish();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speed::PlaybackSpeed;
    use chrono::{TimeZone, Utc};
    use pmreplay_data::{InMemoryTickSource, Tick};
    use rust_decimal_macros::dec;

    fn source() -> InMemoryTickSource {
        InMemoryTickSource::from_ticks((0..3).flat_map(|second| {
            ["m1", "m2"].map(|market| {
                Tick::new(
                    market,
                    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, second).unwrap(),
                    dec!(0.5),
                    dec!(0.5),
                    dec!(1),
                )
            })
        }))
    }

    #[tokio::test]
    async fn test_resolve_markets() {
        let source = source();
        assert_eq!(
            resolve_markets(&source, &MarketSelector::All).await.unwrap(),
            vec![MarketId::new("m1"), MarketId::new("m2")]
        );
        assert_eq!(
            resolve_markets(&source, &MarketSelector::markets(["m2", "m1", "m2"]))
                .await
                .unwrap(),
            vec![MarketId::new("m2"), MarketId::new("m1")]
        );
        assert!(matches!(
            resolve_markets(&source, &MarketSelector::markets(["m1", "zz"])).await,
            Err(BacktestError::Config(ConfigError::UnknownMarket(_)))
        ));
    }

    #[tokio::test]
    async fn test_sequence_counts_per_market_and_limit() {
        let source = source();
        let scheduler = PlaybackScheduler::new(PlaybackSpeed::JumpToEvents);
        let sequencer = MarketSequencer::new(&source, TimeRange::unbounded(), 2);

        let mut seen = Vec::new();
        let report = sequencer
            .run(
                &scheduler,
                &[MarketId::new("m1"), MarketId::new("m2")],
                &mut |tick: &Tick| seen.push(tick.market_id.clone()),
            )
            .await
            .unwrap();

        assert!(!report.stopped);
        assert_eq!(report.total_processed(), 4);
        assert_eq!(report.counts()[&MarketId::new("m1")], 2);
        assert_eq!(seen.len(), 4);
        assert_eq!(scheduler.handle().processed(), 4);
    }

    #[tokio::test]
    async fn test_stop_halts_remaining_markets() {
        let source = source();
        let scheduler = PlaybackScheduler::new(PlaybackSpeed::JumpToEvents);
        let handle = scheduler.handle();
        let sequencer = MarketSequencer::new(&source, TimeRange::unbounded(), 100);

        let report = sequencer
            .run(
                &scheduler,
                &[MarketId::new("m1"), MarketId::new("m2")],
                &mut |_: &Tick| handle.stop(),
            )
            .await
            .unwrap();

        assert!(report.stopped);
        assert_eq!(
            report.markets[&MarketId::new("m1")],
            MarketReplay::Stopped { processed: 1 }
        );
        assert!(!report.markets.contains_key(&MarketId::new("m2")));
    }
}
