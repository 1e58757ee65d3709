use crate::{
    router::StrategyStats,
    sequencer::{MarketReplay, SequenceReport},
    speed::PlaybackSpeed,
    strategy::StrategyId,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use pmreplay_data::MarketId;
use serde::{Deserialize, Serialize};

/// Statistics returned by a replay or backtest run.
///
/// Partial results from a stop or a source failure are always included.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunSummary {
    pub speed: PlaybackSpeed,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcome per market, in replay order
    pub markets: IndexMap<MarketId, MarketReplay>,
    pub ticks_processed: u64,
    /// Markets with at least one replayed tick
    pub markets_analyzed: usize,
    pub signals: IndexMap<StrategyId, u64>,
    pub evaluator_failures: IndexMap<StrategyId, u64>,
    pub results_written: u64,
    pub failed_writes: u64,
    pub stopped: bool,
}

impl RunSummary {
    pub(crate) fn new(
        speed: PlaybackSpeed,
        started_at: DateTime<Utc>,
        report: SequenceReport,
        strategy_stats: IndexMap<StrategyId, StrategyStats>,
        results_written: u64,
        failed_writes: u64,
    ) -> Self {
        let (signals, evaluator_failures) = strategy_stats
            .into_iter()
            .map(|(strategy_id, stats)| {
                ((strategy_id.clone(), stats.signals), (strategy_id, stats.failures))
            })
            .unzip();

        Self {
            speed,
            started_at,
            finished_at: Utc::now(),
            ticks_processed: report.total_processed(),
            markets_analyzed: report.markets.values().filter(|m| m.processed() > 0).count(),
            markets: report.markets,
            signals,
            evaluator_failures,
            results_written,
            failed_writes,
            stopped: report.stopped,
        }
    }

    /// `market_id → processed` counts.
    pub fn counts(&self) -> IndexMap<MarketId, u64> {
        self.markets
            .iter()
            .map(|(market_id, replay)| (market_id.clone(), replay.processed()))
            .collect()
    }

    pub fn failed_markets(&self) -> impl Iterator<Item = (&MarketId, &str)> {
        self.markets.iter().filter_map(|(market_id, replay)| match replay {
            MarketReplay::Failed { reason } => Some((market_id, reason.as_str())),
            _ => None,
        })
    }

    pub fn total_signals(&self) -> u64 {
        self.signals.values().sum()
    }

    pub fn signals_for(&self, strategy_id: &StrategyId) -> u64 {
        self.signals.get(strategy_id).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_from_report() {
        let mut report = SequenceReport::default();
        report
            .markets
            .insert(MarketId::new("m1"), MarketReplay::Completed { processed: 4 });
        report.markets.insert(
            MarketId::new("m2"),
            MarketReplay::Failed {
                reason: "unreachable".into(),
            },
        );
        report
            .markets
            .insert(MarketId::new("m3"), MarketReplay::Completed { processed: 0 });

        let stats = IndexMap::from([(
            StrategyId::new("s1"),
            StrategyStats {
                signals: 3,
                failures: 1,
            },
        )]);

        let summary = RunSummary::new(PlaybackSpeed::JumpToEvents, Utc::now(), report, stats, 3, 0);
        assert_eq!(summary.ticks_processed, 4);
        assert_eq!(summary.markets_analyzed, 1);
        assert_eq!(summary.signals_for(&StrategyId::new("s1")), 3);
        assert_eq!(summary.evaluator_failures[&StrategyId::new("s1")], 1);
        assert_eq!(summary.total_signals(), 3);
        assert_eq!(
            summary.failed_markets().collect::<Vec<_>>(),
            vec![(&MarketId::new("m2"), "unreachable")]
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["markets"]["m2"]["status"], "failed");
        assert_eq!(json["markets"]["m1"]["processed"], 4);
    }
}
