//! Classified backtest results and the outcome classification seam.

use crate::strategy::{Signal, StrategyId};
use chrono::{DateTime, Utc};
use derive_more::Display;
use pmreplay_data::{MarketId, Tick};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a signal's timing related to the opportunity it reacted to.
///
/// Only [`SimulatedOutcome::WouldTrigger`] is produced. The remaining variants are
/// reserved until a rule comparing signals against ground truth exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedOutcome {
    #[display("would_trigger")]
    WouldTrigger,
    #[display("early")]
    Early,
    #[display("late")]
    Late,
    #[display("wrong")]
    Wrong,
}

impl FromStr for SimulatedOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "would_trigger" => Ok(SimulatedOutcome::WouldTrigger),
            "early" => Ok(SimulatedOutcome::Early),
            "late" => Ok(SimulatedOutcome::Late),
            "wrong" => Ok(SimulatedOutcome::Wrong),
            other => Err(format!("unknown simulated outcome: {other}")),
        }
    }
}

/// Rule deciding whether a signal on a tick earns a given outcome.
pub type OutcomeRule = fn(&Tick, &Signal) -> bool;

/// Function table mapping outcome kinds to their classification rules.
///
/// Rules are consulted in insertion order and the first match wins.
#[derive(Clone)]
pub struct OutcomeClassifier {
    rules: Vec<(SimulatedOutcome, OutcomeRule)>,
}

impl std::fmt::Debug for OutcomeClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|(outcome, _)| outcome))
            .finish()
    }
}

/// Any signal that reached the router would have triggered.
fn would_trigger(_: &Tick, _: &Signal) -> bool {
    true
}

impl Default for OutcomeClassifier {
    fn default() -> Self {
        Self {
            rules: vec![(SimulatedOutcome::WouldTrigger, would_trigger as OutcomeRule)],
        }
    }
}

impl OutcomeClassifier {
    pub fn classify(&self, tick: &Tick, signal: &Signal) -> SimulatedOutcome {
        self.rules
            .iter()
            .find(|(_, rule)| rule(tick, signal))
            .map(|(outcome, _)| *outcome)
            .unwrap_or(SimulatedOutcome::WouldTrigger)
    }
}

/// One classified signal produced during a backtest.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestResult {
    pub strategy_id: StrategyId,
    pub market_id: MarketId,
    /// Copied from the source tick.
    pub timestamp: DateTime<Utc>,
    pub signal: serde_json::Value,
    pub simulated_outcome: SimulatedOutcome,
    pub notes: String,
}

impl BacktestResult {
    pub fn new(
        strategy_id: StrategyId,
        tick: &Tick,
        signal: Signal,
        simulated_outcome: SimulatedOutcome,
    ) -> Self {
        Self {
            strategy_id,
            market_id: tick.market_id.clone(),
            timestamp: tick.timestamp,
            signal: signal.payload,
            simulated_outcome,
            notes: signal.notes,
        }
    }
}
