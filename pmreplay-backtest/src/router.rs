//! Dispatches emitted ticks to every registered strategy evaluator.

use crate::{
    error::EvaluatorError,
    result::{BacktestResult, OutcomeClassifier},
    strategy::{Signal, StrategyEvaluator, StrategyId},
};
use indexmap::IndexMap;
use pmreplay_data::Tick;
use serde::{Deserialize, Serialize};
use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};
use tracing::{error, info};

/// Per-strategy counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StrategyStats {
    pub signals: u64,
    pub failures: u64,
}

struct RegisteredStrategy {
    evaluator: Box<dyn StrategyEvaluator>,
    stats: StrategyStats,
}

/// Registry of strategy evaluators keyed by [`StrategyId`].
///
/// Evaluators run in registration order. A failing or panicking evaluator is
/// logged and treated as producing no signal; the others still run.
#[derive(Default)]
pub struct StrategyRouter {
    strategies: IndexMap<StrategyId, RegisteredStrategy>,
    classifier: OutcomeClassifier,
}

impl fmt::Debug for StrategyRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRouter")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .field("classifier", &self.classifier)
            .finish()
    }
}

impl StrategyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(classifier: OutcomeClassifier) -> Self {
        Self {
            strategies: IndexMap::new(),
            classifier,
        }
    }

    /// Register an evaluator, replacing any previously registered under the same id.
    pub fn register<E>(&mut self, strategy_id: impl Into<StrategyId>, evaluator: E)
    where
        E: StrategyEvaluator + 'static,
    {
        self.register_boxed(strategy_id.into(), Box::new(evaluator));
    }

    pub fn register_boxed(&mut self, strategy_id: StrategyId, evaluator: Box<dyn StrategyEvaluator>) {
        info!(%strategy_id, "Strategy evaluator registered");
        self.strategies.insert(
            strategy_id,
            RegisteredStrategy {
                evaluator,
                stats: StrategyStats::default(),
            },
        );
    }

    pub fn unregister(&mut self, strategy_id: &StrategyId) -> bool {
        self.strategies.shift_remove(strategy_id).is_some()
    }

    pub fn strategy_ids(&self) -> impl Iterator<Item = &StrategyId> {
        self.strategies.keys()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Reset every evaluator and zero the per-strategy counters.
    pub fn reset(&mut self) {
        for strategy in self.strategies.values_mut() {
            strategy.evaluator.reset();
            strategy.stats = StrategyStats::default();
        }
    }

    /// Invoke every evaluator on `tick`, returning one classified result per signal.
    pub fn route(&mut self, tick: &Tick) -> Vec<BacktestResult> {
        let mut results = Vec::new();

        for (strategy_id, strategy) in &mut self.strategies {
            match evaluate_guarded(strategy.evaluator.as_mut(), tick) {
                Ok(Some(signal)) => {
                    strategy.stats.signals += 1;
                    let outcome = self.classifier.classify(tick, &signal);
                    results.push(BacktestResult::new(
                        strategy_id.clone(),
                        tick,
                        signal,
                        outcome,
                    ));
                }
                Ok(None) => {}
                Err(error) => {
                    strategy.stats.failures += 1;
                    error!(
                        %strategy_id,
                        market_id = %tick.market_id,
                        timestamp = %tick.timestamp,
                        %error,
                        "Strategy evaluator failed, treating as no signal"
                    );
                }
            }
        }

        results
    }

    pub fn stats(&self) -> IndexMap<StrategyId, StrategyStats> {
        self.strategies
            .iter()
            .map(|(strategy_id, strategy)| (strategy_id.clone(), strategy.stats))
            .collect()
    }
}

fn evaluate_guarded(
    evaluator: &mut dyn StrategyEvaluator,
    tick: &Tick,
) -> Result<Option<Signal>, EvaluatorError> {
    catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(tick)))
        .unwrap_or_else(|panic| Err(EvaluatorError::Panicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
