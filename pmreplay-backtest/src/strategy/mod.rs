//! Pluggable strategy evaluators invoked once per replayed tick.

use crate::error::EvaluatorError;
use derive_more::{Display, From};
use pmreplay_data::Tick;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub mod depth;
pub mod price_alert;
pub mod price_sum;

/// Identifier under which an evaluator is registered.
#[derive(
    Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Display, From, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct StrategyId(pub SmolStr);

impl StrategyId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for StrategyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StrategyId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Strategy specific output for one tick.
///
/// The engine never inspects `payload`; it is persisted as opaque JSON.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Signal {
    pub payload: serde_json::Value,
    #[serde(default)]
    pub notes: String,
}

impl Signal {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            notes: String::new(),
        }
    }

    /// Build a signal from any serialisable payload.
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Self, EvaluatorError> {
        Ok(Self::new(serde_json::to_value(payload)?))
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Capability: inspect a tick and optionally produce a [`Signal`].
///
/// Evaluators must not block; a failing evaluator only loses its own signal
/// for the tick it failed on.
pub trait StrategyEvaluator: Send {
    fn evaluate(&mut self, tick: &Tick) -> Result<Option<Signal>, EvaluatorError>;

    /// Clear any per-run state. Called before every run.
    fn reset(&mut self) {}
}

impl<F> StrategyEvaluator for F
where
    F: FnMut(&Tick) -> Result<Option<Signal>, EvaluatorError> + Send,
{
    fn evaluate(&mut self, tick: &Tick) -> Result<Option<Signal>, EvaluatorError> {
        self(tick)
    }
}
