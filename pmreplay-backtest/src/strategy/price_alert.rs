use super::{Signal, StrategyEvaluator};
use crate::error::EvaluatorError;
use pmreplay_data::{MarketId, Tick};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the target a price alert waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDirection {
    Above,
    Below,
}

/// A single YES price alert on one market.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceAlert {
    pub market_id: MarketId,
    pub direction: AlertDirection,
    pub target_price: Decimal,
}

impl PriceAlert {
    pub fn new(
        market_id: impl Into<MarketId>,
        direction: AlertDirection,
        target_price: Decimal,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            direction,
            target_price,
        }
    }

    /// Strict crossing: a price sitting exactly on the target does not fire.
    fn is_crossed_by(&self, yes_price: Decimal) -> bool {
        match self.direction {
            AlertDirection::Above => yes_price > self.target_price,
            AlertDirection::Below => yes_price < self.target_price,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct AlertPayload<'a> {
    #[serde(flatten)]
    alert: &'a PriceAlert,
    yes_price: Decimal,
}

/// Fires once per run for each alert whose target the YES price crosses.
#[derive(Debug, Clone, Default)]
pub struct PriceAlertEvaluator {
    alerts: Vec<(PriceAlert, bool)>,
}

impl PriceAlertEvaluator {
    pub fn new(alerts: impl IntoIterator<Item = PriceAlert>) -> Self {
        Self {
            alerts: alerts.into_iter().map(|alert| (alert, false)).collect(),
        }
    }

    pub fn add_alert(&mut self, alert: PriceAlert) {
        self.alerts.push((alert, false));
    }

    /// Number of alerts that have fired in the current run.
    pub fn triggered(&self) -> usize {
        self.alerts.iter().filter(|(_, triggered)| *triggered).count()
    }
}

impl StrategyEvaluator for PriceAlertEvaluator {
    fn evaluate(&mut self, tick: &Tick) -> Result<Option<Signal>, EvaluatorError> {
        let Some((alert, triggered)) = self.alerts.iter_mut().find(|(alert, triggered)| {
            !*triggered && alert.market_id == tick.market_id && alert.is_crossed_by(tick.yes_price)
        }) else {
            return Ok(None);
        };

        *triggered = true;
        let notes = format!(
            "YES {} {:?} target {}",
            tick.yes_price, alert.direction, alert.target_price
        );
        let payload = AlertPayload {
            alert,
            yes_price: tick.yes_price,
        };
        Ok(Some(Signal::from_payload(&payload)?.with_notes(notes)))
    }

    fn reset(&mut self) {
        for (_, triggered) in &mut self.alerts {
            *triggered = false;
        }
    }
}
