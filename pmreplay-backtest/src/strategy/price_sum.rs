use super::{Signal, StrategyEvaluator};
use crate::error::EvaluatorError;
use pmreplay_data::Tick;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for [`PriceSumEvaluator`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriceSumConfig {
    /// Taker fee charged on each leg, in basis points (e.g., 50 = 0.5%)
    pub fee_bps: u32,
    /// Edge below $1.00 that must remain after fees (e.g., 0.02 = 2c)
    pub min_edge: Decimal,
}

impl Default for PriceSumConfig {
    fn default() -> Self {
        Self {
            fee_bps: 0,
            min_edge: Decimal::new(2, 2), // 0.02
        }
    }
}

/// Taker fee for one leg of the trade.
///
/// Formula: contracts * price * (fee_bps / 10000)
pub fn taker_fee(price: Decimal, contracts: u32, fee_bps: u32) -> Decimal {
    let bps = Decimal::new(i64::from(fee_bps), 4); // 50 bps = 0.0050
    Decimal::from(contracts) * price * bps
}

/// Buy-both opportunity on a single tick.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PriceSumOpportunity {
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub price_sum: Decimal,
    pub fees: Decimal,
    /// $1.00 payout minus cost of both legs and fees, per contract
    pub edge: Decimal,
}

/// Signals when buying one YES and one NO contract costs less than the
/// guaranteed $1.00 payout by more than `min_edge`, after fees.
///
/// ```text
/// edge = 1.00 - (yes + no) - fee(yes) - fee(no)
/// ```
#[derive(Debug, Clone, Default)]
pub struct PriceSumEvaluator {
    pub config: PriceSumConfig,
}

impl PriceSumEvaluator {
    pub fn new(config: PriceSumConfig) -> Self {
        Self { config }
    }

    pub fn opportunity(&self, tick: &Tick) -> Option<PriceSumOpportunity> {
        let fees = taker_fee(tick.yes_price, 1, self.config.fee_bps)
            + taker_fee(tick.no_price, 1, self.config.fee_bps);
        let price_sum = tick.price_sum();
        let edge = Decimal::ONE - price_sum - fees;

        (edge > self.config.min_edge).then_some(PriceSumOpportunity {
            yes_price: tick.yes_price,
            no_price: tick.no_price,
            price_sum,
            fees,
            edge,
        })
    }
}

impl StrategyEvaluator for PriceSumEvaluator {
    fn evaluate(&mut self, tick: &Tick) -> Result<Option<Signal>, EvaluatorError> {
        if !tick.is_well_formed() {
            return Err(EvaluatorError::MalformedTick {
                market_id: tick.market_id.clone(),
                reason: format!(
                    "prices must lie in [0, 1], got yes={} no={}",
                    tick.yes_price, tick.no_price
                ),
            });
        }

        self.opportunity(tick)
            .map(|opportunity| {
                let notes = format!(
                    "YES+NO {} leaves {} after fees",
                    opportunity.price_sum, opportunity.edge
                );
                Signal::from_payload(&opportunity).map(|signal| signal.with_notes(notes))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn tick(yes: Decimal, no: Decimal) -> Tick {
        Tick::new("m1", Utc::now(), yes, no, dec!(100))
    }

    #[test]
    fn test_taker_fee() {
        // 10 contracts at 0.40 with 50 bps: 10 * 0.40 * 0.005 = 0.02
        assert_eq!(taker_fee(dec!(0.40), 10, 50), dec!(0.02));
        assert_eq!(taker_fee(dec!(0.40), 10, 0), Decimal::ZERO);
    }

    #[test]
    fn test_detects_edge_after_fees() {
        let mut evaluator = PriceSumEvaluator::new(PriceSumConfig {
            fee_bps: 100,
            min_edge: dec!(0.02),
        });

        // 1 - 0.90 - (0.0045 + 0.0045) = 0.091
        let signal = evaluator
            .evaluate(&tick(dec!(0.45), dec!(0.45)))
            .unwrap()
            .unwrap();
        let opportunity: PriceSumOpportunity = serde_json::from_value(signal.payload).unwrap();
        assert_eq!(opportunity.fees, dec!(0.009));
        assert_eq!(opportunity.edge, dec!(0.091));
    }

    #[test]
    fn test_no_signal_at_threshold() {
        let mut evaluator = PriceSumEvaluator::default();
        assert!(evaluator.evaluate(&tick(dec!(0.49), dec!(0.49))).unwrap().is_none());
        assert!(evaluator.evaluate(&tick(dec!(0.55), dec!(0.50))).unwrap().is_none());
        assert!(evaluator.evaluate(&tick(dec!(0.48), dec!(0.49))).unwrap().is_some());
    }

    #[test]
    fn test_malformed_tick_is_an_error() {
        let mut evaluator = PriceSumEvaluator::default();
        assert!(matches!(
            evaluator.evaluate(&tick(dec!(1.20), dec!(0.10))),
            Err(EvaluatorError::MalformedTick { .. })
        ));
    }
}
