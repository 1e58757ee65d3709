use crate::market::MarketId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One recorded price observation for a prediction market.
///
/// `yes_price` and `no_price` are each in `[0, 1]` but are not required to
/// sum to one. `depth_summary` is passed through the replay untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Tick {
    pub market_id: MarketId,
    pub timestamp: DateTime<Utc>,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub volume: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_summary: Option<serde_json::Value>,
}

impl Tick {
    /// Create a tick without a depth summary.
    pub fn new(
        market_id: impl Into<MarketId>,
        timestamp: DateTime<Utc>,
        yes_price: Decimal,
        no_price: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            timestamp,
            yes_price,
            no_price,
            volume,
            depth_summary: None,
        }
    }

    /// Attach an order book depth summary.
    pub fn with_depth_summary(mut self, depth_summary: serde_json::Value) -> Self {
        self.depth_summary = Some(depth_summary);
        self
    }

    /// Sum of the YES and NO prices.
    pub fn price_sum(&self) -> Decimal {
        self.yes_price + self.no_price
    }

    /// True if both prices lie within `[0, 1]` and volume is non-negative.
    pub fn is_well_formed(&self) -> bool {
        let unit = Decimal::ZERO..=Decimal::ONE;
        unit.contains(&self.yes_price)
            && unit.contains(&self.no_price)
            && self.volume >= Decimal::ZERO
    }
}
