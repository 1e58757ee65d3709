use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Opaque identifier of a prediction market, stable across all of its ticks.
#[derive(
    Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Display, From, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct MarketId(pub SmolStr);

impl MarketId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for MarketId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MarketId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for MarketId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
