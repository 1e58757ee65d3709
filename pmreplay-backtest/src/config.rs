//! Configuration types for replay and backtest runs.

use crate::{error::ConfigError, speed::PlaybackSpeed};
use chrono::{DateTime, Utc};
use pmreplay_data::{
    DataError, MarketId, TimeRange, source::sqlite::DEFAULT_HISTORY_DB_PATH,
    timestamp::parse_timestamp,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default cap on ticks fetched per market.
pub const DEFAULT_LIMIT_PER_MARKET: usize = 10_000;

/// Which markets a run replays.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSelector {
    /// Every market the tick source knows about.
    #[default]
    All,
    /// An explicit list, replayed in the given order.
    Markets(Vec<MarketId>),
}

impl MarketSelector {
    pub fn single(market_id: impl Into<MarketId>) -> Self {
        MarketSelector::Markets(vec![market_id.into()])
    }

    pub fn markets<I, M>(market_ids: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MarketId>,
    {
        MarketSelector::Markets(market_ids.into_iter().map(Into::into).collect())
    }
}

/// Validated parameters of one run, passed to the engine's `start`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BacktestRequest {
    pub markets: MarketSelector,
    pub speed: PlaybackSpeed,
    pub range: TimeRange,
    /// Maximum ticks fetched per market, bounding memory
    pub limit_per_market: usize,
}

impl Default for BacktestRequest {
    fn default() -> Self {
        Self {
            markets: MarketSelector::All,
            speed: PlaybackSpeed::default(),
            range: TimeRange::unbounded(),
            limit_per_market: DEFAULT_LIMIT_PER_MARKET,
        }
    }
}

impl BacktestRequest {
    pub fn new(markets: MarketSelector, speed: PlaybackSpeed) -> Self {
        Self {
            markets,
            speed,
            ..Self::default()
        }
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_limit_per_market(mut self, limit_per_market: usize) -> Self {
        self.limit_per_market = limit_per_market;
        self
    }

    /// Check the parameters that are not enforced by construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit_per_market == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        Ok(())
    }
}

/// Configuration for a backtest run, loadable from the environment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Playback speed (preset name or positive multiplier)
    pub speed: PlaybackSpeed,
    /// Maximum ticks fetched per market
    pub limit_per_market: usize,
    /// Inclusive lower bound on tick timestamps
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on tick timestamps
    pub end: Option<DateTime<Utc>>,
    /// Explicit markets to replay; `None` replays every known market
    pub markets: Option<Vec<MarketId>>,
    /// SQLite database holding tick history and results
    pub db_path: PathBuf,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            speed: PlaybackSpeed::default(),
            limit_per_market: DEFAULT_LIMIT_PER_MARKET,
            start: None,
            end: None,
            markets: None,
            db_path: PathBuf::from(DEFAULT_HISTORY_DB_PATH),
        }
    }
}

impl BacktestConfig {
    /// Create from environment variables, falling back to defaults for unset ones:
    /// - `REPLAY_SPEED`: `real_time`, `fast_10x`, `jump_to_events` or a multiplier
    /// - `REPLAY_LIMIT_PER_MARKET` (default: 10000)
    /// - `REPLAY_START` / `REPLAY_END`: RFC 3339 timestamps
    /// - `REPLAY_MARKETS`: comma separated market ids (default: all)
    /// - `REPLAY_DB_PATH` (default: `data/market_history.db`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let var = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (key, value))
        };

        if let Some((key, value)) = var("REPLAY_SPEED") {
            config.speed = value.parse().map_err(|error: ConfigError| invalid(key, error))?;
        }
        if let Some((key, value)) = var("REPLAY_LIMIT_PER_MARKET") {
            config.limit_per_market = value
                .parse()
                .map_err(|error: std::num::ParseIntError| invalid(key, error))?;
        }
        if let Some((key, value)) = var("REPLAY_START") {
            config.start = Some(parse_timestamp(&value).map_err(|error| invalid(key, error))?);
        }
        if let Some((key, value)) = var("REPLAY_END") {
            config.end = Some(parse_timestamp(&value).map_err(|error| invalid(key, error))?);
        }
        if let Some((_, value)) = var("REPLAY_MARKETS") {
            let markets: Vec<MarketId> = value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(MarketId::from)
                .collect();
            config.markets = (!markets.is_empty()).then_some(markets);
        }
        if let Some((_, value)) = var("REPLAY_DB_PATH") {
            config.db_path = PathBuf::from(value);
        }

        Ok(config)
    }

    /// Validate into a [`BacktestRequest`].
    pub fn request(&self) -> Result<BacktestRequest, ConfigError> {
        let range = TimeRange::new(self.start, self.end).map_err(|error| match error {
            DataError::InvalidTimeRange { start, end } => {
                ConfigError::InvalidTimeRange { start, end }
            }
            other => invalid("time range", other),
        })?;

        let request = BacktestRequest {
            markets: self
                .markets
                .clone()
                .map_or(MarketSelector::All, MarketSelector::Markets),
            speed: self.speed,
            range,
            limit_per_market: self.limit_per_market,
        };
        request.validate()?;
        Ok(request)
    }
}

fn invalid(key: &'static str, error: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidEnv {
        key,
        reason: error.to_string(),
    }
}
