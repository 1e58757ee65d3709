//! Playback speed presets and validated custom multipliers.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Positive, finite playback speed multiplier.
///
/// Non-positive values are rejected on construction so playback never sees one.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SpeedMultiplier(f64);

impl SpeedMultiplier {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidSpeed(value))
        }
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

/// Speed at which recorded ticks are re-emitted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(try_from = "RawSpeed", into = "RawSpeed")]
pub enum PlaybackSpeed {
    /// Original timing (1×).
    #[default]
    RealTime,
    /// Ten times faster than recorded.
    Fast10x,
    /// Emit every tick with zero delay regardless of timestamps.
    JumpToEvents,
    /// Arbitrary positive multiplier.
    Custom(SpeedMultiplier),
}

impl PlaybackSpeed {
    /// Custom speed from a raw multiplier, rejecting non-positive values.
    pub fn custom(multiplier: f64) -> Result<Self, ConfigError> {
        SpeedMultiplier::new(multiplier).map(Self::Custom)
    }

    /// Multiplier applied to recorded gaps, or `None` for [`PlaybackSpeed::JumpToEvents`].
    pub fn multiplier(&self) -> Option<f64> {
        match self {
            PlaybackSpeed::RealTime => Some(1.0),
            PlaybackSpeed::Fast10x => Some(10.0),
            PlaybackSpeed::JumpToEvents => None,
            PlaybackSpeed::Custom(multiplier) => Some(multiplier.get()),
        }
    }

    pub fn is_jump_to_events(&self) -> bool {
        matches!(self, PlaybackSpeed::JumpToEvents)
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.multiplier() {
            Some(multiplier) => write!(f, "{multiplier}x"),
            None => write!(f, "jump_to_events"),
        }
    }
}

impl FromStr for PlaybackSpeed {
    type Err = ConfigError;

    /// Accepts preset names (`real_time`, `fast_10x`, `jump_to_events`) or a multiplier
    /// such as `5`, `2.5` or `25x`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalised.as_str() {
            "real_time" | "realtime" | "1x" => Ok(PlaybackSpeed::RealTime),
            "fast_10x" | "10x" => Ok(PlaybackSpeed::Fast10x),
            "jump_to_events" | "jump" | "instant" => Ok(PlaybackSpeed::JumpToEvents),
            other => other
                .trim_end_matches('x')
                .parse::<f64>()
                .map_err(|_| ConfigError::UnknownSpeedPreset(s.to_string()))
                .and_then(PlaybackSpeed::custom),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum RawSpeed {
    Multiplier(f64),
    Named(String),
}

impl TryFrom<RawSpeed> for PlaybackSpeed {
    type Error = ConfigError;

    fn try_from(raw: RawSpeed) -> Result<Self, Self::Error> {
        match raw {
            RawSpeed::Multiplier(multiplier) => PlaybackSpeed::custom(multiplier),
            RawSpeed::Named(name) => name.parse(),
        }
    }
}

impl From<PlaybackSpeed> for RawSpeed {
    fn from(speed: PlaybackSpeed) -> Self {
        match speed {
            PlaybackSpeed::RealTime => RawSpeed::Named("real_time".into()),
            PlaybackSpeed::Fast10x => RawSpeed::Named("fast_10x".into()),
            PlaybackSpeed::JumpToEvents => RawSpeed::Named("jump_to_events".into()),
            PlaybackSpeed::Custom(multiplier) => RawSpeed::Multiplier(multiplier.get()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_rejects_non_positive() {
        assert!(matches!(
            PlaybackSpeed::custom(0.0),
            Err(ConfigError::InvalidSpeed(_))
        ));
        assert!(PlaybackSpeed::custom(-2.0).is_err());
        assert!(PlaybackSpeed::custom(f64::NAN).is_err());
        assert!(PlaybackSpeed::custom(f64::INFINITY).is_err());
        assert_eq!(PlaybackSpeed::custom(2.5).unwrap().multiplier(), Some(2.5));
    }

    #[test]
    fn test_presets() {
        assert_eq!(PlaybackSpeed::RealTime.multiplier(), Some(1.0));
        assert_eq!(PlaybackSpeed::Fast10x.multiplier(), Some(10.0));
        assert_eq!(PlaybackSpeed::JumpToEvents.multiplier(), None);
        assert_eq!(PlaybackSpeed::default(), PlaybackSpeed::RealTime);
    }

    #[test]
    fn test_parse() {
        assert_eq!("real_time".parse::<PlaybackSpeed>().unwrap(), PlaybackSpeed::RealTime);
        assert_eq!("FAST-10X".parse::<PlaybackSpeed>().unwrap(), PlaybackSpeed::Fast10x);
        assert_eq!("jump".parse::<PlaybackSpeed>().unwrap(), PlaybackSpeed::JumpToEvents);
        assert_eq!("25x".parse::<PlaybackSpeed>().unwrap().multiplier(), Some(25.0));
        assert!(matches!(
            "0".parse::<PlaybackSpeed>(),
            Err(ConfigError::InvalidSpeed(_))
        ));
        assert!(matches!(
            "ludicrous".parse::<PlaybackSpeed>(),
            Err(ConfigError::UnknownSpeedPreset(_))
        ));
    }

    #[test]
    fn test_serde_forms() {
        let speed: PlaybackSpeed = serde_json::from_str("4.0").unwrap();
        assert_eq!(speed.multiplier(), Some(4.0));

        let speed: PlaybackSpeed = serde_json::from_str(r#""jump_to_events""#).unwrap();
        assert!(speed.is_jump_to_events());

        assert!(serde_json::from_str::<PlaybackSpeed>("-1.0").is_err());
        assert_eq!(
            serde_json::to_string(&PlaybackSpeed::Fast10x).unwrap(),
            r#""fast_10x""#
        );
    }
}
