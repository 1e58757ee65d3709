//! Delay policy converting recorded tick timestamps into playback waits.

use crate::speed::PlaybackSpeed;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Wait required before emitting a tick recorded at `current`, given the
/// previously emitted tick was recorded at `previous`.
///
/// Returns zero for the first tick of a sequence, for
/// [`PlaybackSpeed::JumpToEvents`], and for out-of-order ticks (`current < previous`).
pub fn delay_between(
    previous: Option<DateTime<Utc>>,
    current: DateTime<Utc>,
    speed: PlaybackSpeed,
) -> Duration {
    let (Some(previous), Some(multiplier)) = (previous, speed.multiplier()) else {
        return Duration::ZERO;
    };

    // Negative deltas fail the conversion and map to zero
    let Ok(delta) = (current - previous).to_std() else {
        return Duration::ZERO;
    };

    Duration::try_from_secs_f64(delta.as_secs_f64() / multiplier).unwrap_or(Duration::MAX)
}

/// Tracks the timestamp of the last emitted tick within one sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayClock {
    previous: Option<DateTime<Utc>>,
}

impl ReplayClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before the tick at `timestamp`, then remember it as the previous tick.
    pub fn advance(&mut self, timestamp: DateTime<Utc>, speed: PlaybackSpeed) -> Duration {
        let delay = delay_between(self.previous, timestamp, speed);
        self.previous = Some(timestamp);
        delay
    }

    pub fn previous(&self) -> Option<DateTime<Utc>> {
        self.previous
    }
}
