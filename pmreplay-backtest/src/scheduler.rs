//! Playback scheduler: re-emits an ordered tick sequence under a
//! pause/resume/stop state machine, reproducing recorded (or scaled) timing.
//!
//! ```text
//!          start()            pause()
//!   Idle ──────────▶ Playing ─────────▶ Paused
//!    ▲                  │  ◀─────────     │
//!    │     finished     │    resume()     │
//!    └──────────────────┘                 │
//!                                         │
//!   any state ───────── stop() ─────────▶ Stopped (terminal)
//! ```
//!
//! Control signals are delivered through a [`tokio::sync::watch`] channel, so an
//! in-flight inter-tick wait reacts to them immediately.

use crate::{clock::ReplayClock, error::SchedulerError, speed::PlaybackSpeed};
use async_trait::async_trait;
use derive_more::Display;
use parking_lot::RwLock;
use pmreplay_data::{MarketId, Tick};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::watch,
    time::{Instant, sleep},
};
use tracing::{debug, info};

/// Ticks between progress log lines.
const PROGRESS_LOG_INTERVAL: u64 = 100;

/// State of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Stopped,
}

/// Outcome of replaying one tick sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every tick was emitted.
    Completed(u64),
    /// A stop was observed after emitting this many ticks.
    Stopped(u64),
}

impl PlaybackOutcome {
    pub fn processed(&self) -> u64 {
        match self {
            PlaybackOutcome::Completed(processed) | PlaybackOutcome::Stopped(processed) => {
                *processed
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PlaybackOutcome::Stopped(_))
    }
}

/// Consumer of emitted ticks.
#[async_trait]
pub trait TickHandler: Send {
    async fn on_tick(&mut self, tick: &Tick);
}

#[async_trait]
impl<F> TickHandler for F
where
    F: FnMut(&Tick) + Send,
{
    async fn on_tick(&mut self, tick: &Tick) {
        self(tick)
    }
}

/// Point-in-time view of a playback session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub speed: PlaybackSpeed,
    pub market_id: Option<MarketId>,
    pub processed: u64,
}

#[derive(Debug)]
struct SessionControl {
    state: watch::Sender<PlaybackState>,
    speed: RwLock<PlaybackSpeed>,
    market_id: RwLock<Option<MarketId>>,
    processed: AtomicU64,
}

/// Cloneable control surface for a [`PlaybackScheduler`], usable from other tasks.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    control: Arc<SessionControl>,
}

impl PlaybackHandle {
    /// Playing → Paused. Returns `false` (no-op) from any other state.
    pub fn pause(&self) -> bool {
        let paused = self.control.state.send_if_modified(|state| match state {
            PlaybackState::Playing => {
                *state = PlaybackState::Paused;
                true
            }
            _ => false,
        });
        if paused {
            info!(processed = self.processed(), "Playback paused");
        }
        paused
    }

    /// Paused → Playing. Returns `false` (no-op) from any other state.
    pub fn resume(&self) -> bool {
        let resumed = self.control.state.send_if_modified(|state| match state {
            PlaybackState::Paused => {
                *state = PlaybackState::Playing;
                true
            }
            _ => false,
        });
        if resumed {
            info!(processed = self.processed(), "Playback resumed");
        }
        resumed
    }

    /// Any state → Stopped. Idempotent and irreversible.
    pub fn stop(&self) {
        let stopped = self.control.state.send_if_modified(|state| {
            let changed = *state != PlaybackState::Stopped;
            *state = PlaybackState::Stopped;
            changed
        });
        if stopped {
            info!(processed = self.processed(), "Playback stopped");
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.control.state.borrow()
    }

    /// True while a session is active, including while it is paused.
    pub fn is_playing(&self) -> bool {
        matches!(
            self.state(),
            PlaybackState::Playing | PlaybackState::Paused
        )
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PlaybackState::Stopped
    }

    /// Change the speed used for subsequent delay computations.
    ///
    /// A wait already in flight keeps the duration it was computed with.
    pub fn set_speed(&self, speed: PlaybackSpeed) {
        let previous = std::mem::replace(&mut *self.control.speed.write(), speed);
        info!(%previous, current = %speed, "Playback speed changed");
    }

    pub fn speed(&self) -> PlaybackSpeed {
        *self.control.speed.read()
    }

    /// Ticks emitted so far in the current session.
    pub fn processed(&self) -> u64 {
        self.control.processed.load(Ordering::Relaxed)
    }

    /// Market currently being replayed, if any.
    pub fn market_id(&self) -> Option<MarketId> {
        self.control.market_id.read().clone()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state(),
            speed: self.speed(),
            market_id: self.market_id(),
            processed: self.processed(),
        }
    }

    fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.control.state.subscribe()
    }
}

/// Drives emission of ordered tick sequences for a single playback session.
///
/// One session at a time: a second concurrent replay must use its own scheduler.
#[derive(Debug)]
pub struct PlaybackScheduler {
    handle: PlaybackHandle,
}

impl PlaybackScheduler {
    pub fn new(speed: PlaybackSpeed) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            handle: PlaybackHandle {
                control: Arc::new(SessionControl {
                    state,
                    speed: RwLock::new(speed),
                    market_id: RwLock::new(None),
                    processed: AtomicU64::new(0),
                }),
            },
        }
    }

    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    /// Idle → Playing, resetting the session counters.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut result = Ok(());
        self.handle.control.state.send_if_modified(|state| match state {
            PlaybackState::Idle => {
                *state = PlaybackState::Playing;
                true
            }
            PlaybackState::Stopped => {
                result = Err(SchedulerError::Stopped);
                false
            }
            PlaybackState::Playing | PlaybackState::Paused => {
                result = Err(SchedulerError::AlreadyActive);
                false
            }
        });
        result?;

        self.handle.control.processed.store(0, Ordering::Relaxed);
        *self.handle.control.market_id.write() = None;
        info!(speed = %self.handle.speed(), "Playback started");
        Ok(())
    }

    /// Playing/Paused → Idle once a session has run to completion. Stopped stays Stopped.
    pub fn finish(&self) {
        self.handle.control.state.send_if_modified(|state| match state {
            PlaybackState::Playing | PlaybackState::Paused => {
                *state = PlaybackState::Idle;
                true
            }
            _ => false,
        });
        *self.handle.control.market_id.write() = None;
    }

    /// Record the market whose sequence is about to be played.
    pub(crate) fn enter_market(&self, market_id: &MarketId) {
        *self.handle.control.market_id.write() = Some(market_id.clone());
    }

    /// Replay one ordered sequence as a complete session: start, play, finish.
    pub async fn replay<H>(
        &self,
        ticks: &[Tick],
        handler: &mut H,
    ) -> Result<PlaybackOutcome, SchedulerError>
    where
        H: TickHandler + ?Sized,
    {
        self.start()?;
        let outcome = self.play(ticks, handler).await;
        self.finish();
        Ok(outcome)
    }

    /// Emit `ticks` within an already started session.
    ///
    /// Each tick waits for the delay computed against the previous tick of this
    /// sequence. The wait is suspended while paused and abandoned on stop.
    pub(crate) async fn play<H>(&self, ticks: &[Tick], handler: &mut H) -> PlaybackOutcome
    where
        H: TickHandler + ?Sized,
    {
        let mut state = self.handle.subscribe();
        let mut clock = ReplayClock::new();
        let mut processed = 0;

        if let Some(first) = ticks.first() {
            self.enter_market(&first.market_id);
        }

        for tick in ticks {
            let delay = clock.advance(tick.timestamp, self.handle.speed());
            if let Gate::Stopped = wait_for_emission(&mut state, delay).await {
                return PlaybackOutcome::Stopped(processed);
            }

            handler.on_tick(tick).await;
            processed += 1;
            let total = self.handle.control.processed.fetch_add(1, Ordering::Relaxed) + 1;

            if processed % PROGRESS_LOG_INTERVAL == 0 {
                debug!(market_id = %tick.market_id, processed, total, "Replay progress");
            }
        }

        PlaybackOutcome::Completed(processed)
    }
}

enum Gate {
    Emit,
    Stopped,
}

/// Wait out `delay` of playing time.
///
/// Time spent paused does not count towards the delay; the remainder is
/// slept once playback resumes.
async fn wait_for_emission(state: &mut watch::Receiver<PlaybackState>, delay: Duration) -> Gate {
    let mut remaining = delay;

    loop {
        let current = *state.borrow_and_update();
        match current {
            PlaybackState::Stopped => return Gate::Stopped,
            PlaybackState::Paused => {
                if state.changed().await.is_err() {
                    return Gate::Stopped;
                }
            }
            PlaybackState::Idle | PlaybackState::Playing => {
                if remaining.is_zero() {
                    return Gate::Emit;
                }

                let started = Instant::now();
                tokio::select! {
                    _ = sleep(remaining) => remaining = Duration::ZERO,
                    changed = state.changed() => {
                        if changed.is_err() {
                            return Gate::Stopped;
                        }
                        remaining = remaining.saturating_sub(started.elapsed());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, second).unwrap()
    }

    fn ticks(seconds: &[u32]) -> Vec<Tick> {
        seconds
            .iter()
            .map(|second| Tick::new("m1", at(*second), dec!(0.4), dec!(0.6), dec!(10)))
            .collect()
    }

    #[test]
    fn test_state_transitions() {
        let scheduler = PlaybackScheduler::new(PlaybackSpeed::JumpToEvents);
        let handle = scheduler.handle();
        assert_eq!(handle.state(), PlaybackState::Idle);

        // Pause/resume are no-ops unless the transition applies
        assert!(!handle.pause());
        assert!(!handle.resume());

        scheduler.start().unwrap();
        assert!(handle.is_playing());
        assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyActive));

        assert!(handle.pause());
        assert!(!handle.pause());
        assert!(handle.is_paused());
        assert!(handle.is_playing());

        assert!(handle.resume());
        assert!(!handle.is_paused());

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(!handle.is_playing());
        assert!(!handle.resume());

        scheduler.finish();
        assert_eq!(handle.state(), PlaybackState::Stopped);
        assert_eq!(scheduler.start(), Err(SchedulerError::Stopped));
    }

    #[test]
    fn test_finish_returns_to_idle() {
        let scheduler = PlaybackScheduler::new(PlaybackSpeed::RealTime);
        scheduler.start().unwrap();
        scheduler.finish();
        assert_eq!(scheduler.handle().state(), PlaybackState::Idle);
        assert!(scheduler.start().is_ok());
    }

    #[tokio::test]
    async fn test_replay_jump_to_events_emits_in_order() {
        let scheduler = PlaybackScheduler::new(PlaybackSpeed::JumpToEvents);
        let input = ticks(&[0, 30, 10, 59]);

        let mut seen = Vec::new();
        let outcome = scheduler
            .replay(&input, &mut |tick: &Tick| seen.push(tick.timestamp))
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed(4));
        assert_eq!(seen, vec![at(0), at(30), at(10), at(59)]);
        assert_eq!(scheduler.handle().processed(), 4);
        assert_eq!(scheduler.handle().state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_stop_inside_handler_returns_partial_count() {
        let scheduler = PlaybackScheduler::new(PlaybackSpeed::JumpToEvents);
        let handle = scheduler.handle();
        let input = ticks(&[0, 1, 2, 3, 4]);

        let mut emitted = 0;
        let outcome = scheduler
            .replay(&input, &mut |_: &Tick| {
                emitted += 1;
                if emitted == 2 {
                    handle.stop();
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Stopped(2));
        assert_eq!(emitted, 2);
    }

    #[tokio::test]
    async fn test_stop_before_start_rejects_replay() {
        let scheduler = PlaybackScheduler::new(PlaybackSpeed::JumpToEvents);
        scheduler.handle().stop();

        let mut emitted = 0;
        let result = scheduler
            .replay(&ticks(&[0, 1]), &mut |_: &Tick| emitted += 1)
            .await;

        assert_eq!(result, Err(SchedulerError::Stopped));
        assert_eq!(emitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_speed_applies_to_next_delay() {
        let scheduler = PlaybackScheduler::new(PlaybackSpeed::RealTime);
        let handle = scheduler.handle();
        let input = ticks(&[0, 10, 20]);

        let started = Instant::now();
        let mut emitted_at = Vec::new();
        scheduler
            .replay(&input, &mut |_: &Tick| {
                emitted_at.push(started.elapsed());
                handle.set_speed(PlaybackSpeed::Fast10x);
            })
            .await
            .unwrap();

        let expected = [0, 1000, 2000];
        assert_eq!(emitted_at.len(), expected.len());
        for (elapsed, millis) in emitted_at.iter().zip(expected) {
            assert!(elapsed.as_millis().abs_diff(millis) <= 5, "{elapsed:?} vs {millis}ms");
        }
    }
}
