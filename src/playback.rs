//! Playback state and session bookkeeping.
//!
//! - [`EngineState`]: where the engine is in its play cycle
//! - [`LoopMode`]: what happens when the source runs out
//! - [`PlaybackSession`]: one run from `play()` until stop or completion

use crate::device::ChannelId;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Nominal state of a [`StreamingEngine`](crate::StreamingEngine).
///
/// `Finished` and `Stopped` end the current session but not the engine;
/// the next `play()` starts a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing has been played since the source was loaded
    Idle,
    Playing,
    /// Device halted with buffers still queued; position is frozen
    Paused,
    /// Halted by the caller; all buffers discarded
    Stopped,
    /// The source ran out and every buffer drained
    Finished,
}

/// Loop mode for streamed playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Play once and finish
    Once,
    /// Rewind at end of stream and keep going
    Infinite,
}

impl Default for LoopMode {
    fn default() -> Self {
        Self::Once
    }
}

/// One run of playback on a device channel.
///
/// Position is derived from the wall clock rather than counted from
/// rendered buffers, so it never accumulates bookkeeping drift but can lead
/// the audible output by the device's own latency.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    id: Uuid,
    channel: ChannelId,
    started_at: Instant,
    paused_at: Option<Instant>,
}

impl PlaybackSession {
    pub fn new(channel: ChannelId, now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            started_at: now,
            paused_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let reference = self.paused_at.unwrap_or(now);
        reference.saturating_duration_since(self.started_at)
    }

    /// Elapsed seconds clamped to `[0, duration]`, rounded to 2 decimals.
    ///
    /// An unknown (zero) duration leaves the upper bound open.
    pub fn position_in_seconds(&self, now: Instant, duration: Duration) -> f32 {
        let mut elapsed = self.elapsed(now);
        if !duration.is_zero() {
            elapsed = elapsed.min(duration);
        }
        round_to_hundredths(elapsed.as_secs_f32())
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Shifts the start forward by the time spent paused
    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.started_at += now.saturating_duration_since(paused_at);
        }
    }

    /// Called when a looping source wraps around
    pub fn advance(&mut self, by: Duration) {
        self.started_at += by;
    }
}

fn round_to_hundredths(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
