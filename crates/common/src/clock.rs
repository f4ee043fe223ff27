//! Clock and timing utilities for recording sessions.
//!
//! Every session is anchored to a monotonic epoch captured when recording
//! starts. The clock is built on `tokio::time::Instant` so timer-driven
//! code behaves identically under a paused test runtime.

use std::time::Duration;

use tokio::time::Instant;

/// A recording clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment recording started).
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant recording started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Time elapsed since recording start.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Wall-clock time at recording start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Constant frame cadence used to pace rendering and to map timestamps
/// onto frame indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCadence {
    fps: u32,
}

impl FrameCadence {
    /// Create a cadence at `fps` frames per second (at least 1).
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Duration of one frame.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps as u64)
    }

    /// Index of the frame that is on screen at `elapsed`.
    pub fn frame_index_at(&self, elapsed: Duration) -> u64 {
        (elapsed.as_nanos() * self.fps as u128 / 1_000_000_000) as u64
    }

    /// Number of frames that must exist to cover `elapsed`
    /// (the frame on screen at `elapsed` included).
    pub fn frames_due(&self, elapsed: Duration) -> u64 {
        self.frame_index_at(elapsed) + 1
    }

    /// Playback duration of `frames` frames.
    pub fn duration_of(&self, frames: u64) -> Duration {
        Duration::from_nanos(
            (frames as u128 * 1_000_000_000 / self.fps as u128).min(u64::MAX as u128) as u64,
        )
    }
}
