//! Video frame sources.
//!
//! The render core samples frames from a source but never owns playback.
//! `VideoFrameSource` is the read side it depends on; `PlaybackControl` is
//! the extra surface the split-preview synchronizer needs to steer the
//! secondary stream.

use crate::frame::{FrameBuffer, SharedFrameBuffer};
use crate::time::FrameRate;
use std::time::Duration;

/// How much media data a source has available, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// A decodable, seekable media element, as seen by the render core.
pub trait VideoFrameSource {
    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    fn ready_state(&self) -> ReadyState;

    /// Whether a decoded frame exists for the current time.
    fn has_displayable_frame(&self) -> bool {
        self.ready_state() >= ReadyState::HaveCurrentData && self.current_frame().is_some()
    }

    /// The decoded frame for the current time, if any.
    fn current_frame(&self) -> Option<&FrameBuffer>;
}

/// Playback steering used to keep a secondary stream aligned with a primary.
pub trait PlaybackControl: VideoFrameSource {
    fn is_paused(&self) -> bool;
    fn playback_rate(&self) -> f64;
    fn seek(&mut self, seconds: f64);
    fn set_paused(&mut self, paused: bool);
    fn set_playback_rate(&mut self, rate: f64);
}

/// An in-memory clip with a tick-driven playback clock.
#[derive(Debug, Clone)]
pub struct MemorySource {
    frames: Vec<SharedFrameBuffer>,
    rate: FrameRate,
    time: f64,
    paused: bool,
    playback_rate: f64,
    looping: bool,
    ended: bool,
}

impl MemorySource {
    /// A source with no media loaded. Reports `HaveNothing`.
    pub fn empty(rate: FrameRate) -> Self {
        Self {
            frames: Vec::new(),
            rate,
            time: 0.0,
            paused: true,
            playback_rate: 1.0,
            looping: false,
            ended: false,
        }
    }

    pub fn from_frames(frames: Vec<FrameBuffer>, rate: FrameRate) -> Self {
        let mut source = Self::empty(rate);
        source.load(frames);
        source
    }

    /// A single frame held for `duration`.
    pub fn still(frame: FrameBuffer, duration: Duration) -> Self {
        let rate = FrameRate::FPS_30;
        let count = ((duration.as_secs_f64() * rate.to_fps_f64()).ceil() as usize).max(1);
        let shared = SharedFrameBuffer::new(frame);
        let mut source = Self::empty(rate);
        source.frames = vec![shared; count];
        source
    }

    /// Replace the loaded media and rewind.
    pub fn load(&mut self, frames: Vec<FrameBuffer>) {
        self.frames = frames.into_iter().map(SharedFrameBuffer::new).collect();
        self.time = 0.0;
        self.ended = false;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.rate
    }

    /// Clip length in seconds.
    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 * self.rate.frame_duration_secs()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Index of the frame shown at the current time.
    pub fn frame_index(&self) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        let idx = self.rate.frame_at(self.time) as usize;
        Some(idx.min(self.frames.len() - 1))
    }

    /// Advance the playback clock by `dt` of wall time.
    pub fn advance(&mut self, dt: Duration) {
        if self.paused || self.frames.is_empty() {
            return;
        }
        let duration = self.duration();
        self.time += dt.as_secs_f64() * self.playback_rate;
        if self.time >= duration {
            if self.looping && duration > 0.0 {
                self.time %= duration;
            } else {
                self.time = duration;
                self.ended = true;
                self.paused = true;
            }
        } else if self.time < 0.0 {
            self.time = 0.0;
        }
    }
}

impl VideoFrameSource for MemorySource {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn ready_state(&self) -> ReadyState {
        if self.frames.is_empty() {
            ReadyState::HaveNothing
        } else if self.ended {
            ReadyState::HaveCurrentData
        } else {
            ReadyState::HaveEnoughData
        }
    }

    fn current_frame(&self) -> Option<&FrameBuffer> {
        self.frame_index().map(|i| self.frames[i].as_ref())
    }
}

impl PlaybackControl for MemorySource {
    fn is_paused(&self) -> bool {
        self.paused
    }

    fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    fn seek(&mut self, seconds: f64) {
        let duration = self.duration();
        self.time = if seconds.is_finite() {
            seconds.clamp(0.0, duration)
        } else {
            0.0
        };
        self.ended = self.time >= duration && duration > 0.0 && !self.looping;
    }

    fn set_paused(&mut self, paused: bool) {
        if !paused && self.ended {
            self.time = 0.0;
            self.ended = false;
        }
        self.paused = paused;
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if rate.is_finite() {
            self.playback_rate = rate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(frames: usize) -> MemorySource {
        let frames = (0..frames)
            .map(|i| FrameBuffer::solid(2, 2, [i as u8, 0, 0, 255]))
            .collect();
        MemorySource::from_frames(frames, FrameRate::FPS_24)
    }

    #[test]
    fn empty_source_has_nothing() {
        let source = MemorySource::empty(FrameRate::FPS_24);
        assert_eq!(source.ready_state(), ReadyState::HaveNothing);
        assert!(!source.has_displayable_frame());
    }

    #[test]
    fn advance_moves_only_while_playing() {
        let mut source = clip(48);
        source.advance(Duration::from_millis(500));
        assert_eq!(source.current_time(), 0.0);

        source.set_paused(false);
        source.advance(Duration::from_millis(500));
        assert!((source.current_time() - 0.5).abs() < 1e-9);
        assert_eq!(source.frame_index(), Some(12));
        assert_eq!(source.current_frame().unwrap().pixel(0, 0)[0], 12);
    }

    #[test]
    fn playback_rate_scales_clock() {
        let mut source = clip(240);
        source.set_paused(false);
        source.set_playback_rate(2.0);
        source.advance(Duration::from_secs(1));
        assert!((source.current_time() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn reaching_the_end_pauses() {
        let mut source = clip(24);
        source.set_paused(false);
        source.advance(Duration::from_secs(5));
        assert!(source.is_ended());
        assert!(source.is_paused());
        assert_eq!(source.frame_index(), Some(23));
        assert!(source.has_displayable_frame());
    }

    #[test]
    fn looping_wraps() {
        let mut source = clip(24);
        source.set_looping(true);
        source.set_paused(false);
        source.advance(Duration::from_millis(1500));
        assert!((source.current_time() - 0.5).abs() < 1e-9);
        assert!(!source.is_ended());
    }

    #[test]
    fn seek_clamps() {
        let mut source = clip(24);
        source.seek(-4.0);
        assert_eq!(source.current_time(), 0.0);
        source.seek(0.25);
        assert_eq!(source.current_time(), 0.25);
    }
}
