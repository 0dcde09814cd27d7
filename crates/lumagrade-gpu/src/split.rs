//! Split before/after preview.
//!
//! The surface is divided at `split_position`: the left lane shows the
//! original (a second, ungraded stream), the right lane the graded primary.
//! Each lane samples only the source region under it, so the two halves
//! line up as one picture. The gap between the lanes is filled with the
//! divider color; a lane with no frame yet stays at the clear color.
//!
//! [`DriftSync`] keeps the secondary stream aligned with the primary.

use lumagrade_core::params::ranges;
use lumagrade_core::{PlaybackControl, SurfaceSize, Viewport};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Where each lane and the divider sit on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitLayout {
    pub left: Viewport,
    pub divider: Viewport,
    pub right: Viewport,
    /// Horizontal uv band of the source shown in the left lane.
    pub left_crop: (f32, f32),
    /// Horizontal uv band of the source shown in the right lane.
    pub right_crop: (f32, f32),
}

impl SplitLayout {
    /// Lay out a surface. Out-of-range inputs are clamped; the three
    /// regions always tile the full width.
    pub fn compute(surface: SurfaceSize, split_position: f32, divider_width: f32) -> Self {
        let (w, h) = (surface.width, surface.height);
        let position = ranges::SPLIT_POSITION.apply(split_position);
        let divider = ranges::DIVIDER_WIDTH.apply(divider_width).round() as u32;

        let split_x = ((w as f32 * position).round() as u32).min(w);
        let left_end = split_x.saturating_sub(divider / 2);
        let right_start = (split_x + (divider - divider / 2)).min(w);

        let fraction = |x: u32| if w == 0 { 0.0 } else { x as f32 / w as f32 };
        Self {
            left: Viewport::new(0, 0, left_end, h),
            divider: Viewport::new(left_end, 0, right_start - left_end, h),
            right: Viewport::new(right_start, 0, w - right_start, h),
            left_crop: (0.0, fraction(left_end)),
            right_crop: (fraction(right_start), 1.0),
        }
    }
}

/// Drift correction settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftSyncConfig {
    /// How often drift is measured.
    pub interval_ms: u64,
    /// Drift beyond this many seconds triggers a seek.
    pub threshold_secs: f64,
}

impl Default for DriftSyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            threshold_secs: 0.1,
        }
    }
}

impl DriftSyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// What one check changed on the secondary stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriftCorrection {
    /// Measured drift before correction, in seconds.
    pub drift: f64,
    pub seeked: bool,
    pub paused_mirrored: bool,
    pub rate_mirrored: bool,
}

impl DriftCorrection {
    pub fn changed_anything(&self) -> bool {
        self.seeked || self.paused_mirrored || self.rate_mirrored
    }
}

/// Keeps a secondary stream's clock, paused state and rate on the primary's.
#[derive(Debug, Clone)]
pub struct DriftSync {
    config: DriftSyncConfig,
    last_check: Option<Instant>,
    checks: u64,
    corrections: u64,
}

impl DriftSync {
    pub fn new(config: DriftSyncConfig) -> Self {
        Self {
            config,
            last_check: None,
            checks: 0,
            corrections: 0,
        }
    }

    pub fn config(&self) -> &DriftSyncConfig {
        &self.config
    }

    /// Whether a check is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_check
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.interval())
    }

    /// Check if the interval has elapsed; otherwise do nothing.
    pub fn poll<P, S>(
        &mut self,
        now: Instant,
        primary: &P,
        secondary: &mut S,
    ) -> Option<DriftCorrection>
    where
        P: PlaybackControl + ?Sized,
        S: PlaybackControl + ?Sized,
    {
        if !self.is_due(now) {
            return None;
        }
        self.last_check = Some(now);
        Some(self.check(primary, secondary))
    }

    /// Measure and correct now.
    pub fn check<P, S>(&mut self, primary: &P, secondary: &mut S) -> DriftCorrection
    where
        P: PlaybackControl + ?Sized,
        S: PlaybackControl + ?Sized,
    {
        self.checks += 1;
        let target = primary.current_time();
        let mut correction = DriftCorrection {
            drift: (target - secondary.current_time()).abs(),
            ..Default::default()
        };

        if correction.drift > self.config.threshold_secs {
            secondary.seek(target);
            correction.seeked = true;
        }
        if primary.is_paused() != secondary.is_paused() {
            secondary.set_paused(primary.is_paused());
            correction.paused_mirrored = true;
        }
        if primary.playback_rate() != secondary.playback_rate() {
            secondary.set_playback_rate(primary.playback_rate());
            correction.rate_mirrored = true;
        }

        if correction.changed_anything() {
            self.corrections += 1;
            debug!(
                drift = correction.drift,
                seeked = correction.seeked,
                "secondary stream realigned"
            );
        } else {
            trace!(drift = correction.drift, "secondary stream in sync");
        }
        correction
    }

    pub fn checks(&self) -> u64 {
        self.checks
    }

    pub fn corrections(&self) -> u64 {
        self.corrections
    }
}

/// Totals from a finished [`run_drift_sync`] task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriftSyncStats {
    pub checks: u64,
    pub corrections: u64,
}

/// Run drift correction on a timer until `shutdown` turns true or its
/// sender is dropped.
///
/// For hosts whose streams live on other threads. Hosts that tick the
/// render loop can let it poll a [`DriftSync`] instead.
pub async fn run_drift_sync<P, S>(
    primary: Arc<Mutex<P>>,
    secondary: Arc<Mutex<S>>,
    config: DriftSyncConfig,
    mut shutdown: watch::Receiver<bool>,
) -> DriftSyncStats
where
    P: PlaybackControl + Send,
    S: PlaybackControl + Send,
{
    let mut sync = DriftSync::new(config);
    let mut interval = tokio::time::interval(config.interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        {
            let primary = primary.lock();
            let mut secondary = secondary.lock();
            sync.check(&*primary, &mut *secondary);
        }
    }

    DriftSyncStats {
        checks: sync.checks(),
        corrections: sync.corrections(),
    }
}
