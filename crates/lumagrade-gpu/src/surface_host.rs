//! Render-surface sizing.
//!
//! Layout reports arrive in device pixels at whatever rate the host emits
//! them. The latest report is held until reports stop for the debounce
//! window, and only then committed.

use lumagrade_core::SurfaceSize;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceHostConfig {
    /// Quiet period before a resize is committed.
    pub debounce_ms: u64,
}

impl Default for SurfaceHostConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Owns the committed pixel size of the render surface.
#[derive(Debug, Clone)]
pub struct SurfaceHost {
    config: SurfaceHostConfig,
    committed: SurfaceSize,
    pending: Option<(SurfaceSize, Instant)>,
}

impl SurfaceHost {
    pub fn new(initial: SurfaceSize, config: SurfaceHostConfig) -> Self {
        Self {
            config,
            committed: initial,
            pending: None,
        }
    }

    /// The size the render target should have.
    pub fn size(&self) -> SurfaceSize {
        self.committed
    }

    pub fn has_pending_resize(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a layout report. Restarts the debounce window.
    pub fn observe(&mut self, size: SurfaceSize, now: Instant) {
        self.pending = Some((size, now));
    }

    /// Commit the pending size once the debounce window has passed.
    /// Returns the new size when it differs from the committed one.
    pub fn poll(&mut self, now: Instant) -> Option<SurfaceSize> {
        let (size, at) = self.pending?;
        if now.saturating_duration_since(at) < Duration::from_millis(self.config.debounce_ms) {
            return None;
        }
        self.pending = None;
        self.commit(size)
    }

    /// Commit the pending size immediately.
    pub fn flush(&mut self) -> Option<SurfaceSize> {
        let (size, _) = self.pending.take()?;
        self.commit(size)
    }

    fn commit(&mut self, size: SurfaceSize) -> Option<SurfaceSize> {
        if size == self.committed {
            return None;
        }
        debug!(from = %self.committed, to = %size, "surface resized");
        self.committed = size;
        Some(size)
    }
}
