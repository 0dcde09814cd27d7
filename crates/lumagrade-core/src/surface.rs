//! Render-surface geometry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel dimensions of a render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-area surface cannot be drawn to.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Viewport covering the whole surface.
    #[inline]
    pub fn full_viewport(self) -> Viewport {
        Viewport::new(0, 0, self.width, self.height)
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for SurfaceSize {
    type Err = String;

    /// Parse `WIDTHxHEIGHT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
        let height = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
        Ok(Self::new(width, height))
    }
}

/// A rectangle of the render target, in device pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clip to a surface, returning `None` if nothing remains.
    pub fn clipped_to(self, size: SurfaceSize) -> Option<Self> {
        let x1 = (self.x.saturating_add(self.width)).min(size.width);
        let y1 = (self.y.saturating_add(self.height)).min(size.height);
        if self.x >= x1 || self.y >= y1 {
            return None;
        }
        Some(Self::new(self.x, self.y, x1 - self.x, y1 - self.y))
    }
}
