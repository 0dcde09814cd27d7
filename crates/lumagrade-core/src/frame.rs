//! Frame buffer types for video frames in CPU memory.

use crate::error::{LumaError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pixel format of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA (32 bits per pixel)
    #[default]
    Rgba8,
    /// 8-bit BGRA, the native layout of many decoders
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
        }
    }

    /// Byte offsets of the R, G, B and A channels within a pixel.
    #[inline]
    pub fn channel_offsets(self) -> [usize; 4] {
        match self {
            Self::Rgba8 => [0, 1, 2, 3],
            Self::Bgra8 => [2, 1, 0, 3],
        }
    }
}

/// A plane of pixel data with stride information.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlane {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Bytes per row (may include padding)
    pub stride: usize,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    bytes_per_pixel: usize,
}

impl FramePlane {
    /// Create a zeroed plane with the given dimensions.
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        // Align stride to 64 bytes for SIMD and GPU compatibility
        let min_stride = (width as usize) * bytes_per_pixel;
        let stride = (min_stride + 63) & !63;
        let data = vec![0u8; stride * height as usize];
        Self {
            data,
            stride,
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Get a row of pixel data, without padding.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * self.bytes_per_pixel;
        &self.data[start..end]
    }

    /// Get a mutable row of pixel data, without padding.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.width as usize * self.bytes_per_pixel;
        &mut self.data[start..end]
    }

    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }
}

/// A decoded video frame in CPU memory.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    plane: FramePlane,
}

impl FrameBuffer {
    /// Create a zeroed (transparent black) frame.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            format,
            width,
            height,
            plane: FramePlane::new(width, height, format.bytes_per_pixel()),
        }
    }

    /// Wrap tightly packed pixel data.
    pub fn from_packed(width: u32, height: u32, format: PixelFormat, data: &[u8]) -> Result<Self> {
        let row_bytes = width as usize * format.bytes_per_pixel();
        let expected = row_bytes * height as usize;
        if data.len() != expected {
            return Err(LumaError::InvalidParameter(format!(
                "expected {expected} bytes for a {width}x{height} {format:?} frame, got {}",
                data.len()
            )));
        }
        let mut frame = Self::new(width, height, format);
        if row_bytes > 0 {
            for (y, src) in data.chunks_exact(row_bytes).enumerate() {
                frame.plane.row_mut(y as u32).copy_from_slice(src);
            }
        }
        Ok(frame)
    }

    /// A frame filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut frame = Self::new(width, height, PixelFormat::Rgba8);
        for y in 0..height {
            for px in frame.plane.row_mut(y).chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
        frame
    }

    #[inline]
    pub fn primary_plane(&self) -> &FramePlane {
        &self.plane
    }

    #[inline]
    pub fn primary_plane_mut(&mut self) -> &mut FramePlane {
        &mut self.plane
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Read a pixel as RGBA regardless of storage order.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let [r, g, b, a] = self.format.channel_offsets();
        let i = y as usize * self.plane.stride + x as usize * 4;
        let d = &self.plane.data;
        [d[i + r], d[i + g], d[i + b], d[i + a]]
    }

    /// Write an RGBA pixel regardless of storage order.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let offsets = self.format.channel_offsets();
        let i = y as usize * self.plane.stride + x as usize * 4;
        for (c, &o) in offsets.iter().enumerate() {
            self.plane.data[i + o] = rgba[c];
        }
    }

    /// Copy out tightly packed RGBA8 pixels (for image encoders).
    pub fn to_packed_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                out.extend_from_slice(&self.pixel(x, y));
            }
        }
        out
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        const BARS: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];
        let mut frame = Self::new(width, height, PixelFormat::Rgba8);
        for y in 0..height {
            let row = frame.plane.row_mut(y);
            for x in 0..width {
                let i = (x * 4) as usize;
                let bar = (x * 8 / width.max(1)) as usize;
                row[i..i + 4].copy_from_slice(&BARS[bar.min(7)]);
            }
        }
        frame
    }
}

/// Arc-wrapped frame buffer for shared ownership.
pub type SharedFrameBuffer = Arc<FrameBuffer>;
