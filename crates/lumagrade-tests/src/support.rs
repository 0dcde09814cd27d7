//! Shared fixtures.

use lumagrade_core::{FilterParameters, FrameBuffer, MemorySource, PixelFormat, SurfaceSize};
use lumagrade_gpu::{GrainMode, ManualScheduler, RenderLoop, RenderLoopConfig, SoftwareDevice};
use std::time::Duration;

pub fn gradient(width: u32, height: u32) -> FrameBuffer {
    let mut frame = FrameBuffer::new(width, height, PixelFormat::Rgba8);
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.saturating_sub(1).max(1)) as u8;
            let g = (y * 255 / height.saturating_sub(1).max(1)) as u8;
            frame.set_pixel(x, y, [r, g, 96, 255]);
        }
    }
    frame
}

/// Black on the left half, white on the right.
pub fn hard_edge(width: u32, height: u32) -> FrameBuffer {
    let mut frame = FrameBuffer::solid(width, height, [0, 0, 0, 255]);
    for y in 0..height {
        for x in width / 2..width {
            frame.set_pixel(x, y, [255, 255, 255, 255]);
        }
    }
    frame
}

pub fn clip(frame: FrameBuffer) -> MemorySource {
    MemorySource::still(frame, Duration::from_secs(5))
}

pub fn software_loop(
    size: SurfaceSize,
    params: FilterParameters,
) -> RenderLoop<SoftwareDevice, ManualScheduler> {
    let config = RenderLoopConfig {
        grain: GrainMode::Fixed(0.0),
        ..Default::default()
    };
    let mut render = RenderLoop::new(SoftwareDevice::new(size), ManualScheduler::new(), config);
    render.set_parameters(params);
    render
}

pub fn max_channel_diff(a: &FrameBuffer, b: &FrameBuffer) -> u8 {
    a.to_packed_rgba()
        .iter()
        .zip(b.to_packed_rgba())
        .map(|(x, y)| x.abs_diff(y))
        .max()
        .unwrap_or(0)
}
