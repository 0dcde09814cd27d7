//! The hardware device against the software reference. Each test returns
//! early when no adapter is available.

use crate::support::{clip, gradient, max_channel_diff};
use lumagrade_core::{FilterParameters, FrameBuffer, SurfaceSize};
use lumagrade_gpu::{
    GpuDevice, GrainMode, ManualScheduler, RenderLoop, RenderLoopConfig, SoftwareDevice,
    TickOutcome, WgpuDevice,
};
use std::time::Instant;

fn hardware(size: SurfaceSize) -> Option<WgpuDevice> {
    match WgpuDevice::new_blocking(size) {
        Ok(device) => Some(device),
        Err(e) => {
            eprintln!("skipping: no GPU adapter ({e})");
            None
        }
    }
}

fn render_once<D: GpuDevice>(
    device: D,
    frame: &FrameBuffer,
    params: FilterParameters,
    split: bool,
) -> FrameBuffer {
    let config = RenderLoopConfig {
        grain: GrainMode::Fixed(3.0),
        ..Default::default()
    };
    let mut render = RenderLoop::new(device, ManualScheduler::new(), config);
    render.set_parameters(params);
    if split {
        render.enable_split().unwrap();
    }
    render.start().unwrap();

    let primary = clip(frame.clone());
    let mut secondary = clip(frame.clone());
    let outcome = render.tick_split(&primary, &mut secondary, Instant::now()).unwrap();
    assert_eq!(outcome, TickOutcome::Rendered);
    render.device_mut().read_target().unwrap()
}

fn graded() -> FilterParameters {
    FilterParameters {
        brightness: 108.0,
        contrast: 125.0,
        saturation: 150.0,
        hue: 20.0,
        temperature: 80.0,
        tint: 15.0,
        highlights: -30.0,
        shadows: 20.0,
        sepia: 25.0,
        vignette: 60.0,
        split_position: 0.4,
        ..Default::default()
    }
}

#[test]
fn render_loop_output_matches_software() {
    let size = SurfaceSize::new(40, 24);
    let Some(gpu) = hardware(size) else { return };
    let frame = gradient(40, 24);

    let a = render_once(gpu, &frame, graded(), false);
    let b = render_once(SoftwareDevice::new(size), &frame, graded(), false);
    let worst = max_channel_diff(&a, &b);
    assert!(worst <= 3, "GPU and CPU differ by {worst}");
}

#[test]
fn split_output_matches_software() {
    let size = SurfaceSize::new(40, 24);
    let Some(gpu) = hardware(size) else { return };
    let frame = gradient(40, 24);

    let a = render_once(gpu, &frame, graded(), true);
    let b = render_once(SoftwareDevice::new(size), &frame, graded(), true);
    let worst = max_channel_diff(&a, &b);
    assert!(worst <= 3, "GPU and CPU differ by {worst}");
}

#[test]
fn scaled_surface_matches_software() {
    let size = SurfaceSize::new(53, 31);
    let Some(gpu) = hardware(size) else { return };
    let frame = gradient(20, 12);

    let a = render_once(gpu, &frame, FilterParameters::NEUTRAL, false);
    let b = render_once(SoftwareDevice::new(size), &frame, FilterParameters::NEUTRAL, false);
    let worst = max_channel_diff(&a, &b);
    assert!(worst <= 2, "GPU and CPU differ by {worst}");
}
