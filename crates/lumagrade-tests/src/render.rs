//! Render loop behavior across crates: resizing, split mode and drift.

use crate::support::{clip, gradient, software_loop};
use lumagrade_core::{
    FilterParameters, FrameBuffer, FrameRate, MemorySource, PlaybackControl, SurfaceSize,
    VideoFrameSource,
};
use lumagrade_gpu::{DriftSyncConfig, GpuDevice, RenderEvent, TickOutcome};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn resize_between_ticks_matches_new_dimensions() {
    let source = clip(FrameBuffer::solid(4, 4, [90, 140, 200, 255]));
    let mut render = software_loop(SurfaceSize::new(4, 4), FilterParameters::NEUTRAL);
    render.start().unwrap();
    render.tick(&source, Instant::now()).unwrap();

    for size in [SurfaceSize::new(7, 3), SurfaceSize::new(2, 9), SurfaceSize::new(16, 16)] {
        render.set_surface_size(size);
        assert_eq!(render.tick(&source, Instant::now()).unwrap(), TickOutcome::Rendered);

        let out = render.device_mut().read_target().unwrap();
        assert_eq!((out.width, out.height), (size.width, size.height));
        for y in 0..size.height {
            for x in 0..size.width {
                assert_eq!(out.pixel(x, y), [90, 140, 200, 255], "{size} at ({x}, {y})");
            }
        }
    }
}

#[test]
fn resize_does_not_rebuild_program_or_texture() {
    let source = clip(gradient(8, 8));
    let mut render = software_loop(SurfaceSize::new(8, 8), FilterParameters::NEUTRAL);
    render.start().unwrap();
    render.tick(&source, Instant::now()).unwrap();
    let live = render.device().live_objects();

    render.set_surface_size(SurfaceSize::new(12, 5));
    render.tick(&source, Instant::now()).unwrap();
    assert_eq!(render.device().live_objects(), live);
}

#[test]
fn split_drift_settles_within_one_interval() {
    let mut render = software_loop(SurfaceSize::new(16, 4), FilterParameters::NEUTRAL);
    render.enable_split().unwrap();
    render.start().unwrap();

    let mut primary = clip(gradient(16, 4));
    let mut secondary = clip(gradient(16, 4));
    primary.seek(2.0);
    let threshold = DriftSyncConfig::default().threshold_secs;

    let t0 = Instant::now();
    render.tick_split(&primary, &mut secondary, t0).unwrap();
    render
        .tick_split(&primary, &mut secondary, t0 + Duration::from_millis(100))
        .unwrap();

    let drift = (primary.current_time() - secondary.current_time()).abs();
    assert!(drift < threshold, "drift {drift}");
}

#[test]
fn split_playback_stays_aligned() {
    let mut render = software_loop(SurfaceSize::new(16, 4), FilterParameters::NEUTRAL);
    render.enable_split().unwrap();
    render.start().unwrap();

    let frames: Vec<_> = (0..60).map(|i| FrameBuffer::solid(16, 4, [i * 4, 0, 0, 255])).collect();
    let mut primary = MemorySource::from_frames(frames.clone(), FrameRate::FPS_30);
    let mut secondary = MemorySource::from_frames(frames, FrameRate::FPS_30);
    primary.set_paused(false);

    // The secondary runs slow and starts paused; the loop keeps pulling it back.
    let start = Instant::now();
    for tick in 1..=90u32 {
        let dt = Duration::from_millis(16);
        primary.advance(dt);
        secondary.advance(dt.mul_f64(0.8));
        let now = start + dt * tick;
        render.tick_split(&primary, &mut secondary, now).unwrap();
        assert!(!secondary.is_paused() || primary.is_paused());
    }

    // Drift can build for one interval past the last check.
    let drift = (primary.current_time() - secondary.current_time()).abs();
    assert!(drift < 0.15, "drift {drift}");
    assert!(render.stats().drift_corrections > 0);
}

#[test]
fn split_frame_notifications_flag_split_mode() {
    let mut render = software_loop(SurfaceSize::new(8, 2), FilterParameters::NEUTRAL);
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    render.on_event(move |event| sink.borrow_mut().push(event.clone()));
    render.enable_split().unwrap();
    render.start().unwrap();

    let primary = clip(gradient(8, 2));
    let mut secondary = clip(gradient(8, 2));
    render.tick_split(&primary, &mut secondary, Instant::now()).unwrap();

    assert!(matches!(
        events.borrow().as_slice(),
        [RenderEvent::FrameRendered { split: true, frame: 1, .. }]
    ));
}
