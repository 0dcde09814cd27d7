//! Observable properties of the grading pipeline.

use crate::support::{clip, gradient, hard_edge, max_channel_diff, software_loop};
use lumagrade_color::render_frame;
use lumagrade_core::{FilterParameters, FrameBuffer, SurfaceSize};
use lumagrade_gpu::{GpuDevice, TickOutcome};
use proptest::prelude::*;
use std::time::Instant;

#[test]
fn neutral_parameters_reproduce_the_source() {
    for frame in [gradient(31, 17), FrameBuffer::test_pattern(64, 8), hard_edge(10, 3)] {
        let out = render_frame(&frame, &FilterParameters::NEUTRAL, 0.0);
        assert_eq!(out.to_packed_rgba(), frame.to_packed_rgba());
    }
}

#[test]
fn neutral_render_loop_reproduces_the_source() {
    let frame = gradient(24, 12);
    let mut render = software_loop(SurfaceSize::new(24, 12), FilterParameters::NEUTRAL);
    render.start().unwrap();
    assert_eq!(render.tick(&clip(frame.clone()), Instant::now()).unwrap(), TickOutcome::Rendered);

    let out = render.device_mut().read_target().unwrap();
    assert_eq!(out.to_packed_rgba(), frame.to_packed_rgba());
}

#[test]
fn same_inputs_render_identically() {
    let frame = gradient(20, 20);
    let params = FilterParameters {
        brightness: 115.0,
        saturation: 160.0,
        hue: 40.0,
        clarity: 35.0,
        vignette: 50.0,
        noise: 60.0,
        ..Default::default()
    };

    let a = render_frame(&frame, &params, 7.0);
    let b = render_frame(&frame, &params, 7.0);
    assert_eq!(a.to_packed_rgba(), b.to_packed_rgba());

    let through_loop = |frame: &FrameBuffer| {
        let mut render = software_loop(SurfaceSize::new(20, 20), params);
        render.start().unwrap();
        render.tick(&clip(frame.clone()), Instant::now()).unwrap();
        render.device_mut().read_target().unwrap()
    };
    assert_eq!(through_loop(&frame).to_packed_rgba(), through_loop(&frame).to_packed_rgba());
}

#[test]
fn blur_runs_before_sharpen() {
    let frame = hard_edge(16, 4);
    let params = FilterParameters {
        sharpen: 50.0,
        blur: 50.0,
        ..Default::default()
    };
    let one_pass = render_frame(&frame, &params, 0.0);

    // The other order: sharpen, store, then blur.
    let sharpened = render_frame(
        &frame,
        &FilterParameters {
            sharpen: 50.0,
            ..Default::default()
        },
        0.0,
    );
    let reversed = render_frame(
        &sharpened,
        &FilterParameters {
            blur: 50.0,
            ..Default::default()
        },
        0.0,
    );

    assert!(max_channel_diff(&one_pass, &reversed) > 0);
}

#[test]
fn brightness_lifts_mid_gray_uniformly() {
    let frame = FrameBuffer::solid(12, 8, [128, 128, 128, 255]);
    let params = FilterParameters {
        brightness: 150.0,
        contrast: 100.0,
        saturation: 100.0,
        ..FilterParameters::NEUTRAL
    };
    let out = render_frame(&frame, &params, 0.0);

    let first = out.pixel(0, 0);
    assert!(first[0] > 128);
    assert_eq!(first[0], first[1]);
    assert_eq!(first[1], first[2]);
    assert_eq!(first[3], 255);
    for y in 0..out.height {
        for x in 0..out.width {
            assert_eq!(out.pixel(x, y), first, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn brightness_delta_is_constant_below_white() {
    let frame = FrameBuffer::solid(6, 6, [64, 64, 64, 255]);
    let params = FilterParameters {
        brightness: 120.0,
        ..FilterParameters::NEUTRAL
    };
    let out = render_frame(&frame, &params, 0.0);
    let delta = out.pixel(3, 3)[0] as i32 - 64;
    assert!((50..=52).contains(&delta), "{delta}");
}

#[test]
fn vignette_darkens_corners() {
    let frame = FrameBuffer::solid(9, 9, [255, 255, 255, 255]);
    let params = FilterParameters {
        vignette: 100.0,
        ..Default::default()
    };
    let out = render_frame(&frame, &params, 0.0);

    let center = out.pixel(4, 4)[0];
    assert_eq!(center, 255);
    for (x, y) in [(0, 0), (8, 0), (0, 8), (8, 8)] {
        assert!(out.pixel(x, y)[0] < center, "corner ({x}, {y})");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn out_of_range_values_match_the_nearest_bound(
        index in 0usize..15,
        excess in 0.5f32..1000.0,
        above in any::<bool>(),
    ) {
        let spec = FilterParameters::SPECS[index];
        let (outside, bound) = if above {
            (spec.range.max + excess, spec.range.max)
        } else {
            (spec.range.min - excess, spec.range.min)
        };
        let frame = gradient(8, 8);

        let clamped = FilterParameters::NEUTRAL.with_value(spec.name, outside).unwrap();
        let at_bound = FilterParameters::NEUTRAL.with_value(spec.name, bound).unwrap();
        let a = render_frame(&frame, &clamped, 0.0);
        let b = render_frame(&frame, &at_bound, 0.0);
        prop_assert_eq!(a.to_packed_rgba(), b.to_packed_rgba(), "{}", spec.name);
    }
}
