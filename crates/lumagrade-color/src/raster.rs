//! Whole-frame evaluation of the pipeline on the CPU.
//!
//! Pixel-to-uv mapping follows the GPU rasterizer: fragment centers sit at
//! `(x + 0.5, y + 0.5)`, local uv spans the (unclipped) viewport, and the
//! uniform crop maps local uv onto the source.

use crate::pipeline::{shade, ShadeContext};
use crate::sampler::{to_rgba8, Sampler};
use glam::Vec2;
use lumagrade_core::{
    FilterParameters, FilterUniforms, FrameBuffer, PixelFormat, SurfaceSize, Viewport,
};
use rayon::prelude::*;

/// Shade `viewport` of `target` from `source`. Rows run in parallel.
pub fn rasterize(
    source: &FrameBuffer,
    target: &mut FrameBuffer,
    viewport: Viewport,
    uniforms: &FilterUniforms,
) {
    let size = SurfaceSize::new(target.width, target.height);
    let Some(clip) = viewport.clipped_to(size) else {
        return;
    };
    if viewport.is_empty() || source.width == 0 || source.height == 0 {
        return;
    }

    let offsets = target.format.channel_offsets();
    let sampler = Sampler::new(source);
    let origin = Vec2::new(viewport.x as f32, viewport.y as f32);
    let extent = Vec2::new(viewport.width as f32, viewport.height as f32);
    let crop_offset = Vec2::new(uniforms.uv_offset_x, uniforms.uv_offset_y);
    let crop_scale = Vec2::new(uniforms.uv_scale_x, uniforms.uv_scale_y);

    let plane = target.primary_plane_mut();
    let stride = plane.stride;
    plane
        .data
        .par_chunks_mut(stride)
        .enumerate()
        .skip(clip.y as usize)
        .take(clip.height as usize)
        .for_each(|(y, row)| {
            for x in clip.x..clip.x + clip.width {
                let frag_coord = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let local = (frag_coord - origin) / extent;
                let ctx = ShadeContext {
                    source: sampler,
                    uniforms,
                    uv: crop_offset + local * crop_scale,
                    frag_coord,
                };
                let rgba = to_rgba8(shade(&ctx));
                let i = x as usize * 4;
                for (c, &o) in offsets.iter().enumerate() {
                    row[i + o] = rgba[c];
                }
            }
        });
}

/// Grade a whole frame at its native size.
pub fn render_frame(
    source: &FrameBuffer,
    params: &FilterParameters,
    noise_seed: f32,
) -> FrameBuffer {
    let uniforms = FilterUniforms::from_parameters(params, source.size(), noise_seed);
    let mut target = FrameBuffer::new(source.width, source.height, PixelFormat::Rgba8);
    let viewport = SurfaceSize::new(source.width, source.height).full_viewport();
    rasterize(source, &mut target, viewport, &uniforms);
    target
}
