//! lumagrade color - CPU reference of the grading pipeline.
//!
//! The same per-pixel math as the WGSL fragment program, evaluated on the
//! CPU. The software render device draws with it and the pipeline's
//! observable properties are tested against it.

pub mod hsl;
pub mod pipeline;
pub mod raster;
pub mod sampler;

pub use hsl::{hsl_to_rgb, rgb_to_hsl};
pub use pipeline::{shade, ShadeContext, Stage};
pub use raster::{rasterize, render_frame};
pub use sampler::{to_rgba8, Sampler};
