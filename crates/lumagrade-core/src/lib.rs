//! lumagrade core - value types for the live grading preview
//!
//! This crate provides the types shared by the color pipeline and the
//! render core:
//! - Filter parameters and their packed uniform form
//! - Frame buffers and pixel formats
//! - Render-surface geometry
//! - Video frame source traits and an in-memory clip

pub mod error;
pub mod frame;
pub mod params;
pub mod source;
pub mod surface;
pub mod time;
pub mod uniforms;

pub use error::{LumaError, Result};
pub use frame::{FrameBuffer, FramePlane, PixelFormat, SharedFrameBuffer};
pub use params::{FilterParameters, ParamRange, ParamSpec};
pub use source::{MemorySource, PlaybackControl, ReadyState, VideoFrameSource};
pub use surface::{SurfaceSize, Viewport};
pub use time::FrameRate;
pub use uniforms::FilterUniforms;
