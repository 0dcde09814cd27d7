//! lumagrade gpu - render core for the live grading preview
//!
//! Compiles the grading program, uploads decoded frames and draws them
//! once per display refresh. Uses Metal on macOS; Vulkan, DX12 or GL
//! elsewhere. [`SoftwareDevice`] runs the same program on the CPU for
//! headless use and tests.

pub mod context;
pub mod device;
pub mod error;
pub mod program;
pub mod render_loop;
pub mod session;
pub mod shaders;
pub mod software;
pub mod split;
pub mod surface_host;
pub mod texture;
pub mod upload;
pub mod wgpu_device;

pub use context::GpuContext;
pub use device::{
    BufferHandle, BufferKind, DrawCall, FilterMode, GpuDevice, ProgramHandle, QuadVertex,
    SamplerState, ShaderHandle, TextureHandle, WrapMode, QUAD_VERTICES,
};
pub use error::{CompileError, RenderError, ShaderStage};
pub use program::{compile_program, LinkedProgram, ProgramCache};
pub use render_loop::{
    FrameStats, GrainMode, LoopState, ManualScheduler, RefreshScheduler, RefreshToken, RenderEvent,
    RenderLoop, RenderLoopConfig, SkipReason, TickOutcome,
};
pub use session::PreviewSession;
pub use shaders::ProgramSources;
pub use software::SoftwareDevice;
pub use split::{
    run_drift_sync, DriftCorrection, DriftSync, DriftSyncConfig, DriftSyncStats, SplitLayout,
};
pub use surface_host::{SurfaceHost, SurfaceHostConfig};
pub use texture::GpuTexture;
pub use upload::{FrameUploader, UploadOutcome};
pub use wgpu_device::WgpuDevice;
