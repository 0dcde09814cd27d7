//! The graphics-device seam.
//!
//! The render core talks to the GPU through [`GpuDevice`]: explicit object
//! handles, explicit deletion and one draw per viewport. [`WgpuDevice`]
//! drives real hardware; [`SoftwareDevice`] evaluates the same program on
//! the CPU for headless use and tests.
//!
//! [`WgpuDevice`]: crate::wgpu_device::WgpuDevice
//! [`SoftwareDevice`]: crate::software::SoftwareDevice

use crate::error::{CompileError, ShaderStage};
use bytemuck::{Pod, Zeroable};
use lumagrade_core::{FilterUniforms, FrameBuffer, Result, SurfaceSize, Viewport};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

handle!(
    /// A compiled shader stage.
    ShaderHandle
);
handle!(
    /// A linked vertex + fragment program.
    ProgramHandle
);
handle!(
    /// A sampled 2D texture.
    TextureHandle
);
handle!(
    /// A vertex or uniform buffer.
    BufferHandle
);

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Texel filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Sampler state attached to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerState {
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

impl SamplerState {
    /// Clamp-to-edge on both axes with linear filtering; no mipmaps.
    /// Video frames are rarely power-of-two sized, so this is the only
    /// state the preview uses.
    pub const VIDEO: Self = Self {
        wrap_u: WrapMode::ClampToEdge,
        wrap_v: WrapMode::ClampToEdge,
        min_filter: FilterMode::Linear,
        mag_filter: FilterMode::Linear,
    };
}

/// What a buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// The full-surface quad, [`QUAD_VERTICES`].
    Quad,
    /// One [`FilterUniforms`] block.
    Uniform,
}

/// Quad vertex: NDC position and viewport-local uv.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

const fn vertex(x: f32, y: f32, u: f32, v: f32) -> QuadVertex {
    QuadVertex {
        position: [x, y],
        uv: [u, v],
    }
}

/// Two triangles covering the viewport. uv (0,0) is the top-left corner.
pub const QUAD_VERTICES: [QuadVertex; 6] = [
    vertex(-1.0, 1.0, 0.0, 0.0),
    vertex(-1.0, -1.0, 0.0, 1.0),
    vertex(1.0, 1.0, 1.0, 0.0),
    vertex(1.0, 1.0, 1.0, 0.0),
    vertex(-1.0, -1.0, 0.0, 1.0),
    vertex(1.0, -1.0, 1.0, 1.0),
];

/// One quad drawn into one viewport of the target.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub texture: TextureHandle,
    pub quad: BufferHandle,
    pub uniform_buffer: BufferHandle,
    /// Written into `uniform_buffer` before the draw.
    pub uniforms: FilterUniforms,
    pub viewport: Viewport,
}

/// A GL-style graphics device with an offscreen color target.
///
/// Handles stay valid until deleted or until the context is lost; after a
/// loss every handle is dead and must not be deleted. Handle ids are never
/// reused, so a stale handle is reported as invalid rather than aliasing a
/// newer object.
pub trait GpuDevice {
    /// Human-readable backend name, for logs.
    fn backend_name(&self) -> &str;

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> std::result::Result<ShaderHandle, CompileError>;

    /// Link a vertex and a fragment shader. Failures report [`ShaderStage::Link`].
    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> std::result::Result<ProgramHandle, CompileError>;

    fn delete_shader(&mut self, shader: ShaderHandle);
    fn delete_program(&mut self, program: ProgramHandle);

    fn create_texture(&mut self, sampler: SamplerState) -> Result<TextureHandle>;

    /// Copy a frame into a texture, reallocating storage if the size or
    /// pixel format changed.
    fn upload_texture(&mut self, texture: TextureHandle, frame: &FrameBuffer) -> Result<()>;

    /// Size of the last upload, `None` before the first one.
    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;
    fn delete_texture(&mut self, texture: TextureHandle);

    fn create_buffer(&mut self, kind: BufferKind) -> Result<BufferHandle>;
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Resize the color target. Contents are undefined afterwards.
    fn resize_target(&mut self, size: SurfaceSize) -> Result<()>;
    fn target_size(&self) -> SurfaceSize;

    /// Start a frame by clearing the whole target.
    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<()>;
    fn draw(&mut self, call: &DrawCall) -> Result<()>;
    /// Paint a solid rectangle of the target. Draws issued in the same
    /// frame land on top of it.
    fn fill(&mut self, viewport: Viewport, color: [f32; 4]) -> Result<()>;
    /// Finish and present the frame.
    fn end_frame(&mut self) -> Result<()>;

    /// Copy the presented target back to memory as RGBA8.
    fn read_target(&mut self) -> Result<FrameBuffer>;

    fn is_context_lost(&self) -> bool;
    /// Bring up a fresh context after a loss. All objects must be recreated.
    fn restore_context(&mut self) -> Result<()>;

    /// Number of live shaders, programs, textures and buffers.
    fn live_objects(&self) -> usize;
}

/// Check a draw's viewport against the target before submitting it.
pub(crate) fn check_viewport(viewport: Viewport, target: SurfaceSize) -> Result<()> {
    if viewport.x.saturating_add(viewport.width) > target.width
        || viewport.y.saturating_add(viewport.height) > target.height
    {
        return Err(lumagrade_core::LumaError::InvalidParameter(format!(
            "viewport {}x{}+{}+{} exceeds target {target}",
            viewport.width, viewport.height, viewport.x, viewport.y
        )));
    }
    Ok(())
}
