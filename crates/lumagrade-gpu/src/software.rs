//! A [`GpuDevice`] that shades on the CPU.
//!
//! Shaders go through the same naga validation the hardware path uses, and
//! draws run the reference pipeline from `lumagrade-color`, so output
//! matches the WGSL program. Context loss can be simulated to exercise
//! recovery paths.

use crate::device::{
    check_viewport, BufferHandle, BufferKind, DrawCall, GpuDevice, ProgramHandle, SamplerState,
    ShaderHandle, TextureHandle,
};
use crate::error::{CompileError, ShaderStage};
use crate::shaders::{check_link, validate_stage};
use lumagrade_core::{
    FilterUniforms, FrameBuffer, LumaError, PixelFormat, Result, SurfaceSize, Viewport,
};
use std::collections::HashMap;
use tracing::{debug, warn};

struct SoftShader {
    stage: ShaderStage,
    module: naga::Module,
}

struct SoftTexture {
    frame: Option<FrameBuffer>,
}

struct SoftBuffer {
    kind: BufferKind,
    uniforms: Option<FilterUniforms>,
}

/// CPU-backed device with an RGBA8 color target.
pub struct SoftwareDevice {
    shaders: HashMap<u32, SoftShader>,
    programs: HashMap<u32, (ShaderHandle, ShaderHandle)>,
    textures: HashMap<u32, SoftTexture>,
    buffers: HashMap<u32, SoftBuffer>,
    next_id: u32,
    back: FrameBuffer,
    front: FrameBuffer,
    in_frame: bool,
    presented: u64,
    lost: bool,
}

impl SoftwareDevice {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            next_id: 1,
            back: FrameBuffer::new(size.width, size.height, PixelFormat::Rgba8),
            front: FrameBuffer::new(size.width, size.height, PixelFormat::Rgba8),
            in_frame: false,
            presented: 0,
            lost: false,
        }
    }

    /// Drop every object as a driver reset would. Handles held by callers
    /// become invalid.
    pub fn simulate_context_loss(&mut self) {
        warn!("software device: simulating context loss");
        self.shaders.clear();
        self.programs.clear();
        self.textures.clear();
        self.buffers.clear();
        self.in_frame = false;
        self.lost = true;
    }

    /// Frames presented since creation.
    pub fn presented_frames(&self) -> u64 {
        self.presented
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_live(&self) -> Result<()> {
        if self.lost {
            Err(LumaError::ContextLost)
        } else {
            Ok(())
        }
    }

    fn shader(&self, handle: ShaderHandle) -> std::result::Result<&SoftShader, CompileError> {
        self.shaders.get(&handle.0).ok_or_else(|| {
            CompileError::new(ShaderStage::Link, format!("unknown shader {}", handle.0))
        })
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new(SurfaceSize::new(0, 0))
    }
}

impl GpuDevice for SoftwareDevice {
    fn backend_name(&self) -> &str {
        "software"
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> std::result::Result<ShaderHandle, CompileError> {
        if self.lost {
            return Err(CompileError::new(stage, "GPU context lost"));
        }
        let module = validate_stage(stage, source)?;
        let id = self.alloc_id();
        self.shaders.insert(id, SoftShader { stage, module });
        debug!(id, %stage, "software device: shader compiled");
        Ok(ShaderHandle(id))
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> std::result::Result<ProgramHandle, CompileError> {
        if self.lost {
            return Err(CompileError::new(ShaderStage::Link, "GPU context lost"));
        }
        let vs = self.shader(vertex)?;
        let fs = self.shader(fragment)?;
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err(CompileError::new(
                ShaderStage::Link,
                format!("expected vertex + fragment, got {} + {}", vs.stage, fs.stage),
            ));
        }
        check_link(&vs.module, &fs.module)?;

        let id = self.alloc_id();
        self.programs.insert(id, (vertex, fragment));
        Ok(ProgramHandle(id))
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader.0);
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn create_texture(&mut self, sampler: SamplerState) -> Result<TextureHandle> {
        self.ensure_live()?;
        if sampler != SamplerState::VIDEO {
            return Err(LumaError::UnsupportedFormat(format!(
                "software sampler only supports clamp-to-edge linear, got {sampler:?}"
            )));
        }
        let id = self.alloc_id();
        self.textures.insert(id, SoftTexture { frame: None });
        Ok(TextureHandle(id))
    }

    fn upload_texture(&mut self, texture: TextureHandle, frame: &FrameBuffer) -> Result<()> {
        self.ensure_live()?;
        let slot = self
            .textures
            .get_mut(&texture.0)
            .ok_or(LumaError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })?;
        slot.frame = Some(frame.clone());
        Ok(())
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .get(&texture.0)
            .and_then(|t| t.frame.as_ref())
            .map(FrameBuffer::size)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn create_buffer(&mut self, kind: BufferKind) -> Result<BufferHandle> {
        self.ensure_live()?;
        let id = self.alloc_id();
        self.buffers.insert(
            id,
            SoftBuffer {
                kind,
                uniforms: None,
            },
        );
        Ok(BufferHandle(id))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn resize_target(&mut self, size: SurfaceSize) -> Result<()> {
        self.ensure_live()?;
        self.back = FrameBuffer::new(size.width, size.height, PixelFormat::Rgba8);
        self.front = FrameBuffer::new(size.width, size.height, PixelFormat::Rgba8);
        Ok(())
    }

    fn target_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.back.width, self.back.height)
    }

    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<()> {
        self.ensure_live()?;
        self.back = FrameBuffer::solid(self.back.width, self.back.height, to_rgba8(clear));
        self.in_frame = true;
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<()> {
        self.ensure_live()?;
        if !self.in_frame {
            return Err(LumaError::Gpu("draw outside begin_frame/end_frame".into()));
        }
        if !self.programs.contains_key(&call.program.0) {
            return Err(LumaError::InvalidHandle {
                kind: "program",
                id: call.program.0,
            });
        }
        match self.buffers.get(&call.quad.0) {
            Some(b) if b.kind == BufferKind::Quad => {}
            _ => {
                return Err(LumaError::InvalidHandle {
                    kind: "quad buffer",
                    id: call.quad.0,
                })
            }
        }
        check_viewport(call.viewport, self.target_size())?;

        let uniforms = self
            .buffers
            .get_mut(&call.uniform_buffer.0)
            .filter(|b| b.kind == BufferKind::Uniform)
            .ok_or(LumaError::InvalidHandle {
                kind: "uniform buffer",
                id: call.uniform_buffer.0,
            })?;
        uniforms.uniforms = Some(call.uniforms);

        let source = self
            .textures
            .get(&call.texture.0)
            .ok_or(LumaError::InvalidHandle {
                kind: "texture",
                id: call.texture.0,
            })?
            .frame
            .as_ref()
            .ok_or_else(|| LumaError::Gpu(format!("texture {} has no contents", call.texture.0)))?;

        lumagrade_color::rasterize(source, &mut self.back, call.viewport, &call.uniforms);
        Ok(())
    }

    fn fill(&mut self, viewport: Viewport, color: [f32; 4]) -> Result<()> {
        self.ensure_live()?;
        if !self.in_frame {
            return Err(LumaError::Gpu("fill outside begin_frame/end_frame".into()));
        }
        check_viewport(viewport, self.target_size())?;
        let rgba = to_rgba8(color);
        for y in viewport.y..viewport.y + viewport.height {
            for x in viewport.x..viewport.x + viewport.width {
                self.back.set_pixel(x, y, rgba);
            }
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.ensure_live()?;
        if !self.in_frame {
            return Err(LumaError::Gpu("end_frame without begin_frame".into()));
        }
        self.front.clone_from(&self.back);
        self.in_frame = false;
        self.presented += 1;
        Ok(())
    }

    fn read_target(&mut self) -> Result<FrameBuffer> {
        self.ensure_live()?;
        Ok(self.front.clone())
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn restore_context(&mut self) -> Result<()> {
        if self.lost {
            debug!("software device: context restored");
            let size = self.target_size();
            self.lost = false;
            self.resize_target(size)?;
        }
        Ok(())
    }

    fn live_objects(&self) -> usize {
        self.shaders.len() + self.programs.len() + self.textures.len() + self.buffers.len()
    }
}

fn to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{FRAGMENT_SOURCE, VERTEX_SOURCE};
    use lumagrade_core::FilterParameters;

    struct Fixture {
        device: SoftwareDevice,
        program: ProgramHandle,
        texture: TextureHandle,
        quad: BufferHandle,
        uniform_buffer: BufferHandle,
    }

    fn fixture(size: SurfaceSize) -> Fixture {
        let mut device = SoftwareDevice::new(size);
        let vs = device.compile_shader(ShaderStage::Vertex, VERTEX_SOURCE).unwrap();
        let fs = device.compile_shader(ShaderStage::Fragment, FRAGMENT_SOURCE).unwrap();
        let program = device.link_program(vs, fs).unwrap();
        let texture = device.create_texture(SamplerState::VIDEO).unwrap();
        let quad = device.create_buffer(BufferKind::Quad).unwrap();
        let uniform_buffer = device.create_buffer(BufferKind::Uniform).unwrap();
        Fixture {
            device,
            program,
            texture,
            quad,
            uniform_buffer,
        }
    }

    fn call(f: &Fixture, uniforms: FilterUniforms, viewport: Viewport) -> DrawCall {
        DrawCall {
            program: f.program,
            texture: f.texture,
            quad: f.quad,
            uniform_buffer: f.uniform_buffer,
            uniforms,
            viewport,
        }
    }

    #[test]
    fn draw_renders_graded_frame() {
        let size = SurfaceSize::new(4, 4);
        let mut f = fixture(size);
        let frame = FrameBuffer::solid(4, 4, [128, 128, 128, 255]);
        f.device.upload_texture(f.texture, &frame).unwrap();

        let params = FilterParameters {
            brightness: 150.0,
            ..Default::default()
        };
        let uniforms = FilterUniforms::from_parameters(&params, (4, 4), 0.0);
        f.device.begin_frame([0.0, 0.0, 0.0, 1.0]).unwrap();
        let draw = call(&f, uniforms, size.full_viewport());
        f.device.draw(&draw).unwrap();
        f.device.end_frame().unwrap();

        let out = f.device.read_target().unwrap();
        assert_eq!(out.pixel(2, 2), [255, 255, 255, 255]);
        assert_eq!(f.device.presented_frames(), 1);
    }

    #[test]
    fn clear_fills_undrawn_area() {
        let size = SurfaceSize::new(8, 2);
        let mut f = fixture(size);
        f.device
            .upload_texture(f.texture, &FrameBuffer::solid(4, 2, [10, 10, 10, 255]))
            .unwrap();
        f.device.begin_frame([1.0, 0.0, 0.0, 1.0]).unwrap();
        let draw = call(&f, FilterUniforms::passthrough((4, 2)), Viewport::new(0, 0, 4, 2));
        f.device.draw(&draw).unwrap();
        f.device.end_frame().unwrap();

        let out = f.device.read_target().unwrap();
        assert_eq!(out.pixel(1, 1), [10, 10, 10, 255]);
        assert_eq!(out.pixel(6, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn fill_paints_rectangle_under_later_draws() {
        let size = SurfaceSize::new(6, 2);
        let mut f = fixture(size);
        f.device
            .upload_texture(f.texture, &FrameBuffer::solid(2, 2, [10, 10, 10, 255]))
            .unwrap();
        f.device.begin_frame([0.0, 0.0, 0.0, 1.0]).unwrap();
        f.device.fill(Viewport::new(2, 0, 4, 2), [0.0, 0.0, 1.0, 1.0]).unwrap();
        let draw = call(&f, FilterUniforms::passthrough((2, 2)), Viewport::new(4, 0, 2, 2));
        f.device.draw(&draw).unwrap();
        f.device.end_frame().unwrap();

        let out = f.device.read_target().unwrap();
        assert_eq!(out.pixel(0, 1), [0, 0, 0, 255]);
        assert_eq!(out.pixel(3, 1), [0, 0, 255, 255]);
        assert_eq!(out.pixel(5, 1), [10, 10, 10, 255]);

        assert!(f.device.fill(Viewport::new(0, 0, 1, 1), [1.0; 4]).is_err(), "outside a frame");
        f.device.begin_frame([0.0; 4]).unwrap();
        assert!(f.device.fill(Viewport::new(5, 0, 2, 2), [1.0; 4]).is_err(), "past the target");
    }

    #[test]
    fn draw_without_upload_fails() {
        let size = SurfaceSize::new(2, 2);
        let mut f = fixture(size);
        f.device.begin_frame([0.0; 4]).unwrap();
        let draw = call(&f, FilterUniforms::passthrough((2, 2)), size.full_viewport());
        assert!(f.device.draw(&draw).is_err());
    }

    #[test]
    fn link_rejects_swapped_stages() {
        let mut device = SoftwareDevice::default();
        let vs = device.compile_shader(ShaderStage::Vertex, VERTEX_SOURCE).unwrap();
        let fs = device.compile_shader(ShaderStage::Fragment, FRAGMENT_SOURCE).unwrap();
        let err = device.link_program(fs, vs).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Link);
    }

    #[test]
    fn non_video_sampler_is_rejected() {
        let mut device = SoftwareDevice::default();
        let repeat = SamplerState {
            wrap_u: crate::device::WrapMode::Repeat,
            ..SamplerState::VIDEO
        };
        assert!(device.create_texture(repeat).is_err());
    }

    #[test]
    fn context_loss_invalidates_everything() {
        let size = SurfaceSize::new(2, 2);
        let mut f = fixture(size);
        assert_eq!(f.device.live_objects(), 6);

        f.device.simulate_context_loss();
        assert!(f.device.is_context_lost());
        assert_eq!(f.device.live_objects(), 0);
        assert!(matches!(f.device.begin_frame([0.0; 4]), Err(LumaError::ContextLost)));

        f.device.restore_context().unwrap();
        assert!(!f.device.is_context_lost());
        assert_eq!(f.device.target_size(), size);
        // Old handles stay dead after restore.
        assert!(f
            .device
            .upload_texture(f.texture, &FrameBuffer::solid(2, 2, [0; 4]))
            .is_err());
    }
}
