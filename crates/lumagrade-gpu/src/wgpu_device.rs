//! [`GpuDevice`] on wgpu.
//!
//! Renders into an offscreen RGBA8 target. A frame's draws are recorded by
//! [`GpuDevice::draw`] and submitted as one render pass in
//! [`GpuDevice::end_frame`]; uniform writes are queued immediately, so each
//! draw within a frame needs its own uniform buffer. Solid fills are buffer
//! copies encoded between the clear and the draw pass.

use crate::context::GpuContext;
use crate::device::{
    check_viewport, BufferHandle, BufferKind, DrawCall, FilterMode, GpuDevice, ProgramHandle,
    QuadVertex, SamplerState, ShaderHandle, TextureHandle, WrapMode, QUAD_VERTICES,
};
use crate::error::{CompileError, ShaderStage};
use crate::shaders::{check_link, validate_stage, FRAGMENT_ENTRY, VERTEX_ENTRY};
use crate::texture::{GpuTexture, TARGET_FORMAT};
use lumagrade_core::{
    FilterUniforms, FrameBuffer, LumaError, PixelFormat, Result, SurfaceSize, Viewport,
};
use std::collections::HashMap;
use std::sync::mpsc;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

struct CompiledShader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
    ir: naga::Module,
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

struct SampledTexture {
    sampler: wgpu::Sampler,
    texture: Option<GpuTexture>,
}

struct DeviceBuffer {
    kind: BufferKind,
    buffer: wgpu::Buffer,
}

struct PendingFrame {
    clear: wgpu::Color,
    fills: Vec<(Viewport, [u8; 4])>,
    draws: Vec<DrawCall>,
}

/// Hardware device with an offscreen color target.
pub struct WgpuDevice {
    context: GpuContext,
    shaders: HashMap<u32, CompiledShader>,
    programs: HashMap<u32, LinkedProgram>,
    textures: HashMap<u32, SampledTexture>,
    buffers: HashMap<u32, DeviceBuffer>,
    target: GpuTexture,
    target_size: SurfaceSize,
    frame: Option<PendingFrame>,
    next_id: u32,
}

impl WgpuDevice {
    pub fn new(context: GpuContext, size: SurfaceSize) -> Self {
        let target = GpuTexture::render_target(&context.device, size.width, size.height);
        info!(adapter = %context.adapter_info().name, %size, "wgpu preview device ready");
        Self {
            context,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            target,
            target_size: size,
            frame: None,
            next_id: 1,
        }
    }

    /// Open the default adapter and create a device on it.
    pub fn new_blocking(size: SurfaceSize) -> Result<Self> {
        Ok(Self::new(GpuContext::new_blocking()?, size))
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_live(&self) -> Result<()> {
        if self.context.is_lost() {
            Err(LumaError::ContextLost)
        } else {
            Ok(())
        }
    }

    fn buffer(&self, handle: BufferHandle, kind: BufferKind) -> Result<&wgpu::Buffer> {
        self.buffers
            .get(&handle.0)
            .filter(|b| b.kind == kind)
            .map(|b| &b.buffer)
            .ok_or(LumaError::InvalidHandle {
                kind: match kind {
                    BufferKind::Quad => "quad buffer",
                    BufferKind::Uniform => "uniform buffer",
                },
                id: handle.0,
            })
    }

    /// Clear the whole target in a pass of its own.
    fn encode_clear(&self, encoder: &mut wgpu::CommandEncoder, clear: wgpu::Color) {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("preview clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    /// Copy a solid rectangle into the target. Rows are padded to the copy
    /// alignment.
    fn encode_fill(&self, encoder: &mut wgpu::CommandEncoder, viewport: Viewport, rgba: [u8; 4]) {
        let row = viewport.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = row.div_ceil(align) * align;
        let mut contents = vec![0u8; padded as usize * viewport.height as usize];
        for line in contents.chunks_exact_mut(padded as usize) {
            for texel in line[..row as usize].chunks_exact_mut(4) {
                texel.copy_from_slice(&rgba);
            }
        }
        let staging = self
            .context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("preview fill"),
                contents: &contents,
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(viewport.height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: viewport.x,
                    y: viewport.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: viewport.width,
                height: viewport.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_pipeline(
        &self,
        vs: &wgpu::ShaderModule,
        fs: &wgpu::ShaderModule,
    ) -> (LinkedProgram, Option<wgpu::Error>) {
        self.context.validation_scope(|device| {
            let layout_desc = wgpu::BindGroupLayoutDescriptor {
                label: Some("grade bind group layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(FilterUniforms::SIZE),
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            };
            let bind_group_layout = device.create_bind_group_layout(&layout_desc);

            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("grade pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("grade pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: vs,
                    entry_point: Some(VERTEX_ENTRY),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &QUAD_ATTRIBUTES,
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: fs,
                    entry_point: Some(FRAGMENT_ENTRY),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });

            LinkedProgram {
                pipeline,
                bind_group_layout,
            }
        })
    }
}

fn address_mode(mode: WrapMode) -> wgpu::AddressMode {
    match mode {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn filter_mode(mode: FilterMode) -> wgpu::FilterMode {
    match mode {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

impl GpuDevice for WgpuDevice {
    fn backend_name(&self) -> &str {
        "wgpu"
    }

    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> std::result::Result<ShaderHandle, CompileError> {
        if self.context.is_lost() {
            return Err(CompileError::new(stage, "GPU context lost"));
        }
        let ir = validate_stage(stage, source)?;

        let (module, error) = self.context.validation_scope(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "preview vertex shader",
                    _ => "grade fragment shader",
                }),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(error) = error {
            return Err(CompileError::new(stage, error.to_string()));
        }

        let id = self.alloc_id();
        self.shaders.insert(id, CompiledShader { stage, module, ir });
        debug!(id, %stage, "shader compiled");
        Ok(ShaderHandle(id))
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> std::result::Result<ProgramHandle, CompileError> {
        if self.context.is_lost() {
            return Err(CompileError::new(ShaderStage::Link, "GPU context lost"));
        }
        let lookup = |handle: ShaderHandle| {
            self.shaders.get(&handle.0).ok_or_else(|| {
                CompileError::new(ShaderStage::Link, format!("unknown shader {}", handle.0))
            })
        };
        let vs = lookup(vertex)?;
        let fs = lookup(fragment)?;
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err(CompileError::new(
                ShaderStage::Link,
                format!("expected vertex + fragment, got {} + {}", vs.stage, fs.stage),
            ));
        }
        check_link(&vs.ir, &fs.ir)?;

        let (program, error) = self.create_pipeline(&vs.module, &fs.module);
        if let Some(error) = error {
            return Err(CompileError::new(ShaderStage::Link, error.to_string()));
        }

        let id = self.alloc_id();
        self.programs.insert(id, program);
        Ok(ProgramHandle(id))
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader.0);
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn create_texture(&mut self, state: SamplerState) -> Result<TextureHandle> {
        self.ensure_live()?;
        let sampler = self.context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("video sampler"),
            address_mode_u: address_mode(state.wrap_u),
            address_mode_v: address_mode(state.wrap_v),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter_mode(state.mag_filter),
            min_filter: filter_mode(state.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let id = self.alloc_id();
        self.textures.insert(
            id,
            SampledTexture {
                sampler,
                texture: None,
            },
        );
        Ok(TextureHandle(id))
    }

    fn upload_texture(&mut self, texture: TextureHandle, frame: &FrameBuffer) -> Result<()> {
        self.ensure_live()?;
        if frame.width == 0 || frame.height == 0 {
            return Err(LumaError::InvalidParameter("cannot upload an empty frame".into()));
        }
        let device = &self.context.device;
        let slot = self
            .textures
            .get_mut(&texture.0)
            .ok_or(LumaError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })?;

        if !slot.texture.as_ref().is_some_and(|t| t.fits(frame)) {
            debug!(
                width = frame.width,
                height = frame.height,
                format = ?frame.format,
                "allocating frame texture"
            );
            slot.texture = Some(GpuTexture::for_video_frame(
                device,
                frame.width,
                frame.height,
                frame.format,
            ));
        }
        match &slot.texture {
            Some(t) => t.upload_frame(&self.context.queue, frame),
            None => Err(LumaError::Gpu("frame texture missing after allocation".into())),
        }
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .get(&texture.0)
            .and_then(|t| t.texture.as_ref())
            .map(|t| (t.width, t.height))
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn create_buffer(&mut self, kind: BufferKind) -> Result<BufferHandle> {
        self.ensure_live()?;
        let device = &self.context.device;
        let buffer = match kind {
            BufferKind::Quad => device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("preview quad"),
                contents: bytemuck::cast_slice(&QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            BufferKind::Uniform => device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("grade uniforms"),
                size: FilterUniforms::SIZE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        };
        let id = self.alloc_id();
        self.buffers.insert(id, DeviceBuffer { kind, buffer });
        Ok(BufferHandle(id))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn resize_target(&mut self, size: SurfaceSize) -> Result<()> {
        self.ensure_live()?;
        if size != self.target_size {
            self.target = GpuTexture::render_target(&self.context.device, size.width, size.height);
            self.target_size = size;
        }
        Ok(())
    }

    fn target_size(&self) -> SurfaceSize {
        self.target_size
    }

    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<()> {
        self.ensure_live()?;
        let [r, g, b, a] = clear.map(f64::from);
        self.frame = Some(PendingFrame {
            clear: wgpu::Color { r, g, b, a },
            fills: Vec::new(),
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<()> {
        self.ensure_live()?;
        if self.frame.is_none() {
            return Err(LumaError::Gpu("draw outside begin_frame/end_frame".into()));
        }
        if call.viewport.is_empty() {
            return Ok(());
        }
        check_viewport(call.viewport, self.target_size)?;
        if !self.programs.contains_key(&call.program.0) {
            return Err(LumaError::InvalidHandle {
                kind: "program",
                id: call.program.0,
            });
        }
        self.buffer(call.quad, BufferKind::Quad)?;
        let uniforms = self.buffer(call.uniform_buffer, BufferKind::Uniform)?;
        self.context
            .queue
            .write_buffer(uniforms, 0, call.uniforms.as_bytes());

        if let Some(frame) = self.frame.as_mut() {
            frame.draws.push(*call);
        }
        Ok(())
    }

    fn fill(&mut self, viewport: Viewport, color: [f32; 4]) -> Result<()> {
        self.ensure_live()?;
        check_viewport(viewport, self.target_size)?;
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| LumaError::Gpu("fill outside begin_frame/end_frame".into()))?;
        if !viewport.is_empty() {
            let rgba = color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            frame.fills.push((viewport, rgba));
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.ensure_live()?;
        let frame = self
            .frame
            .take()
            .ok_or_else(|| LumaError::Gpu("end_frame without begin_frame".into()))?;
        let device = &self.context.device;

        let mut passes = Vec::with_capacity(frame.draws.len());
        for call in &frame.draws {
            let program = self.programs.get(&call.program.0).ok_or(LumaError::InvalidHandle {
                kind: "program",
                id: call.program.0,
            })?;
            let sampled = self.textures.get(&call.texture.0).ok_or(LumaError::InvalidHandle {
                kind: "texture",
                id: call.texture.0,
            })?;
            let texture = sampled
                .texture
                .as_ref()
                .ok_or_else(|| {
                    LumaError::Gpu(format!("texture {} has no contents", call.texture.0))
                })?;
            let uniforms = self.buffer(call.uniform_buffer, BufferKind::Uniform)?;
            let quad = self.buffer(call.quad, BufferKind::Quad)?;

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("grade bind group"),
                layout: &program.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampled.sampler),
                    },
                ],
            });
            passes.push((&program.pipeline, bind_group, quad, call.viewport));
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("preview frame"),
        });
        let load = if frame.fills.is_empty() {
            wgpu::LoadOp::Clear(frame.clear)
        } else {
            self.encode_clear(&mut encoder, frame.clear);
            for (viewport, rgba) in &frame.fills {
                self.encode_fill(&mut encoder, *viewport, *rgba);
            }
            wgpu::LoadOp::Load
        };
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("preview pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            for (pipeline, bind_group, quad, viewport) in &passes {
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.set_vertex_buffer(0, quad.slice(..));
                pass.set_viewport(
                    viewport.x as f32,
                    viewport.y as f32,
                    viewport.width as f32,
                    viewport.height as f32,
                    0.0,
                    1.0,
                );
                pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
            }
        }
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_target(&mut self) -> Result<FrameBuffer> {
        self.ensure_live()?;
        let size = self.target_size;
        if size.is_empty() {
            return Ok(FrameBuffer::new(size.width, size.height, PixelFormat::Rgba8));
        }

        let unpadded = size.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let device = &self.context.device;

        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("preview readback"),
            size: u64::from(padded) * u64::from(size.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("preview readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| LumaError::Gpu("readback callback dropped".into()))?
            .map_err(|e| LumaError::Gpu(format!("readback mapping failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let mut packed = Vec::with_capacity((unpadded * size.height) as usize);
        for row in mapped.chunks_exact(padded as usize) {
            packed.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(mapped);
        readback.unmap();

        FrameBuffer::from_packed(size.width, size.height, PixelFormat::Rgba8, &packed)
    }

    fn is_context_lost(&self) -> bool {
        self.context.is_lost()
    }

    fn restore_context(&mut self) -> Result<()> {
        if !self.context.is_lost() {
            return Ok(());
        }
        let context = GpuContext::new_blocking()?;
        self.shaders.clear();
        self.programs.clear();
        self.textures.clear();
        self.buffers.clear();
        self.frame = None;
        self.target = GpuTexture::render_target(
            &context.device,
            self.target_size.width,
            self.target_size.height,
        );
        self.context = context;
        info!("GPU context restored");
        Ok(())
    }

    fn live_objects(&self) -> usize {
        self.shaders.len() + self.programs.len() + self.textures.len() + self.buffers.len()
    }
}
