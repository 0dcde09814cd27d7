//! GPU texture management.

use lumagrade_core::{FrameBuffer, LumaError, PixelFormat, Result};

/// Format of the offscreen color target.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A GPU texture that can hold video frame data.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl GpuTexture {
    /// Create a new GPU texture with the given dimensions.
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: Option<&str>,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
            format,
        }
    }

    /// Texture format matching a frame's pixel layout. Frames hold
    /// display-referred values, so the unorm (non-sRGB) formats keep the
    /// shader working on the stored values.
    pub fn format_for(pixel_format: PixelFormat) -> wgpu::TextureFormat {
        match pixel_format {
            PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        }
    }

    /// Create a sampled texture sized for a video frame.
    pub fn for_video_frame(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Self {
        Self::new(
            device,
            width,
            height,
            Self::format_for(pixel_format),
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            Some("video frame texture"),
        )
    }

    /// Create the offscreen render target.
    pub fn render_target(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self::new(
            device,
            width.max(1),
            height.max(1),
            TARGET_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            Some("preview target"),
        )
    }

    /// Whether a frame can be uploaded without reallocating.
    pub fn fits(&self, frame: &FrameBuffer) -> bool {
        frame.width == self.width
            && frame.height == self.height
            && Self::format_for(frame.format) == self.format
    }

    /// Upload a FrameBuffer to this texture.
    pub fn upload_frame(&self, queue: &wgpu::Queue, frame: &FrameBuffer) -> Result<()> {
        if !self.fits(frame) {
            return Err(LumaError::Gpu(format!(
                "Frame {}x{} {:?} doesn't match texture {}x{} {:?}",
                frame.width, frame.height, frame.format, self.width, self.height, self.format
            )));
        }

        let plane = frame.primary_plane();

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &plane.data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(plane.stride as u32),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        Ok(())
    }
}
