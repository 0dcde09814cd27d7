//! Per-lane GPU resources.
//!
//! A session holds everything one preview lane draws with: its program, its
//! frame texture, its quad and its uniform buffer. Sessions are created
//! whole or not at all, and [`PreviewSession::release`] consumes the
//! session, so teardown happens exactly once.

use crate::device::{BufferHandle, BufferKind, DrawCall, GpuDevice, ProgramHandle};
use crate::error::RenderError;
use crate::program::ProgramCache;
use crate::shaders::ProgramSources;
use crate::upload::{FrameUploader, UploadOutcome};
use lumagrade_core::{FilterUniforms, Result, VideoFrameSource, Viewport};
use tracing::debug;

#[derive(Debug)]
pub struct PreviewSession {
    programs: ProgramCache,
    program: ProgramHandle,
    uploader: FrameUploader,
    quad: BufferHandle,
    uniform_buffer: BufferHandle,
}

impl PreviewSession {
    /// Compile the program and allocate the lane's objects. On failure
    /// everything allocated so far is released.
    pub fn create(
        device: &mut dyn GpuDevice,
        sources: &ProgramSources,
    ) -> std::result::Result<Self, RenderError> {
        let mut programs = ProgramCache::new(sources.clone());
        let program = programs.get_or_compile(device)?;

        let uploader = match FrameUploader::create(device) {
            Ok(uploader) => uploader,
            Err(e) => {
                programs.release(device);
                return Err(e.into());
            }
        };
        let (quad, uniform_buffer) = match create_buffers(device) {
            Ok(buffers) => buffers,
            Err(e) => {
                uploader.release(device);
                programs.release(device);
                return Err(e.into());
            }
        };

        Ok(Self {
            programs,
            program,
            uploader,
            quad,
            uniform_buffer,
        })
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn uploader(&self) -> &FrameUploader {
        &self.uploader
    }

    pub fn upload(
        &mut self,
        device: &mut dyn GpuDevice,
        source: &dyn VideoFrameSource,
    ) -> Result<UploadOutcome> {
        self.uploader.upload(device, source)
    }

    /// Draw the lane's texture into `viewport` with `uniforms`.
    pub fn draw(
        &self,
        device: &mut dyn GpuDevice,
        uniforms: FilterUniforms,
        viewport: Viewport,
    ) -> Result<()> {
        device.draw(&DrawCall {
            program: self.program,
            texture: self.uploader.texture(),
            quad: self.quad,
            uniform_buffer: self.uniform_buffer,
            uniforms,
            viewport,
        })
    }

    /// Delete every object this session owns.
    pub fn release(mut self, device: &mut dyn GpuDevice) {
        device.delete_buffer(self.uniform_buffer);
        device.delete_buffer(self.quad);
        self.uploader.release(device);
        self.programs.release(device);
        debug!("preview session released");
    }

    /// Drop the session after a context loss, when its handles are dead.
    pub fn abandon(mut self) {
        self.programs.invalidate();
        debug!("preview session abandoned after context loss");
    }
}

fn create_buffers(device: &mut dyn GpuDevice) -> Result<(BufferHandle, BufferHandle)> {
    let quad = device.create_buffer(BufferKind::Quad)?;
    match device.create_buffer(BufferKind::Uniform) {
        Ok(uniforms) => Ok((quad, uniforms)),
        Err(e) => {
            device.delete_buffer(quad);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShaderStage;
    use crate::software::SoftwareDevice;
    use std::borrow::Cow;

    #[test]
    fn create_then_release_leaves_nothing() {
        let mut device = SoftwareDevice::default();
        let session = PreviewSession::create(&mut device, &ProgramSources::default()).unwrap();
        // program + 2 shaders + texture + 2 buffers
        assert_eq!(device.live_objects(), 6);
        session.release(&mut device);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn compile_failure_allocates_nothing() {
        let mut device = SoftwareDevice::default();
        let sources = ProgramSources {
            fragment: Cow::Borrowed("fn nope() {}"),
            ..Default::default()
        };
        let err = PreviewSession::create(&mut device, &sources).unwrap_err();
        assert!(matches!(err, RenderError::Compile(ref e) if e.stage == ShaderStage::Fragment));
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn two_sessions_are_independent() {
        let mut device = SoftwareDevice::default();
        let a = PreviewSession::create(&mut device, &ProgramSources::default()).unwrap();
        let b = PreviewSession::create(&mut device, &ProgramSources::default()).unwrap();
        assert_ne!(a.program(), b.program());
        assert_ne!(a.uploader().texture(), b.uploader().texture());
        a.release(&mut device);
        assert_eq!(device.live_objects(), 6);
        b.release(&mut device);
        assert_eq!(device.live_objects(), 0);
    }
}
