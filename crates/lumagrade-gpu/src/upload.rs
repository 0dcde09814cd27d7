//! Copies the source's current decoded frame into a sampled texture.

use crate::device::{GpuDevice, SamplerState, TextureHandle};
use lumagrade_core::{Result, VideoFrameSource};
use tracing::{debug, trace};

/// Result of one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A fresh frame is in the texture.
    Uploaded { width: u32, height: u32 },
    /// The source had no displayable frame; the texture keeps its previous
    /// contents.
    Stale,
}

/// Owns the frame texture of one preview lane.
#[derive(Debug)]
pub struct FrameUploader {
    texture: TextureHandle,
    source_size: Option<(u32, u32)>,
}

impl FrameUploader {
    /// Allocate the texture with clamp-to-edge, linear sampling.
    pub fn create(device: &mut dyn GpuDevice) -> Result<Self> {
        Ok(Self {
            texture: device.create_texture(SamplerState::VIDEO)?,
            source_size: None,
        })
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Size of the last uploaded frame.
    pub fn source_size(&self) -> Option<(u32, u32)> {
        self.source_size
    }

    /// Whether the texture holds anything drawable.
    pub fn has_frame(&self) -> bool {
        self.source_size.is_some()
    }

    /// Upload the source's current frame, or do nothing if it has none.
    pub fn upload(
        &mut self,
        device: &mut dyn GpuDevice,
        source: &dyn VideoFrameSource,
    ) -> Result<UploadOutcome> {
        let frame = match source.current_frame() {
            Some(frame)
                if source.has_displayable_frame() && frame.width > 0 && frame.height > 0 =>
            {
                frame
            }
            _ => {
                trace!(ready = ?source.ready_state(), "no displayable frame, keeping texture");
                return Ok(UploadOutcome::Stale);
            }
        };

        device.upload_texture(self.texture, frame)?;
        let size = frame.size();
        if self.source_size != Some(size) {
            debug!(width = size.0, height = size.1, "frame texture resized");
            self.source_size = Some(size);
        }
        Ok(UploadOutcome::Uploaded {
            width: size.0,
            height: size.1,
        })
    }

    pub fn release(self, device: &mut dyn GpuDevice) {
        device.delete_texture(self.texture);
    }
}
