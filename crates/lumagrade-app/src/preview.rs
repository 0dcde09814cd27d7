//! One-shot preview rendering through the render loop.

use anyhow::{bail, Result};
use lumagrade_core::{FilterParameters, FrameBuffer, MemorySource};
use lumagrade_gpu::{
    GpuDevice, GrainMode, ManualScheduler, RenderEvent, RenderLoop, RenderLoopConfig, TickOutcome,
};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct PreviewJob {
    pub frame: FrameBuffer,
    pub params: FilterParameters,
    pub split: bool,
    pub seed: f32,
}

impl PreviewJob {
    /// Start a loop on `device`, tick it once and read back the target.
    pub fn render<D: GpuDevice>(self, device: D) -> Result<FrameBuffer> {
        let config = RenderLoopConfig {
            grain: GrainMode::Fixed(self.seed),
            ..Default::default()
        };
        let mut render = RenderLoop::new(device, ManualScheduler::new(), config);
        render.on_event(|event| match event {
            RenderEvent::CompileFailed(e) => warn!(stage = %e.stage, "{}", e.diagnostic),
            other => debug!(?other, "render event"),
        });

        render.set_parameters(self.params);
        if self.split {
            render.enable_split()?;
        }
        render.start()?;

        let primary = MemorySource::still(self.frame.clone(), Duration::from_secs(1));
        let outcome = if self.split {
            let mut original = MemorySource::still(self.frame, Duration::from_secs(1));
            render.tick_split(&primary, &mut original, Instant::now())?
        } else {
            render.tick(&primary, Instant::now())?
        };
        if outcome != TickOutcome::Rendered {
            bail!("nothing rendered: {outcome:?}");
        }

        let output = render.device_mut().read_target()?;
        render.stop();
        Ok(output)
    }
}
