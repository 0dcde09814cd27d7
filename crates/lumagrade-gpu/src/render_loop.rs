//! The per-refresh render loop.
//!
//! The host owns the display-refresh callback; the loop asks for one through
//! a [`RefreshScheduler`] after every tick and the host answers by calling
//! [`RenderLoop::tick`] (or [`RenderLoop::tick_split`]). Each tick applies
//! any committed resize, uploads the current frame, binds one parameter
//! snapshot and draws.
//!
//! ```text
//! Uninitialized --initialize--> Ready --start--> Running <--pause/resume--> Paused
//!        |                                          |
//!        +--compile error--> Failed          stop (any state) --> Stopped
//! ```

use crate::device::GpuDevice;
use crate::error::{CompileError, RenderError};
use crate::session::PreviewSession;
use crate::shaders::ProgramSources;
use crate::split::{DriftSync, DriftSyncConfig, SplitLayout};
use crate::surface_host::{SurfaceHost, SurfaceHostConfig};
use crate::upload::UploadOutcome;
use lumagrade_core::{
    FilterParameters, FilterUniforms, LumaError, PlaybackControl, SurfaceSize, VideoFrameSource,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    Uninitialized,
    /// Program linked and texture allocated; not yet drawing.
    Ready,
    Running,
    Paused,
    Stopped,
    /// Program construction failed. Terminal.
    Failed,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        })
    }
}

/// How the grain stage is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum GrainMode {
    /// A new seed every rendered frame.
    #[default]
    Animated,
    /// The same seed every frame. Output is then fully deterministic.
    Fixed(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderLoopConfig {
    /// Fill for the target before lanes are drawn.
    pub clear_color: [f32; 4],
    /// Color of the divider between split lanes.
    pub divider_color: [f32; 4],
    pub grain: GrainMode,
    pub surface: SurfaceHostConfig,
    pub drift: DriftSyncConfig,
}

impl Default for RenderLoopConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            divider_color: [1.0, 1.0, 1.0, 1.0],
            grain: GrainMode::Animated,
            surface: SurfaceHostConfig::default(),
            drift: DriftSyncConfig::default(),
        }
    }
}

/// Notifications delivered to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    FrameRendered {
        frame: u64,
        size: SurfaceSize,
        split: bool,
    },
    CompileFailed(CompileError),
    ContextLost,
    ContextRestored,
}

/// Why a running tick drew nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No frame has ever been uploaded.
    NoFrame,
    EmptySurface,
    ContextLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered,
    Skipped(SkipReason),
    /// The loop is not running; nothing was touched.
    Inactive,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub frames_rendered: u64,
    /// Ticks whose source had no new frame; the previous one was redrawn.
    pub stale_uploads: u64,
    pub skipped_ticks: u64,
    pub context_losses: u64,
    pub context_restores: u64,
    pub drift_corrections: u64,
    /// Wall time of the most recent rendered tick.
    pub last_frame_time: Option<Duration>,
}

/// Identifies one requested refresh callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefreshToken(pub u64);

/// The host's display-refresh registration.
pub trait RefreshScheduler {
    /// Ask for one callback on the next refresh.
    fn request_refresh(&mut self) -> RefreshToken;
    /// Withdraw a pending request. Unknown tokens are ignored.
    fn cancel_refresh(&mut self, token: RefreshToken);
}

/// A scheduler the host drives by hand: poll [`ManualScheduler::take_pending`]
/// once per refresh and tick when it yields a token.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next: u64,
    pending: Option<RefreshToken>,
    cancelled: u64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<RefreshToken> {
        self.pending
    }

    pub fn take_pending(&mut self) -> Option<RefreshToken> {
        self.pending.take()
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled
    }
}

impl RefreshScheduler for ManualScheduler {
    fn request_refresh(&mut self) -> RefreshToken {
        self.next += 1;
        let token = RefreshToken(self.next);
        self.pending = Some(token);
        token
    }

    fn cancel_refresh(&mut self, token: RefreshToken) {
        if self.pending == Some(token) {
            self.pending = None;
            self.cancelled += 1;
        }
    }
}

pub type RenderCallback = Box<dyn FnMut(&RenderEvent)>;

struct SplitLane {
    session: Option<PreviewSession>,
    sync: DriftSync,
}

/// Drives one preview: owns the device, the lane sessions and the schedule.
pub struct RenderLoop<D: GpuDevice, S: RefreshScheduler> {
    device: D,
    scheduler: S,
    config: RenderLoopConfig,
    sources: ProgramSources,
    state: LoopState,
    active: bool,
    primary: Option<PreviewSession>,
    split: Option<SplitLane>,
    params: FilterParameters,
    surface: SurfaceHost,
    target_dirty: bool,
    refresh: Option<RefreshToken>,
    callback: Option<RenderCallback>,
    stats: FrameStats,
    frame_index: u64,
    loss_pending: bool,
}

impl<D: GpuDevice, S: RefreshScheduler> RenderLoop<D, S> {
    pub fn new(device: D, scheduler: S, config: RenderLoopConfig) -> Self {
        Self::with_sources(device, scheduler, config, ProgramSources::default())
    }

    /// A loop that builds its program from custom sources.
    pub fn with_sources(
        device: D,
        scheduler: S,
        config: RenderLoopConfig,
        sources: ProgramSources,
    ) -> Self {
        let surface = SurfaceHost::new(device.target_size(), config.surface);
        Self {
            device,
            scheduler,
            config,
            sources,
            state: LoopState::Uninitialized,
            active: false,
            primary: None,
            split: None,
            params: FilterParameters::NEUTRAL,
            surface,
            target_dirty: false,
            refresh: None,
            callback: None,
            stats: FrameStats::default(),
            frame_index: 0,
            loss_pending: false,
        }
    }

    /// Register the host's event callback.
    pub fn on_event(&mut self, callback: impl FnMut(&RenderEvent) + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn config(&self) -> &RenderLoopConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn parameters(&self) -> &FilterParameters {
        &self.params
    }

    /// Committed surface size.
    pub fn surface_size(&self) -> SurfaceSize {
        self.surface.size()
    }

    pub fn is_split(&self) -> bool {
        self.split.is_some()
    }

    // ── Inputs ──────────────────────────────────────────────────

    /// Replace the parameter snapshot. Read by the next tick.
    pub fn set_parameters(&mut self, params: FilterParameters) {
        self.params = params;
    }

    /// Resize now, bypassing the debounce window. Applied on the next tick.
    pub fn set_surface_size(&mut self, size: SurfaceSize) {
        self.surface.observe(size, Instant::now());
        if self.surface.flush().is_some() {
            self.target_dirty = true;
        }
    }

    /// Report a layout size; committed once reports settle.
    pub fn observe_surface(&mut self, size: SurfaceSize, now: Instant) {
        self.surface.observe(size, now);
    }

    /// Turn on before/after mode. The original lane gets its own GPU
    /// objects, created now if the loop is initialized.
    pub fn enable_split(&mut self) -> Result<(), RenderError> {
        if self.split.is_some() {
            return Ok(());
        }
        let session = if self.primary.is_some() {
            match PreviewSession::create(&mut self.device, &self.sources) {
                Ok(session) => Some(session),
                Err(_) if self.device.is_context_lost() => {
                    self.note_context_loss();
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };
        self.split = Some(SplitLane {
            session,
            sync: DriftSync::new(self.config.drift),
        });
        info!("split preview enabled");
        Ok(())
    }

    pub fn disable_split(&mut self) {
        if let Some(lane) = self.split.take() {
            if let Some(session) = lane.session {
                self.dispose(session);
            }
            info!("split preview disabled");
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Compile the program and allocate textures and buffers.
    pub fn initialize(&mut self) -> Result<(), RenderError> {
        match self.state {
            LoopState::Uninitialized => {}
            LoopState::Ready => return Ok(()),
            LoopState::Stopped => return Err(RenderError::Stopped),
            other => return Err(RenderError::NotReady(other)),
        }

        let size = self.surface.size();
        let built = if size != self.device.target_size() {
            self.device.resize_target(size).map_err(RenderError::from)
        } else {
            Ok(())
        };
        match built.and_then(|()| self.create_sessions()) {
            Ok(()) => {}
            // The first tick rebuilds once the context comes back.
            Err(RenderError::ContextLost) => {
                self.note_context_loss();
                self.target_dirty = true;
            }
            Err(e) => return Err(self.fail(e)),
        }
        self.state = LoopState::Ready;
        info!(backend = self.device.backend_name(), %size, "render loop ready");
        Ok(())
    }

    /// Begin drawing on every refresh. Initializes first if needed.
    pub fn start(&mut self) -> Result<(), RenderError> {
        match self.state {
            LoopState::Uninitialized => self.initialize()?,
            LoopState::Ready | LoopState::Paused => {}
            LoopState::Running => return Ok(()),
            LoopState::Stopped => return Err(RenderError::Stopped),
            LoopState::Failed => return Err(RenderError::NotReady(LoopState::Failed)),
        }
        self.state = LoopState::Running;
        self.active = true;
        self.schedule();
        info!("render loop running");
        Ok(())
    }

    /// Stop scheduling without releasing anything.
    pub fn pause(&mut self) {
        if self.state == LoopState::Running {
            self.cancel_refresh();
            self.state = LoopState::Paused;
            debug!("render loop paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state == LoopState::Paused {
            self.state = LoopState::Running;
            self.schedule();
            debug!("render loop resumed");
        }
    }

    /// Stop for good and release GPU objects. Idempotent.
    ///
    /// The pending refresh is withdrawn before any object is deleted, and
    /// the active flag is cleared first so a callback that still fires
    /// touches nothing.
    pub fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.active = false;
        self.cancel_refresh();

        let mut sessions = Vec::with_capacity(2);
        sessions.extend(self.primary.take());
        sessions.extend(self.split.as_mut().and_then(|lane| lane.session.take()));
        for session in sessions {
            self.dispose(session);
        }

        let previous = self.state;
        self.state = LoopState::Stopped;
        info!(from = %previous, "render loop stopped");
    }

    // ── Ticks ───────────────────────────────────────────────────

    /// Render one frame from `source`.
    pub fn tick(
        &mut self,
        source: &dyn VideoFrameSource,
        now: Instant,
    ) -> Result<TickOutcome, RenderError> {
        if let Some(outcome) = self.begin_tick(now)? {
            return Ok(outcome);
        }
        let started = Instant::now();
        let result = self.render_single(source);
        self.finish_tick(result, started, false)
    }

    /// Render one frame, and in split mode also align and draw the
    /// original stream. Without split mode this is [`RenderLoop::tick`].
    pub fn tick_split<P, Q>(
        &mut self,
        primary: &P,
        secondary: &mut Q,
        now: Instant,
    ) -> Result<TickOutcome, RenderError>
    where
        P: PlaybackControl,
        Q: PlaybackControl,
    {
        if self.split.is_none() {
            return self.tick(primary, now);
        }
        if let Some(outcome) = self.begin_tick(now)? {
            return Ok(outcome);
        }

        if let Some(lane) = self.split.as_mut() {
            if let Some(correction) = lane.sync.poll(now, primary, secondary) {
                if correction.changed_anything() {
                    self.stats.drift_corrections += 1;
                }
            }
        }

        let started = Instant::now();
        let result = self.render_split(primary, &*secondary);
        self.finish_tick(result, started, true)
    }

    /// Checks shared by both tick kinds. `Some` ends the tick early.
    fn begin_tick(&mut self, now: Instant) -> Result<Option<TickOutcome>, RenderError> {
        // This refresh has fired.
        self.refresh = None;
        if !self.active || self.state != LoopState::Running {
            return Ok(Some(TickOutcome::Inactive));
        }

        if self.device.is_context_lost() || self.loss_pending {
            if !self.recover_context()? {
                self.stats.skipped_ticks += 1;
                self.schedule();
                return Ok(Some(TickOutcome::Skipped(SkipReason::ContextLost)));
            }
        }

        if self.surface.poll(now).is_some() {
            self.target_dirty = true;
        }
        if self.target_dirty {
            let size = self.surface.size();
            match self.device.resize_target(size) {
                Ok(()) => {
                    self.target_dirty = false;
                    debug!(%size, "render target resized");
                }
                Err(LumaError::ContextLost) => {
                    self.note_context_loss();
                    self.stats.skipped_ticks += 1;
                    self.schedule();
                    return Ok(Some(TickOutcome::Skipped(SkipReason::ContextLost)));
                }
                Err(e) => return Err(e.into()),
            }
        }

        if self.surface.size().is_empty() {
            self.stats.skipped_ticks += 1;
            self.schedule();
            return Ok(Some(TickOutcome::Skipped(SkipReason::EmptySurface)));
        }
        Ok(None)
    }

    fn finish_tick(
        &mut self,
        result: lumagrade_core::Result<TickOutcome>,
        started: Instant,
        split: bool,
    ) -> Result<TickOutcome, RenderError> {
        let outcome = match result {
            Ok(TickOutcome::Rendered) => {
                self.frame_index += 1;
                self.stats.frames_rendered += 1;
                self.stats.last_frame_time = Some(started.elapsed());
                trace!(frame = self.frame_index, "frame rendered");
                self.emit(RenderEvent::FrameRendered {
                    frame: self.frame_index,
                    size: self.surface.size(),
                    split,
                });
                TickOutcome::Rendered
            }
            Ok(other) => {
                self.stats.skipped_ticks += 1;
                other
            }
            Err(LumaError::ContextLost) => {
                self.note_context_loss();
                self.stats.skipped_ticks += 1;
                TickOutcome::Skipped(SkipReason::ContextLost)
            }
            Err(e) => {
                error!(error = %e, "render tick failed");
                self.schedule();
                return Err(e.into());
            }
        };
        self.schedule();
        Ok(outcome)
    }

    fn render_single(
        &mut self,
        source: &dyn VideoFrameSource,
    ) -> lumagrade_core::Result<TickOutcome> {
        let params = self.params;
        let seed = self.noise_seed();
        let clear = self.config.clear_color;
        let viewport = self.surface.size().full_viewport();
        let Some(session) = self.primary.as_mut() else {
            return Err(LumaError::ContextLost);
        };

        if session.upload(&mut self.device, source)? == UploadOutcome::Stale {
            self.stats.stale_uploads += 1;
        }
        let Some(source_size) = session.uploader().source_size() else {
            return Ok(TickOutcome::Skipped(SkipReason::NoFrame));
        };

        let uniforms = FilterUniforms::from_parameters(&params, source_size, seed);
        self.device.begin_frame(clear)?;
        session.draw(&mut self.device, uniforms, viewport)?;
        self.device.end_frame()?;
        Ok(TickOutcome::Rendered)
    }

    fn render_split(
        &mut self,
        primary: &dyn VideoFrameSource,
        secondary: &dyn VideoFrameSource,
    ) -> lumagrade_core::Result<TickOutcome> {
        let params = self.params;
        let seed = self.noise_seed();
        let (clear, divider) = (self.config.clear_color, self.config.divider_color);
        let layout = SplitLayout::compute(
            self.surface.size(),
            params.split_position,
            params.divider_width,
        );

        let graded = self.primary.as_mut();
        let original = self.split.as_mut().and_then(|lane| lane.session.as_mut());
        let (Some(graded), Some(original)) = (graded, original) else {
            return Err(LumaError::ContextLost);
        };

        for (session, source) in [(&mut *graded, primary), (&mut *original, secondary)] {
            if session.upload(&mut self.device, source)? == UploadOutcome::Stale {
                self.stats.stale_uploads += 1;
            }
        }
        let graded_size = graded.uploader().source_size();
        let original_size = original.uploader().source_size();
        if graded_size.is_none() && original_size.is_none() {
            return Ok(TickOutcome::Skipped(SkipReason::NoFrame));
        }

        self.device.begin_frame(clear)?;
        if !layout.divider.is_empty() {
            self.device.fill(layout.divider, divider)?;
        }
        if let Some(size) = original_size.filter(|_| !layout.left.is_empty()) {
            let (start, end) = layout.left_crop;
            let uniforms = FilterUniforms::passthrough(size).with_horizontal_crop(start, end);
            original.draw(&mut self.device, uniforms, layout.left)?;
        }
        if let Some(size) = graded_size.filter(|_| !layout.right.is_empty()) {
            let (start, end) = layout.right_crop;
            let uniforms = FilterUniforms::from_parameters(&params, size, seed)
                .with_horizontal_crop(start, end);
            graded.draw(&mut self.device, uniforms, layout.right)?;
        }
        self.device.end_frame()?;
        Ok(TickOutcome::Rendered)
    }

    // ── Internals ───────────────────────────────────────────────

    fn noise_seed(&self) -> f32 {
        match self.config.grain {
            GrainMode::Fixed(seed) => seed,
            GrainMode::Animated => (self.frame_index % 1024) as f32,
        }
    }

    fn schedule(&mut self) {
        if self.active && self.state == LoopState::Running && self.refresh.is_none() {
            self.refresh = Some(self.scheduler.request_refresh());
        }
    }

    fn cancel_refresh(&mut self) {
        if let Some(token) = self.refresh.take() {
            self.scheduler.cancel_refresh(token);
        }
    }

    fn emit(&mut self, event: RenderEvent) {
        if let Some(callback) = self.callback.as_mut() {
            callback(&event);
        }
    }

    /// Build the preview sessions. A failure caused by a lost context
    /// comes back as [`RenderError::ContextLost`], never as a compile error.
    fn create_sessions(&mut self) -> Result<(), RenderError> {
        let primary = match PreviewSession::create(&mut self.device, &self.sources) {
            Ok(session) => session,
            Err(e) => return Err(self.classify(e)),
        };
        if self.split.is_some() {
            match PreviewSession::create(&mut self.device, &self.sources) {
                Ok(session) => {
                    if let Some(lane) = self.split.as_mut() {
                        lane.session = Some(session);
                    }
                }
                Err(e) => {
                    let err = self.classify(e);
                    self.dispose(primary);
                    return Err(err);
                }
            }
        }
        self.primary = Some(primary);
        Ok(())
    }

    fn classify(&self, err: RenderError) -> RenderError {
        if self.device.is_context_lost() {
            RenderError::ContextLost
        } else {
            err
        }
    }

    /// Release a session, or drop it if its handles died with the context.
    fn dispose(&mut self, session: PreviewSession) {
        if self.device.is_context_lost() || self.loss_pending {
            session.abandon();
        } else {
            session.release(&mut self.device);
        }
    }

    /// Record a context loss once: forget every handle and tell the host.
    fn note_context_loss(&mut self) {
        if self.loss_pending {
            return;
        }
        warn!("GPU context lost; resources will be rebuilt");
        self.loss_pending = true;
        self.stats.context_losses += 1;
        if let Some(session) = self.primary.take() {
            session.abandon();
        }
        if let Some(session) = self.split.as_mut().and_then(|lane| lane.session.take()) {
            session.abandon();
        }
        self.emit(RenderEvent::ContextLost);
    }

    /// Rebuild everything after a loss. `Ok(false)` means try again later.
    fn recover_context(&mut self) -> Result<bool, RenderError> {
        self.note_context_loss();
        if let Err(e) = self.device.restore_context() {
            warn!(error = %e, "context not restored yet");
            return Ok(false);
        }

        match self.create_sessions() {
            Ok(()) => {}
            Err(RenderError::ContextLost) => return Ok(false),
            Err(e) => return Err(self.fail(e)),
        }
        self.loss_pending = false;
        self.target_dirty = true;
        self.stats.context_restores += 1;
        info!("GPU resources rebuilt after context loss");
        self.emit(RenderEvent::ContextRestored);
        Ok(true)
    }

    /// Move to `Failed` on a compile error and report it.
    fn fail(&mut self, err: RenderError) -> RenderError {
        if let RenderError::Compile(compile) = &err {
            error!(stage = %compile.stage, "preview program failed; rendering halted");
            self.active = false;
            self.cancel_refresh();
            self.state = LoopState::Failed;
            let event = RenderEvent::CompileFailed(compile.clone());
            self.emit(event);
        }
        err
    }
}

impl<D: GpuDevice, S: RefreshScheduler> Drop for RenderLoop<D, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{
        BufferHandle, BufferKind, DrawCall, ProgramHandle, SamplerState, ShaderHandle,
        TextureHandle,
    };
    use crate::error::ShaderStage;
    use crate::software::SoftwareDevice;
    use lumagrade_core::{FrameBuffer, FrameRate, MemorySource, Viewport};
    use std::borrow::Cow;
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestLoop = RenderLoop<SoftwareDevice, ManualScheduler>;

    fn config() -> RenderLoopConfig {
        RenderLoopConfig {
            grain: GrainMode::Fixed(0.0),
            ..Default::default()
        }
    }

    fn gray(width: u32, height: u32) -> MemorySource {
        MemorySource::still(
            FrameBuffer::solid(width, height, [128, 128, 128, 255]),
            Duration::from_secs(2),
        )
    }

    fn running(size: SurfaceSize) -> TestLoop {
        let mut render =
            RenderLoop::new(SoftwareDevice::new(size), ManualScheduler::new(), config());
        render.start().unwrap();
        render
    }

    fn record(render: &mut TestLoop) -> Rc<RefCell<Vec<RenderEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        render.on_event(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    fn pixel(render: &mut TestLoop, x: u32, y: u32) -> [u8; 4] {
        render.device_mut().read_target().unwrap().pixel(x, y)
    }

    #[test]
    fn lifecycle_transitions() {
        let mut render = RenderLoop::new(
            SoftwareDevice::new(SurfaceSize::new(4, 4)),
            ManualScheduler::new(),
            config(),
        );
        assert_eq!(render.state(), LoopState::Uninitialized);

        render.initialize().unwrap();
        assert_eq!(render.state(), LoopState::Ready);
        assert_eq!(render.device().live_objects(), 6);
        assert!(render.scheduler().pending().is_none());

        render.start().unwrap();
        assert_eq!(render.state(), LoopState::Running);
        assert!(render.scheduler().pending().is_some());

        render.pause();
        assert_eq!(render.state(), LoopState::Paused);
        assert!(render.scheduler().pending().is_none());

        render.resume();
        assert_eq!(render.state(), LoopState::Running);
        assert!(render.scheduler().pending().is_some());

        render.stop();
        assert_eq!(render.state(), LoopState::Stopped);
        assert_eq!(render.device().live_objects(), 0);
        render.stop();
        assert!(matches!(render.start(), Err(RenderError::Stopped)));
    }

    #[test]
    fn tick_draws_graded_frame_and_reports_it() {
        let mut render = running(SurfaceSize::new(4, 4));
        let events = record(&mut render);
        render.set_parameters(FilterParameters {
            brightness: 150.0,
            ..FilterParameters::NEUTRAL
        });

        let outcome = render.tick(&gray(4, 4), Instant::now()).unwrap();
        assert_eq!(outcome, TickOutcome::Rendered);
        assert_eq!(pixel(&mut render, 2, 2), [255, 255, 255, 255]);
        assert_eq!(
            events.borrow().as_slice(),
            &[RenderEvent::FrameRendered {
                frame: 1,
                size: SurfaceSize::new(4, 4),
                split: false,
            }]
        );
        assert!(render.scheduler().pending().is_some(), "next refresh requested");
    }

    #[test]
    fn parameter_change_shows_on_next_tick() {
        let mut render = running(SurfaceSize::new(2, 2));
        let source = gray(2, 2);

        render.tick(&source, Instant::now()).unwrap();
        assert_eq!(pixel(&mut render, 0, 0)[0], 128);

        render.set_parameters(FilterParameters {
            brightness: 75.0,
            ..FilterParameters::NEUTRAL
        });
        render.tick(&source, Instant::now()).unwrap();
        let r = pixel(&mut render, 0, 0)[0];
        assert!((63..=65).contains(&r), "{r}");
    }

    #[test]
    fn paused_tick_touches_nothing() {
        let mut render = running(SurfaceSize::new(2, 2));
        render.tick(&gray(2, 2), Instant::now()).unwrap();
        render.pause();

        let presented = render.device().presented_frames();
        assert_eq!(render.tick(&gray(2, 2), Instant::now()).unwrap(), TickOutcome::Inactive);
        assert_eq!(render.device().presented_frames(), presented);
        assert!(render.scheduler().pending().is_none());
    }

    #[test]
    fn refresh_after_stop_is_ignored() {
        let mut render = running(SurfaceSize::new(2, 2));
        render.tick(&gray(2, 2), Instant::now()).unwrap();
        assert!(render.scheduler().pending().is_some());

        render.stop();
        assert_eq!(render.scheduler().cancelled(), 1);
        assert!(render.scheduler().pending().is_none());

        // A callback that was already in flight still arrives.
        let presented = render.device().presented_frames();
        assert_eq!(render.tick(&gray(2, 2), Instant::now()).unwrap(), TickOutcome::Inactive);
        assert_eq!(render.device().presented_frames(), presented);
        assert!(render.scheduler().pending().is_none());
    }

    type Log = Rc<RefCell<Vec<&'static str>>>;

    struct LoggingScheduler {
        log: Log,
        inner: ManualScheduler,
    }

    impl RefreshScheduler for LoggingScheduler {
        fn request_refresh(&mut self) -> RefreshToken {
            self.inner.request_refresh()
        }

        fn cancel_refresh(&mut self, token: RefreshToken) {
            self.log.borrow_mut().push("cancel");
            self.inner.cancel_refresh(token);
        }
    }

    struct LoggingDevice {
        log: Log,
        inner: SoftwareDevice,
    }

    impl GpuDevice for LoggingDevice {
        fn backend_name(&self) -> &str {
            "logging"
        }
        fn compile_shader(
            &mut self,
            stage: ShaderStage,
            source: &str,
        ) -> Result<ShaderHandle, CompileError> {
            self.inner.compile_shader(stage, source)
        }
        fn link_program(
            &mut self,
            vertex: ShaderHandle,
            fragment: ShaderHandle,
        ) -> Result<ProgramHandle, CompileError> {
            self.inner.link_program(vertex, fragment)
        }
        fn delete_shader(&mut self, shader: ShaderHandle) {
            self.log.borrow_mut().push("delete");
            self.inner.delete_shader(shader);
        }
        fn delete_program(&mut self, program: ProgramHandle) {
            self.log.borrow_mut().push("delete");
            self.inner.delete_program(program);
        }
        fn create_texture(
            &mut self,
            sampler: SamplerState,
        ) -> lumagrade_core::Result<TextureHandle> {
            self.inner.create_texture(sampler)
        }
        fn upload_texture(
            &mut self,
            texture: TextureHandle,
            frame: &FrameBuffer,
        ) -> lumagrade_core::Result<()> {
            self.inner.upload_texture(texture, frame)
        }
        fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
            self.inner.texture_size(texture)
        }
        fn delete_texture(&mut self, texture: TextureHandle) {
            self.log.borrow_mut().push("delete");
            self.inner.delete_texture(texture);
        }
        fn create_buffer(&mut self, kind: BufferKind) -> lumagrade_core::Result<BufferHandle> {
            self.inner.create_buffer(kind)
        }
        fn delete_buffer(&mut self, buffer: BufferHandle) {
            self.log.borrow_mut().push("delete");
            self.inner.delete_buffer(buffer);
        }
        fn resize_target(&mut self, size: SurfaceSize) -> lumagrade_core::Result<()> {
            self.inner.resize_target(size)
        }
        fn target_size(&self) -> SurfaceSize {
            self.inner.target_size()
        }
        fn begin_frame(&mut self, clear: [f32; 4]) -> lumagrade_core::Result<()> {
            self.inner.begin_frame(clear)
        }
        fn draw(&mut self, call: &DrawCall) -> lumagrade_core::Result<()> {
            self.inner.draw(call)
        }
        fn fill(&mut self, viewport: Viewport, color: [f32; 4]) -> lumagrade_core::Result<()> {
            self.inner.fill(viewport, color)
        }
        fn end_frame(&mut self) -> lumagrade_core::Result<()> {
            self.inner.end_frame()
        }
        fn read_target(&mut self) -> lumagrade_core::Result<FrameBuffer> {
            self.inner.read_target()
        }
        fn is_context_lost(&self) -> bool {
            self.inner.is_context_lost()
        }
        fn restore_context(&mut self) -> lumagrade_core::Result<()> {
            self.inner.restore_context()
        }
        fn live_objects(&self) -> usize {
            self.inner.live_objects()
        }
    }

    #[test]
    fn stop_withdraws_refresh_before_deleting_objects() {
        let log: Log = Rc::default();
        let device = LoggingDevice {
            log: Rc::clone(&log),
            inner: SoftwareDevice::new(SurfaceSize::new(2, 2)),
        };
        let scheduler = LoggingScheduler {
            log: Rc::clone(&log),
            inner: ManualScheduler::new(),
        };
        let mut render = RenderLoop::new(device, scheduler, config());
        render.start().unwrap();
        render.stop();

        let log = log.borrow();
        assert_eq!(log.first(), Some(&"cancel"));
        assert!(log[1..].iter().all(|entry| *entry == "delete"));
        assert_eq!(render.device().live_objects(), 0);
    }

    #[test]
    fn missing_frame_skips_then_previous_frame_is_kept() {
        let mut render = running(SurfaceSize::new(2, 2));
        let empty = MemorySource::empty(FrameRate::FPS_30);

        assert_eq!(
            render.tick(&empty, Instant::now()).unwrap(),
            TickOutcome::Skipped(SkipReason::NoFrame)
        );

        render.tick(&gray(2, 2), Instant::now()).unwrap();
        assert_eq!(render.tick(&empty, Instant::now()).unwrap(), TickOutcome::Rendered);
        assert_eq!(pixel(&mut render, 1, 1)[0], 128);

        let stats = render.stats();
        assert_eq!(stats.stale_uploads, 2);
        assert_eq!(stats.frames_rendered, 2);
        assert_eq!(stats.skipped_ticks, 1);
    }

    #[test]
    fn empty_surface_skips_until_sized() {
        let mut render = running(SurfaceSize::new(0, 0));
        assert_eq!(
            render.tick(&gray(2, 2), Instant::now()).unwrap(),
            TickOutcome::Skipped(SkipReason::EmptySurface)
        );

        render.set_surface_size(SurfaceSize::new(3, 2));
        assert_eq!(render.tick(&gray(2, 2), Instant::now()).unwrap(), TickOutcome::Rendered);
        assert_eq!(render.device().target_size(), SurfaceSize::new(3, 2));
    }

    #[test]
    fn layout_reports_are_debounced() {
        let mut render = running(SurfaceSize::new(4, 4));
        let source = gray(2, 2);
        let t0 = Instant::now();

        render.observe_surface(SurfaceSize::new(8, 2), t0);
        render.tick(&source, t0).unwrap();
        assert_eq!(render.device().target_size(), SurfaceSize::new(4, 4));

        render.tick(&source, t0 + Duration::from_millis(150)).unwrap();
        assert_eq!(render.device().target_size(), SurfaceSize::new(8, 2));
        assert_eq!(render.surface_size(), SurfaceSize::new(8, 2));
        assert_eq!(pixel(&mut render, 7, 1)[0], 128);
    }

    #[test]
    fn compile_failure_halts_the_loop() {
        let sources = ProgramSources {
            fragment: Cow::Borrowed(
                "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1.0; }",
            ),
            ..ProgramSources::default()
        };
        let mut render = RenderLoop::with_sources(
            SoftwareDevice::new(SurfaceSize::new(2, 2)),
            ManualScheduler::new(),
            config(),
            sources,
        );
        let events = record(&mut render);

        let err = render.start().unwrap_err();
        assert!(
            matches!(&err, RenderError::Compile(e) if e.stage == ShaderStage::Fragment),
            "{err}"
        );
        assert_eq!(render.state(), LoopState::Failed);
        assert_eq!(render.device().live_objects(), 0);
        assert!(render.scheduler().pending().is_none());
        assert!(matches!(
            events.borrow().as_slice(),
            [RenderEvent::CompileFailed(e)] if e.stage == ShaderStage::Fragment
        ));

        assert_eq!(render.tick(&gray(2, 2), Instant::now()).unwrap(), TickOutcome::Inactive);
    }

    #[test]
    fn recovers_from_context_loss() {
        let mut render = running(SurfaceSize::new(2, 2));
        let events = record(&mut render);
        let source = gray(2, 2);
        render.tick(&source, Instant::now()).unwrap();

        render.device_mut().simulate_context_loss();
        assert_eq!(render.tick(&source, Instant::now()).unwrap(), TickOutcome::Rendered);
        assert_eq!(pixel(&mut render, 0, 0)[0], 128);
        assert_eq!(render.device().live_objects(), 6);

        let stats = render.stats();
        assert_eq!(stats.context_losses, 1);
        assert_eq!(stats.context_restores, 1);
        let events = events.borrow();
        assert!(events.contains(&RenderEvent::ContextLost));
        assert!(events.contains(&RenderEvent::ContextRestored));
    }

    #[test]
    fn stop_after_context_loss_does_not_touch_dead_handles() {
        let mut render = running(SurfaceSize::new(2, 2));
        render.tick(&gray(2, 2), Instant::now()).unwrap();
        render.device_mut().simulate_context_loss();

        render.stop();
        assert_eq!(render.state(), LoopState::Stopped);
        assert_eq!(render.device().live_objects(), 0);
    }

    #[test]
    fn context_lost_before_start_is_recovered_on_first_tick() {
        let mut render = RenderLoop::new(
            SoftwareDevice::new(SurfaceSize::new(2, 2)),
            ManualScheduler::new(),
            config(),
        );
        let events = record(&mut render);
        render.device_mut().simulate_context_loss();

        render.start().unwrap();
        assert_eq!(render.state(), LoopState::Running);
        assert!(render.scheduler().pending().is_some());
        assert_eq!(events.borrow().as_slice(), [RenderEvent::ContextLost]);

        assert_eq!(render.tick(&gray(2, 2), Instant::now()).unwrap(), TickOutcome::Rendered);
        assert_eq!(pixel(&mut render, 1, 1)[0], 128);
        assert_eq!(render.stats().context_losses, 1);
        assert_eq!(render.stats().context_restores, 1);
        assert!(!events.borrow().iter().any(|e| matches!(e, RenderEvent::CompileFailed(_))));
    }

    #[test]
    fn context_lost_while_enabling_split_is_recovered() {
        let mut render = running(SurfaceSize::new(8, 2));
        render.device_mut().simulate_context_loss();

        render.enable_split().unwrap();
        assert!(render.is_split());
        assert_eq!(render.state(), LoopState::Running);

        let primary = gray(8, 2);
        let mut secondary = gray(8, 2);
        let outcome = render.tick_split(&primary, &mut secondary, Instant::now()).unwrap();
        assert_eq!(outcome, TickOutcome::Rendered);
        assert_eq!(render.device().live_objects(), 12);
        assert_eq!(render.stats().context_restores, 1);
    }

    fn split_loop() -> TestLoop {
        let mut render = RenderLoop::new(
            SoftwareDevice::new(SurfaceSize::new(8, 2)),
            ManualScheduler::new(),
            config(),
        );
        render.enable_split().unwrap();
        render.set_parameters(FilterParameters {
            brightness: 50.0,
            split_position: 0.5,
            divider_width: 2.0,
            ..FilterParameters::NEUTRAL
        });
        render.start().unwrap();
        render
    }

    #[test]
    fn split_draws_original_left_and_graded_right() {
        let mut render = split_loop();
        assert_eq!(render.device().live_objects(), 12);

        let primary = gray(8, 2);
        let mut secondary = gray(8, 2);
        let outcome = render.tick_split(&primary, &mut secondary, Instant::now()).unwrap();
        assert_eq!(outcome, TickOutcome::Rendered);

        for x in 0..3 {
            assert_eq!(pixel(&mut render, x, 1), [128, 128, 128, 255], "original at {x}");
        }
        for x in 3..5 {
            assert_eq!(pixel(&mut render, x, 1), [255, 255, 255, 255], "divider at {x}");
        }
        for x in 5..8 {
            assert!(pixel(&mut render, x, 1)[0] <= 1, "graded at {x}");
        }
    }

    #[test]
    fn split_lane_without_frame_shows_clear_color() {
        let mut render = RenderLoop::new(
            SoftwareDevice::new(SurfaceSize::new(8, 2)),
            ManualScheduler::new(),
            RenderLoopConfig {
                clear_color: [0.0, 0.0, 1.0, 1.0],
                ..config()
            },
        );
        render.enable_split().unwrap();
        render.set_parameters(FilterParameters {
            split_position: 0.5,
            divider_width: 2.0,
            ..FilterParameters::NEUTRAL
        });
        render.start().unwrap();

        let primary = gray(8, 2);
        let mut secondary = MemorySource::empty(FrameRate::FPS_30);
        let outcome = render.tick_split(&primary, &mut secondary, Instant::now()).unwrap();
        assert_eq!(outcome, TickOutcome::Rendered);

        for x in 0..3 {
            assert_eq!(pixel(&mut render, x, 0), [0, 0, 255, 255], "empty lane at {x}");
        }
        for x in 3..5 {
            assert_eq!(pixel(&mut render, x, 0), [255, 255, 255, 255], "divider at {x}");
        }
        for x in 5..8 {
            assert_eq!(pixel(&mut render, x, 0), [128, 128, 128, 255], "graded at {x}");
        }
    }

    #[test]
    fn split_tick_realigns_secondary() {
        let mut render = split_loop();
        let mut primary = gray(8, 2);
        let mut secondary = gray(8, 2);
        primary.seek(0.5);
        primary.set_playback_rate(2.0);

        render.tick_split(&primary, &mut secondary, Instant::now()).unwrap();
        assert!((secondary.current_time() - 0.5).abs() < 1e-9);
        assert_eq!(secondary.playback_rate(), 2.0);
        assert_eq!(render.stats().drift_corrections, 1);
    }

    #[test]
    fn disabling_split_releases_the_original_lane() {
        let mut render = split_loop();
        render.disable_split();
        assert!(!render.is_split());
        assert_eq!(render.device().live_objects(), 6);

        let primary = gray(8, 2);
        let mut secondary = gray(8, 2);
        render.tick_split(&primary, &mut secondary, Instant::now()).unwrap();
        assert!(pixel(&mut render, 1, 1)[0] <= 1, "whole surface graded");
    }

    #[test]
    fn animated_grain_changes_seed_per_frame() {
        let mut render = RenderLoop::new(
            SoftwareDevice::new(SurfaceSize::new(16, 16)),
            ManualScheduler::new(),
            RenderLoopConfig::default(),
        );
        render.set_parameters(FilterParameters {
            noise: 100.0,
            ..FilterParameters::NEUTRAL
        });
        render.start().unwrap();
        let source = gray(16, 16);

        render.tick(&source, Instant::now()).unwrap();
        let first = render.device_mut().read_target().unwrap();
        render.tick(&source, Instant::now()).unwrap();
        let second = render.device_mut().read_target().unwrap();
        assert_ne!(first.to_packed_rgba(), second.to_packed_rgba());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: RenderLoopConfig = serde_json::from_str(r#"{"grain":{"Fixed":3.0}}"#).unwrap();
        assert_eq!(config.grain, GrainMode::Fixed(3.0));
        assert_eq!(config.surface.debounce_ms, 100);
        assert_eq!(config.drift.interval_ms, 100);
    }
}
