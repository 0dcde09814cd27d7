//! Shader program management.
//!
//! A preview instance owns exactly one linked program. It is compiled the
//! first time it is asked for, returned from the cache afterwards, and
//! released explicitly together with its two shader stages.

use crate::device::{GpuDevice, ProgramHandle, ShaderHandle};
use crate::error::{CompileError, ShaderStage};
use crate::shaders::ProgramSources;
use tracing::{error, info};

/// A linked program and the stages it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkedProgram {
    pub program: ProgramHandle,
    pub vertex: ShaderHandle,
    pub fragment: ShaderHandle,
}

/// Compile both stages and link them. Nothing is left allocated on failure.
pub fn compile_program(
    device: &mut dyn GpuDevice,
    sources: &ProgramSources,
) -> Result<LinkedProgram, CompileError> {
    let vertex = device.compile_shader(ShaderStage::Vertex, &sources.vertex)?;
    let fragment = match device.compile_shader(ShaderStage::Fragment, &sources.fragment) {
        Ok(handle) => handle,
        Err(e) => {
            device.delete_shader(vertex);
            return Err(e);
        }
    };
    match device.link_program(vertex, fragment) {
        Ok(program) => Ok(LinkedProgram {
            program,
            vertex,
            fragment,
        }),
        Err(e) => {
            device.delete_shader(vertex);
            device.delete_shader(fragment);
            Err(e)
        }
    }
}

/// Lazily compiled, single-entry program cache.
#[derive(Debug, Default)]
pub struct ProgramCache {
    sources: ProgramSources,
    linked: Option<LinkedProgram>,
}

impl ProgramCache {
    pub fn new(sources: ProgramSources) -> Self {
        Self {
            sources,
            linked: None,
        }
    }

    /// The cached program, compiling it on first use.
    pub fn get_or_compile(
        &mut self,
        device: &mut dyn GpuDevice,
    ) -> Result<ProgramHandle, CompileError> {
        if let Some(linked) = self.linked {
            return Ok(linked.program);
        }
        match compile_program(device, &self.sources) {
            Ok(linked) => {
                info!(backend = device.backend_name(), "grade program linked");
                self.linked = Some(linked);
                Ok(linked.program)
            }
            Err(e) => {
                error!(
                    stage = %e.stage,
                    diagnostic = %e.diagnostic,
                    "grade program failed to build"
                );
                Err(e)
            }
        }
    }

    pub fn program(&self) -> Option<ProgramHandle> {
        self.linked.map(|l| l.program)
    }

    /// Delete the program and its stages.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(linked) = self.linked.take() {
            device.delete_program(linked.program);
            device.delete_shader(linked.vertex);
            device.delete_shader(linked.fragment);
        }
    }

    /// Forget the program without deleting it. Used after a context loss,
    /// when the handles are already dead.
    pub fn invalidate(&mut self) {
        self.linked = None;
    }
}
