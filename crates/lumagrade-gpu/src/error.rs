//! Error types for the render core.

use crate::render_loop::LoopState;
use lumagrade_core::LumaError;
use std::fmt;
use thiserror::Error;

/// Where in program construction a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    /// Both stages compiled but could not be combined into a program.
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Link => "link",
        })
    }
}

/// A shader failed to compile or a program failed to link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} stage failed: {diagnostic}")]
pub struct CompileError {
    pub stage: ShaderStage,
    /// Compiler output, as reported by the driver or validator.
    pub diagnostic: String,
}

impl CompileError {
    pub fn new(stage: ShaderStage, diagnostic: impl Into<String>) -> Self {
        Self {
            stage,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Errors surfaced by the render loop and its sessions.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("GPU context lost")]
    ContextLost,

    #[error("render loop cannot do that while {0}")]
    NotReady(LoopState),

    #[error("render loop has been stopped")]
    Stopped,

    #[error(transparent)]
    Device(LumaError),
}

impl From<LumaError> for RenderError {
    fn from(err: LumaError) -> Self {
        match err {
            LumaError::ContextLost => Self::ContextLost,
            other => Self::Device(other),
        }
    }
}
