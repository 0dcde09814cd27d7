//! Built-in WGSL sources and front-end validation.
//!
//! Both devices run sources through naga before handing them to the
//! backend, so a broken shader fails with a readable diagnostic and the
//! stage that caused it.

use crate::error::{CompileError, ShaderStage};
use lumagrade_core::FilterUniforms;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use std::borrow::Cow;

pub const VERTEX_SOURCE: &str = include_str!("shaders/preview.vert.wgsl");
pub const FRAGMENT_SOURCE: &str = include_str!("shaders/grade.frag.wgsl");

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// The two sources that make up the preview program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl Default for ProgramSources {
    fn default() -> Self {
        Self {
            vertex: Cow::Borrowed(VERTEX_SOURCE),
            fragment: Cow::Borrowed(FRAGMENT_SOURCE),
        }
    }
}

/// Parse and validate one stage, and check it has the expected entry point.
pub fn validate_stage(stage: ShaderStage, source: &str) -> Result<naga::Module, CompileError> {
    let (naga_stage, entry) = match stage {
        ShaderStage::Vertex => (naga::ShaderStage::Vertex, VERTEX_ENTRY),
        ShaderStage::Fragment => (naga::ShaderStage::Fragment, FRAGMENT_ENTRY),
        ShaderStage::Link => {
            return Err(CompileError::new(stage, "link is not a compilable stage"));
        }
    };

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| CompileError::new(stage, e.emit_to_string(source)))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| CompileError::new(stage, e.emit_to_string(source)))?;

    if !module
        .entry_points
        .iter()
        .any(|ep| ep.stage == naga_stage && ep.name == entry)
    {
        return Err(CompileError::new(
            stage,
            format!("missing {stage} entry point `{entry}`"),
        ));
    }

    Ok(module)
}

/// Check that two validated stages can form the preview program: every
/// fragment input location is written by the vertex stage, and the
/// fragment uniform block is exactly one [`FilterUniforms`].
pub fn check_link(vertex: &naga::Module, fragment: &naga::Module) -> Result<(), CompileError> {
    let link_err = |msg: String| CompileError::new(ShaderStage::Link, msg);

    let vs = vertex
        .entry_points
        .iter()
        .find(|ep| ep.name == VERTEX_ENTRY)
        .ok_or_else(|| link_err(format!("vertex entry point `{VERTEX_ENTRY}` not found")))?;
    let fs = fragment
        .entry_points
        .iter()
        .find(|ep| ep.name == FRAGMENT_ENTRY)
        .ok_or_else(|| link_err(format!("fragment entry point `{FRAGMENT_ENTRY}` not found")))?;

    let mut outputs = Vec::new();
    if let Some(result) = &vs.function.result {
        collect_locations(vertex, result.ty, result.binding.as_ref(), &mut outputs);
    }
    let mut inputs = Vec::new();
    for arg in &fs.function.arguments {
        collect_locations(fragment, arg.ty, arg.binding.as_ref(), &mut inputs);
    }
    if let Some(missing) = inputs.iter().find(|loc| !outputs.contains(loc)) {
        return Err(link_err(format!(
            "fragment input @location({missing}) is not written by the vertex stage"
        )));
    }

    let uniform_span = fragment
        .global_variables
        .iter()
        .filter(|(_, var)| var.space == naga::AddressSpace::Uniform)
        .find_map(|(_, var)| match &fragment.types[var.ty].inner {
            naga::TypeInner::Struct { span, .. } => Some(*span),
            _ => None,
        });
    match uniform_span {
        Some(span) if u64::from(span) == FilterUniforms::SIZE => Ok(()),
        Some(span) => Err(link_err(format!(
            "uniform block is {span} bytes, expected {}",
            FilterUniforms::SIZE
        ))),
        None => Err(link_err("fragment stage declares no uniform block".to_string())),
    }
}

fn collect_locations(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<u32>,
) {
    if let Some(naga::Binding::Location { location, .. }) = binding {
        out.push(*location);
        return;
    }
    if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
        for member in members {
            if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                out.push(*location);
            }
        }
    }
}
