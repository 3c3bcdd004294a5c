//! The processor interface

use kiln_core::{Lod, Model};

use crate::{ProcessError, ProcessResult};

/// State shared by every processor of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessContext {
    /// Frame all size and reachability calculations are based on
    pub base_frame: usize,
}

impl ProcessContext {
    pub fn new(base_frame: usize) -> Self {
        Self { base_frame }
    }
}

/// One named transformation step over a model
///
/// The driver calls [`Processor::init`] to check preconditions and then
/// [`Processor::process`]. Either may fail; the model is validated after every
/// successful `process`.
pub trait Processor {
    /// Short name used in logs and error attribution
    fn name(&self) -> &str;

    /// Check preconditions against the model
    fn init(&mut self, model: &Model, ctx: &ProcessContext) -> ProcessResult<()> {
        base_lod(model)?;
        check_base_frame(model, ctx)
    }

    /// Transform the model in place
    fn process(&mut self, model: &mut Model, ctx: &ProcessContext) -> ProcessResult<()>;
}

/// Get the base LOD or fail
pub(crate) fn base_lod(model: &Model) -> ProcessResult<&Lod> {
    model
        .base_lod()
        .ok_or_else(|| ProcessError::Config("model has no LODs".into()))
}

/// Get the base LOD mutably or fail
pub(crate) fn base_lod_mut(model: &mut Model) -> ProcessResult<&mut Lod> {
    model
        .base_lod_mut()
        .ok_or_else(|| ProcessError::Config("model has no LODs".into()))
}

/// Get LOD `index` or fail
pub(crate) fn lod_mut(model: &mut Model, index: usize) -> ProcessResult<&mut Lod> {
    let count = model.lod_count();
    model
        .lod_mut(index)
        .ok_or_else(|| ProcessError::Config(format!("LOD {} out of range ({} LODs)", index, count)))
}

/// Fail unless the base frame exists in the base LOD
pub(crate) fn check_base_frame(model: &Model, ctx: &ProcessContext) -> ProcessResult<()> {
    let count = base_lod(model)?.frame_count();
    if ctx.base_frame >= count {
        return Err(ProcessError::Config(format!(
            "base frame {} out of range ({} frames)",
            ctx.base_frame, count
        )));
    }
    Ok(())
}
