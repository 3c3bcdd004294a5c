//! Frame count reduction

use kiln_core::{Frame, Model};

use crate::processor::{check_base_frame, ProcessContext, Processor};
use crate::{ProcessError, ProcessResult};

/// Matrix tolerance for treating two frames as equal
pub const FRAME_EPSILON: f32 = 1e-3;

/// Drops surplus or repeated frames
///
/// With a keep count only the first N frames survive. Otherwise each frame is
/// compared with the last kept one and dropped when equal, so only runs of
/// adjacent duplicates collapse. Frames up to the base frame are never
/// dropped, keeping the base frame index stable.
#[derive(Debug)]
pub struct FrameOptimizer {
    keep_count: Option<usize>,
    remove_duplicates: bool,
}

impl FrameOptimizer {
    pub fn new(keep_count: Option<usize>, remove_duplicates: bool) -> Self {
        Self {
            keep_count: keep_count.filter(|&n| n > 0),
            remove_duplicates,
        }
    }

    fn collapse_adjacent(frames: Vec<Frame>, base_frame: usize) -> Vec<Frame> {
        let mut kept: Vec<Frame> = Vec::with_capacity(frames.len());
        for (i, frame) in frames.into_iter().enumerate() {
            let duplicate = i > base_frame
                && kept
                    .last()
                    .is_some_and(|last| last.matches(&frame, FRAME_EPSILON));
            if !duplicate {
                kept.push(frame);
            }
        }
        kept
    }
}

impl Processor for FrameOptimizer {
    fn name(&self) -> &str {
        "FrameOptimizer"
    }

    fn init(&mut self, model: &Model, ctx: &ProcessContext) -> ProcessResult<()> {
        check_base_frame(model, ctx)?;
        if let Some(keep) = self.keep_count {
            if ctx.base_frame >= keep {
                return Err(ProcessError::Config(format!(
                    "base frame {} is not among the {} kept frames",
                    ctx.base_frame, keep
                )));
            }
        }
        Ok(())
    }

    fn process(&mut self, model: &mut Model, ctx: &ProcessContext) -> ProcessResult<()> {
        for (l, lod) in model.lods.iter_mut().enumerate() {
            let before = lod.frames.len();
            if let Some(keep) = self.keep_count {
                lod.frames.truncate(keep);
            } else if self.remove_duplicates {
                let frames = std::mem::take(&mut lod.frames);
                lod.frames = Self::collapse_adjacent(frames, ctx.base_frame);
            }
            log::debug!("LOD {}: {} of {} frames kept", l, lod.frames.len(), before);
        }
        Ok(())
    }
}
