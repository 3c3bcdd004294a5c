//! Removal of meshes, materials and textures nothing reaches

use kiln_core::Model;

use crate::processor::{ProcessContext, Processor};
use crate::{ProcessError, ProcessResult};

/// Deletes data unreachable from the base frame
///
/// Reachability runs base frame → mesh → material → texture. Textures with an
/// empty file name are always removed.
#[derive(Debug)]
pub struct UnusedDataRemover {
    remove_materials: bool,
}

impl UnusedDataRemover {
    pub fn new() -> Self {
        Self {
            remove_materials: true,
        }
    }

    /// Keep materials even when no mesh uses them
    pub fn keep_materials(mut self) -> Self {
        self.remove_materials = false;
        self
    }

    fn remove_unused_meshes(model: &mut Model, base_frame: usize) -> ProcessResult<usize> {
        let mut removed = 0;
        for (l, lod) in model.lods.iter_mut().enumerate() {
            let Some(frame) = lod.frames.get(base_frame) else {
                continue;
            };
            let mut remove = vec![true; lod.meshes.len()];
            for node in &frame.nodes {
                if let Some(r) = remove.get_mut(node.mesh) {
                    *r = false;
                }
            }
            if !remove.contains(&true) {
                continue;
            }

            for (f, frame) in lod.frames.iter().enumerate() {
                let survives = frame
                    .nodes
                    .iter()
                    .any(|n| !remove.get(n.mesh).copied().unwrap_or(true));
                if !survives {
                    return Err(ProcessError::Geometry(format!(
                        "LOD {} frame {} would lose all of its nodes",
                        l, f
                    )));
                }
            }
            removed += remove.iter().filter(|&&r| r).count();
            lod.remove_meshes(&remove);
        }
        Ok(removed)
    }

    fn remove_unused_materials(model: &mut Model) -> usize {
        let mut remove = vec![true; model.materials.len()];
        for mesh in model.lods.iter().flat_map(|l| &l.meshes) {
            if let Some(r) = mesh.material.and_then(|m| remove.get_mut(m)) {
                *r = false;
            }
        }
        let removed = remove.iter().filter(|&&r| r).count();
        if removed > 0 {
            model.remove_materials(&remove);
        }
        removed
    }

    fn remove_unused_textures(model: &mut Model) -> usize {
        let mut remove = vec![true; model.textures.len()];
        for material in &model.materials {
            if let Some(r) = material.texture.and_then(|t| remove.get_mut(t)) {
                *r = false;
            }
        }
        for (r, texture) in remove.iter_mut().zip(model.textures.values()) {
            if texture.filename.is_empty() {
                *r = true;
            }
        }
        let removed = remove.iter().filter(|&&r| r).count();
        if removed > 0 {
            model.remove_textures(&remove);
        }
        removed
    }
}

impl Default for UnusedDataRemover {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for UnusedDataRemover {
    fn name(&self) -> &str {
        "UnusedDataRemover"
    }

    fn process(&mut self, model: &mut Model, ctx: &ProcessContext) -> ProcessResult<()> {
        let meshes = Self::remove_unused_meshes(model, ctx.base_frame)?;
        let materials = if self.remove_materials {
            Self::remove_unused_materials(model)
        } else {
            0
        };
        let textures = Self::remove_unused_textures(model);
        log::debug!(
            "Removed {} meshes, {} materials and {} textures",
            meshes,
            materials,
            textures
        );
        Ok(())
    }
}
