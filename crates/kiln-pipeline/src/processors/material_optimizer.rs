//! Merging of near-identical materials

use kiln_core::Model;

use crate::processor::{ProcessContext, Processor};
use crate::ProcessResult;

/// Largest [`kiln_core::Material::distance`] at which two materials merge
pub const MATERIAL_MERGE_THRESHOLD: f32 = 0.1;

/// Greedy clustering of materials with the same texture and close colors
///
/// Materials are visited in order; each one merges into the first earlier
/// kept material with the same texture within [`MATERIAL_MERGE_THRESHOLD`].
/// Meshes in every LOD are re-pointed at the kept material.
#[derive(Debug)]
pub struct MaterialOptimizer {
    reset_materials: bool,
}

impl MaterialOptimizer {
    /// With `reset_materials` every color is reset to engine defaults first
    pub fn new(reset_materials: bool) -> Self {
        Self { reset_materials }
    }
}

impl Processor for MaterialOptimizer {
    fn name(&self) -> &str {
        "MaterialOptimizer"
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        if self.reset_materials {
            for material in &mut model.materials {
                material.reset_colors();
            }
        }

        let count = model.materials.len();
        // Kept material each material merges into
        let mut target: Vec<usize> = (0..count).collect();
        let mut kept: Vec<usize> = Vec::with_capacity(count);
        for i in 0..count {
            let candidate = &model.materials[i];
            let existing = kept.iter().copied().find(|&k| {
                let other = &model.materials[k];
                other.texture == candidate.texture
                    && other.distance(candidate) <= MATERIAL_MERGE_THRESHOLD
            });
            match existing {
                Some(k) => target[i] = k,
                None => kept.push(i),
            }
        }

        if kept.len() == count {
            return Ok(());
        }

        for mesh in model.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            mesh.material = mesh.material.map(|m| target.get(m).copied().unwrap_or(m));
        }
        let remove: Vec<bool> = (0..count).map(|i| target[i] != i).collect();
        model.remove_materials(&remove);
        log::debug!("Merged {} materials into {}", count, kept.len());
        Ok(())
    }
}
