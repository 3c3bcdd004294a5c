//! Merging of meshes that always move together

use ahash::AHashMap;
use kiln_core::math::Mat4;
use kiln_core::{Lod, MeshId, Model};

use crate::processor::{ProcessContext, Processor};
use crate::ProcessResult;

/// Concatenates meshes that can be drawn as one
///
/// Two meshes merge when each is placed at most once per frame, they share
/// material and team-color flag, appear in exactly the same frames and carry
/// identical node matrices in every one of them.
#[derive(Debug, Default)]
pub struct MeshOptimizer;

impl MeshOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Node matrix of `mesh` in every frame, `None` where it is absent
    fn placements(lod: &Lod, mesh: MeshId) -> Option<Vec<Option<Mat4>>> {
        lod.frames
            .iter()
            .map(|frame| {
                let mut nodes = frame.nodes.iter().filter(|n| n.mesh == mesh);
                let first = nodes.next().map(|n| n.matrix);
                match nodes.next() {
                    Some(_) => None,
                    None => Some(first),
                }
            })
            .collect()
    }

    fn mergeable(lod: &Lod, a: MeshId, b: MeshId, placements: &[Option<Vec<Option<Mat4>>>]) -> bool {
        let (ma, mb) = (&lod.meshes[a], &lod.meshes[b]);
        ma.material == mb.material
            && ma.is_team_color == mb.is_team_color
            && placements[a] == placements[b]
    }

    /// Merge groups in one LOD, returning how many meshes were removed
    pub fn merge_meshes(lod: &mut Lod) -> usize {
        let placements: Vec<_> = (0..lod.meshes.len())
            .map(|m| Self::placements(lod, m))
            .collect();

        // Frame-presence pattern → candidate meshes
        let mut buckets: AHashMap<Vec<bool>, Vec<MeshId>> = AHashMap::new();
        let mut order = Vec::new();
        for (mesh, placement) in placements.iter().enumerate() {
            let Some(placement) = placement else {
                continue;
            };
            let pattern: Vec<bool> = placement.iter().map(Option::is_some).collect();
            let bucket = buckets.entry(pattern.clone()).or_default();
            if bucket.is_empty() {
                order.push(pattern);
            }
            bucket.push(mesh);
        }

        let mut remove = vec![false; lod.meshes.len()];
        for pattern in &order {
            let candidates = &buckets[pattern];
            let mut groups: Vec<Vec<MeshId>> = Vec::new();
            for &mesh in candidates {
                match groups
                    .iter_mut()
                    .find(|g| Self::mergeable(lod, g[0], mesh, &placements))
                {
                    Some(group) => group.push(mesh),
                    None => groups.push(vec![mesh]),
                }
            }

            for group in groups.iter().filter(|g| g.len() > 1) {
                let base = group[0];
                for &other in &group[1..] {
                    let other_mesh = lod.meshes[other].clone();
                    lod.meshes[base].append(&other_mesh);
                    remove[other] = true;
                }
                log::debug!(
                    "Merged {} meshes into '{}'",
                    group.len(),
                    lod.meshes[base].name
                );
            }
        }

        let removed = remove.iter().filter(|&&r| r).count();
        if removed > 0 {
            lod.remove_meshes(&remove);
        }
        removed
    }
}

impl Processor for MeshOptimizer {
    fn name(&self) -> &str {
        "MeshOptimizer"
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        for (l, lod) in model.lods.iter_mut().enumerate() {
            let before = lod.mesh_count();
            let removed = Self::merge_meshes(lod);
            log::debug!("LOD {}: {} meshes merged into {}", l, before, before - removed);
        }
        Ok(())
    }
}
