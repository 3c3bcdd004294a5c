//! Splitting of meshes placed several times in one frame

use kiln_core::math::{is_identity, Mat4};
use kiln_core::{Lod, MeshId, Model};

use crate::processor::{ProcessContext, Processor};
use crate::ProcessResult;

/// Gives every node of a multiply-placed mesh its own mesh
///
/// For a mesh placed by more than one node in some frame, nodes with an
/// identity transform keep the original mesh. Every distinct other transform
/// gets one copy of the mesh with the transform baked in, and its nodes are
/// re-pointed at that copy with an identity transform. When no node places
/// the mesh untransformed, the first transform is baked into the original
/// mesh instead of a copy.
///
/// Afterwards every mesh is placed by at most one node per frame.
#[derive(Debug, Default)]
pub struct NodeOptimizer;

impl NodeOptimizer {
    pub fn new() -> Self {
        Self
    }

    fn is_shared(lod: &Lod, mesh: MeshId) -> bool {
        lod.frames.iter().any(|f| f.mesh_node_count(mesh) > 1)
    }

    fn split_mesh(lod: &mut Lod, mesh_id: MeshId) -> usize {
        let has_identity = lod
            .frames
            .iter()
            .flat_map(|f| &f.nodes)
            .any(|n| n.mesh == mesh_id && is_identity(&n.matrix));

        let original = lod.meshes[mesh_id].clone();
        // Transform → mesh carrying it baked
        let mut baked: Vec<(Mat4, MeshId)> = Vec::new();
        let mut created = 0;

        for f in 0..lod.frames.len() {
            for n in 0..lod.frames[f].nodes.len() {
                let node = lod.frames[f].nodes[n];
                if node.mesh != mesh_id || is_identity(&node.matrix) {
                    continue;
                }

                let target = match baked.iter().find(|(m, _)| *m == node.matrix) {
                    Some(&(_, target)) => target,
                    None if !has_identity && baked.is_empty() => {
                        lod.meshes[mesh_id].transform(&node.matrix);
                        baked.push((node.matrix, mesh_id));
                        mesh_id
                    }
                    None => {
                        let mut copy = original.clone();
                        copy.name = format!("{}_{}", original.name, baked.len());
                        copy.transform(&node.matrix);
                        let target = lod.add_mesh(copy);
                        baked.push((node.matrix, target));
                        created += 1;
                        target
                    }
                };

                let node = &mut lod.frames[f].nodes[n];
                node.mesh = target;
                node.matrix = Mat4::IDENTITY;
            }
        }
        created
    }
}

impl Processor for NodeOptimizer {
    fn name(&self) -> &str {
        "NodeOptimizer"
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        for (l, lod) in model.lods.iter_mut().enumerate() {
            let mesh_count = lod.meshes.len();
            let mut created = 0;
            for mesh_id in 0..mesh_count {
                if Self::is_shared(lod, mesh_id) {
                    created += Self::split_mesh(lod, mesh_id);
                }
            }
            if created > 0 {
                log::debug!("LOD {}: created {} mesh copies", l, created);
            }
        }
        Ok(())
    }
}
