//! Levels of detail

use crate::frame::Frame;
use crate::mesh::Mesh;
use crate::MaterialId;

/// Index of a mesh within its LOD
pub type MeshId = usize;

/// One detail level: meshes plus the frames placing them
#[derive(Debug, Clone, Default)]
pub struct Lod {
    pub meshes: Vec<Mesh>,
    pub frames: Vec<Frame>,
    /// Camera distance from which this LOD is used
    pub distance: f32,
}

impl Lod {
    /// Create an empty LOD
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Number of frames
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Append a mesh and return its id
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    /// Get a mesh by id
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    /// Get a frame by index
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Delete every mesh for which `remove` is true
    ///
    /// Surviving meshes keep their relative order. Nodes placing a removed mesh
    /// are dropped from every frame. Returns the old id → new id table.
    pub fn remove_meshes(&mut self, remove: &[bool]) -> Vec<Option<MeshId>> {
        let mut remap = Vec::with_capacity(self.meshes.len());
        let mut next = 0;
        for i in 0..self.meshes.len() {
            if remove.get(i).copied().unwrap_or(false) {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }

        let mut index = 0;
        self.meshes.retain(|_| {
            let keep = remap[index].is_some();
            index += 1;
            keep
        });
        for frame in &mut self.frames {
            frame.remap_meshes(&remap);
        }
        remap
    }

    /// Re-point mesh materials through a material remap table
    ///
    /// Meshes whose material was removed lose their material.
    pub fn remap_materials(&mut self, remap: &[Option<MaterialId>]) {
        for mesh in &mut self.meshes {
            mesh.material = mesh.material.and_then(|m| remap.get(m).copied().flatten());
        }
    }

    /// Total vertex count over all meshes
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(Mesh::vertex_count).sum()
    }

    /// Total face count over all meshes
    pub fn face_count(&self) -> usize {
        self.meshes.iter().map(Mesh::face_count).sum()
    }

    /// One-line summary for logging
    pub fn short_stats(&self) -> String {
        format!(
            "{} meshes, {} vertices, {} faces, {} frames",
            self.mesh_count(),
            self.vertex_count(),
            self.face_count(),
            self.frame_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Mat4;
    use crate::mesh::quad;

    fn three_mesh_lod() -> Lod {
        let mut lod = Lod::new();
        for name in ["a", "b", "c"] {
            lod.add_mesh(quad(name));
        }
        let mut frame = Frame::new();
        for i in 0..3 {
            frame.add_node(i, Mat4::IDENTITY);
        }
        lod.frames.push(frame);
        lod
    }

    #[test]
    fn test_remove_meshes() {
        let mut lod = three_mesh_lod();
        let remap = lod.remove_meshes(&[false, true, false]);
        assert_eq!(remap, vec![Some(0), None, Some(1)]);
        assert_eq!(lod.mesh_count(), 2);
        assert_eq!(lod.meshes[1].name, "c");
        let meshes: Vec<_> = lod.frames[0].nodes.iter().map(|n| n.mesh).collect();
        assert_eq!(meshes, vec![0, 1]);
    }

    #[test]
    fn test_remap_materials() {
        let mut lod = three_mesh_lod();
        lod.meshes[0].material = Some(0);
        lod.meshes[1].material = Some(1);
        lod.meshes[2].material = Some(2);
        lod.remap_materials(&[Some(0), Some(0), None]);
        let materials: Vec<_> = lod.meshes.iter().map(|m| m.material).collect();
        assert_eq!(materials, vec![Some(0), Some(0), None]);
    }

    #[test]
    fn test_short_stats() {
        let lod = three_mesh_lod();
        assert_eq!(lod.short_stats(), "3 meshes, 12 vertices, 6 faces, 1 frames");
    }
}
