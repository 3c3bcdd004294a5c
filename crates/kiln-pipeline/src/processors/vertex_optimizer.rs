//! Duplicate vertex removal

use kiln_core::math::{cmp_vec2, cmp_vec3};
use kiln_core::{Face, Mesh, Model, Vertex};

use crate::processor::{ProcessContext, Processor};
use crate::ProcessResult;

/// Result of optimizing one mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexStats {
    pub kept: usize,
    pub removed: usize,
}

/// Merges vertices that can be shared between faces
///
/// Two vertices merge when position and texture coordinate are exactly equal
/// and they either share a smoothing group or have exactly equal normals.
#[derive(Debug, Default)]
pub struct VertexOptimizer;

impl VertexOptimizer {
    pub fn new() -> Self {
        Self
    }

    fn is_duplicate(kept: &Vertex, candidate: &Vertex) -> bool {
        kept.pos == candidate.pos
            && kept.tex == candidate.tex
            && (kept.smoothing_group & candidate.smoothing_group != 0
                || kept.normal == candidate.normal)
    }

    /// Remove duplicate vertices from one mesh
    pub fn optimize_mesh(mesh: &mut Mesh) -> VertexStats {
        let original = mesh.vertex_count();
        let mut order: Vec<usize> = (0..original).collect();
        {
            let vertices = mesh.vertices();
            order.sort_by(|&a, &b| {
                let (va, vb) = (&vertices[a], &vertices[b]);
                cmp_vec3(va.pos, vb.pos)
                    .then_with(|| cmp_vec3(va.normal, vb.normal))
                    .then_with(|| cmp_vec2(va.tex, vb.tex))
            });
        }

        // Old index → index of the vertex it merges into
        let mut replacement: Vec<usize> = (0..original).collect();
        let vertices = mesh.vertices();
        let mut run_start = 0;
        while run_start < order.len() {
            let pos = vertices[order[run_start]].pos;
            let mut run_end = run_start + 1;
            while run_end < order.len() && vertices[order[run_end]].pos == pos {
                run_end += 1;
            }

            // Vertices of this run that survive
            let mut kept: Vec<usize> = Vec::new();
            for &candidate in &order[run_start..run_end] {
                match kept
                    .iter()
                    .copied()
                    .find(|&k| Self::is_duplicate(&vertices[k], &vertices[candidate]))
                {
                    Some(k) => replacement[candidate] = k,
                    None => kept.push(candidate),
                }
            }
            run_start = run_end;
        }

        // Survivors keep their relative order
        let mut new_index = vec![usize::MAX; original];
        let mut new_vertices: Vec<Vertex> = Vec::with_capacity(original);
        for (i, vertex) in vertices.iter().enumerate() {
            if replacement[i] == i {
                new_index[i] = new_vertices.len();
                new_vertices.push(vertex.clone());
            }
        }
        let new_faces: Vec<Face> = mesh
            .faces()
            .iter()
            .map(|face| Face {
                vertices: face.vertices.map(|v| new_index[replacement[v]]),
                ..face.clone()
            })
            .collect();

        let kept = new_vertices.len();
        mesh.set_geometry(new_vertices, new_faces);
        mesh.update_vertex_smoothing_groups();
        VertexStats {
            kept,
            removed: original - kept,
        }
    }
}

impl Processor for VertexOptimizer {
    fn name(&self) -> &str {
        "VertexOptimizer"
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        let mut total = VertexStats::default();
        for mesh in model.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            let stats = Self::optimize_mesh(mesh);
            total.kept += stats.kept;
            total.removed += stats.removed;
        }
        log::debug!(
            "Kept {} vertices, removed {} duplicates",
            total.kept,
            total.removed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::math::{Vec2, Vec3};

    /// Quad whose triangles each carry their own copy of the shared corners
    fn split_quad(smoothing_group: u32) -> Mesh {
        let corner = |x: f32, y: f32| {
            Vertex::with_normal(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::new(x, y))
        };
        let vertices = vec![
            corner(0.0, 0.0),
            corner(1.0, 0.0),
            corner(1.0, 1.0),
            corner(0.0, 0.0),
            corner(1.0, 1.0),
            corner(0.0, 1.0),
        ];
        let faces = vec![
            Face::with_smoothing_group([0, 1, 2], smoothing_group),
            Face::with_smoothing_group([3, 4, 5], smoothing_group),
        ];
        let mut mesh = Mesh::with_geometry("split", vertices, faces);
        mesh.loading_completed();
        mesh
    }

    #[test]
    fn test_merges_duplicates() {
        let mut mesh = split_quad(1);
        let stats = VertexOptimizer::optimize_mesh(&mut mesh);
        assert_eq!(stats, VertexStats { kept: 4, removed: 2 });
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face(1).unwrap().vertices, [0, 2, 3]);
        assert_eq!(mesh.vertex(0).unwrap().faces.as_slice(), &[0, 1]);
    }

    #[test]
    fn test_equal_normals_merge_without_smoothing() {
        let mut mesh = split_quad(0);
        let stats = VertexOptimizer::optimize_mesh(&mut mesh);
        assert_eq!(stats.kept, 4);
    }

    #[test]
    fn test_hard_edges_survive() {
        let mut mesh = split_quad(0);
        mesh.vertices_mut()[3].normal = Vec3::X;
        let stats = VertexOptimizer::optimize_mesh(&mut mesh);
        assert_eq!(stats, VertexStats { kept: 5, removed: 1 });
    }

    #[test]
    fn test_different_texcoords_survive() {
        let mut mesh = split_quad(1);
        mesh.vertices_mut()[4].tex = Vec2::new(0.5, 0.5);
        let stats = VertexOptimizer::optimize_mesh(&mut mesh);
        assert_eq!(stats.kept + stats.removed, 6);
        assert_eq!(stats.kept, 5);
    }

    #[test]
    fn test_no_two_survivors_are_duplicates() {
        let mut mesh = split_quad(1);
        VertexOptimizer::optimize_mesh(&mut mesh);
        let vertices = mesh.vertices();
        for (i, a) in vertices.iter().enumerate() {
            for b in &vertices[i + 1..] {
                assert!(!VertexOptimizer::is_duplicate(a, b));
            }
        }
    }
}
