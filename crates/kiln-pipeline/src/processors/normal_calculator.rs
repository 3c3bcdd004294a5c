//! Angle-based vertex normal calculation

use ahash::AHashMap;
use kiln_core::math::{position_key, Vec3};
use kiln_core::{Face, Mesh, Model, Vertex};

use crate::processor::{ProcessContext, Processor};
use crate::{ProcessError, ProcessResult};

/// Default minimum cosine between face normals that are smoothed together
pub const DEFAULT_NORMAL_THRESHOLD: f32 = 0.6;

/// Computes vertex normals from face angles instead of smoothing groups
///
/// Every face corner first gets its own vertex carrying the flat face normal.
/// Corners at the same position whose face normals are within the threshold
/// of each other then share their averaged normal. Smoothing groups are
/// cleared afterwards since the normals already encode the hard edges.
#[derive(Debug)]
pub struct NormalCalculator {
    threshold: f32,
}

impl NormalCalculator {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Recalculate the normals of one mesh
    pub fn calculate(&self, mesh: &mut Mesh) {
        mesh.calculate_face_normals();

        let mut vertices: Vec<Vertex> = Vec::with_capacity(mesh.face_count() * 3);
        let mut faces: Vec<Face> = Vec::with_capacity(mesh.face_count());
        for face in mesh.faces() {
            let base = vertices.len();
            for &v in &face.vertices {
                let source = &mesh.vertices()[v];
                vertices.push(Vertex::with_normal(source.pos, face.normal, source.tex));
            }
            faces.push(Face {
                vertices: [base, base + 1, base + 2],
                normal: face.normal,
                smoothing_group: 0,
            });
        }
        let face_normals: Vec<_> = vertices.iter().map(|v| v.normal).collect();

        let mut by_position: AHashMap<[u32; 3], Vec<usize>> = AHashMap::new();
        for (i, vertex) in vertices.iter().enumerate() {
            by_position.entry(position_key(vertex.pos)).or_default().push(i);
        }

        let mut processed = vec![false; vertices.len()];
        let mut group = Vec::new();
        for i in 0..vertices.len() {
            if processed[i] {
                continue;
            }
            let reference = vertices[i].normal;
            group.clear();
            group.extend(
                by_position[&position_key(vertices[i].pos)]
                    .iter()
                    .copied()
                    .filter(|&j| !processed[j] && face_normals[j].dot(reference) >= self.threshold),
            );
            // A degenerate face has a zero normal and matches nothing, itself included
            if group.is_empty() {
                processed[i] = true;
                continue;
            }

            let sum: Vec3 = group.iter().map(|&j| face_normals[j]).sum();
            let normal = sum.normalize_or(reference);
            for &j in &group {
                vertices[j].normal = normal;
                processed[j] = true;
            }
        }

        mesh.set_geometry(vertices, faces);
        mesh.update_vertex_smoothing_groups();
    }
}

impl Default for NormalCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_NORMAL_THRESHOLD)
    }
}

impl Processor for NormalCalculator {
    fn name(&self) -> &str {
        "NormalCalculator"
    }

    fn init(&mut self, model: &Model, ctx: &ProcessContext) -> ProcessResult<()> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(ProcessError::Config(format!(
                "normal threshold {} is not a cosine",
                self.threshold
            )));
        }
        crate::processor::check_base_frame(model, ctx)
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        for mesh in model.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            self.calculate(mesh);
        }
        Ok(())
    }
}
