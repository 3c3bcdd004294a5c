//! Model scaling and transform baking

use kiln_core::math::{is_identity, Aabb, Mat4, Vec3};
use kiln_core::{Lod, Model};

use crate::processor::{base_lod, ProcessContext, Processor};
use crate::{ProcessError, ProcessResult};

/// Determinant magnitude below which a matrix counts as singular
const SINGULAR_EPSILON: f32 = 1e-12;

/// Resizes the model and bakes node transforms into meshes
///
/// The first pass scales the model uniformly so the larger of its base-frame
/// width (X) and height (Y) equals the target size, optionally centering it
/// on the origin in X/Y with its lowest point at Z = 0. The scale and
/// translation are folded into every node matrix.
///
/// The second pass bakes one base-frame transform into each mesh. When a mesh
/// is placed by several nodes the base-frame node with the largest transformed
/// bounding volume is baked and every other node placing the mesh is
/// multiplied by the inverse of that transform.
#[derive(Debug)]
pub struct Transformer {
    size: f32,
    center: bool,
}

impl Transformer {
    pub fn new(size: f32, center: bool) -> Self {
        Self { size, center }
    }

    /// Base-frame bounding box over every placed vertex
    fn base_frame_bounds(lod: &Lod, base_frame: usize) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        if let Some(frame) = lod.frame(base_frame) {
            for node in &frame.nodes {
                if let Some(mesh) = lod.mesh(node.mesh) {
                    for vertex in mesh.vertices() {
                        bounds.expand_to_include(node.matrix.transform_point3(vertex.pos));
                    }
                }
            }
        }
        bounds
    }

    /// Scale and translation folded into every node
    pub fn resize_matrix(&self, bounds: &Aabb) -> ProcessResult<Mat4> {
        let size = bounds.size();
        let scale = if size.x > size.y {
            self.size / size.x
        } else {
            self.size / size.y
        };
        if !scale.is_finite() {
            return Err(ProcessError::Geometry(format!(
                "cannot scale a model of size {} x {} to {}",
                size.x, size.y, self.size
            )));
        }

        let translate = if self.center {
            let center = bounds.center();
            Vec3::new(-center.x * scale, -center.y * scale, -bounds.min.z * scale)
        } else {
            Vec3::ZERO
        };
        Ok(Mat4::from_translation(translate) * Mat4::from_scale(Vec3::splat(scale)))
    }

    fn resize_model(&self, model: &mut Model, base_frame: usize) -> ProcessResult<()> {
        let bounds = Self::base_frame_bounds(base_lod(model)?, base_frame);
        let size = bounds.size();
        if bounds.is_empty() || (size.x <= 0.0 && size.y <= 0.0) {
            log::warn!(
                "Base frame {} has no width or height, not resizing the model",
                base_frame
            );
            return Ok(());
        }
        let transform = self.resize_matrix(&bounds)?;
        log::debug!(
            "Resizing model by {} (base frame size {:?})",
            transform.x_axis.x,
            size
        );

        for lod in &mut model.lods {
            for node in lod.frames.iter_mut().flat_map(|f| f.nodes.iter_mut()) {
                node.matrix = transform * node.matrix;
                if node.matrix.is_nan() {
                    return Err(ProcessError::Geometry(
                        "resized node matrix contains NaN".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Bake one transform into every mesh of `lod`
    pub fn apply_transformations(lod: &mut Lod, base_frame: usize) -> ProcessResult<()> {
        for mesh_id in 0..lod.meshes.len() {
            Self::apply_mesh_transformation(lod, mesh_id, base_frame)?;
        }
        Ok(())
    }

    fn apply_mesh_transformation(lod: &mut Lod, mesh_id: usize, base_frame: usize) -> ProcessResult<()> {
        let mesh = &lod.meshes[mesh_id];

        // (frame, node) of every node placing this mesh
        let mut placements = Vec::new();
        for (f, frame) in lod.frames.iter().enumerate() {
            for n in frame.nodes_for_mesh(mesh_id) {
                placements.push((f, n));
            }
        }
        if placements.is_empty() {
            return Err(ProcessError::Geometry(format!(
                "mesh '{}' is not placed by any node",
                mesh.name
            )));
        }

        let local_bounds = Aabb::from_points(mesh.vertices().iter().map(|v| v.pos));
        let mut chosen: Option<(usize, f32)> = None;
        for &(f, n) in placements.iter().filter(|(f, _)| *f == base_frame) {
            let volume = local_bounds.transform(lod.frames[f].nodes[n].matrix).volume();
            let volume = if volume.is_nan() { 0.0 } else { volume };
            if chosen.is_none_or(|(_, best)| volume > best) {
                chosen = Some((n, volume));
            }
        }
        let Some((base_node, _)) = chosen else {
            return Err(ProcessError::Geometry(format!(
                "mesh '{}' has no node in base frame {}",
                mesh.name, base_frame
            )));
        };

        let matrix = lod.frames[base_frame].nodes[base_node].matrix;
        if is_identity(&matrix) {
            return Ok(());
        }

        let inverse = if placements.len() > 1 {
            if matrix.determinant().abs() < SINGULAR_EPSILON {
                return Err(ProcessError::Geometry(format!(
                    "base transform of mesh '{}' is not invertible",
                    mesh.name
                )));
            }
            Some(matrix.inverse())
        } else {
            None
        };

        let mesh = &mut lod.meshes[mesh_id];
        for vertex in mesh.vertices_mut() {
            vertex.pos = matrix.transform_point3(vertex.pos);
        }
        mesh.update_bounding_box();

        if let Some(inverse) = inverse {
            for &(f, n) in &placements {
                let node = &mut lod.frames[f].nodes[n];
                node.matrix *= inverse;
            }
        }
        lod.frames[base_frame].nodes[base_node].matrix = Mat4::IDENTITY;
        Ok(())
    }
}

impl Processor for Transformer {
    fn name(&self) -> &str {
        "Transformer"
    }

    fn process(&mut self, model: &mut Model, ctx: &ProcessContext) -> ProcessResult<()> {
        self.resize_model(model, ctx.base_frame)?;
        for lod in &mut model.lods {
            Self::apply_transformations(lod, ctx.base_frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::{quad_mesh, quad_model};
    use kiln_core::Frame;

    fn placed_bounds(model: &Model) -> Aabb {
        Transformer::base_frame_bounds(&model.lods[0], 0)
    }

    #[test]
    fn test_scale() {
        let mut model = quad_model();
        model.lods[0].frames[0].nodes[0].matrix = Mat4::from_scale(Vec3::new(4.0, 2.0, 1.0));
        Transformer::new(2.0, false)
            .process(&mut model, &ProcessContext::default())
            .unwrap();

        let bounds = placed_bounds(&model);
        let size = bounds.size();
        assert!((size.x.max(size.y) - 2.0).abs() < 1e-5);
        assert!((size.y - 1.0).abs() < 1e-5);
        // Single node: transform baked into the mesh
        assert!(is_identity(&model.lods[0].frames[0].nodes[0].matrix));
    }

    #[test]
    fn test_center() {
        let mut model = quad_model();
        model.lods[0].frames[0].nodes[0].matrix =
            Mat4::from_translation(Vec3::new(10.0, 20.0, 5.0));
        Transformer::new(1.0, true)
            .process(&mut model, &ProcessContext::default())
            .unwrap();

        let bounds = placed_bounds(&model);
        assert!(bounds.center().truncate().length() < 1e-5);
        assert!(bounds.min.z.abs() < 1e-5);
    }

    #[test]
    fn test_flat_model_not_resized() {
        let mut model = quad_model();
        let squashed = Mat4::from_scale(Vec3::new(0.0, 0.0, 1.0));
        model.lods[0].frames[0].nodes[0].matrix = squashed;
        Transformer::new(1.0, true).resize_model(&mut model, 0).unwrap();
        assert_eq!(model.lods[0].frames[0].nodes[0].matrix, squashed);
    }

    #[test]
    fn test_empty_base_frame_not_resized() {
        let mut model = quad_model();
        let moved = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        let lod = &mut model.lods[0];
        lod.frames[0].nodes.clear();
        let mut second = Frame::new();
        second.add_node(0, moved);
        lod.frames.push(second);

        Transformer::new(2.0, false).resize_model(&mut model, 0).unwrap();
        assert_eq!(model.lods[0].frames[1].nodes[0].matrix, moved);
        assert!(!model.lods[0].frames[1].nodes[0].matrix.is_nan());
    }

    #[test]
    fn test_infinite_target_size_fails() {
        let mut model = quad_model();
        let result = Transformer::new(f32::INFINITY, false).resize_model(&mut model, 0);
        assert!(matches!(result, Err(ProcessError::Geometry(_))));
    }

    #[test]
    fn test_multiple_nodes_keep_relative_transforms() {
        let mut model = quad_model();
        let lod = &mut model.lods[0];
        lod.meshes[0].vertices_mut()[2].pos.z = 1.0;
        let corner = Vec3::new(1.0, 1.0, 1.0);
        let big = Mat4::from_scale(Vec3::splat(2.0));
        let moved = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        lod.frames[0].nodes[0].matrix = moved;
        lod.frames[0].add_node(0, big);
        let mut second = Frame::new();
        second.add_node(0, moved);
        lod.frames.push(second);

        let placed = |lod: &Lod, p: Vec3| -> Vec<Vec3> {
            lod.frames
                .iter()
                .flat_map(|f| f.nodes.iter())
                .map(|n| n.matrix.transform_point3(p))
                .collect()
        };
        let before = placed(lod, corner);
        Transformer::apply_transformations(lod, 0).unwrap();

        // The larger placement is baked
        assert!(is_identity(&lod.frames[0].nodes[1].matrix));
        let baked = lod.meshes[0].vertices()[2].pos;
        assert_eq!(baked, Vec3::splat(2.0));

        // Every placement still puts the corner in the same spot
        for (a, b) in before.iter().zip(placed(lod, baked)) {
            assert!((*a - b).length() < 1e-5);
        }
    }

    #[test]
    fn test_mesh_missing_from_base_frame_fails() {
        let mut model = quad_model();
        let lod = &mut model.lods[0];
        lod.add_mesh(quad_mesh("late", 2.0));
        let mut second = Frame::new();
        second.add_node(1, Mat4::IDENTITY);
        lod.frames.push(second);
        assert!(Transformer::apply_transformations(lod, 0).is_err());
    }
}
