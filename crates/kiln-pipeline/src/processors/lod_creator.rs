//! Decimation of one level of detail

use kiln_core::{Face, LodMode, Mesh, Model, Vertex};

use crate::decimate::{
    DecimationEngine, DecimationInput, DecimationOutput, DecimationTarget, QuadricDecimator,
};
use crate::processor::{check_base_frame, lod_mut, ProcessContext, Processor};
use crate::{ProcessError, ProcessResult};

/// Fewest faces a decimated mesh is reduced to
pub const MIN_LOD_FACES: usize = 4;

/// Simplifies every mesh of one LOD
///
/// The face budget of a mesh is `max(4, round(face_factor * faces))`. In
/// error mode the error bound alone decides; in hybrid mode the budget is
/// reached first and collapsing continues while the bound allows.
pub struct LodCreator {
    lod_index: usize,
    face_factor: f32,
    max_error: Option<f32>,
    mode: LodMode,
    engine: Box<dyn DecimationEngine>,
}

impl LodCreator {
    pub fn new(lod_index: usize, face_factor: f32, max_error: Option<f32>, mode: LodMode) -> Self {
        Self {
            lod_index,
            face_factor,
            max_error,
            mode,
            engine: Box::new(QuadricDecimator::new()),
        }
    }

    /// Use a different decimation backend
    pub fn with_engine(mut self, engine: Box<dyn DecimationEngine>) -> Self {
        self.engine = engine;
        self
    }

    fn face_budget(&self, faces: usize) -> usize {
        ((self.face_factor * faces as f32).round() as usize).max(MIN_LOD_FACES)
    }

    fn target(&self, faces: usize) -> DecimationTarget {
        let budget = self.face_budget(faces);
        match (self.mode, self.max_error) {
            (LodMode::MaxError, Some(max_error)) => DecimationTarget::MaxError(max_error),
            (LodMode::Hybrid, Some(max_error)) => DecimationTarget::Hybrid {
                faces: budget,
                max_error,
            },
            _ => DecimationTarget::FaceCount(budget),
        }
    }

    /// Reject engine output that does not describe faces of `mesh`
    fn check_output(mesh: &Mesh, output: &DecimationOutput) -> ProcessResult<()> {
        let fail = |reason: String| {
            Err(ProcessError::Decimation(format!("mesh '{}': {}", mesh.name, reason)))
        };
        if output.faces.len() != output.sources.len() {
            return fail(format!(
                "{} faces but {} source faces",
                output.faces.len(),
                output.sources.len()
            ));
        }
        let vertex_count = mesh.vertex_count();
        for (&[a, b, c], &source) in output.faces.iter().zip(&output.sources) {
            if let Some(v) = [a, b, c].into_iter().find(|&v| v >= vertex_count) {
                return fail(format!("vertex {} out of range ({} vertices)", v, vertex_count));
            }
            if a == b || b == c || a == c {
                return fail(format!("degenerate face [{}, {}, {}]", a, b, c));
            }
            if source >= mesh.face_count() {
                return fail(format!("source face {} out of range", source));
            }
        }
        Ok(())
    }

    /// Decimate one mesh and replace its buffers, returning the new face count
    fn simplify(&self, mesh: &mut Mesh) -> ProcessResult<usize> {
        let faces = mesh.face_count();
        let target = self.target(faces);
        if faces <= MIN_LOD_FACES
            || matches!(target, DecimationTarget::FaceCount(budget) if budget >= faces)
        {
            return Ok(faces);
        }

        let positions: Vec<_> = mesh.vertices().iter().map(|v| v.pos).collect();
        let normals: Vec<_> = mesh.vertices().iter().map(|v| v.normal).collect();
        let texcoords: Vec<_> = mesh.vertices().iter().map(|v| v.tex).collect();
        let indices: Vec<[usize; 3]> = mesh.faces().iter().map(|f| f.vertices).collect();
        let input = DecimationInput {
            positions: &positions,
            normals: &normals,
            texcoords: &texcoords,
            faces: &indices,
        };
        let output = self
            .engine
            .decimate(&input, target)
            .map_err(|err| match err {
                ProcessError::Decimation(reason) => {
                    ProcessError::Decimation(format!("mesh '{}': {}", mesh.name, reason))
                }
                other => other,
            })?;
        Self::check_output(mesh, &output)?;

        // Compact away vertices no remaining face uses
        let (old_vertices, old_faces) = mesh.take_geometry();
        let mut new_index = vec![usize::MAX; old_vertices.len()];
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut new_faces: Vec<Face> = Vec::with_capacity(output.faces.len());
        for (face, &source) in output.faces.iter().zip(&output.sources) {
            let mapped = face.map(|v| {
                if new_index[v] == usize::MAX {
                    new_index[v] = vertices.len();
                    vertices.push(old_vertices[v].clone());
                }
                new_index[v]
            });
            let smoothing_group = old_faces[source].smoothing_group;
            new_faces.push(Face::with_smoothing_group(mapped, smoothing_group));
        }

        let count = new_faces.len();
        mesh.set_geometry(vertices, new_faces);
        mesh.calculate_face_normals();
        mesh.update_vertex_smoothing_groups();
        mesh.update_bounding_box();
        Ok(count)
    }
}

impl Processor for LodCreator {
    fn name(&self) -> &str {
        "LodCreator"
    }

    fn init(&mut self, model: &Model, ctx: &ProcessContext) -> ProcessResult<()> {
        if self.lod_index == 0 || self.lod_index >= model.lod_count() {
            return Err(ProcessError::Config(format!(
                "cannot decimate LOD {} of a model with {} LODs",
                self.lod_index,
                model.lod_count()
            )));
        }
        if !(self.face_factor > 0.0 && self.face_factor <= 1.0) {
            return Err(ProcessError::Config(format!(
                "LOD face factor {} is outside (0, 1]",
                self.face_factor
            )));
        }
        if self.mode != LodMode::FaceCount && self.max_error.is_none_or(|e| !(e >= 0.0)) {
            return Err(ProcessError::Config(format!(
                "LOD mode {:?} needs a non-negative error bound",
                self.mode
            )));
        }
        check_base_frame(model, ctx)
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        let lod_index = self.lod_index;
        let lod = lod_mut(model, lod_index)?;
        let before = lod.face_count();
        for mesh in &mut lod.meshes {
            self.simplify(mesh)?;
        }
        log::debug!(
            "LOD {}: {} -> {} faces ({})",
            lod_index,
            before,
            lod.face_count(),
            lod.short_stats()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::{grid_mesh, quad_model};

    fn grid_model(n: usize, lods: usize) -> Model {
        let mut model = quad_model();
        model.lods[0].meshes[0] = grid_mesh("grid", n);
        model.create_lods(lods);
        model
    }

    fn run(model: &mut Model, mut creator: LodCreator) -> ProcessResult<()> {
        let ctx = ProcessContext::default();
        creator.init(model, &ctx)?;
        creator.process(model, &ctx)
    }

    #[test]
    fn test_face_budget() {
        let mut model = grid_model(8, 2);
        run(&mut model, LodCreator::new(1, 0.5, None, LodMode::FaceCount)).unwrap();

        let original = model.lods[0].meshes[0].face_count();
        let reduced = model.lods[1].meshes[0].face_count();
        assert_eq!(original, 128);
        assert!(reduced <= 64 && reduced >= MIN_LOD_FACES);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_unused_vertices_compacted() {
        let mut model = grid_model(8, 2);
        run(&mut model, LodCreator::new(1, 0.25, None, LodMode::FaceCount)).unwrap();
        let mesh = &model.lods[1].meshes[0];
        assert!(mesh.vertex_count() < 81);
        assert!(mesh.vertices().iter().all(|v| !v.faces.is_empty()));
    }

    #[test]
    fn test_error_mode_requires_bound() {
        let mut model = grid_model(2, 2);
        let result = run(&mut model, LodCreator::new(1, 0.5, None, LodMode::MaxError));
        assert!(matches!(result, Err(ProcessError::Config(_))));
    }

    #[test]
    fn test_base_lod_rejected() {
        let mut model = grid_model(2, 2);
        let result = run(&mut model, LodCreator::new(0, 0.5, None, LodMode::FaceCount));
        assert!(matches!(result, Err(ProcessError::Config(_))));
        let result = run(&mut model, LodCreator::new(2, 0.5, None, LodMode::FaceCount));
        assert!(result.is_err());
    }

    #[test]
    fn test_small_meshes_untouched() {
        let mut model = quad_model();
        model.create_lods(2);
        run(&mut model, LodCreator::new(1, 0.1, None, LodMode::FaceCount)).unwrap();
        assert_eq!(model.lods[1].meshes[0].face_count(), 2);
    }

    struct FailingEngine;

    impl DecimationEngine for FailingEngine {
        fn decimate(
            &self,
            _input: &DecimationInput<'_>,
            _target: DecimationTarget,
        ) -> ProcessResult<DecimationOutput> {
            Err(ProcessError::Decimation("engine failure".into()))
        }
    }

    #[test]
    fn test_engine_failure_propagates() {
        let mut model = grid_model(4, 2);
        let creator =
            LodCreator::new(1, 0.5, None, LodMode::FaceCount).with_engine(Box::new(FailingEngine));
        let err = run(&mut model, creator).unwrap_err();
        assert!(err.to_string().contains("grid"));
    }

    struct FixedEngine(DecimationOutput);

    impl DecimationEngine for FixedEngine {
        fn decimate(
            &self,
            _input: &DecimationInput<'_>,
            _target: DecimationTarget,
        ) -> ProcessResult<DecimationOutput> {
            Ok(self.0.clone())
        }
    }

    /// Run with a canned engine result, returning the LOD 1 face count too
    fn run_fixed(faces: Vec<[usize; 3]>, sources: Vec<usize>) -> (ProcessResult<()>, usize) {
        let mut model = grid_model(6, 2);
        let output = DecimationOutput {
            faces,
            sources,
            max_error: 0.0,
        };
        let creator = LodCreator::new(1, 0.5, None, LodMode::FaceCount)
            .with_engine(Box::new(FixedEngine(output)));
        let result = run(&mut model, creator);
        (result, model.lods[1].meshes[0].face_count())
    }

    #[test]
    fn test_malformed_engine_output_rejected() {
        let (result, faces) = run_fixed(vec![[0, 1, 999]], vec![0]);
        assert!(matches!(result, Err(ProcessError::Decimation(ref r)) if r.contains("999")));
        assert_eq!(faces, 72);

        let cases = [
            (vec![[0, 1, 8], [1, 9, 8]], vec![0]),
            (vec![[0, 1, 1]], vec![0]),
            (vec![[0, 1, 8]], vec![500]),
        ];
        for (faces, sources) in cases {
            let (result, count) = run_fixed(faces, sources);
            assert!(matches!(result, Err(ProcessError::Decimation(ref r)) if r.contains("grid")));
            assert_eq!(count, 72);
        }

        let (result, faces) = run_fixed(vec![[0, 1, 8], [0, 8, 7]], vec![0, 1]);
        assert!(result.is_ok());
        assert_eq!(faces, 2);
    }
}
