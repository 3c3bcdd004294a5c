//! The pipeline driver
//!
//! Runs processors strictly in order. Each processor is initialized, run and
//! followed by a full model validation; the first failure aborts the run.

use kiln_core::{ConverterSettings, Model};

use crate::processor::{ProcessContext, Processor};
use crate::processors::{
    DefaultMaterials, FrameOptimizer, LodCreator, MaterialOptimizer, MeshOptimizer,
    NodeOptimizer, NormalCalculator, TextureOptimizer, Transformer, UnusedDataRemover,
    VertexOptimizer,
};
use crate::{ProcessError, ProcessResult};

/// Ordered list of processors sharing one [`ProcessContext`]
pub struct Pipeline {
    ctx: ProcessContext,
    processors: Vec<Box<dyn Processor>>,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new(ctx: ProcessContext) -> Self {
        Self {
            ctx,
            processors: Vec::new(),
        }
    }

    /// Build the standard conversion chain
    ///
    /// Default materials, unused-data removal, frame reduction (when a keep
    /// count or duplicate removal is configured) and resizing come first. Then
    /// the optional atlas, node splitting, the normal calculator, material and
    /// mesh merging and vertex deduplication. Without the normal calculator,
    /// smoothing-group normals are computed on the deduplicated vertices.
    /// Finally the LODs are created and each one past the base is decimated.
    pub fn from_settings(settings: &ConverterSettings) -> Self {
        let mut pipeline = Self::new(ProcessContext::new(settings.base_frame));
        pipeline
            .add(DefaultMaterials::new())
            .add(UnusedDataRemover::new());
        if settings.frames_keep_count.is_some_and(|n| n > 0) || settings.remove_duplicate_frames {
            pipeline.add(FrameOptimizer::new(
                settings.frames_keep_count,
                settings.remove_duplicate_frames,
            ));
        }
        pipeline.add(Transformer::new(settings.size, settings.center));
        if settings.texture_optimize {
            pipeline.add(
                TextureOptimizer::new(
                    settings.texture_size,
                    settings.texture_name.clone(),
                    settings.texture_path.clone(),
                    settings.texture_packing,
                )
                .with_search_paths(settings.texture_search_paths.clone()),
            );
        }
        pipeline.add(NodeOptimizer::new());
        if settings.use_normal_calculator {
            pipeline.add(NormalCalculator::new(settings.normal_threshold));
        }
        pipeline.add(MaterialOptimizer::new(settings.reset_materials));
        if settings.merge_meshes {
            pipeline.add(MeshOptimizer::new());
        }
        pipeline.add(VertexOptimizer::new());
        if !settings.use_normal_calculator {
            pipeline.add(SmoothingGroupNormals);
        }

        let lods = settings.lods.max(1);
        pipeline.add(CreateLods { count: lods });
        for lod in 1..lods {
            pipeline.add(LodCreator::new(
                lod,
                settings.lod_face_factor(lod),
                settings.lod_max_error(lod),
                settings.lod_mode,
            ));
        }
        pipeline
    }

    /// Append a processor
    pub fn add(&mut self, processor: impl Processor + 'static) -> &mut Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Get the context shared by every processor
    pub fn context(&self) -> &ProcessContext {
        &self.ctx
    }

    /// Names of the processors in run order
    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Number of processors
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Check whether there are no processors
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run every processor on `model`
    ///
    /// The model is validated before the first processor and after each one.
    /// A validation failure is attributed to the processor that just ran.
    pub fn run(&mut self, model: &mut Model) -> ProcessResult<()> {
        model.validate().map_err(|source| ProcessError::Validation {
            processor: "input".into(),
            source,
        })?;

        let ctx = self.ctx;
        for processor in &mut self.processors {
            if let Err(err) = Self::run_one(processor.as_mut(), model, &ctx) {
                log::error!("{} failed: {}", processor.name(), err);
                return Err(err);
            }
        }
        Ok(())
    }

    fn run_one(processor: &mut dyn Processor, model: &mut Model, ctx: &ProcessContext) -> ProcessResult<()> {
        let name = processor.name().to_string();
        log::debug!("Running {}", name);
        processor.init(model, ctx)?;
        processor.process(model, ctx)?;
        model.validate().map_err(|source| ProcessError::Validation {
            processor: name.clone(),
            source,
        })?;
        if let Some(lod) = model.base_lod() {
            log::debug!("{} done: {}", name, lod.short_stats());
        }
        Ok(())
    }
}

/// Get a model ready for processing after import
///
/// Applies texture-name lowercasing and smooth-all-faces when configured,
/// rebuilds vertex topology and, when enabled, decodes the textures. Texture
/// decoding failures are only warnings here.
pub fn prepare_model(model: &mut Model, settings: &ConverterSettings) {
    if settings.lowercase_texture_names {
        model.lowercase_texture_names();
    }
    if settings.smooth_all_faces {
        model.smooth_all_faces();
    }
    model.loading_completed();
    if settings.load_textures && !model.load_textures(&settings.texture_search_paths) {
        log::warn!("Some textures could not be loaded");
    }
    for (i, lod) in model.lods.iter().enumerate() {
        log::info!("LOD {}: {}", i, lod.short_stats());
    }
}

/// Normals from smoothing groups, used when the normal calculator is off
struct SmoothingGroupNormals;

impl Processor for SmoothingGroupNormals {
    fn name(&self) -> &str {
        "SmoothingGroupNormals"
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        model.calculate_face_normals();
        model.calculate_vertex_normals();
        Ok(())
    }
}

/// Clones the base LOD into the configured number of LODs
struct CreateLods {
    count: usize,
}

impl Processor for CreateLods {
    fn name(&self) -> &str {
        "CreateLods"
    }

    fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
        model.create_lods(self.count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::quad_model;
    use kiln_core::math::{Mat4, Vec2, Vec3};
    use kiln_core::{Face, Mesh, Vertex};

    struct Corrupt;

    impl Processor for Corrupt {
        fn name(&self) -> &str {
            "Corrupt"
        }

        fn process(&mut self, model: &mut Model, _ctx: &ProcessContext) -> ProcessResult<()> {
            model.lods[0].frames[0].add_node(7, Mat4::IDENTITY);
            Ok(())
        }
    }

    #[test]
    fn test_standard_chain_order() {
        let settings = ConverterSettings {
            lods: 3,
            ..Default::default()
        };
        let pipeline = Pipeline::from_settings(&settings);
        assert_eq!(
            pipeline.processor_names(),
            vec![
                "DefaultMaterials",
                "UnusedDataRemover",
                "FrameOptimizer",
                "Transformer",
                "NodeOptimizer",
                "NormalCalculator",
                "MaterialOptimizer",
                "MeshOptimizer",
                "VertexOptimizer",
                "CreateLods",
                "LodCreator",
                "LodCreator",
            ]
        );
    }

    #[test]
    fn test_optional_steps() {
        let settings = ConverterSettings {
            lods: 1,
            remove_duplicate_frames: false,
            merge_meshes: false,
            use_normal_calculator: false,
            texture_optimize: true,
            texture_name: "atlas.jpg".into(),
            ..Default::default()
        };
        let names = Pipeline::from_settings(&settings).processor_names().join(",");
        assert!(!names.contains("FrameOptimizer"));
        assert!(!names.contains("MeshOptimizer"));
        assert!(names.contains("TextureOptimizer"));
        assert!(!names.contains("LodCreator"));
        assert!(names.ends_with("VertexOptimizer,SmoothingGroupNormals,CreateLods"));
    }

    /// Two triangles folded along the X axis, each with its own copy of the
    /// shared edge, both in smoothing group 1
    fn folded_model() -> Model {
        let edge = [Vec3::ZERO, Vec3::X];
        let tex = [Vec2::ZERO, Vec2::X];
        let vertices = vec![
            Vertex::new(edge[0], tex[0]),
            Vertex::new(edge[1], tex[1]),
            Vertex::new(Vec3::Y, Vec2::Y),
            Vertex::new(edge[0], tex[0]),
            Vertex::new(Vec3::new(0.0, -1.0, 1.0), Vec2::ONE),
            Vertex::new(edge[1], tex[1]),
        ];
        let faces = vec![
            Face::with_smoothing_group([0, 1, 2], 1),
            Face::with_smoothing_group([3, 4, 5], 1),
        ];
        let mut mesh = Mesh::with_geometry("fold", vertices, faces);
        mesh.loading_completed();
        let mut model = quad_model();
        model.lods[0].meshes[0] = mesh;
        model
    }

    #[test]
    fn test_smoothing_group_normals_span_merged_vertices() {
        let mut model = folded_model();
        let settings = ConverterSettings {
            lods: 1,
            use_normal_calculator: false,
            ..Default::default()
        };
        Pipeline::from_settings(&settings).run(&mut model).unwrap();

        let mesh = &model.lods[0].meshes[0];
        assert_eq!(mesh.vertex_count(), 4);
        let [n0, n1] = [mesh.faces()[0].normal, mesh.faces()[1].normal];
        assert!(n0.dot(n1) < 0.9);
        let smooth = (n0 + n1).normalize();
        let shared: Vec<_> = mesh.vertices().iter().filter(|v| v.faces.len() == 2).collect();
        assert_eq!(shared.len(), 2);
        for vertex in shared {
            assert!(
                vertex.normal.abs_diff_eq(smooth, 1e-4),
                "{:?} != {:?}",
                vertex.normal,
                smooth
            );
        }
    }

    #[test]
    fn test_validation_failure_attributed() {
        let mut model = quad_model();
        let mut pipeline = Pipeline::new(ProcessContext::default());
        pipeline.add(DefaultMaterials::new()).add(Corrupt);
        match pipeline.run(&mut model) {
            Err(ProcessError::Validation { processor, .. }) => assert_eq!(processor, "Corrupt"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut model = quad_model();
        model.lods[0].frames[0].add_node(3, Mat4::IDENTITY);
        let mut pipeline = Pipeline::new(ProcessContext::default());
        assert!(matches!(
            pipeline.run(&mut model),
            Err(ProcessError::Validation { processor, .. }) if processor == "input"
        ));
    }

    #[test]
    fn test_runs_standard_chain() {
        let mut model = quad_model();
        let settings = ConverterSettings {
            lods: 2,
            ..Default::default()
        };
        prepare_model(&mut model, &settings);
        Pipeline::from_settings(&settings).run(&mut model).unwrap();
        assert_eq!(model.lod_count(), 2);
        assert_eq!(model.lods[1].distance, 10.0);
        assert!(model.validate().is_ok());
    }
}
