//! Concrete processors

mod default_materials;
mod frame_optimizer;
mod lod_creator;
mod material_optimizer;
mod mesh_optimizer;
mod node_optimizer;
mod normal_calculator;
mod texture_optimizer;
mod transformer;
mod unused_data_remover;
mod vertex_optimizer;

pub use default_materials::{DefaultMaterials, DEFAULT_MATERIAL_NAME, DEFAULT_TEXTURE_NAME};
pub use frame_optimizer::FrameOptimizer;
pub use lod_creator::LodCreator;
pub use material_optimizer::MaterialOptimizer;
pub use mesh_optimizer::MeshOptimizer;
pub use node_optimizer::NodeOptimizer;
pub use normal_calculator::NormalCalculator;
pub use texture_optimizer::TextureOptimizer;
pub use transformer::Transformer;
pub use unused_data_remover::UnusedDataRemover;
pub use vertex_optimizer::VertexOptimizer;
