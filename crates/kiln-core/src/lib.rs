//! # Kiln Core
//!
//! Model data structures for the Kiln model converter.
//!
//! - **Mesh**: vertex and face buffers with vertex → face back-references
//! - **Material / Texture**: surface description and the decoded image buffer
//! - **Frame / LOD**: animation poses and detail levels
//! - **Model**: the top-level container, its remapping operations and the
//!   flattened arrays built before writing
//! - **Validation**: the structural checks run after every processing step
//! - **Settings**: the flat configuration of a conversion run

pub mod frame;
pub mod lod;
pub mod material;
pub mod math;
pub mod mesh;
pub mod model;
pub mod settings;
pub mod texture;
pub mod validate;

pub use frame::{Frame, Node};
pub use lod::{Lod, MeshId};
pub use material::{Material, MaterialId};
pub use mesh::{Face, FaceId, Mesh, Vertex, VertexId, ALL_SMOOTHING_GROUPS};
pub use model::{IndexArray, MeshRange, Model, ModelArrays, FLOATS_PER_VERTEX};
pub use settings::{AtlasPacking, ConverterSettings, LodMode};
pub use texture::{Texture, TextureError, TextureId, TextureImage, TextureResult};
pub use validate::{ValidationError, ValidationResult};
