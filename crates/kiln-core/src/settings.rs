//! Converter settings
//!
//! One flat value carrying every knob of a conversion run. The CLI fills it
//! from a settings file and command-line flags; processors read the parts
//! they need.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How LOD face budgets are chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LodMode {
    /// Decimate to a face count
    #[default]
    FaceCount,
    /// Decimate until an error bound is reached
    MaxError,
    /// Reach the face count, then keep going while under the error bound
    Hybrid,
}

/// How textures are laid out in the atlas
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtlasPacking {
    /// Equal-sized cells
    Grid,
    /// Cells sized by texture importance and bin-packed
    #[default]
    BinPack,
}

/// Settings for one conversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    pub input: PathBuf,
    pub output: PathBuf,

    pub model_name: String,
    pub model_comment: String,
    pub model_author: String,

    /// Number of LODs including the base LOD
    pub lods: usize,
    /// Face-count factor applied per successive LOD
    pub lod_factor: f32,
    pub lod_mode: LodMode,
    /// Error bound of LOD 1
    pub base_error: f32,
    /// Error bound growth per successive LOD
    pub error_mod: f32,
    pub smooth_all_faces: bool,

    /// Keep only the first N frames
    pub frames_keep_count: Option<usize>,
    pub remove_duplicate_frames: bool,
    pub base_frame: usize,

    /// Larger of model width and height after scaling
    pub size: f32,
    pub center: bool,

    pub texture_optimize: bool,
    /// Atlas width and height in pixels
    pub texture_size: u32,
    /// Atlas file name, also used as its texture name
    pub texture_name: String,
    /// Directory the atlas is written to
    pub texture_path: PathBuf,
    pub texture_packing: AtlasPacking,
    pub texture_search_paths: Vec<PathBuf>,
    pub lowercase_texture_names: bool,
    pub load_textures: bool,

    pub merge_meshes: bool,
    pub use_normal_calculator: bool,
    pub normal_threshold: f32,
    pub reset_materials: bool,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            model_name: String::new(),
            model_comment: String::new(),
            model_author: String::new(),
            lods: 5,
            lod_factor: 0.5,
            lod_mode: LodMode::FaceCount,
            base_error: 0.075,
            error_mod: 4.0,
            smooth_all_faces: false,
            frames_keep_count: None,
            remove_duplicate_frames: true,
            base_frame: 0,
            size: 1.0,
            center: false,
            texture_optimize: false,
            texture_size: 512,
            texture_name: String::new(),
            texture_path: PathBuf::new(),
            texture_packing: AtlasPacking::BinPack,
            texture_search_paths: Vec::new(),
            lowercase_texture_names: false,
            load_textures: true,
            merge_meshes: true,
            use_normal_calculator: true,
            normal_threshold: 0.6,
            reset_materials: false,
        }
    }
}

impl ConverterSettings {
    /// Face-count factor of LOD `lod` (LOD 0 keeps every face)
    pub fn lod_face_factor(&self, lod: usize) -> f32 {
        self.lod_factor.powi(lod as i32)
    }

    /// Error bound of LOD `lod`, or `None` when the LOD mode ignores errors
    pub fn lod_max_error(&self, lod: usize) -> Option<f32> {
        match self.lod_mode {
            LodMode::FaceCount => None,
            LodMode::MaxError | LodMode::Hybrid => {
                Some(self.base_error * self.error_mod.powi(lod.saturating_sub(1) as i32))
            }
        }
    }
}
