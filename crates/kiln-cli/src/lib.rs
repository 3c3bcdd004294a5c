//! # Kiln CLI
//!
//! Command-line front end of the Kiln model converter.
//!
//! ## Features
//! - Settings file (TOML) with command-line overrides
//! - JSON scene import
//! - Full processing chain with LOD generation and optional texture atlas
//! - Binary model output, written only when every step succeeded

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use serde::Deserialize;

use kiln_core::{AtlasPacking, ConverterSettings, LodMode, Model};
use kiln_pipeline::{Importer, JsonImporter, ModelWriter, Pipeline, prepare_model};

/// Atlas layout choice on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Packing {
    Grid,
    Binpack,
}

impl From<Packing> for AtlasPacking {
    fn from(packing: Packing) -> Self {
        match packing {
            Packing::Grid => AtlasPacking::Grid,
            Packing::Binpack => AtlasPacking::BinPack,
        }
    }
}

/// Kiln model converter
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input scene file
    pub input: PathBuf,

    /// Output file (default: input with a .kmf extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model name
    #[arg(long)]
    pub name: Option<String>,

    /// Model comment
    #[arg(long)]
    pub comment: Option<String>,

    /// Model author(s)
    #[arg(long)]
    pub author: Option<String>,

    /// Number of LODs to create
    #[arg(long)]
    pub lods: Option<usize>,

    /// Face-count factor between successive LODs
    #[arg(long)]
    pub lod_factor: Option<f32>,

    /// Smooth the whole model
    #[arg(long)]
    pub smooth_all: bool,

    /// Decimate LODs by error bound instead of face budget
    #[arg(long)]
    pub use_error: bool,

    /// Decimate LODs by face budget and error bound
    #[arg(long)]
    pub use_both: bool,

    /// Error bound of the first decimated LOD
    #[arg(long)]
    pub base_error: Option<f32>,

    /// Error bound growth between successive LODs
    #[arg(long)]
    pub error_mod: Option<f32>,

    /// Keep only the first frame
    #[arg(long)]
    pub no_frames: bool,

    /// Don't remove duplicate frames
    #[arg(long)]
    pub keep_frames: bool,

    /// Frame all calculations are based on
    #[arg(long)]
    pub base_frame: Option<usize>,

    /// Larger of the model's width and height
    #[arg(long)]
    pub size: Option<f32>,

    /// Center the model
    #[arg(long)]
    pub center: bool,

    /// Combine all textures into one atlas
    #[arg(long)]
    pub tex_optimize: bool,

    /// Atlas width and height in pixels
    #[arg(long)]
    pub tex_size: Option<u32>,

    /// Atlas file name without path (default: input name with a .jpg extension)
    #[arg(long)]
    pub tex_name: Option<String>,

    /// Directory the atlas is written to (default: output directory)
    #[arg(long)]
    pub tex_path: Option<PathBuf>,

    /// Atlas layout
    #[arg(long, value_enum)]
    pub tex_packing: Option<Packing>,

    /// Add a texture search directory
    #[arg(short = 't', value_name = "DIR")]
    pub texture_paths: Vec<PathBuf>,

    /// Lowercase all texture names
    #[arg(long)]
    pub tex_name_to_lower: bool,

    /// Don't decode textures
    #[arg(long)]
    pub dont_load_tex: bool,

    /// Don't merge meshes
    #[arg(long)]
    pub dont_merge_meshes: bool,

    /// Use smoothing-group normals instead of the normal calculator
    #[arg(long)]
    pub no_normal_calculator: bool,

    /// Cosine threshold of the normal calculator
    #[arg(long, allow_negative_numbers = true)]
    pub normal_threshold: Option<f32>,

    /// Reset all material colors
    #[arg(long)]
    pub reset_materials: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the run settings: defaults, then the settings file, then flags
    pub fn settings(&self) -> Result<ConverterSettings> {
        let mut settings = ConverterSettings::default();
        if let Some(path) = &self.config {
            SettingsFile::load(path)?.apply(&mut settings);
        }

        settings.input = self.input.clone();
        settings.output = self
            .output
            .clone()
            .unwrap_or_else(|| self.input.with_extension("kmf"));

        if let Some(name) = &self.name {
            settings.model_name = name.clone();
        }
        if let Some(comment) = &self.comment {
            settings.model_comment = comment.clone();
        }
        if let Some(author) = &self.author {
            settings.model_author = author.clone();
        }

        if let Some(lods) = self.lods {
            settings.lods = lods;
        }
        if let Some(factor) = self.lod_factor {
            settings.lod_factor = factor;
        }
        if self.use_both {
            settings.lod_mode = LodMode::Hybrid;
        } else if self.use_error {
            settings.lod_mode = LodMode::MaxError;
        }
        if let Some(error) = self.base_error {
            settings.base_error = error;
        }
        if let Some(factor) = self.error_mod {
            settings.error_mod = factor;
        }
        settings.smooth_all_faces |= self.smooth_all;

        if self.no_frames {
            settings.frames_keep_count = Some(1);
        }
        if self.keep_frames {
            settings.remove_duplicate_frames = false;
        }
        if let Some(frame) = self.base_frame {
            settings.base_frame = frame;
        }

        if let Some(size) = self.size {
            settings.size = size;
        }
        settings.center |= self.center;

        settings.texture_optimize |= self.tex_optimize;
        if let Some(size) = self.tex_size {
            settings.texture_size = size;
        }
        settings.texture_name = match &self.tex_name {
            Some(name) => name.clone(),
            None => default_texture_name(&self.input),
        };
        settings.texture_path = match &self.tex_path {
            Some(path) => path.clone(),
            None => settings
                .output
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        if let Some(packing) = self.tex_packing {
            settings.texture_packing = packing.into();
        }
        settings
            .texture_search_paths
            .extend(self.texture_paths.iter().cloned());
        settings.lowercase_texture_names |= self.tex_name_to_lower;
        if self.dont_load_tex {
            settings.load_textures = false;
        }

        if self.dont_merge_meshes {
            settings.merge_meshes = false;
        }
        if self.no_normal_calculator {
            settings.use_normal_calculator = false;
        }
        if let Some(threshold) = self.normal_threshold {
            settings.normal_threshold = threshold;
        }
        settings.reset_materials |= self.reset_materials;

        Ok(settings)
    }
}

fn default_texture_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "texture".to_string());
    format!("{}.jpg", stem)
}

/// `[model]` table of a settings file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    pub size: Option<f32>,
    pub merge_meshes: Option<bool>,
    pub use_normal_calculator: Option<bool>,
    pub normal_calculator_threshold: Option<f32>,
    pub keep_frames_count: Option<usize>,
    pub lods: Option<usize>,
}

/// One `[animations.<name>]` table
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AnimationRange {
    pub start: usize,
    pub end: usize,
}

/// Settings file contents
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub model: ModelSection,
    pub animations: BTreeMap<String, AnimationRange>,
}

impl SettingsFile {
    /// Read and parse a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let file: Self = toml::from_str(text)?;
        for (name, range) in &file.animations {
            if range.end < range.start {
                bail!("animation '{}' ends before it starts", name);
            }
        }
        Ok(file)
    }

    /// Frames to keep: the explicit count, or enough for every animation
    pub fn keep_frames(&self) -> Option<usize> {
        self.model.keep_frames_count.or_else(|| {
            self.animations
                .values()
                .map(|a| a.end + 1)
                .max()
        })
    }

    pub fn apply(&self, settings: &mut ConverterSettings) {
        let model = &self.model;
        if let Some(size) = model.size {
            settings.size = size;
        }
        if let Some(merge) = model.merge_meshes {
            settings.merge_meshes = merge;
        }
        if let Some(calculate) = model.use_normal_calculator {
            settings.use_normal_calculator = calculate;
        }
        if let Some(threshold) = model.normal_calculator_threshold {
            settings.normal_threshold = threshold;
        }
        if let Some(lods) = model.lods {
            settings.lods = lods;
        }
        if let Some(keep) = self.keep_frames() {
            log::debug!("Keeping {} frames", keep);
            settings.frames_keep_count = Some(keep);
        }
    }
}

/// Run one conversion
///
/// Nothing is written unless import, processing and serialization all
/// succeed.
pub fn convert(settings: &ConverterSettings) -> Result<Model> {
    if !settings.input.is_file() {
        bail!("Input file {} doesn't exist", settings.input.display());
    }

    let mut model = Model::new("");
    JsonImporter::new()
        .import(&settings.input, &mut model)
        .with_context(|| format!("Failed to import {}", settings.input.display()))?;
    if !settings.model_name.is_empty() {
        model.name = settings.model_name.clone();
    }
    if !settings.model_comment.is_empty() {
        model.comment = settings.model_comment.clone();
    }
    if !settings.model_author.is_empty() {
        model.author = settings.model_author.clone();
    }

    prepare_model(&mut model, settings);
    let mut pipeline = Pipeline::from_settings(settings);
    log::debug!("Processors: {}", pipeline.processor_names().join(", "));
    pipeline
        .run(&mut model)
        .context("Failed to process model")?;

    ModelWriter::new()
        .write(&mut model, settings.base_frame, &settings.output)
        .with_context(|| format!("Failed to write {}", settings.output.display()))?;
    Ok(model)
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let settings = cli.settings()?;
    log::info!(
        "Converting {} to {}",
        settings.input.display(),
        settings.output.display()
    );
    let model = convert(&settings)?;
    log::info!(
        "Done: {} LODs, {} materials, {} textures",
        model.lod_count(),
        model.materials.len(),
        model.textures.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    const QUAD: &str = r#"{
        "name": "crate",
        "materials": [{ "name": "wood" }],
        "meshes": [{
            "name": "side",
            "material": 0,
            "positions": [[0, 0, 0], [2, 0, 0], [2, 2, 0], [0, 2, 0]],
            "uvs": [[0, 0], [1, 0], [1, 1], [0, 1]],
            "faces": [[0, 1, 2, 3]]
        }]
    }"#;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["kiln", "tank.json"]);
        assert_eq!(cli.input, PathBuf::from("tank.json"));
        assert!(cli.output.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_default_paths() {
        let cli = Cli::parse_from(["kiln", "models/tank.json"]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.output, PathBuf::from("models/tank.kmf"));
        assert_eq!(settings.texture_name, "tank.jpg");
        assert_eq!(settings.texture_path, PathBuf::from("models"));
    }

    #[test]
    fn test_flags_override() {
        let cli = Cli::parse_from([
            "kiln",
            "tank.json",
            "-o",
            "out/tank.kmf",
            "--lods",
            "3",
            "--use-both",
            "--no-frames",
            "--keep-frames",
            "--tex-packing",
            "grid",
            "-t",
            "textures",
            "-t",
            "more",
            "--normal-threshold",
            "-0.5",
            "--dont-merge-meshes",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.lods, 3);
        assert_eq!(settings.lod_mode, LodMode::Hybrid);
        assert_eq!(settings.frames_keep_count, Some(1));
        assert!(!settings.remove_duplicate_frames);
        assert_eq!(settings.texture_packing, AtlasPacking::Grid);
        assert_eq!(settings.texture_search_paths.len(), 2);
        assert_eq!(settings.normal_threshold, -0.5);
        assert!(!settings.merge_meshes);
    }

    #[test]
    fn test_settings_file() {
        let file = SettingsFile::parse(
            r#"
            [model]
            size = 2.5
            merge_meshes = false
            lods = 2

            [animations.idle]
            start = 0
            end = 4

            [animations.walk]
            start = 5
            end = 11
            "#,
        )
        .unwrap();
        assert_eq!(file.keep_frames(), Some(12));

        let mut settings = ConverterSettings::default();
        file.apply(&mut settings);
        assert_eq!(settings.size, 2.5);
        assert!(!settings.merge_meshes);
        assert_eq!(settings.lods, 2);
        assert_eq!(settings.frames_keep_count, Some(12));
    }

    #[test]
    fn test_explicit_keep_count_wins() {
        let file = SettingsFile::parse(
            "[model]\nkeep_frames_count = 3\n[animations.walk]\nstart = 0\nend = 20\n",
        )
        .unwrap();
        assert_eq!(file.keep_frames(), Some(3));
        assert_eq!(SettingsFile::parse("").unwrap().keep_frames(), None);
    }

    #[test]
    fn test_bad_animation_range() {
        assert!(SettingsFile::parse("[animations.run]\nstart = 4\nend = 1\n").is_err());
    }

    #[test]
    fn test_convert() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("crate.json");
        fs::write(&input, QUAD).unwrap();
        let config = dir.path().join("crate.toml");
        fs::write(&config, "[model]\nlods = 2\n").unwrap();

        let cli = Cli::parse_from([
            OsStr::new("kiln"),
            input.as_os_str(),
            OsStr::new("-c"),
            config.as_os_str(),
            OsStr::new("--author"),
            OsStr::new("someone"),
        ]);
        let settings = cli.settings().unwrap();
        let model = convert(&settings).unwrap();

        assert!(dir.path().join("crate.kmf").is_file());
        assert_eq!(model.lod_count(), 2);
        assert_eq!(model.name, "crate");
        assert_eq!(model.author, "someone");
    }

    #[test]
    fn test_failed_conversion_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.json");
        fs::write(&input, "{ not json").unwrap();
        let cli = Cli::parse_from([OsStr::new("kiln"), input.as_os_str()]);
        let settings = cli.settings().unwrap();

        assert!(convert(&settings).is_err());
        assert!(!dir.path().join("broken.kmf").exists());

        let missing = Cli::parse_from(["kiln", "/nonexistent/model.json"]);
        assert!(convert(&missing.settings().unwrap()).is_err());
    }
}
