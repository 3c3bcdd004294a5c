//! Textures and the image buffer
//!
//! [`Texture`] is the model-side record of a texture file. The pixels live in
//! an optional [`TextureImage`], decoded on demand from the texture's file
//! name and a list of search paths.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use thiserror::Error;

use crate::math::Vec2;

/// Index of a texture in [`crate::Model::textures`] (insertion order)
pub type TextureId = usize;

/// Texture loading and saving errors
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Texture '{name}' not found (searched {searched} locations)")]
    NotFound { name: String, searched: usize },

    #[error("Failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to save '{path}': {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Result type for texture operations
pub type TextureResult<T> = Result<T, TextureError>;

/// Decoded RGBA image
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pixels: RgbaImage,
}

impl TextureImage {
    /// Create a blank (transparent black) image
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    /// Create an image filled with one color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba(rgba)),
        }
    }

    /// Wrap an existing RGBA buffer
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Decode an image file
    pub fn open(path: &Path) -> TextureResult<Self> {
        let image = image::open(path).map_err(|source| TextureError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            pixels: image.to_rgba8(),
        })
    }

    /// Find `name` in the working directory or one of `search_paths` and decode it
    ///
    /// Each search path is tried with the full name and with its file-name
    /// component only.
    pub fn load(name: &str, search_paths: &[PathBuf]) -> TextureResult<Self> {
        let candidates = candidate_paths(name, search_paths);
        match candidates.iter().find(|p| p.is_file()) {
            Some(path) => {
                log::debug!("Loading texture '{}' from {}", name, path.display());
                Self::open(path)
            }
            None => Err(TextureError::NotFound {
                name: name.to_string(),
                searched: candidates.len(),
            }),
        }
    }

    /// Get the image width in pixels
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Get the image height in pixels
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Get one pixel
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    /// Check whether any pixel is not fully opaque
    pub fn has_transparency(&self) -> bool {
        self.pixels.pixels().any(|p| p.0[3] < 255)
    }

    /// Resample to a new size
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width() && height == self.height() {
            return self.clone();
        }
        Self {
            pixels: imageops::resize(&self.pixels, width.max(1), height.max(1), FilterType::Triangle),
        }
    }

    /// Rotate 90 degrees clockwise
    pub fn rotated90(&self) -> Self {
        Self {
            pixels: imageops::rotate90(&self.pixels),
        }
    }

    /// Mirror top to bottom
    pub fn flipped_vertical(&self) -> Self {
        Self {
            pixels: imageops::flip_vertical(&self.pixels),
        }
    }

    /// Copy a `width` x `height` region of `source` starting at (`src_x`, `src_y`)
    /// to (`dst_x`, `dst_y`)
    ///
    /// Both regions must lie inside their images.
    pub fn blit(
        &mut self,
        source: &TextureImage,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
        dst_x: u32,
        dst_y: u32,
    ) {
        let region = imageops::crop_imm(&source.pixels, src_x, src_y, width, height).to_image();
        imageops::replace(&mut self.pixels, &region, i64::from(dst_x), i64::from(dst_y));
    }

    /// Save with the format inferred from the file extension
    ///
    /// `.png` saves PNG, `.jpg`/`.jpeg` save JPEG. Anything else falls back to
    /// JPEG with a warning.
    pub fn save(&self, path: &Path) -> TextureResult<()> {
        let format = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("png") => ImageFormat::Png,
            Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
            _ => {
                log::warn!(
                    "Unknown image extension for {}, saving as JPEG",
                    path.display()
                );
                ImageFormat::Jpeg
            }
        };

        let result = match format {
            // JPEG has no alpha channel
            ImageFormat::Jpeg => DynamicImage::ImageRgba8(self.pixels.clone())
                .to_rgb8()
                .save_with_format(path, format),
            _ => self.pixels.save_with_format(path, format),
        };
        result.map_err(|source| TextureError::Save {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn candidate_paths(name: &str, search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let direct = PathBuf::from(name);
    let file_name = direct.file_name().map(PathBuf::from);
    let mut candidates = vec![direct.clone()];
    for dir in search_paths {
        candidates.push(dir.join(&direct));
        if let Some(file_name) = &file_name {
            if file_name != &direct {
                candidates.push(dir.join(file_name));
            }
        }
    }
    candidates
}

/// A texture referenced by the model's materials
#[derive(Debug, Clone)]
pub struct Texture {
    /// File name, also the key in the model's texture dictionary
    pub filename: String,
    /// Decoded pixels, if loaded
    pub image: Option<TextureImage>,
    /// Smallest texture coordinate used by any face
    pub used_min: Vec2,
    /// Largest texture coordinate used by any face
    pub used_max: Vec2,
    /// Total 3D area of the faces using this texture
    pub used_face_area: f32,
    /// Total texture-space area of the faces using this texture
    pub used_tex_area: f32,
    /// Output id, assigned by [`crate::Model::prepare_for_saving`]
    pub id: u32,
}

impl Texture {
    /// Create an unloaded texture
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            image: None,
            used_min: Vec2::splat(f32::INFINITY),
            used_max: Vec2::splat(f32::NEG_INFINITY),
            used_face_area: 0.0,
            used_tex_area: 0.0,
            id: 0,
        }
    }

    /// Create a texture with an already decoded image
    pub fn with_image(filename: impl Into<String>, image: TextureImage) -> Self {
        Self {
            image: Some(image),
            ..Self::new(filename)
        }
    }

    /// Check whether the image is decoded
    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    /// Decode the image unless it is already loaded
    pub fn load(&mut self, search_paths: &[PathBuf]) -> TextureResult<&TextureImage> {
        let image = match self.image.take() {
            Some(image) => image,
            None => TextureImage::load(&self.filename, search_paths)?,
        };
        Ok(&*self.image.insert(image))
    }

    /// Check whether the decoded image has transparent pixels
    pub fn has_transparency(&self) -> bool {
        self.image.as_ref().is_some_and(TextureImage::has_transparency)
    }

    /// Clear used-area bookkeeping
    pub fn reset_used_area(&mut self) {
        self.used_min = Vec2::splat(f32::INFINITY);
        self.used_max = Vec2::splat(f32::NEG_INFINITY);
        self.used_face_area = 0.0;
        self.used_tex_area = 0.0;
    }

    /// Record one face worth of usage
    pub fn add_used_face(&mut self, tex: [Vec2; 3], face_area: f32, tex_area: f32) {
        for t in tex {
            self.used_min = self.used_min.min(t);
            self.used_max = self.used_max.max(t);
        }
        self.used_face_area += face_area;
        self.used_tex_area += tex_area;
    }

    /// Size of the used texture-coordinate rectangle (zero if unused)
    pub fn used_size(&self) -> Vec2 {
        (self.used_max - self.used_min).max(Vec2::ZERO)
    }
}
