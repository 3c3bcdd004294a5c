//! Texture atlas creation
//!
//! Combines every texture of the model into one square atlas. Each texture
//! gets a rectangle sized by how much of it the base frame uses and how
//! densely, the used part of the texture is resampled (and tiled, for
//! repeating texture coordinates) into that rectangle and all texture
//! coordinates are remapped into atlas space.

use std::path::PathBuf;

use kiln_core::math::{is_identity, triangle_area, uv_triangle_area, Vec2};
use kiln_core::{AtlasPacking, Mesh, Model, Texture, TextureId, TextureImage};

use crate::packing::{RectPacker, ShelfPacker};
use crate::processor::{base_lod, check_base_frame, ProcessContext, Processor};
use crate::{ProcessError, ProcessResult};

/// Color of atlas pixels no texture is copied to
const ATLAS_BACKGROUND: [u8; 4] = [128, 128, 128, 255];

/// Upper bound for one resampled texture repeat
const MAX_REPEAT_SIZE: u32 = 8192;

/// How one texture is used by the base frame
#[derive(Debug, Clone, Copy)]
struct Usage {
    texture: TextureId,
    /// Lower corner of the used texture-coordinate rectangle
    min: Vec2,
    /// Size of the used rectangle, never zero
    size: Vec2,
    score: f32,
}

/// Atlas pixel rectangle, origin at the top left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    rotated: bool,
}

/// Where a texture's used area ends up in atlas texture coordinates
#[derive(Debug, Clone, Copy)]
struct AtlasRect {
    used_min: Vec2,
    used_size: Vec2,
    min: Vec2,
    size: Vec2,
    rotated: bool,
}

impl AtlasRect {
    fn new(usage: &Usage, cell: &Cell, atlas_size: u32) -> Self {
        let s = atlas_size as f32;
        Self {
            used_min: usage.min,
            used_size: usage.size,
            // Texture V grows upwards, image rows downwards
            min: Vec2::new(cell.x as f32 / s, (s - (cell.y + cell.height) as f32) / s),
            size: Vec2::new(cell.width as f32 / s, cell.height as f32 / s),
            rotated: cell.rotated,
        }
    }

    fn map(&self, tex: Vec2) -> Vec2 {
        let local = tex - self.used_min;
        if self.rotated {
            Vec2::new(
                local.y * (self.size.x / self.used_size.y),
                local.x * (self.size.y / self.used_size.x),
            ) + self.min
        } else {
            local * (self.size / self.used_size) + self.min
        }
    }
}

/// Packs all textures into one atlas image
pub struct TextureOptimizer {
    size: u32,
    texture_name: String,
    output_dir: PathBuf,
    packing: AtlasPacking,
    search_paths: Vec<PathBuf>,
    packer: Box<dyn RectPacker>,
}

impl TextureOptimizer {
    /// Create an optimizer writing a `size` x `size` atlas to `output_dir/texture_name`
    pub fn new(
        size: u32,
        texture_name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        packing: AtlasPacking,
    ) -> Self {
        Self {
            size,
            texture_name: texture_name.into(),
            output_dir: output_dir.into(),
            packing,
            search_paths: Vec::new(),
            packer: Box::new(ShelfPacker),
        }
    }

    /// Directories searched when decoding source textures
    pub fn with_search_paths(mut self, search_paths: Vec<PathBuf>) -> Self {
        self.search_paths = search_paths;
        self
    }

    /// Replace the rectangle packer used for [`AtlasPacking::BinPack`]
    pub fn with_packer(mut self, packer: Box<dyn RectPacker>) -> Self {
        self.packer = packer;
        self
    }

    /// Shift every connected face component so its smallest texture
    /// coordinate lies in `[0, 1)`
    fn normalize_texcoords(mesh: &mut Mesh) {
        let mut visited = vec![false; mesh.face_count()];
        let mut seen_vertex = vec![false; mesh.vertex_count()];
        let mut stack = Vec::new();
        let mut component = Vec::new();

        for start in 0..mesh.face_count() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            stack.push(start);
            component.clear();
            while let Some(f) = stack.pop() {
                for &v in &mesh.faces()[f].vertices {
                    if seen_vertex[v] {
                        continue;
                    }
                    seen_vertex[v] = true;
                    component.push(v);
                    for &g in &mesh.vertices()[v].faces {
                        if !visited[g] {
                            visited[g] = true;
                            stack.push(g);
                        }
                    }
                }
            }

            let min = component
                .iter()
                .map(|&v| mesh.vertices()[v].tex)
                .fold(Vec2::splat(f32::INFINITY), Vec2::min);
            let shift = -min.floor();
            if shift != Vec2::ZERO && shift.is_finite() {
                let vertices = mesh.vertices_mut();
                for &v in &component {
                    vertices[v].tex += shift;
                }
            }
        }
    }

    /// Record per texture how the base frame's faces use it
    fn accumulate_usage(model: &mut Model, base_frame: usize) {
        for texture in model.textures.values_mut() {
            texture.reset_used_area();
        }
        let Some(lod) = model.lods.first() else {
            return;
        };
        let Some(frame) = lod.frames.get(base_frame) else {
            return;
        };

        for node in &frame.nodes {
            let Some(mesh) = lod.meshes.get(node.mesh) else {
                continue;
            };
            let texture = mesh
                .material
                .and_then(|m| model.materials.get(m))
                .and_then(|m| m.texture)
                .and_then(|t| model.textures.get_index_mut(t).map(|(_, t)| t));
            let Some(texture) = texture else {
                continue;
            };

            let transformed = !is_identity(&node.matrix);
            for face in mesh.faces() {
                let corners = face.vertices.map(|v| &mesh.vertices()[v]);
                let pos = corners.map(|v| {
                    if transformed {
                        node.matrix.transform_point3(v.pos)
                    } else {
                        v.pos
                    }
                });
                let tex = corners.map(|v| v.tex);
                let face_area = triangle_area(pos[0], pos[1], pos[2]);
                let tex_area = uv_triangle_area(tex[0], tex[1], tex[2]);
                if face_area.is_finite() && tex_area.is_finite() {
                    texture.add_used_face(tex, face_area, tex_area);
                }
            }
        }
    }

    /// Used rectangle and score of every texture, best first
    fn usages(model: &Model) -> Vec<Usage> {
        let total_tex: f32 = model.textures.values().map(|t| t.used_tex_area).sum();
        let mut usages: Vec<Usage> = model
            .textures
            .values()
            .enumerate()
            .map(|(id, texture)| {
                let (min, size) = used_rect(texture);
                let density = texture.used_tex_area / texture.used_face_area;
                let score = (1.0 + texture.used_tex_area / total_tex).sqrt()
                    * density
                    * (0.8 + 0.2 * (size.x * size.y).sqrt());
                Usage {
                    texture: id,
                    min,
                    size,
                    score: if score.is_finite() { score } else { 0.0 },
                }
            })
            .collect();

        if usages.iter().all(|u| u.score <= 0.0) {
            for usage in &mut usages {
                usage.score = 1.0;
            }
        }
        usages.sort_by(|a, b| b.score.total_cmp(&a.score));
        usages
    }

    /// Uniform grid of `floor(sqrt n)` columns
    fn grid_layout(&self, count: usize) -> Vec<Cell> {
        let columns = ((count as f64).sqrt().floor() as usize).max(1);
        let rows = count.div_ceil(columns);
        let width = (self.size / columns as u32).max(1);
        let height = (self.size / rows as u32).max(1);
        (0..count)
            .map(|i| Cell {
                x: (i % columns) as u32 * width,
                y: (i / columns) as u32 * height,
                width,
                height,
                rotated: false,
            })
            .collect()
    }

    /// Boxes sized by score, packed and stretched to fill the atlas height
    fn binpack_layout(&self, model: &Model, usages: &[Usage]) -> ProcessResult<Vec<Cell>> {
        let s = self.size as f32;
        let total_score: f32 = usages.iter().map(|u| u.score).sum();

        let mut boxes = Vec::with_capacity(usages.len());
        for usage in usages {
            let image = model
                .texture(usage.texture)
                .and_then(|t| t.image.as_ref())
                .ok_or_else(|| ProcessError::Packing("texture not loaded".into()))?;
            let wanted = usage.score / total_score * s * s;
            let ratio = (usage.size.x * image.width() as f32) / (usage.size.y * image.height() as f32);
            let scale = (wanted / ratio).sqrt();
            boxes.push(((scale * ratio).clamp(1.0, s), scale.clamp(1.0, s)));
        }

        let placed = self.packer.pack(&boxes, s).ok_or_else(|| {
            ProcessError::Packing(format!("{} textures do not fit a {} px atlas", boxes.len(), self.size))
        })?;
        let used_height = placed
            .iter()
            .map(|r| r.y + r.height)
            .fold(0.0f32, f32::max);
        if !(used_height > 0.0) {
            return Err(ProcessError::Packing("packer returned an empty layout".into()));
        }
        let y_scale = s / used_height;

        Ok(placed
            .iter()
            .map(|r| {
                let (x, width) = pixel_span(r.x, r.width, self.size);
                let (y, height) = pixel_span(r.y * y_scale, r.height * y_scale, self.size);
                Cell {
                    x,
                    y,
                    width,
                    height,
                    rotated: r.rotated,
                }
            })
            .collect())
    }

    /// Normalize texture coordinates, load the textures and assign each one
    /// its atlas cell
    fn layout(&self, model: &mut Model, base_frame: usize) -> ProcessResult<Vec<(Usage, Cell)>> {
        for mesh in model.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            Self::normalize_texcoords(mesh);
        }
        Self::accumulate_usage(model, base_frame);
        let usages = Self::usages(model);

        for texture in model.textures.values_mut() {
            texture.load(&self.search_paths)?;
        }

        let cells = match self.packing {
            AtlasPacking::Grid => self.grid_layout(usages.len()),
            AtlasPacking::BinPack => self.binpack_layout(model, &usages)?,
        };
        Ok(usages.into_iter().zip(cells).collect())
    }

    /// Resample the used area of `source` into `cell`, tiling repeats
    fn copy_to_atlas(atlas: &mut TextureImage, source: &TextureImage, usage: &Usage, cell: &Cell) {
        // One repeat of the texture at atlas resolution, oriented like the cell.
        // `a` runs along the cell's X axis, `b` along its inverted Y axis.
        let repeat = |extent: u32, used: f32| {
            ((extent as f32 / used).round() as u32).clamp(1, MAX_REPEAT_SIZE)
        };
        let (repeat_image, a_min, b_max) = if cell.rotated {
            let w = repeat(cell.width, usage.size.y);
            let h = repeat(cell.height, usage.size.x);
            (
                source.resized(h, w).rotated90().flipped_vertical(),
                usage.min.y,
                usage.min.x + usage.size.x,
            )
        } else {
            let w = repeat(cell.width, usage.size.x);
            let h = repeat(cell.height, usage.size.y);
            (source.resized(w, h), usage.min.x, usage.min.y + usage.size.y)
        };

        let (rw, rh) = (repeat_image.width(), repeat_image.height());
        let start_x = ((a_min * rw as f32).floor() as i64).rem_euclid(i64::from(rw)) as u32;
        let start_y = (((1.0 - b_max) * rh as f32).floor() as i64).rem_euclid(i64::from(rh)) as u32;

        let mut y = 0;
        while y < cell.height {
            let sy = (start_y + y) % rh;
            let h = (rh - sy).min(cell.height - y);
            let mut x = 0;
            while x < cell.width {
                let sx = (start_x + x) % rw;
                let w = (rw - sx).min(cell.width - x);
                atlas.blit(&repeat_image, sx, sy, w, h, cell.x + x, cell.y + y);
                x += w;
            }
            y += h;
        }
    }
}

/// Used texture-coordinate rectangle, widened to one unit along empty axes
fn used_rect(texture: &Texture) -> (Vec2, Vec2) {
    if !(texture.used_min.is_finite() && texture.used_max.is_finite()) {
        return (Vec2::ZERO, Vec2::ONE);
    }
    let mut min = texture.used_min;
    let mut size = texture.used_size();
    if size.x <= 0.0 {
        min.x = min.x.floor();
        size.x = 1.0;
    }
    if size.y <= 0.0 {
        min.y = min.y.floor();
        size.y = 1.0;
    }
    (min, size)
}

/// Whole-pixel span covering `[start, start + len)` inside `0..size`
fn pixel_span(start: f32, len: f32, size: u32) -> (u32, u32) {
    let begin = (start.floor() as u32).min(size - 1);
    let end = ((start + len).floor() as u32).clamp(begin + 1, size);
    (begin, end - begin)
}

impl Processor for TextureOptimizer {
    fn name(&self) -> &str {
        "TextureOptimizer"
    }

    fn init(&mut self, model: &Model, ctx: &ProcessContext) -> ProcessResult<()> {
        if self.size == 0 {
            return Err(ProcessError::Config("atlas size must be positive".into()));
        }
        if self.texture_name.is_empty() {
            return Err(ProcessError::Config("atlas texture name is empty".into()));
        }
        base_lod(model)?;
        check_base_frame(model, ctx)
    }

    fn process(&mut self, model: &mut Model, ctx: &ProcessContext) -> ProcessResult<()> {
        if model.textures.len() <= 1 {
            log::debug!("{} texture(s), nothing to combine", model.textures.len());
            return Ok(());
        }

        let layout = self.layout(model, ctx.base_frame)?;
        let mut atlas = TextureImage::filled(self.size, self.size, ATLAS_BACKGROUND);
        let mut rects: Vec<Option<AtlasRect>> = vec![None; model.textures.len()];
        for (usage, cell) in &layout {
            if let Some(image) = model.texture(usage.texture).and_then(|t| t.image.as_ref()) {
                Self::copy_to_atlas(&mut atlas, image, usage, cell);
            }
            rects[usage.texture] = Some(AtlasRect::new(usage, cell, self.size));
            log::debug!(
                "Texture {} -> {}x{} at ({}, {}){}",
                usage.texture,
                cell.width,
                cell.height,
                cell.x,
                cell.y,
                if cell.rotated { " rotated" } else { "" }
            );
        }

        let materials = &model.materials;
        for mesh in model.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            let rect = mesh
                .material
                .and_then(|m| materials.get(m))
                .and_then(|m| m.texture)
                .and_then(|t| rects.get(t).copied().flatten());
            if let Some(rect) = rect {
                for vertex in mesh.vertices_mut() {
                    vertex.tex = rect.map(vertex.tex);
                }
            }
        }

        let path = self.output_dir.join(&self.texture_name);
        atlas.save(&path)?;
        log::info!(
            "Combined {} textures into {} ({}x{})",
            layout.len(),
            path.display(),
            self.size,
            self.size
        );

        model.textures.clear();
        let combined = model.add_texture(Texture::with_image(self.texture_name.clone(), atlas));
        for material in &mut model.materials {
            if material.texture.is_some() {
                material.texture = Some(combined);
            }
        }
        Ok(())
    }
}
