//! The model container
//!
//! A [`Model`] owns the LODs, the material array and the texture dictionary.
//! It is populated once by an importer, mutated in place by the processors and
//! frozen by [`Model::prepare_for_saving`], which also builds the flattened
//! vertex and index arrays handed to the writer.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::lod::Lod;
use crate::material::{Material, MaterialId};
use crate::math::{Aabb, Vec3};
use crate::texture::{Texture, TextureId};
use crate::validate::{ValidationError, ValidationResult};

/// Floats per vertex in the flattened vertex array (position, normal, texcoord)
pub const FLOATS_PER_VERTEX: usize = 8;

/// Flattened index array, 16 bit when every index fits
#[derive(Debug, Clone, PartialEq)]
pub enum IndexArray {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexArray {
    /// Number of indices
    pub fn len(&self) -> usize {
        match self {
            IndexArray::U16(v) => v.len(),
            IndexArray::U32(v) => v.len(),
        }
    }

    /// Check whether there are no indices
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get an index widened to u32
    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            IndexArray::U16(v) => v.get(i).map(|&x| u32::from(x)),
            IndexArray::U32(v) => v.get(i).copied(),
        }
    }
}

impl Default for IndexArray {
    fn default() -> Self {
        IndexArray::U16(Vec::new())
    }
}

/// Where one mesh's data lives in the flattened arrays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshRange {
    /// First vertex (in vertices, not floats)
    pub vertex_offset: usize,
    pub vertex_count: usize,
    pub index_offset: usize,
    pub index_count: usize,
}

/// Flattened geometry of all LODs, built by [`Model::prepare_for_saving`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelArrays {
    /// Interleaved position, normal and texcoord, [`FLOATS_PER_VERTEX`] per vertex
    pub vertices: Vec<f32>,
    /// Triangle indices into `vertices`, already offset by each mesh's first vertex
    pub indices: IndexArray,
    /// Ranges per LOD, per mesh
    pub ranges: Vec<Vec<MeshRange>>,
}

/// Top-level model container
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub name: String,
    pub comment: String,
    pub author: String,
    pub lods: Vec<Lod>,
    pub materials: Vec<Material>,
    /// Textures keyed by file name, in insertion order
    pub textures: IndexMap<String, Texture>,
    /// Bounding box of the base LOD in the base frame
    pub bounds: Aabb,
    /// Bounding sphere radius around the origin
    pub radius: f32,
    /// Flattened arrays, present after [`Model::prepare_for_saving`]
    pub arrays: Option<ModelArrays>,
}

impl Model {
    /// Create a model with one empty base LOD
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lods: vec![Lod::new()],
            ..Default::default()
        }
    }

    /// Number of LODs
    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    /// Get a LOD by index
    pub fn lod(&self, index: usize) -> Option<&Lod> {
        self.lods.get(index)
    }

    /// Get a mutable LOD by index
    pub fn lod_mut(&mut self, index: usize) -> Option<&mut Lod> {
        self.lods.get_mut(index)
    }

    /// Get the base LOD
    pub fn base_lod(&self) -> Option<&Lod> {
        self.lods.first()
    }

    /// Get the base LOD mutably
    pub fn base_lod_mut(&mut self) -> Option<&mut Lod> {
        self.lods.first_mut()
    }

    /// Append a material and return its id
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        self.materials.len() - 1
    }

    /// Look up a texture by file name, inserting a fresh one if unknown
    ///
    /// Returns `None` for an empty name.
    pub fn get_texture(&mut self, filename: &str) -> Option<TextureId> {
        if filename.is_empty() {
            return None;
        }
        let entry = self.textures.entry(filename.to_string());
        let id = entry.index();
        entry.or_insert_with(|| Texture::new(filename));
        Some(id)
    }

    /// Add a texture, replacing any texture with the same file name
    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.textures.insert_full(texture.filename.clone(), texture).0
    }

    /// Get a texture by id
    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get_index(id).map(|(_, t)| t)
    }

    /// Get a mutable texture by id
    pub fn texture_mut(&mut self, id: TextureId) -> Option<&mut Texture> {
        self.textures.get_index_mut(id).map(|(_, t)| t)
    }

    /// Decode every texture that is not loaded yet
    ///
    /// Failures are logged and the texture stays unloaded. Returns whether all
    /// textures are loaded.
    pub fn load_textures(&mut self, search_paths: &[PathBuf]) -> bool {
        let mut all_loaded = true;
        for texture in self.textures.values_mut() {
            if let Err(err) = texture.load(search_paths) {
                log::warn!("Could not load texture: {}", err);
                all_loaded = false;
            }
        }
        all_loaded
    }

    /// Lower-case every texture file name
    ///
    /// Textures whose names collide after lower-casing are merged into the
    /// first one and materials are re-pointed accordingly.
    pub fn lowercase_texture_names(&mut self) {
        let old = std::mem::take(&mut self.textures);
        let mut remap = Vec::with_capacity(old.len());
        for (name, mut texture) in old {
            let lower = name.to_lowercase();
            match self.textures.get_index_of(&lower) {
                Some(existing) => remap.push(existing),
                None => {
                    texture.filename = lower.clone();
                    remap.push(self.textures.insert_full(lower, texture).0);
                }
            }
        }
        for material in &mut self.materials {
            material.texture = material.texture.and_then(|t| remap.get(t).copied());
        }
    }

    /// Delete every material for which `remove` is true
    ///
    /// Meshes in every LOD are re-pointed; meshes using a removed material lose
    /// their material. Returns the old id → new id table.
    pub fn remove_materials(&mut self, remove: &[bool]) -> Vec<Option<MaterialId>> {
        let remap = compact_remap(self.materials.len(), remove);
        let mut index = 0;
        self.materials.retain(|_| {
            let keep = remap[index].is_some();
            index += 1;
            keep
        });
        for lod in &mut self.lods {
            lod.remap_materials(&remap);
        }
        remap
    }

    /// Delete every texture for which `remove` is true
    ///
    /// Materials using a removed texture lose their texture. Returns the old
    /// id → new id table.
    pub fn remove_textures(&mut self, remove: &[bool]) -> Vec<Option<TextureId>> {
        let remap = compact_remap(self.textures.len(), remove);
        let mut index = 0;
        self.textures.retain(|_, _| {
            let keep = remap[index].is_some();
            index += 1;
            keep
        });
        for material in &mut self.materials {
            material.texture = material.texture.and_then(|t| remap.get(t).copied().flatten());
        }
        remap
    }

    /// Put every face of every LOD into every smoothing group
    pub fn smooth_all_faces(&mut self) {
        for mesh in self.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            mesh.smooth_all_faces();
        }
    }

    /// Finalize meshes after import
    pub fn loading_completed(&mut self) {
        for mesh in self.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            mesh.loading_completed();
        }
    }

    /// Recompute face normals of every mesh
    pub fn calculate_face_normals(&mut self) {
        for mesh in self.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            mesh.calculate_face_normals();
        }
    }

    /// Recompute smoothing-group vertex normals of every mesh
    pub fn calculate_vertex_normals(&mut self) {
        for mesh in self.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            mesh.calculate_vertex_normals();
        }
    }

    /// Make the model have exactly `count` LODs, each a clone of the base LOD
    ///
    /// Render distances are 0, 10, 25, 45, 70, ...
    pub fn create_lods(&mut self, count: usize) {
        let Some(base) = self.lods.first().cloned() else {
            return;
        };
        let count = count.max(1);
        self.lods.truncate(1);
        while self.lods.len() < count {
            self.lods.push(base.clone());
        }

        let mut distance = 0.0;
        for (i, lod) in self.lods.iter_mut().enumerate() {
            if i > 0 {
                distance += 10.0 * (0.5 + 0.5 * i as f32);
            }
            lod.distance = distance;
        }
    }

    /// Freeze the model for writing
    ///
    /// Removes meshes without faces, updates bounding boxes, assigns material
    /// and texture ids, computes the bounding radius from the base frame and
    /// builds the flattened arrays.
    pub fn prepare_for_saving(&mut self, base_frame: usize) -> ValidationResult<()> {
        let frame_count = self.base_lod().map_or(0, Lod::frame_count);
        if base_frame >= frame_count {
            return Err(ValidationError::BaseFrameOutOfRange {
                frame: base_frame,
                count: frame_count,
            });
        }

        self.remove_empty_meshes();
        self.update_bounding_box(base_frame);
        self.update_ids();
        self.update_radius(base_frame);
        self.create_arrays();
        Ok(())
    }

    fn remove_empty_meshes(&mut self) {
        for (i, lod) in self.lods.iter_mut().enumerate() {
            let remove: Vec<bool> = lod.meshes.iter().map(|m| m.face_count() == 0).collect();
            let removed = remove.iter().filter(|&&r| r).count();
            if removed > 0 {
                log::debug!("Removing {} empty meshes from LOD {}", removed, i);
                lod.remove_meshes(&remove);
            }
        }
    }

    fn update_bounding_box(&mut self, base_frame: usize) {
        for mesh in self.lods.iter_mut().flat_map(|l| l.meshes.iter_mut()) {
            mesh.update_bounding_box();
        }

        let mut bounds = Aabb::EMPTY;
        if let Some(lod) = self.lods.first() {
            if let Some(frame) = lod.frames.get(base_frame) {
                for node in &frame.nodes {
                    if let Some(mesh) = lod.meshes.get(node.mesh) {
                        bounds = bounds.merge(&mesh.bounds.transform(node.matrix));
                    }
                }
            }
        }
        self.bounds = bounds;
    }

    fn update_ids(&mut self) {
        for (i, texture) in self.textures.values_mut().enumerate() {
            texture.id = i as u32;
        }
        for (i, material) in self.materials.iter_mut().enumerate() {
            material.id = i as u32;
        }
    }

    fn update_radius(&mut self, base_frame: usize) {
        let mut max_sq = 0.0f32;
        if let Some(lod) = self.lods.first() {
            if let Some(frame) = lod.frames.get(base_frame) {
                for node in &frame.nodes {
                    let Some(mesh) = lod.meshes.get(node.mesh) else {
                        continue;
                    };
                    for vertex in mesh.vertices() {
                        let p: Vec3 = node.matrix.transform_point3(vertex.pos);
                        max_sq = max_sq.max(p.length_squared());
                    }
                }
            }
        }
        self.radius = max_sq.sqrt();
    }

    fn create_arrays(&mut self) {
        let vertex_total: usize = self.lods.iter().map(Lod::vertex_count).sum();
        let index_total: usize = self.lods.iter().map(|l| l.face_count() * 3).sum();

        let mut vertices = Vec::with_capacity(vertex_total * FLOATS_PER_VERTEX);
        let mut indices: Vec<u32> = Vec::with_capacity(index_total);
        let mut ranges = Vec::with_capacity(self.lods.len());

        for lod in &self.lods {
            let mut lod_ranges = Vec::with_capacity(lod.meshes.len());
            for mesh in &lod.meshes {
                let vertex_offset = vertices.len() / FLOATS_PER_VERTEX;
                let index_offset = indices.len();
                for v in mesh.vertices() {
                    vertices.extend_from_slice(&v.pos.to_array());
                    vertices.extend_from_slice(&v.normal.to_array());
                    vertices.extend_from_slice(&v.tex.to_array());
                }
                for face in mesh.faces() {
                    indices.extend(face.vertices.iter().map(|&v| (vertex_offset + v) as u32));
                }
                lod_ranges.push(MeshRange {
                    vertex_offset,
                    vertex_count: mesh.vertex_count(),
                    index_offset,
                    index_count: mesh.face_count() * 3,
                });
            }
            ranges.push(lod_ranges);
        }

        let max_index = vertex_total.saturating_sub(1);
        let indices = if max_index <= usize::from(u16::MAX) {
            IndexArray::U16(indices.into_iter().map(|i| i as u16).collect())
        } else {
            IndexArray::U32(indices)
        };
        log::debug!(
            "Created arrays: {} vertices, {} indices",
            vertex_total,
            indices.len()
        );

        self.arrays = Some(ModelArrays {
            vertices,
            indices,
            ranges,
        });
    }
}

fn compact_remap(len: usize, remove: &[bool]) -> Vec<Option<usize>> {
    let mut next = 0;
    (0..len)
        .map(|i| {
            if remove.get(i).copied().unwrap_or(false) {
                None
            } else {
                next += 1;
                Some(next - 1)
            }
        })
        .collect()
}
