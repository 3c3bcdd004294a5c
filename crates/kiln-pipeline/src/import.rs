//! Scene importers
//!
//! [`JsonImporter`] reads a JSON scene description:
//!
//! ```json
//! {
//!   "name": "tower",
//!   "materials": [{ "name": "stone", "diffuse": [0.7, 0.7, 0.7], "texture": "stone.jpg" }],
//!   "meshes": [{
//!     "name": "base", "material": 0,
//!     "positions": [[0, 0, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0]],
//!     "uvs": [[0, 0], [1, 0], [1, 1], [0, 1]],
//!     "faces": [[0, 1, 2, 3]]
//!   }],
//!   "frames": [{ "nodes": [{ "mesh": 0, "children": [] }] }]
//! }
//! ```
//!
//! Polygons are triangulated as fans. Frame nodes form trees whose matrices
//! (16 floats, column major) compose parent to child. A scene without frames
//! gets one frame placing every mesh once.

use std::path::Path;

use kiln_core::math::{Mat4, Vec2, Vec3};
use kiln_core::{Face, Frame, Material, Mesh, Model, Vertex};
use serde::Deserialize;
use thiserror::Error;

use crate::{ProcessError, ProcessResult};

/// Scene import errors
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Malformed scene: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model has no base LOD")]
    NoBaseLod,

    #[error("Model already has geometry")]
    NotEmpty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for importing
pub type ImportResult<T> = Result<T, ImportError>;

/// Populates a model from a source file
pub trait Importer {
    /// Fill the empty base LOD of `model` plus its materials and textures
    fn import(&self, path: &Path, model: &mut Model) -> ProcessResult<()>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SceneFile {
    name: Option<String>,
    comment: String,
    author: String,
    materials: Vec<SceneMaterial>,
    meshes: Vec<SceneMesh>,
    frames: Vec<SceneFrame>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SceneMaterial {
    name: String,
    ambient: [f32; 3],
    diffuse: [f32; 3],
    specular: [f32; 3],
    emissive: [f32; 3],
    shininess: f32,
    texture: Option<String>,
}

impl Default for SceneMaterial {
    fn default() -> Self {
        let defaults = Material::new("");
        Self {
            name: String::new(),
            ambient: defaults.ambient.to_array(),
            diffuse: defaults.diffuse.to_array(),
            specular: defaults.specular.to_array(),
            emissive: defaults.emissive.to_array(),
            shininess: defaults.shininess,
            texture: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SceneMesh {
    name: String,
    material: Option<usize>,
    team_color: bool,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    faces: Vec<Vec<usize>>,
    smoothing_groups: Vec<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SceneFrame {
    nodes: Vec<SceneNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SceneNode {
    mesh: Option<usize>,
    matrix: Option<[f32; 16]>,
    children: Vec<SceneNode>,
}

/// Importer for JSON scene files
#[derive(Debug, Default)]
pub struct JsonImporter;

impl JsonImporter {
    pub fn new() -> Self {
        Self
    }

    /// Import from an in-memory JSON document
    pub fn import_str(&self, source: &str, model: &mut Model) -> ImportResult<()> {
        let scene: SceneFile = serde_json::from_str(source)?;
        let lod = model.base_lod().ok_or(ImportError::NoBaseLod)?;
        if lod.mesh_count() > 0 || lod.frame_count() > 0 {
            return Err(ImportError::NotEmpty);
        }

        if let Some(name) = scene.name {
            model.name = name;
        }
        model.comment = scene.comment;
        model.author = scene.author;

        for source in &scene.materials {
            let mut material = Material::new(source.name.clone());
            material.ambient = Vec3::from_array(source.ambient);
            material.diffuse = Vec3::from_array(source.diffuse);
            material.specular = Vec3::from_array(source.specular);
            material.emissive = Vec3::from_array(source.emissive);
            material.shininess = source.shininess;
            material.texture = source.texture.as_deref().and_then(|t| model.get_texture(t));
            model.add_material(material);
        }

        let material_count = model.materials.len();
        let meshes: Vec<Mesh> = scene
            .meshes
            .iter()
            .map(|source| build_mesh(source, material_count))
            .collect();

        let mesh_count = meshes.len();
        let mut frames: Vec<Frame> = scene
            .frames
            .iter()
            .enumerate()
            .map(|(i, frame)| flatten_frame(i, frame, mesh_count))
            .collect();
        if frames.is_empty() {
            let mut frame = Frame::new();
            for mesh in 0..mesh_count {
                frame.add_node(mesh, Mat4::IDENTITY);
            }
            frames.push(frame);
        }

        if let Some(lod) = model.base_lod_mut() {
            lod.meshes = meshes;
            lod.frames = frames;
            log::debug!("Imported {}", lod.short_stats());
        }
        Ok(())
    }
}

impl Importer for JsonImporter {
    fn import(&self, path: &Path, model: &mut Model) -> ProcessResult<()> {
        let fail = |source: ImportError| ProcessError::Import {
            path: path.to_path_buf(),
            source,
        };
        let source = std::fs::read_to_string(path).map_err(|e| fail(e.into()))?;
        if model.name.is_empty() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                model.name = stem.to_string();
            }
        }
        self.import_str(&source, model).map_err(fail)
    }
}

fn build_mesh(source: &SceneMesh, material_count: usize) -> Mesh {
    let count = source.positions.len();
    let uvs = if source.uvs.len() == count {
        Some(&source.uvs)
    } else {
        if !source.uvs.is_empty() {
            log::warn!(
                "Mesh '{}': {} texture coordinates for {} vertices, ignoring them",
                source.name,
                source.uvs.len(),
                count
            );
        }
        None
    };
    let normals = (source.normals.len() == count).then_some(&source.normals);

    let vertices: Vec<Vertex> = source
        .positions
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let tex = uvs.map_or(Vec2::ZERO, |uvs| Vec2::from_array(uvs[i]));
            let normal = normals.map_or(Vec3::ZERO, |n| Vec3::from_array(n[i]));
            Vertex::with_normal(Vec3::from_array(p), normal, tex)
        })
        .collect();

    if !source.smoothing_groups.is_empty() && source.smoothing_groups.len() != source.faces.len() {
        log::warn!(
            "Mesh '{}': {} smoothing groups for {} polygons",
            source.name,
            source.smoothing_groups.len(),
            source.faces.len()
        );
    }

    let mut faces = Vec::with_capacity(source.faces.len());
    for (p, polygon) in source.faces.iter().enumerate() {
        if polygon.len() < 3 {
            log::warn!(
                "Mesh '{}': polygon {} has {} points, skipped",
                source.name,
                p,
                polygon.len()
            );
            continue;
        }
        if let Some(&bad) = polygon.iter().find(|&&v| v >= count) {
            log::warn!(
                "Mesh '{}': polygon {} references vertex {} of {}, skipped",
                source.name,
                p,
                bad,
                count
            );
            continue;
        }
        let group = source.smoothing_groups.get(p).copied().unwrap_or(0);
        for i in 1..polygon.len() - 1 {
            let corners = [polygon[0], polygon[i], polygon[i + 1]];
            if corners[0] == corners[1] || corners[1] == corners[2] || corners[0] == corners[2] {
                continue;
            }
            faces.push(Face::with_smoothing_group(corners, group));
        }
    }

    let mut mesh = Mesh::with_geometry(source.name.clone(), vertices, faces);
    mesh.is_team_color = source.team_color;
    mesh.material = match source.material {
        Some(m) if m < material_count => Some(m),
        Some(m) => {
            log::warn!(
                "Mesh '{}': material {} out of range ({} materials)",
                source.name,
                m,
                material_count
            );
            None
        }
        None => None,
    };
    mesh.loading_completed();
    mesh
}

/// Flatten one frame's node trees into a node list
fn flatten_frame(index: usize, frame: &SceneFrame, mesh_count: usize) -> Frame {
    let mut flat = Frame::new();
    let mut stack: Vec<(&SceneNode, Mat4)> =
        frame.nodes.iter().rev().map(|n| (n, Mat4::IDENTITY)).collect();

    while let Some((node, parent)) = stack.pop() {
        let local = node.matrix.map_or(Mat4::IDENTITY, |m| Mat4::from_cols_array(&m));
        let world = parent * local;
        match node.mesh {
            Some(mesh) if mesh < mesh_count => flat.add_node(mesh, world),
            Some(mesh) => log::warn!(
                "Frame {}: node references mesh {} of {}, skipped",
                index,
                mesh,
                mesh_count
            ),
            None => {}
        }
        stack.extend(node.children.iter().rev().map(|c| (c, world)));
    }
    flat
}
