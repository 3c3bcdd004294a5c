//! Structural model validation
//!
//! [`Model::validate`] walks every reference reachable from the model and
//! reports the first one that does not resolve.

use thiserror::Error;

use crate::model::Model;

/// A violated structural invariant
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Model has no LODs")]
    NoLods,

    #[error("LOD {lod} mesh {mesh}: material {material} out of range")]
    MaterialOutOfRange {
        lod: usize,
        mesh: usize,
        material: usize,
    },

    #[error("LOD {lod} mesh {mesh} face {face}: vertex {vertex} out of range")]
    VertexOutOfRange {
        lod: usize,
        mesh: usize,
        face: usize,
        vertex: usize,
    },

    #[error("LOD {lod} mesh {mesh}: vertex {vertex} has id {id}")]
    VertexIdMismatch {
        lod: usize,
        mesh: usize,
        vertex: usize,
        id: usize,
    },

    #[error("LOD {lod} mesh {mesh}: vertex {vertex} references face {face} which does not use it")]
    StaleFaceReference {
        lod: usize,
        mesh: usize,
        vertex: usize,
        face: usize,
    },

    #[error("LOD {lod} frame {frame} has no nodes")]
    EmptyFrame { lod: usize, frame: usize },

    #[error("LOD {lod} frame {frame} node {node}: mesh {mesh} out of range")]
    MeshOutOfRange {
        lod: usize,
        frame: usize,
        node: usize,
        mesh: usize,
    },

    #[error("LOD {lod} frame {frame} node {node}: transform contains NaN")]
    NanTransform { lod: usize, frame: usize, node: usize },

    #[error("Material {material}: texture {texture} out of range")]
    TextureOutOfRange { material: usize, texture: usize },

    #[error("Texture stored as '{key}' is named '{filename}'")]
    TextureKeyMismatch { key: String, filename: String },

    #[error("Base frame {frame} out of range ({count} frames)")]
    BaseFrameOutOfRange { frame: usize, count: usize },
}

/// Result type for validation
pub type ValidationResult<T> = Result<T, ValidationError>;

impl Model {
    /// Check every structural invariant of the model
    ///
    /// Validation never mutates the model, so validating twice gives the same
    /// result.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.lods.is_empty() {
            return Err(ValidationError::NoLods);
        }

        for (key, texture) in &self.textures {
            if key != &texture.filename {
                return Err(ValidationError::TextureKeyMismatch {
                    key: key.clone(),
                    filename: texture.filename.clone(),
                });
            }
        }

        for (i, material) in self.materials.iter().enumerate() {
            if let Some(texture) = material.texture {
                if texture >= self.textures.len() {
                    return Err(ValidationError::TextureOutOfRange {
                        material: i,
                        texture,
                    });
                }
            }
        }

        for (l, lod) in self.lods.iter().enumerate() {
            for (m, mesh) in lod.meshes.iter().enumerate() {
                if let Some(material) = mesh.material {
                    if material >= self.materials.len() {
                        return Err(ValidationError::MaterialOutOfRange {
                            lod: l,
                            mesh: m,
                            material,
                        });
                    }
                }

                for (f, face) in mesh.faces().iter().enumerate() {
                    if let Some(&vertex) = face.vertices.iter().find(|&&v| v >= mesh.vertex_count()) {
                        return Err(ValidationError::VertexOutOfRange {
                            lod: l,
                            mesh: m,
                            face: f,
                            vertex,
                        });
                    }
                }

                for (v, vertex) in mesh.vertices().iter().enumerate() {
                    if vertex.id != v {
                        return Err(ValidationError::VertexIdMismatch {
                            lod: l,
                            mesh: m,
                            vertex: v,
                            id: vertex.id,
                        });
                    }
                    for &f in &vertex.faces {
                        let uses_vertex = mesh.face(f).is_some_and(|face| face.vertices.contains(&v));
                        if !uses_vertex {
                            return Err(ValidationError::StaleFaceReference {
                                lod: l,
                                mesh: m,
                                vertex: v,
                                face: f,
                            });
                        }
                    }
                }
            }

            for (f, frame) in lod.frames.iter().enumerate() {
                if frame.nodes.is_empty() {
                    return Err(ValidationError::EmptyFrame { lod: l, frame: f });
                }
                for (n, node) in frame.nodes.iter().enumerate() {
                    if node.mesh >= lod.meshes.len() {
                        return Err(ValidationError::MeshOutOfRange {
                            lod: l,
                            frame: f,
                            node: n,
                            mesh: node.mesh,
                        });
                    }
                    if node.matrix.is_nan() {
                        return Err(ValidationError::NanTransform {
                            lod: l,
                            frame: f,
                            node: n,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::material::Material;
    use crate::math::Mat4;
    use crate::mesh::quad;

    fn valid_model() -> Model {
        let mut model = Model::new("valid");
        let texture = model.get_texture("skin.png");
        let mut material = Material::new("skin");
        material.texture = texture;
        let material = model.add_material(material);

        let lod = model.base_lod_mut().unwrap();
        let mut mesh = quad("body");
        mesh.material = Some(material);
        lod.add_mesh(mesh);
        let mut frame = Frame::new();
        frame.add_node(0, Mat4::IDENTITY);
        lod.frames.push(frame);
        model
    }

    #[test]
    fn test_valid_model_is_idempotent() {
        let model = valid_model();
        assert_eq!(model.validate(), Ok(()));
        assert_eq!(model.validate(), Ok(()));
    }

    #[test]
    fn test_empty_frame() {
        let mut model = valid_model();
        model.lods[0].frames.push(Frame::new());
        assert_eq!(
            model.validate(),
            Err(ValidationError::EmptyFrame { lod: 0, frame: 1 })
        );
    }

    #[test]
    fn test_dangling_references() {
        let mut model = valid_model();
        model.lods[0].meshes[0].material = Some(7);
        assert!(matches!(
            model.validate(),
            Err(ValidationError::MaterialOutOfRange { material: 7, .. })
        ));

        let mut model = valid_model();
        model.materials[0].texture = Some(3);
        assert!(matches!(
            model.validate(),
            Err(ValidationError::TextureOutOfRange { texture: 3, .. })
        ));

        let mut model = valid_model();
        model.lods[0].frames[0].add_node(5, Mat4::IDENTITY);
        assert!(matches!(
            model.validate(),
            Err(ValidationError::MeshOutOfRange { mesh: 5, .. })
        ));
    }

    #[test]
    fn test_vertex_bookkeeping() {
        let mut model = valid_model();
        model.lods[0].meshes[0].vertices_mut()[2].id = 9;
        assert!(matches!(
            model.validate(),
            Err(ValidationError::VertexIdMismatch { vertex: 2, id: 9, .. })
        ));

        let mut model = valid_model();
        model.lods[0].meshes[0].vertices_mut()[1].faces.push(1);
        assert!(matches!(
            model.validate(),
            Err(ValidationError::StaleFaceReference { vertex: 1, face: 1, .. })
        ));
    }

    #[test]
    fn test_nan_transform() {
        let mut model = valid_model();
        model.lods[0].frames[0].nodes[0].matrix = Mat4::from_scale(crate::math::Vec3::NAN);
        assert!(matches!(
            model.validate(),
            Err(ValidationError::NanTransform { node: 0, .. })
        ));
    }
}
