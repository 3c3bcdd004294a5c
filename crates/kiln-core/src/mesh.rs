//! Meshes
//!
//! A mesh owns its vertex and face buffers. Faces reference vertices by index
//! and every vertex keeps a back-reference list of the faces that use it.
//! Buffers are only ever replaced as a whole through [`Mesh::set_geometry`],
//! which rebuilds ids and back-references so they never go stale.

use smallvec::SmallVec;

use crate::math::{face_normal, normal_matrix, Aabb, Mat4, Vec2, Vec3};
use crate::MaterialId;

/// Smoothing-group mask where every group bit is set
pub const ALL_SMOOTHING_GROUPS: u32 = u32::MAX;

/// Index of a vertex within its mesh
pub type VertexId = usize;

/// Index of a face within its mesh
pub type FaceId = usize;

/// A single mesh vertex
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// Position in mesh space
    pub pos: Vec3,
    /// Vertex normal
    pub normal: Vec3,
    /// Texture coordinate
    pub tex: Vec2,
    /// Index of this vertex in the owning mesh's vertex buffer
    pub id: VertexId,
    /// Bitwise AND of the smoothing groups of all faces using this vertex
    pub smoothing_group: u32,
    /// Faces referencing this vertex
    pub faces: SmallVec<[FaceId; 8]>,
}

impl Vertex {
    /// Create a vertex with a position and texture coordinate
    pub fn new(pos: Vec3, tex: Vec2) -> Self {
        Self {
            pos,
            normal: Vec3::ZERO,
            tex,
            id: 0,
            smoothing_group: 0,
            faces: SmallVec::new(),
        }
    }

    /// Create a vertex with an explicit normal
    pub fn with_normal(pos: Vec3, normal: Vec3, tex: Vec2) -> Self {
        Self {
            normal,
            ..Self::new(pos, tex)
        }
    }
}

/// A triangle
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    /// Vertex indices into the owning mesh
    pub vertices: [VertexId; 3],
    /// Face normal
    pub normal: Vec3,
    /// Smoothing-group mask
    pub smoothing_group: u32,
}

impl Face {
    /// Create a face without a smoothing group
    pub fn new(vertices: [VertexId; 3]) -> Self {
        Self {
            vertices,
            normal: Vec3::ZERO,
            smoothing_group: 0,
        }
    }

    /// Create a face with a smoothing-group mask
    pub fn with_smoothing_group(vertices: [VertexId; 3], smoothing_group: u32) -> Self {
        Self {
            smoothing_group,
            ..Self::new(vertices)
        }
    }
}

/// One renderable part of a model
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Mesh name
    pub name: String,
    /// Material used by the mesh
    pub material: Option<MaterialId>,
    /// Whether the mesh is tinted with the owning player's color
    pub is_team_color: bool,
    /// Bounding box in mesh space (see [`Mesh::update_bounding_box`])
    pub bounds: Aabb,
    vertices: Vec<Vertex>,
    faces: Vec<Face>,
}

impl Mesh {
    /// Create an empty mesh
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a mesh from vertex and face buffers
    pub fn with_geometry(name: impl Into<String>, vertices: Vec<Vertex>, faces: Vec<Face>) -> Self {
        let mut mesh = Self::new(name);
        mesh.set_geometry(vertices, faces);
        mesh
    }

    /// Get the vertex buffer
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Get the face buffer
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Get a vertex by index
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id)
    }

    /// Get a face by index
    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Mutable access to vertex attributes
    ///
    /// Topology (ids and face lists) must not be changed through this slice;
    /// use [`Mesh::set_geometry`] for that.
    pub fn vertices_mut(&mut self) -> &mut [Vertex] {
        &mut self.vertices
    }

    /// Mutable access to face attributes (normals and smoothing groups)
    pub fn faces_mut(&mut self) -> &mut [Face] {
        &mut self.faces
    }

    /// Replace both buffers at once
    ///
    /// Vertex ids are reassigned to their new indices and the vertex → face
    /// back-references are rebuilt from `faces`.
    pub fn set_geometry(&mut self, vertices: Vec<Vertex>, faces: Vec<Face>) {
        self.vertices = vertices;
        self.faces = faces;
        self.rebuild_topology();
    }

    /// Take both buffers out of the mesh, leaving it empty
    pub fn take_geometry(&mut self) -> (Vec<Vertex>, Vec<Face>) {
        (
            std::mem::take(&mut self.vertices),
            std::mem::take(&mut self.faces),
        )
    }

    /// Reassign vertex ids and rebuild face back-references
    pub fn rebuild_topology(&mut self) {
        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            vertex.id = i;
            vertex.faces.clear();
        }
        for (face_id, face) in self.faces.iter().enumerate() {
            for &v in &face.vertices {
                if let Some(vertex) = self.vertices.get_mut(v) {
                    if !vertex.faces.contains(&face_id) {
                        vertex.faces.push(face_id);
                    }
                }
            }
        }
    }

    /// Recompute each vertex's smoothing group as the AND of its faces' groups
    pub fn update_vertex_smoothing_groups(&mut self) {
        for vertex in &mut self.vertices {
            vertex.smoothing_group = vertex
                .faces
                .iter()
                .filter_map(|&f| self.faces.get(f))
                .fold(ALL_SMOOTHING_GROUPS, |mask, face| mask & face.smoothing_group);
            if vertex.faces.is_empty() {
                vertex.smoothing_group = 0;
            }
        }
    }

    /// Called by importers once the buffers are final
    pub fn loading_completed(&mut self) {
        self.rebuild_topology();
        self.update_vertex_smoothing_groups();
        self.update_bounding_box();
    }

    /// Put every face into every smoothing group
    pub fn smooth_all_faces(&mut self) {
        for face in &mut self.faces {
            face.smoothing_group = ALL_SMOOTHING_GROUPS;
        }
        self.update_vertex_smoothing_groups();
    }

    /// Recompute face normals from vertex positions
    pub fn calculate_face_normals(&mut self) {
        for face in &mut self.faces {
            let [a, b, c] = face.vertices;
            face.normal = face_normal(
                self.vertices[a].pos,
                self.vertices[b].pos,
                self.vertices[c].pos,
            );
        }
    }

    /// Compute vertex normals by averaging the normals of adjacent faces
    ///
    /// Only faces sharing a smoothing group with the vertex contribute. A
    /// vertex outside every smoothing group takes the normal of its first face.
    pub fn calculate_vertex_normals(&mut self) {
        for vertex in &mut self.vertices {
            let mut sum = Vec3::ZERO;
            for &f in &vertex.faces {
                let face = &self.faces[f];
                if face.smoothing_group & vertex.smoothing_group != 0 {
                    sum += face.normal;
                }
            }
            if sum == Vec3::ZERO {
                sum = vertex
                    .faces
                    .first()
                    .map(|&f| self.faces[f].normal)
                    .unwrap_or(Vec3::Z);
            }
            vertex.normal = sum.normalize_or(Vec3::Z);
        }
    }

    /// Recompute the mesh-space bounding box
    pub fn update_bounding_box(&mut self) {
        self.bounds = Aabb::from_points(self.vertices.iter().map(|v| v.pos));
    }

    /// Bake a transform into vertex positions and normals
    pub fn transform(&mut self, matrix: &Mat4) {
        let normal_matrix = normal_matrix(matrix);
        for vertex in &mut self.vertices {
            vertex.pos = matrix.transform_point3(vertex.pos);
            vertex.normal = (normal_matrix * vertex.normal).normalize_or_zero();
        }
        self.update_bounding_box();
    }

    /// Append another mesh's geometry to this one
    pub fn append(&mut self, other: &Mesh) {
        let offset = self.vertices.len();
        let mut vertices = std::mem::take(&mut self.vertices);
        let mut faces = std::mem::take(&mut self.faces);
        vertices.extend(other.vertices.iter().cloned());
        faces.extend(other.faces.iter().map(|f| Face {
            vertices: f.vertices.map(|v| v + offset),
            ..f.clone()
        }));
        self.set_geometry(vertices, faces);
        self.bounds = self.bounds.merge(&other.bounds);
    }
}

#[cfg(test)]
pub(crate) fn quad(name: &str) -> Mesh {
    let vertices = vec![
        Vertex::new(Vec3::new(0.0, 0.0, 0.0), Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(1.0, 0.0, 0.0), Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(0.0, 1.0, 0.0), Vec2::new(0.0, 1.0)),
    ];
    let faces = vec![Face::new([0, 1, 2]), Face::new([0, 2, 3])];
    let mut mesh = Mesh::with_geometry(name, vertices, faces);
    mesh.loading_completed();
    mesh
}
