//! Animation frames
//!
//! A frame is one pose of a LOD: an ordered list of nodes, each placing a mesh
//! with a transform.

use crate::math::{matrices_equal, Mat4};
use crate::MeshId;

/// One placed mesh within a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    /// Mesh in the owning LOD
    pub mesh: MeshId,
    /// Mesh-to-model transform
    pub matrix: Mat4,
}

impl Node {
    pub fn new(mesh: MeshId, matrix: Mat4) -> Self {
        Self { mesh, matrix }
    }
}

/// One pose of a LOD
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub nodes: Vec<Node>,
}

impl Frame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame from nodes
    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append a node
    pub fn add_node(&mut self, mesh: MeshId, matrix: Mat4) {
        self.nodes.push(Node::new(mesh, matrix));
    }

    /// Indices of the nodes placing `mesh`
    pub fn nodes_for_mesh(&self, mesh: MeshId) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.mesh == mesh)
            .map(|(i, _)| i)
    }

    /// Number of nodes placing `mesh`
    pub fn mesh_node_count(&self, mesh: MeshId) -> usize {
        self.nodes_for_mesh(mesh).count()
    }

    /// Check whether any node matrix contains NaN
    pub fn has_nan(&self) -> bool {
        self.nodes.iter().any(|n| n.matrix.is_nan())
    }

    /// Check whether two frames place the same meshes with matrices equal within `epsilon`
    pub fn matches(&self, other: &Frame, epsilon: f32) -> bool {
        self.nodes.len() == other.nodes.len()
            && self
                .nodes
                .iter()
                .zip(&other.nodes)
                .all(|(a, b)| a.mesh == b.mesh && matrices_equal(&a.matrix, &b.matrix, epsilon))
    }

    /// Re-point nodes through a mesh remap table, dropping nodes of removed meshes
    pub fn remap_meshes(&mut self, remap: &[Option<MeshId>]) {
        self.nodes.retain_mut(|node| match remap.get(node.mesh).copied().flatten() {
            Some(new) => {
                node.mesh = new;
                true
            }
            None => false,
        });
    }
}
