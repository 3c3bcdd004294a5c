//! Math utilities
//!
//! Re-exports from glam and the small geometric helpers the converter
//! needs: bounding boxes, matrix comparisons and triangle areas.

use std::cmp::Ordering;

pub use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Tolerance used when deciding whether a matrix is the identity
pub const IDENTITY_EPSILON: f32 = 1e-6;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create an empty AABB
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create an AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create the smallest AABB containing all points
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut aabb = Self::EMPTY;
        for point in points {
            aabb.expand_to_include(point);
        }
        aabb
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the full size of the AABB
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Get the volume of the AABB (0 for empty boxes)
    pub fn volume(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        (size.x * size.y * size.z).abs()
    }

    /// Check if the AABB is empty
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand the AABB to include a point
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Merge with another AABB
    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Transform the AABB by a matrix
    pub fn transform(&self, matrix: Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];

        let mut result = Aabb::EMPTY;
        for corner in corners {
            let transformed = matrix.transform_point3(corner);
            result.expand_to_include(transformed);
        }
        result
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Check whether a matrix is the identity (within [`IDENTITY_EPSILON`])
pub fn is_identity(matrix: &Mat4) -> bool {
    matrix.abs_diff_eq(Mat4::IDENTITY, IDENTITY_EPSILON)
}

/// Check whether two matrices are equal element-wise within `epsilon`
pub fn matrices_equal(a: &Mat4, b: &Mat4, epsilon: f32) -> bool {
    a.abs_diff_eq(*b, epsilon)
}

/// Inverse transpose of the linear part of `matrix`, for transforming normals
pub fn normal_matrix(matrix: &Mat4) -> Mat3 {
    Mat3::from_mat4(*matrix).inverse().transpose()
}

/// Area of a triangle in 3D space (Heron's formula)
pub fn triangle_area(v0: Vec3, v1: Vec3, v2: Vec3) -> f32 {
    heron(v0.distance(v1), v1.distance(v2), v2.distance(v0))
}

/// Area of a triangle in texture space (Heron's formula)
pub fn uv_triangle_area(t0: Vec2, t1: Vec2, t2: Vec2) -> f32 {
    heron(t0.distance(t1), t1.distance(t2), t2.distance(t0))
}

fn heron(a: f32, b: f32, c: f32) -> f32 {
    let p = 0.5 * (a + b + c);
    // Rounding can push the product slightly below zero for degenerate triangles
    (p * (p - a) * (p - b) * (p - c)).max(0.0).sqrt()
}

/// Face normal from the cross product of two edges (zero for degenerate faces)
pub fn face_normal(v0: Vec3, v1: Vec3, v2: Vec3) -> Vec3 {
    (v1 - v0).cross(v2 - v0).normalize_or_zero()
}

/// Bit pattern of a position, usable as an exact-equality hash key
pub fn position_key(p: Vec3) -> [u32; 3] {
    // -0.0 and 0.0 compare equal, so they must hash equal too
    let canonical = |f: f32| if f == 0.0 { 0u32 } else { f.to_bits() };
    [canonical(p.x), canonical(p.y), canonical(p.z)]
}

/// Total ordering over vectors, X before Y before Z
///
/// Signed zeroes compare equal so that equal positions stay adjacent when sorted.
pub fn cmp_vec3(a: Vec3, b: Vec3) -> Ordering {
    cmp_f32(a.x, b.x)
        .then_with(|| cmp_f32(a.y, b.y))
        .then_with(|| cmp_f32(a.z, b.z))
}

/// Total ordering over 2D vectors, X before Y
pub fn cmp_vec2(a: Vec2, b: Vec2) -> Ordering {
    cmp_f32(a.x, b.x).then_with(|| cmp_f32(a.y, b.y))
}

fn cmp_f32(a: f32, b: f32) -> Ordering {
    let canonical = |f: f32| if f == 0.0 { 0.0 } else { f };
    canonical(a).total_cmp(&canonical(b))
}
