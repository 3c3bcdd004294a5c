//! Mesh decimation
//!
//! The pipeline talks to decimation through [`DecimationEngine`]. The bundled
//! [`QuadricDecimator`] performs half-edge collapses ordered by quadric error:
//! a vertex is merged into one of its neighbours, so the surviving vertices
//! are a subset of the input and keep their own normals and texture
//! coordinates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use glam::{DMat4, DVec4};
use kiln_core::math::{face_normal, Vec2, Vec3};
use smallvec::SmallVec;

use crate::{ProcessError, ProcessResult};

/// When to stop collapsing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecimationTarget {
    /// Collapse until at most this many faces remain
    FaceCount(usize),
    /// Collapse while the cheapest collapse stays within this error
    MaxError(f32),
    /// Reach the face count, then keep going while within the error
    Hybrid { faces: usize, max_error: f32 },
}

/// Geometry handed to a [`DecimationEngine`]
///
/// Normals and texture coordinates are bound per vertex and must have one
/// entry per position.
#[derive(Debug, Clone, Copy)]
pub struct DecimationInput<'a> {
    pub positions: &'a [Vec3],
    pub normals: &'a [Vec3],
    pub texcoords: &'a [Vec2],
    pub faces: &'a [[usize; 3]],
}

/// Result of a decimation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecimationOutput {
    /// Remaining faces, indexing the input vertices
    pub faces: Vec<[usize; 3]>,
    /// Input face each remaining face descends from
    pub sources: Vec<usize>,
    /// Largest error of any collapse performed
    pub max_error: f32,
}

/// A mesh simplification backend
pub trait DecimationEngine {
    /// Simplify `input` towards `target`
    ///
    /// Every output face references three distinct input vertices.
    fn decimate(
        &self,
        input: &DecimationInput<'_>,
        target: DecimationTarget,
    ) -> ProcessResult<DecimationOutput>;
}

/// Symmetric 4x4 error quadric
#[derive(Debug, Clone, Copy)]
struct Quadric(DMat4);

impl Quadric {
    const ZERO: Self = Self(DMat4::ZERO);

    /// Squared distance to the plane `ax + by + cz + d = 0`, scaled by `weight`
    fn from_plane(plane: DVec4, weight: f64) -> Self {
        let p = plane * weight;
        Self(DMat4::from_cols(
            p * plane.x,
            p * plane.y,
            p * plane.z,
            p * plane.w,
        ))
    }

    fn add(&self, other: &Quadric) -> Quadric {
        Quadric(self.0 + other.0)
    }

    fn error(&self, position: Vec3) -> f64 {
        let v = position.as_dvec3().extend(1.0);
        v.dot(self.0 * v).max(0.0)
    }
}

fn plane_through(point: Vec3, normal: Vec3) -> DVec4 {
    let n = normal.as_dvec3();
    n.extend(-n.dot(point.as_dvec3()))
}

/// Collapse candidate, ordered so the cheapest pops first
#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    from: usize,
    to: usize,
    stamp: (u32, u32),
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| (other.from, other.to).cmp(&(self.from, self.to)))
    }
}

/// Quadric error metric decimator using half-edge collapses
///
/// Boundary edges get an extra perpendicular plane weighted by
/// `boundary_weight`, which keeps open borders and texture seams in place.
/// Collapsing across differing normals or texture coordinates adds a penalty
/// weighted by `normal_weight` and `uv_weight`.
#[derive(Debug, Clone)]
pub struct QuadricDecimator {
    pub boundary_weight: f64,
    pub normal_weight: f64,
    pub uv_weight: f64,
    /// Never go below this many faces
    pub min_faces: usize,
    /// Smallest cosine between a face's normal before and after a collapse
    pub flip_threshold: f32,
}

impl Default for QuadricDecimator {
    fn default() -> Self {
        Self {
            boundary_weight: 100.0,
            normal_weight: 0.05,
            uv_weight: 0.1,
            min_faces: 4,
            flip_threshold: 0.2,
        }
    }
}

impl QuadricDecimator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecimationEngine for QuadricDecimator {
    fn decimate(
        &self,
        input: &DecimationInput<'_>,
        target: DecimationTarget,
    ) -> ProcessResult<DecimationOutput> {
        check_input(input)?;
        let mut state = Collapser::new(self, input);
        state.run(target);
        Ok(state.finish())
    }
}

fn check_input(input: &DecimationInput<'_>) -> ProcessResult<()> {
    let count = input.positions.len();
    if input.normals.len() != count || input.texcoords.len() != count {
        return Err(ProcessError::Decimation(format!(
            "{} positions but {} normals and {} texture coordinates",
            count,
            input.normals.len(),
            input.texcoords.len()
        )));
    }
    for (i, face) in input.faces.iter().enumerate() {
        let [a, b, c] = *face;
        if a >= count || b >= count || c >= count {
            return Err(ProcessError::Decimation(format!(
                "face {} references a vertex out of range ({} vertices)",
                i, count
            )));
        }
        if a == b || b == c || c == a {
            return Err(ProcessError::Decimation(format!("face {} is degenerate", i)));
        }
    }
    Ok(())
}

struct Collapser<'a> {
    settings: &'a QuadricDecimator,
    input: &'a DecimationInput<'a>,
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    vertex_faces: Vec<SmallVec<[usize; 8]>>,
    vertex_alive: Vec<bool>,
    version: Vec<u32>,
    quadrics: Vec<Quadric>,
    alive_faces: usize,
    heap: BinaryHeap<Candidate>,
    max_error: f64,
}

impl<'a> Collapser<'a> {
    fn new(settings: &'a QuadricDecimator, input: &'a DecimationInput<'a>) -> Self {
        let count = input.positions.len();
        let mut vertex_faces = vec![SmallVec::new(); count];
        let mut quadrics = vec![Quadric::ZERO; count];
        // Edge → (face count, last face)
        let mut edges: AHashMap<(usize, usize), (u32, usize)> = AHashMap::new();

        for (f, face) in input.faces.iter().enumerate() {
            let p = face.map(|v| input.positions[v]);
            let normal = face_normal(p[0], p[1], p[2]);
            let area = f64::from((p[1] - p[0]).cross(p[2] - p[0]).length()) * 0.5;
            let q = Quadric::from_plane(plane_through(p[0], normal), area);
            for (i, &v) in face.iter().enumerate() {
                vertex_faces[v].push(f);
                quadrics[v] = quadrics[v].add(&q);
                let w = face[(i + 1) % 3];
                let entry = edges.entry((v.min(w), v.max(w))).or_insert((0, f));
                entry.0 += 1;
                entry.1 = f;
            }
        }

        for (&(a, b), &(uses, f)) in &edges {
            if uses != 1 {
                continue;
            }
            let p = input.faces[f].map(|v| input.positions[v]);
            let face_n = face_normal(p[0], p[1], p[2]);
            let (pa, pb) = (input.positions[a], input.positions[b]);
            let edge_normal = (pb - pa).cross(face_n).normalize_or_zero();
            if edge_normal == Vec3::ZERO {
                continue;
            }
            let weight = settings.boundary_weight * f64::from(pa.distance_squared(pb));
            let q = Quadric::from_plane(plane_through(pa, edge_normal), weight);
            quadrics[a] = quadrics[a].add(&q);
            quadrics[b] = quadrics[b].add(&q);
        }

        let mut state = Self {
            settings,
            input,
            faces: input.faces.to_vec(),
            face_alive: vec![true; input.faces.len()],
            vertex_faces,
            vertex_alive: vec![true; count],
            version: vec![0; count],
            quadrics,
            alive_faces: input.faces.len(),
            heap: BinaryHeap::new(),
            max_error: 0.0,
        };
        let mut edge_list: Vec<(usize, usize)> = edges.into_keys().collect();
        edge_list.sort_unstable();
        for (a, b) in edge_list {
            state.push_edge(a, b);
        }
        state
    }

    fn cost(&self, from: usize, to: usize) -> f64 {
        let input = self.input;
        let q = self.quadrics[from].add(&self.quadrics[to]);
        let geometric = q.error(input.positions[to]).sqrt();
        let normal = f64::from((1.0 - input.normals[from].dot(input.normals[to])).max(0.0));
        let uv = f64::from(input.texcoords[from].distance(input.texcoords[to]));
        geometric + self.settings.normal_weight * normal + self.settings.uv_weight * uv
    }

    /// Queue the cheaper direction of collapsing edge (a, b)
    fn push_edge(&mut self, a: usize, b: usize) {
        let (ab, ba) = (self.cost(a, b), self.cost(b, a));
        let (from, to, cost) = if ab <= ba { (a, b, ab) } else { (b, a, ba) };
        self.heap.push(Candidate {
            cost,
            from,
            to,
            stamp: (self.version[from], self.version[to]),
        });
    }

    fn live_faces(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertex_faces[v].iter().copied().filter(|&f| self.face_alive[f])
    }

    fn neighbours(&self, v: usize) -> SmallVec<[usize; 16]> {
        let mut out: SmallVec<[usize; 16]> = self
            .live_faces(v)
            .flat_map(|f| self.faces[f])
            .filter(|&w| w != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Number of faces the collapse removes, or `None` if it would damage
    /// the surface
    fn check_collapse(&self, from: usize, to: usize) -> Option<usize> {
        let shared = self
            .live_faces(from)
            .filter(|&f| self.faces[f].contains(&to))
            .count();
        if shared == 0 {
            return None;
        }

        // Link condition: the edge's end points may only share the
        // neighbours of the faces on the edge
        let from_n = self.neighbours(from);
        let to_n = self.neighbours(to);
        let common = from_n.iter().filter(|v| to_n.binary_search(v).is_ok()).count();
        if common != shared {
            return None;
        }

        let positions = self.input.positions;
        for f in self.live_faces(from) {
            let face = self.faces[f];
            if face.contains(&to) {
                continue;
            }
            let before = face_normal(positions[face[0]], positions[face[1]], positions[face[2]]);
            if before == Vec3::ZERO {
                continue;
            }
            let moved = face.map(|v| if v == from { to } else { v });
            let after = face_normal(positions[moved[0]], positions[moved[1]], positions[moved[2]]);
            if after.dot(before) < self.settings.flip_threshold {
                return None;
            }
        }
        Some(shared)
    }

    fn collapse(&mut self, from: usize, to: usize) {
        let incident: SmallVec<[usize; 8]> = self.live_faces(from).collect();
        for f in incident {
            if self.faces[f].contains(&to) {
                self.face_alive[f] = false;
                self.alive_faces -= 1;
            } else {
                for v in self.faces[f].iter_mut() {
                    if *v == from {
                        *v = to;
                    }
                }
                self.vertex_faces[to].push(f);
            }
        }
        let face_alive = &self.face_alive;
        self.vertex_faces[to].retain(|f| face_alive[*f]);
        self.vertex_faces[from].clear();
        self.vertex_alive[from] = false;
        self.quadrics[to] = self.quadrics[to].add(&self.quadrics[from]);
        self.version[to] = self.version[to].wrapping_add(1);

        for n in self.neighbours(to) {
            self.push_edge(to, n);
        }
    }

    fn run(&mut self, target: DecimationTarget) {
        let min_faces = self.settings.min_faces;
        while let Some(candidate) = self.heap.pop() {
            let Candidate { cost, from, to, stamp } = candidate;
            if !self.vertex_alive[from]
                || !self.vertex_alive[to]
                || stamp != (self.version[from], self.version[to])
            {
                continue;
            }

            let wanted = match target {
                DecimationTarget::FaceCount(faces) => self.alive_faces > faces,
                DecimationTarget::MaxError(max_error) => cost <= f64::from(max_error),
                DecimationTarget::Hybrid { faces, max_error } => {
                    self.alive_faces > faces || cost <= f64::from(max_error)
                }
            };
            if !wanted {
                break;
            }

            let Some(removed) = self.check_collapse(from, to) else {
                continue;
            };
            if self.alive_faces < min_faces + removed {
                continue;
            }
            self.collapse(from, to);
            self.max_error = self.max_error.max(cost);
        }
    }

    fn finish(self) -> DecimationOutput {
        let mut output = DecimationOutput {
            max_error: self.max_error as f32,
            ..Default::default()
        };
        for (f, face) in self.faces.into_iter().enumerate() {
            if self.face_alive[f] {
                output.faces.push(face);
                output.sources.push(f);
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat `n` x `n` grid of quads in the XY plane
    fn grid(n: usize) -> (Vec<Vec3>, Vec<Vec2>, Vec<[usize; 3]>) {
        let mut positions = Vec::new();
        let mut texcoords = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                let (fx, fy) = (x as f32 / n as f32, y as f32 / n as f32);
                positions.push(Vec3::new(fx, fy, 0.0));
                texcoords.push(Vec2::new(fx, fy));
            }
        }
        let row = n + 1;
        let mut faces = Vec::new();
        for y in 0..n {
            for x in 0..n {
                let i = y * row + x;
                faces.push([i, i + 1, i + row + 1]);
                faces.push([i, i + row + 1, i + row]);
            }
        }
        (positions, texcoords, faces)
    }

    fn decimate(n: usize, target: DecimationTarget) -> (DecimationOutput, usize, usize) {
        let (positions, texcoords, faces) = grid(n);
        let normals = vec![Vec3::Z; positions.len()];
        let input = DecimationInput {
            positions: &positions,
            normals: &normals,
            texcoords: &texcoords,
            faces: &faces,
        };
        let output = QuadricDecimator::new().decimate(&input, target).unwrap();
        (output, positions.len(), faces.len())
    }

    fn assert_valid(output: &DecimationOutput, vertex_count: usize) {
        assert_eq!(output.faces.len(), output.sources.len());
        for face in &output.faces {
            assert!(face.iter().all(|&v| v < vertex_count));
            assert!(face[0] != face[1] && face[1] != face[2] && face[0] != face[2]);
        }
    }

    #[test]
    fn test_face_count_target() {
        let (output, vertices, faces) = decimate(8, DecimationTarget::FaceCount(64));
        assert_eq!(faces, 128);
        assert!(output.faces.len() <= 64);
        assert!(output.faces.len() >= 4);
        assert_valid(&output, vertices);
    }

    #[test]
    fn test_flat_grid_collapses_within_error() {
        // Only the texture-coordinate penalty of 0.1 * 1/6 applies along grid lines
        let (output, vertices, faces) = decimate(6, DecimationTarget::MaxError(0.02));
        assert!(output.faces.len() < faces);
        assert!(output.max_error <= 0.02);
        assert_valid(&output, vertices);
    }

    #[test]
    fn test_zero_error_bound_keeps_everything() {
        let (mut positions, texcoords, faces) = grid(4);
        for p in &mut positions {
            p.z = (p.x * 3.0).sin() + (p.y * 2.0).cos();
        }
        let normals = vec![Vec3::Z; positions.len()];
        let input = DecimationInput {
            positions: &positions,
            normals: &normals,
            texcoords: &texcoords,
            faces: &faces,
        };
        let output = QuadricDecimator::new()
            .decimate(&input, DecimationTarget::MaxError(0.0))
            .unwrap();
        assert_eq!(output.faces.len(), faces.len());
    }

    #[test]
    fn test_hybrid_reaches_face_target() {
        let (output, vertices, _) = decimate(
            8,
            DecimationTarget::Hybrid {
                faces: 100,
                max_error: 0.0,
            },
        );
        assert!(output.faces.len() <= 100);
        assert_valid(&output, vertices);
    }

    #[test]
    fn test_min_faces_floor() {
        let (output, _, _) = decimate(4, DecimationTarget::FaceCount(0));
        assert!(output.faces.len() >= 4);
    }

    #[test]
    fn test_rejects_bad_input() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let normals = [Vec3::Z; 3];
        let texcoords = [Vec2::ZERO; 3];
        let faces = [[0, 1, 5]];
        let input = DecimationInput {
            positions: &positions,
            normals: &normals,
            texcoords: &texcoords,
            faces: &faces,
        };
        let result = QuadricDecimator::new().decimate(&input, DecimationTarget::FaceCount(1));
        assert!(matches!(result, Err(ProcessError::Decimation(_))));

        let input = DecimationInput {
            normals: &normals[..2],
            faces: &[[0, 1, 2]],
            ..input
        };
        assert!(QuadricDecimator::new()
            .decimate(&input, DecimationTarget::FaceCount(1))
            .is_err());
    }
}
