//! Processor Benchmarks
//!
//! Performance benchmarks for the heavier pipeline steps

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln_core::math::{Mat4, Vec2, Vec3};
use kiln_core::{Face, Frame, Mesh, Model, Vertex};
use kiln_pipeline::processors::{NormalCalculator, VertexOptimizer};
use kiln_pipeline::{DecimationEngine, DecimationInput, DecimationTarget, QuadricDecimator};
use kiln_pipeline::{ProcessContext, Processor};

/// Wavy `n` x `n` grid, two triangles per cell
fn grid_mesh(n: usize) -> Mesh {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    for y in 0..=n {
        for x in 0..=n {
            let (fx, fy) = (x as f32 / n as f32, y as f32 / n as f32);
            let z = 0.05 * (fx * 12.0).sin() * (fy * 9.0).cos();
            vertices.push(Vertex::new(Vec3::new(fx, fy, z), Vec2::new(fx, fy)));
        }
    }
    let row = n + 1;
    let mut faces = Vec::with_capacity(n * n * 2);
    for y in 0..n {
        for x in 0..n {
            let i = y * row + x;
            faces.push(Face::with_smoothing_group([i, i + 1, i + row + 1], 1));
            faces.push(Face::with_smoothing_group([i, i + row + 1, i + row], 1));
        }
    }
    let mut mesh = Mesh::with_geometry("grid", vertices, faces);
    mesh.loading_completed();
    mesh
}

fn grid_model(n: usize) -> Model {
    let mut model = Model::new("bench");
    let lod = &mut model.lods[0];
    lod.add_mesh(grid_mesh(n));
    let mut frame = Frame::new();
    frame.add_node(0, Mat4::IDENTITY);
    lod.frames.push(frame);
    model
}

fn bench_normal_calculator(c: &mut Criterion) {
    let mut group = c.benchmark_group("normal_calculator");

    for n in [16, 64, 128].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_batched(
                || grid_mesh(n),
                |mut mesh| {
                    NormalCalculator::default().calculate(&mut mesh);
                    mesh
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_vertex_optimizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("vertex_optimizer");

    for n in [16, 64, 128].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, &n| {
            b.iter_batched(
                || {
                    // Split every corner so there is something to merge
                    let mut model = grid_model(n);
                    NormalCalculator::default()
                        .process(&mut model, &ProcessContext::default())
                        .ok();
                    model
                },
                |mut model| {
                    VertexOptimizer::new()
                        .process(&mut model, &ProcessContext::default())
                        .ok();
                    model
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_decimation(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadric_decimation");

    for n in [16, 48, 96].iter() {
        let mesh = grid_mesh(*n);
        let positions: Vec<Vec3> = mesh.vertices().iter().map(|v| v.pos).collect();
        let normals = vec![Vec3::Z; positions.len()];
        let texcoords: Vec<Vec2> = mesh.vertices().iter().map(|v| v.tex).collect();
        let faces: Vec<[usize; 3]> = mesh.faces().iter().map(|f| f.vertices).collect();

        group.bench_with_input(BenchmarkId::from_parameter(n), n, |b, _| {
            let input = DecimationInput {
                positions: &positions,
                normals: &normals,
                texcoords: &texcoords,
                faces: &faces,
            };
            let decimator = QuadricDecimator::new();
            b.iter(|| {
                black_box(
                    decimator
                        .decimate(&input, DecimationTarget::FaceCount(faces.len() / 4))
                        .ok(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_normal_calculator,
    bench_vertex_optimizer,
    bench_decimation,
);
criterion_main!(benches);
