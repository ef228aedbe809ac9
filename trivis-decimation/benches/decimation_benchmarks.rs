//! Benchmarks for the vertex decimator on flat and curved grids

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trivis_core::{Point3f, TriangleMesh};
use trivis_decimation::{Decimator, MeshDecimator};

fn generate_grid(size: usize, curved: bool) -> TriangleMesh {
    let mut vertices = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let z = if curved {
                let fx = x as f32 / (size - 1) as f32 * std::f32::consts::PI;
                let fy = y as f32 / (size - 1) as f32 * std::f32::consts::PI;
                (fx.sin() * fy.sin()) * 2.0
            } else {
                0.0
            };
            vertices.push(Point3f::new(x as f32, y as f32, z));
        }
    }
    let mut faces = Vec::with_capacity(2 * (size - 1) * (size - 1));
    for y in 0..(size - 1) {
        for x in 0..(size - 1) {
            let tl = y * size + x;
            let tr = tl + 1;
            let bl = (y + 1) * size + x;
            let br = bl + 1;
            faces.push([tl, bl, tr]);
            faces.push([tr, bl, br]);
        }
    }
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

fn bench_decimation(c: &mut Criterion) {
    let sizes = [20, 40, 80];

    let mut group = c.benchmark_group("decimation");
    group.sample_size(20);

    for &size in &sizes {
        let flat = generate_grid(size, false);
        group.bench_with_input(BenchmarkId::new("flat", flat.face_count()), &flat, |b, mesh| {
            let decimator = Decimator::new()
                .with_target_reduction(0.9)
                .with_initial_error(0.01);
            b.iter(|| {
                let result = decimator.decimate(black_box(mesh)).unwrap();
                black_box(result.final_triangles);
            });
        });

        let curved = generate_grid(size, true);
        group.bench_with_input(
            BenchmarkId::new("curved", curved.face_count()),
            &curved,
            |b, mesh| {
                let decimator = Decimator::new()
                    .with_target_reduction(0.5)
                    .with_initial_error(0.01);
                b.iter(|| {
                    let result = decimator.decimate(black_box(mesh)).unwrap();
                    black_box(result.final_triangles);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_decimation);
criterion_main!(benches);
