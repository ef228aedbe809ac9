//! Benchmarks comparing scalar tree queries against a brute-force scan

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trivis_core::{LinkedMesh, Point3f, TriangleMesh};
use trivis_scalartree::ScalarTree;

fn generate_strip(n: usize) -> LinkedMesh {
    let num_points = n + 2;
    let vertices = (0..num_points)
        .map(|i| Point3f::new(i as f32, (i % 2) as f32, 0.0))
        .collect();
    let faces = (0..n).map(|i| [i, i + 1, i + 2]).collect();
    let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
    mesh.set_scalars((0..num_points).map(|i| (i as f32).sin() * 100.0).collect());
    LinkedMesh::from_mesh(&mesh)
}

fn brute_force_count(mesh: &LinkedMesh, value: f32) -> usize {
    let scalars = mesh.scalars().unwrap();
    (0..mesh.cell_count())
        .filter_map(|c| mesh.cell(c))
        .filter(|verts| {
            let lo = verts.iter().map(|&v| scalars[v]).fold(f32::INFINITY, f32::min);
            let hi = verts
                .iter()
                .map(|&v| scalars[v])
                .fold(f32::NEG_INFINITY, f32::max);
            lo <= value && value <= hi
        })
        .count()
}

fn bench_queries(c: &mut Criterion) {
    let sizes = [1_000, 10_000, 100_000];
    let value = 99.5;

    let mut group = c.benchmark_group("scalar_query");

    for &size in &sizes {
        let mesh = generate_strip(size);

        group.bench_with_input(BenchmarkId::new("tree", size), &mesh, |b, mesh| {
            let mut tree = ScalarTree::new();
            tree.build(mesh).unwrap();
            b.iter(|| {
                let count = tree.traverse(black_box(mesh), value).unwrap().count();
                black_box(count);
            });
        });

        group.bench_with_input(BenchmarkId::new("brute_force", size), &mesh, |b, mesh| {
            b.iter(|| {
                let count = brute_force_count(black_box(mesh), value);
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
