//! Benchmarks for mesh-gen relaxation and decoding.
//!
//! Run with: cargo bench -p mesh-gen
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p mesh-gen -- --save-baseline main
//! 2. After changes: cargo bench -p mesh-gen -- --baseline main

use std::path::Path;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mesh_gen::{
    CellGroup, CellType, LloydRelaxer, Mesh, RelaxParams, Relaxer, SubsetMesh, merge, parse_msh,
    project,
};
use nalgebra::Point3;

// =============================================================================
// Test Mesh Generation
// =============================================================================

/// `n x n` grid on the unit square with deterministically jittered interior points.
fn jittered_grid(n: usize) -> SubsetMesh {
    let h = 1.0 / n as f64;
    let id = |i: usize, j: usize| j * (n + 1) + i;
    let mut points = Vec::with_capacity((n + 1) * (n + 1));
    for j in 0..=n {
        for i in 0..=n {
            let interior = i > 0 && i < n && j > 0 && j < n;
            let (dx, dy) = if interior {
                let s = (i * 7 + j * 13) as f64;
                (0.2 * h * s.sin(), 0.2 * h * s.cos())
            } else {
                (0.0, 0.0)
            };
            points.push(Point3::new(i as f64 * h + dx, j as f64 * h + dy, 0.0));
        }
    }
    let mut triangles = Vec::with_capacity(2 * n * n);
    for j in 0..n {
        for i in 0..n {
            triangles.push([id(i, j), id(i + 1, j), id(i + 1, j + 1)]);
            triangles.push([id(i, j), id(i + 1, j + 1), id(i, j + 1)]);
        }
    }
    SubsetMesh::new(points, triangles)
}

/// The grid as a tagged full mesh.
fn grid_mesh(n: usize) -> Mesh {
    let grid = jittered_grid(n);
    let mut mesh = Mesh::from_points(grid.points);
    let tags = vec![1; grid.triangles.len()];
    if let Ok(group) = CellGroup::from_rows(CellType::Triangle, &grid.triangles) {
        mesh.insert_cells(group.with_geometrical(tags));
    }
    mesh
}

// =============================================================================
// Relaxation Benchmarks
// =============================================================================

fn bench_lloyd(c: &mut Criterion) {
    let mut group = c.benchmark_group("Lloyd");
    group.sample_size(20);

    for n in [8, 16, 32] {
        let grid = jittered_grid(n);
        group.throughput(Throughput::Elements(grid.triangles.len() as u64));

        group.bench_with_input(BenchmarkId::new("10_steps", n), &grid, |b, grid| {
            let relaxer = LloydRelaxer::default();
            let params = RelaxParams::with_max_steps(10);
            b.iter(|| relaxer.relax(black_box(grid.clone()), black_box(&params), None))
        });

        group.bench_with_input(BenchmarkId::new("10_steps_no_flips", n), &grid, |b, grid| {
            let relaxer = LloydRelaxer::default();
            let params = RelaxParams {
                max_steps: 10,
                flip_frequency: 0,
                ..Default::default()
            };
            b.iter(|| relaxer.relax(black_box(grid.clone()), black_box(&params), None))
        });
    }

    group.finish();
}

// =============================================================================
// Projection / Merge Benchmarks
// =============================================================================

fn bench_project_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("Subset");

    for n in [32, 128] {
        let mesh = grid_mesh(n);
        group.throughput(Throughput::Elements(mesh.cell_count() as u64));

        group.bench_with_input(BenchmarkId::new("project", n), &mesh, |b, mesh| {
            b.iter(|| project(black_box(mesh)))
        });

        group.bench_with_input(BenchmarkId::new("project_merge", n), &mesh, |b, mesh| {
            b.iter(|| {
                let mut target = mesh.clone();
                if let Ok(projection) = project(&target) {
                    let _ = merge(&mut target, &projection.subset, &projection.original_index);
                }
                target
            })
        });
    }

    group.finish();
}

// =============================================================================
// Decoding Benchmarks
// =============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("Decode");

    for n in [32, 128] {
        let mesh = grid_mesh(n);
        let mut text = Vec::new();
        if mesh_gen::msh::write_msh_to(&mesh, &mut text).is_err() {
            continue;
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        group.throughput(Throughput::Bytes(text.len() as u64));

        group.bench_with_input(BenchmarkId::new("msh22", n), &text, |b, text| {
            b.iter(|| parse_msh(black_box(text), Path::new("bench.msh")))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lloyd, bench_project_merge, bench_decode);
criterion_main!(benches);
