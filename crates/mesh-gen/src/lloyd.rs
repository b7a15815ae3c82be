//! Lloyd relaxation of planar triangulations.
//!
//! Each step moves every interior point to the centroid of its Voronoi
//! control volume, computed from the circumcenters of the incident triangles
//! (obtuse triangles contribute signed, partly negative areas). Delaunay edge
//! flips keep the triangulation matched to the moving points. Boundary points
//! never move, and a move that would invert a triangle is undone.
//!
//! # Example
//!
//! ```
//! use mesh_gen::lloyd::LloydRelaxer;
//! use mesh_gen::relax::{RelaxParams, Relaxer};
//! use mesh_gen::subset::SubsetMesh;
//! use nalgebra::Point3;
//!
//! // A square with an off-centre interior point.
//! let mesh = SubsetMesh::new(
//!     vec![
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!         Point3::new(0.3, 0.4, 0.0),
//!     ],
//!     vec![[0, 1, 4], [1, 2, 4], [2, 3, 4], [3, 0, 4]],
//! );
//! let result = LloydRelaxer::default()
//!     .relax(mesh, &RelaxParams::with_max_steps(50), None)
//!     .unwrap();
//! let centre = result.mesh.points[4];
//! assert!((centre.x - 0.5).abs() < 1e-3 && (centre.y - 0.5).abs() < 1e-3);
//! ```

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector2};
use tracing::{debug, info, trace, warn};

use crate::error::{MeshError, MeshResult};
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::relax::{RelaxParams, RelaxResult, RelaxStats, Relaxer, doubled_area, worst_quality, xy};
use crate::subset::SubsetMesh;

/// Triangles whose doubled area is below this fraction of their longest
/// squared edge count as degenerate.
const DEGENERATE_AREA_RATIO: f64 = 1e-14;

/// Centroidal Voronoi relaxation with Delaunay flips.
#[derive(Debug, Clone)]
pub struct LloydRelaxer {
    /// A step whose largest move is below this fraction of the mesh extent
    /// counts as "nothing moved" and ends the run.
    /// Default: 1e-12
    pub move_tolerance: f64,

    /// Maximum flip sweeps per flip pass.
    /// Default: 64
    pub max_flip_sweeps: usize,
}

impl Default for LloydRelaxer {
    fn default() -> Self {
        Self {
            move_tolerance: 1e-12,
            max_flip_sweeps: 64,
        }
    }
}

impl Relaxer for LloydRelaxer {
    fn name(&self) -> &'static str {
        "lloyd"
    }

    fn relax(
        &self,
        mesh: SubsetMesh,
        params: &RelaxParams,
        progress: Option<&ProgressCallback>,
    ) -> MeshResult<RelaxResult> {
        let orientation = validate(&mesh)?;
        let boundary = boundary_points(&mesh);
        let scale = extent(&mesh.points);
        let SubsetMesh {
            mut points,
            mut triangles,
        } = mesh;

        let mut stats = RelaxStats {
            min_quality_before: worst_quality(&points, &triangles),
            ..Default::default()
        };
        let reached = |quality: f64| params.target_quality > 0.0 && quality >= params.target_quality;

        let tracker = ProgressTracker::new(params.max_steps as u64);
        let mut quality = stats.min_quality_before;
        stats.converged = reached(quality);

        while !stats.converged && stats.steps < params.max_steps {
            let step = stats.steps;
            if params.flip_frequency > 0 && step % params.flip_frequency == 0 {
                stats.edges_flipped += flip_to_delaunay(
                    &points,
                    &mut triangles,
                    &orientation,
                    self.max_flip_sweeps,
                );
            }

            let incident = incidence(points.len(), &triangles);
            let max_move = smooth_step(&mut points, &triangles, &orientation, &boundary, &incident);
            stats.steps += 1;
            stats.max_final_move = max_move;
            quality = worst_quality(&points, &triangles);

            if params.verbose {
                info!(
                    target: "mesh_gen::relax",
                    step = stats.steps,
                    max_move = format!("{:.3e}", max_move),
                    min_quality = format!("{:.4}", quality),
                    "Lloyd step"
                );
            } else {
                trace!(target: "mesh_gen::relax", step = stats.steps, max_move, quality, "Lloyd step");
            }

            tracker.set(stats.steps as u64);
            if !tracker.maybe_callback(
                progress,
                format!("Lloyd step {}/{}", stats.steps, params.max_steps),
            ) {
                warn!(target: "mesh_gen::relax", step = stats.steps, "Relaxation cancelled");
                return Err(MeshError::relaxation_failure(format!(
                    "cancelled by progress callback after {} steps",
                    stats.steps
                )));
            }

            if reached(quality) || max_move <= self.move_tolerance * scale {
                stats.converged = true;
            }
        }

        stats.min_quality_after = quality;
        debug!(
            target: "mesh_gen::relax",
            steps = stats.steps,
            converged = stats.converged,
            edges_flipped = stats.edges_flipped,
            "Lloyd relaxation finished"
        );
        Ok(RelaxResult {
            mesh: SubsetMesh::new(points, triangles),
            stats,
        })
    }
}

/// Check the mesh is usable and return each triangle's orientation (+1 or -1).
fn validate(mesh: &SubsetMesh) -> MeshResult<Vec<f64>> {
    if mesh.triangles.is_empty() {
        return Err(MeshError::relaxation_failure("no triangles to relax"));
    }
    if let Some(i) = mesh
        .points
        .iter()
        .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
    {
        return Err(MeshError::relaxation_failure(format!(
            "point {} has non-finite coordinates",
            i
        )));
    }

    let n = mesh.points.len();
    let mut orientation = Vec::with_capacity(mesh.triangles.len());
    for (t, tri) in mesh.triangles.iter().enumerate() {
        if let Some(&bad) = tri.iter().find(|&&v| v >= n) {
            return Err(MeshError::relaxation_failure(format!(
                "triangle {} references point {}, but there are only {} points",
                t, bad, n
            )));
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(MeshError::relaxation_failure(format!(
                "triangle {} repeats a point: {:?}",
                t, tri
            )));
        }
        let [a, b, c] = tri.map(|v| mesh.points[v]);
        let area = doubled_area(&a, &b, &c);
        let longest = [(b - a), (c - b), (a - c)]
            .iter()
            .map(|e| e.xy().norm_squared())
            .fold(0.0, f64::max);
        if area.abs() <= DEGENERATE_AREA_RATIO * longest {
            return Err(MeshError::relaxation_failure(format!(
                "triangle {} has zero area",
                t
            )));
        }
        orientation.push(area.signum());
    }

    for (edge, faces) in edge_faces(&mesh.triangles) {
        if faces.len() > 2 {
            return Err(MeshError::relaxation_failure(format!(
                "edge ({}, {}) is shared by {} triangles",
                edge.0,
                edge.1,
                faces.len()
            )));
        }
    }
    Ok(orientation)
}

/// Length of the bounding box diagonal in the xy-plane.
fn extent(points: &[Point3<f64>]) -> f64 {
    let Some(first) = points.first() else {
        return 0.0;
    };
    let (min, max) = points
        .iter()
        .fold((*first, *first), |(min, max), p| (min.inf(p), max.sup(p)));
    (max - min).xy().norm()
}

/// Create a canonical edge key (smaller index first).
fn canonical_edge(v0: usize, v1: usize) -> (usize, usize) {
    if v0 < v1 { (v0, v1) } else { (v1, v0) }
}

fn edge_faces(triangles: &[[usize; 3]]) -> HashMap<(usize, usize), Vec<usize>> {
    let mut edges: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (t, tri) in triangles.iter().enumerate() {
        for i in 0..3 {
            edges
                .entry(canonical_edge(tri[i], tri[(i + 1) % 3]))
                .or_default()
                .push(t);
        }
    }
    edges
}

/// Points on edges used by exactly one triangle.
fn boundary_points(mesh: &SubsetMesh) -> Vec<bool> {
    let mut boundary = vec![false; mesh.points.len()];
    for ((v0, v1), faces) in edge_faces(&mesh.triangles) {
        if faces.len() == 1 {
            boundary[v0] = true;
            boundary[v1] = true;
        }
    }
    boundary
}

fn incidence(point_count: usize, triangles: &[[usize; 3]]) -> Vec<Vec<usize>> {
    let mut incident = vec![Vec::new(); point_count];
    for (t, tri) in triangles.iter().enumerate() {
        for &v in tri {
            incident[v].push(t);
        }
    }
    incident
}

/// Rotate `tri` so that it starts at `v`.
fn starting_at(tri: [usize; 3], v: usize) -> [usize; 3] {
    if tri[1] == v {
        [tri[1], tri[2], tri[0]]
    } else if tri[2] == v {
        [tri[2], tri[0], tri[1]]
    } else {
        tri
    }
}

/// Rotate `tri` so that its first two points are the edge `{v0, v1}`,
/// keeping the triangle's orientation.
fn along_edge(tri: [usize; 3], v0: usize, v1: usize) -> Option<[usize; 3]> {
    (0..3)
        .map(|i| [tri[i], tri[(i + 1) % 3], tri[(i + 2) % 3]])
        .find(|r| canonical_edge(r[0], r[1]) == canonical_edge(v0, v1))
}

fn circumcenter(a: Vector2<f64>, b: Vector2<f64>, c: Vector2<f64>) -> Option<Vector2<f64>> {
    let ab = b - a;
    let ac = c - a;
    let d = 2.0 * (ab.x * ac.y - ab.y * ac.x);
    if d == 0.0 {
        return None;
    }
    let ux = (ac.y * ab.norm_squared() - ab.y * ac.norm_squared()) / d;
    let uy = (ab.x * ac.norm_squared() - ac.x * ab.norm_squared()) / d;
    Some(a + Vector2::new(ux, uy))
}

#[inline]
fn cross(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Centroid of the Voronoi control volume of `v`.
fn control_centroid(
    v: usize,
    points: &[Point3<f64>],
    triangles: &[[usize; 3]],
    orientation: &[f64],
    incident: &[usize],
) -> Option<Vector2<f64>> {
    let pv = xy(&points[v]);
    let mut area_sum = 0.0;
    let mut moment = Vector2::zeros();
    for &t in incident {
        let [_, j, k] = starting_at(triangles[t], v);
        let (pj, pk) = (xy(&points[j]), xy(&points[k]));
        let Some(center) = circumcenter(pv, pj, pk) else {
            continue;
        };
        let mid_j = (pv + pj) * 0.5;
        let mid_k = (pv + pk) * 0.5;
        for (a, b) in [(mid_j, center), (center, mid_k)] {
            let area = 0.5 * cross(a - pv, b - pv) * orientation[t];
            moment += (pv + a + b) * (area / 3.0);
            area_sum += area;
        }
    }
    (area_sum > 0.0).then(|| moment / area_sum)
}

/// One Jacobi-style Lloyd step. Returns the largest move kept.
fn smooth_step(
    points: &mut [Point3<f64>],
    triangles: &[[usize; 3]],
    orientation: &[f64],
    boundary: &[bool],
    incident: &[Vec<usize>],
) -> f64 {
    let old = points.to_vec();
    let mut moved = vec![false; points.len()];
    let targets: Vec<Option<Vector2<f64>>> = (0..points.len())
        .map(|v| {
            if boundary[v] || incident[v].is_empty() {
                None
            } else {
                control_centroid(v, &old, triangles, orientation, &incident[v])
            }
        })
        .collect();
    for (v, target) in targets.into_iter().enumerate() {
        if let Some(c) = target {
            points[v].x = c.x;
            points[v].y = c.y;
            moved[v] = true;
        }
    }

    // Undo moves around inverted triangles until none are left.
    loop {
        let mut reverted = false;
        for (t, tri) in triangles.iter().enumerate() {
            if !tri.iter().any(|&v| moved[v]) {
                continue;
            }
            let [a, b, c] = tri.map(|v| points[v]);
            if doubled_area(&a, &b, &c) * orientation[t] <= 0.0 {
                for &v in tri {
                    if moved[v] {
                        points[v] = old[v];
                        moved[v] = false;
                        reverted = true;
                    }
                }
            }
        }
        if !reverted {
            break;
        }
    }

    (0..points.len())
        .filter(|&v| moved[v])
        .map(|v| (points[v] - old[v]).norm())
        .fold(0.0, f64::max)
}

/// Interior angle at `apex` opposite the edge `p`-`q`.
fn opposite_angle(points: &[Point3<f64>], p: usize, q: usize, apex: usize) -> f64 {
    let a = xy(&points[p]) - xy(&points[apex]);
    let b = xy(&points[q]) - xy(&points[apex]);
    cross(a, b).abs().atan2(a.dot(&b))
}

/// Flip non-Delaunay interior edges until none remain or the sweep budget
/// runs out. Returns the number of flips.
fn flip_to_delaunay(
    points: &[Point3<f64>],
    triangles: &mut [[usize; 3]],
    orientation: &[f64],
    max_sweeps: usize,
) -> usize {
    let mut total = 0;
    for _ in 0..max_sweeps {
        let edges = edge_faces(triangles);
        let mut interior: Vec<(usize, usize)> = edges
            .iter()
            .filter(|(_, faces)| faces.len() == 2)
            .map(|(&edge, _)| edge)
            .collect();
        interior.sort_unstable();

        let mut touched = vec![false; triangles.len()];
        let mut created: HashSet<(usize, usize)> = HashSet::new();
        let mut flipped = 0;
        for (v0, v1) in interior {
            let (t0, t1) = (edges[&(v0, v1)][0], edges[&(v0, v1)][1]);
            if touched[t0] || touched[t1] || orientation[t0] != orientation[t1] {
                continue;
            }
            let Some([p, q, a]) = along_edge(triangles[t0], v0, v1) else {
                continue;
            };
            let Some([q1, p1, b]) = along_edge(triangles[t1], v0, v1) else {
                continue;
            };
            // Consistently oriented neighbours traverse the shared edge in
            // opposite directions.
            if q1 != q || p1 != p || a == b {
                continue;
            }
            let new_edge = canonical_edge(a, b);
            if edges.contains_key(&new_edge) || created.contains(&new_edge) {
                continue;
            }
            let angles = opposite_angle(points, p, q, a) + opposite_angle(points, p, q, b);
            if angles <= std::f64::consts::PI + 1e-12 {
                continue;
            }
            let n0 = [a, p, b];
            let n1 = [b, q, a];
            let keeps_orientation = |tri: [usize; 3], t: usize| {
                let [x, y, z] = tri.map(|v| points[v]);
                doubled_area(&x, &y, &z) * orientation[t] > 0.0
            };
            if !keeps_orientation(n0, t0) || !keeps_orientation(n1, t1) {
                continue;
            }
            triangles[t0] = n0;
            triangles[t1] = n1;
            touched[t0] = true;
            touched[t1] = true;
            created.insert(new_edge);
            flipped += 1;
        }

        total += flipped;
        if flipped == 0 {
            break;
        }
    }
    total
}
