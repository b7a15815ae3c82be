//! Relaxation of a triangle subset.
//!
//! The [`Relaxer`] trait is the seam between the pipeline and the optimizer.
//! [`relax`] wraps a relaxer call with the checks the merge step depends on
//! (the relaxer must keep the number and order of points) plus timing and
//! logging. The default optimizer is [`LloydRelaxer`](crate::lloyd::LloydRelaxer).

use nalgebra::{Point3, Vector2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MeshError, MeshResult};
use crate::progress::ProgressCallback;
use crate::subset::SubsetMesh;
use crate::tracing_ext::{OperationTimer, log_relax_result};

/// Parameters for relaxation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaxParams {
    /// Stop once the worst triangle reaches this quality (radius ratio).
    /// 0.0 runs the whole step budget.
    /// Default: 0.0
    pub target_quality: f64,

    /// Maximum number of smoothing steps.
    /// Default: 1000
    pub max_steps: usize,

    /// Run Delaunay edge flips before every k-th step; 0 disables flips.
    /// Default: 1
    pub flip_frequency: usize,

    /// Log every step at info level instead of trace.
    /// Default: false
    pub verbose: bool,
}

impl Default for RelaxParams {
    fn default() -> Self {
        Self {
            target_quality: 0.0,
            max_steps: 1000,
            flip_frequency: 1,
            verbose: false,
        }
    }
}

impl RelaxParams {
    /// Default parameters with a different step budget.
    pub fn with_max_steps(max_steps: usize) -> Self {
        Self {
            max_steps,
            ..Default::default()
        }
    }

    /// Stop as soon as every triangle reaches `quality`.
    pub fn until_quality(quality: f64) -> Self {
        Self {
            target_quality: quality,
            ..Default::default()
        }
    }
}

/// Statistics from a relaxation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RelaxStats {
    /// Smoothing steps performed.
    pub steps: usize,
    /// Edges flipped over all flip passes.
    pub edges_flipped: usize,
    /// The target quality was reached or nothing moved any more.
    pub converged: bool,
    /// Worst triangle quality of the input.
    pub min_quality_before: f64,
    /// Worst triangle quality of the output.
    pub min_quality_after: f64,
    /// Largest point displacement in the final step.
    pub max_final_move: f64,
}

/// A relaxed subset mesh with statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxResult {
    pub mesh: SubsetMesh,
    pub stats: RelaxStats,
}

/// A mesh relaxation optimizer.
///
/// Implementations must return a mesh with the same number of points, in the
/// same order, and triangles indexing into those points. Boundary points
/// (on edges used by exactly one triangle) are expected to stay put.
pub trait Relaxer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Relax `mesh`.
    ///
    /// A progress callback returning `false` cancels the run, which is
    /// reported as [`MeshError::RelaxationFailure`].
    fn relax(
        &self,
        mesh: SubsetMesh,
        params: &RelaxParams,
        progress: Option<&ProgressCallback>,
    ) -> MeshResult<RelaxResult>;
}

/// Run `relaxer` on `subset`, checking that the point count survives.
pub fn relax(
    subset: SubsetMesh,
    params: &RelaxParams,
    relaxer: &dyn Relaxer,
    progress: Option<&ProgressCallback>,
) -> MeshResult<RelaxResult> {
    let timer = OperationTimer::with_context("relax", subset.point_count(), subset.triangle_count());
    let point_count = subset.point_count();
    debug!(
        target: "mesh_gen::relax",
        relaxer = relaxer.name(),
        max_steps = params.max_steps,
        target_quality = params.target_quality,
        flip_frequency = params.flip_frequency,
        "Relaxing subset mesh"
    );

    let result = relaxer.relax(subset, params, progress)?;
    if result.mesh.point_count() != point_count {
        return Err(MeshError::subset_mismatch(format!(
            "relaxer '{}' returned {} points for {} input points",
            relaxer.name(),
            result.mesh.point_count(),
            point_count
        )));
    }

    log_relax_result(&result.stats, timer.elapsed_ms());
    Ok(result)
}

/// Twice the signed area of the triangle in the xy-plane.
#[inline]
pub(crate) fn doubled_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

#[inline]
pub(crate) fn xy(p: &Point3<f64>) -> Vector2<f64> {
    Vector2::new(p.x, p.y)
}

/// Radius ratio `2 r_in / r_circ` of a planar triangle: 1 for equilateral,
/// 0 for degenerate.
pub fn triangle_quality(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let la = (xy(b) - xy(c)).norm();
    let lb = (xy(c) - xy(a)).norm();
    let lc = (xy(a) - xy(b)).norm();
    let denom = (la + lb + lc) * la * lb * lc;
    if denom <= 0.0 {
        return 0.0;
    }
    let area = 0.5 * doubled_area(a, b, c);
    16.0 * area * area / denom
}

/// Worst triangle quality of a subset mesh (1.0 when it has no triangles).
pub fn min_quality(mesh: &SubsetMesh) -> f64 {
    worst_quality(&mesh.points, &mesh.triangles)
}

pub(crate) fn worst_quality(points: &[Point3<f64>], triangles: &[[usize; 3]]) -> f64 {
    triangles
        .iter()
        .map(|t| triangle_quality(&points[t[0]], &points[t[1]], &points[t[2]]))
        .fold(1.0, f64::min)
}
