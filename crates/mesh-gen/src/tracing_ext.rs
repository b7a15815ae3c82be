//! Tracing extensions for mesh generation.
//!
//! Structured logging and timing for the pipeline stages. Everything is
//! emitted through `tracing`; the library never installs a subscriber.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=mesh_gen=debug for stage details,
//! // RUST_LOG=mesh_gen::engine=trace to see every engine line.
//! ```
//!
//! # Targets
//!
//! - `mesh_gen::engine`: engine command line and output
//! - `mesh_gen::timing`: per-stage durations
//! - `mesh_gen::mesh_state`: mesh dimensions between stages
//! - `mesh_gen::relax`: relaxation statistics
//! - `mesh_gen::io`: file reads and writes

use std::ffi::OsString;
use std::path::Path;
use std::time::Instant;

use tracing::{Span, debug, info, warn};

use crate::classify::Eligibility;
use crate::relax::RelaxStats;
use crate::types::Mesh;

/// A performance timer that logs duration on drop.
///
/// # Example
///
/// ```rust,ignore
/// use mesh_gen::tracing_ext::OperationTimer;
///
/// fn decode() {
///     let _timer = OperationTimer::new("decode");
///     // ... do work ...
/// } // Timer logs duration when dropped
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("mesh_stage", stage = name);
        debug!(target: "mesh_gen::timing", stage = name, "Starting stage");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer that also records the mesh size going in.
    pub fn with_context(name: &'static str, point_count: usize, cell_count: usize) -> Self {
        let span = tracing::info_span!(
            "mesh_stage",
            stage = name,
            points = point_count,
            cells = cell_count
        );
        debug!(
            target: "mesh_gen::timing",
            stage = name,
            points = point_count,
            cells = cell_count,
            "Starting stage"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Get the elapsed time.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Get the span for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "mesh_gen::timing",
            stage = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Stage completed"
        );
    }
}

/// Log mesh statistics at debug level.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let (min_bounds, max_bounds) = mesh.bounds().unwrap_or_default();
    let dims = max_bounds - min_bounds;
    let groups: Vec<String> = mesh
        .cells
        .values()
        .map(|g| format!("{}={}", g.cell_type(), g.len()))
        .collect();

    debug!(
        target: "mesh_gen::mesh_state",
        context = context,
        points = mesh.point_count(),
        cells = mesh.cell_count(),
        groups = groups.join(" "),
        dimensions = format!("{:.3} x {:.3} x {:.3}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log the exact engine command line.
pub fn log_engine_command(executable: &Path, args: &[OsString]) {
    let rendered: Vec<String> = args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    info!(
        target: "mesh_gen::engine",
        executable = %executable.display(),
        args = rendered.join(" "),
        "Running mesh engine"
    );
}

/// Log the classifier verdict.
pub fn log_eligibility(eligibility: &Eligibility) {
    match eligibility {
        Eligibility::Eligible { region, triangles } => info!(
            target: "mesh_gen::relax",
            region = region,
            triangles = triangles,
            "Mesh is a planar single-region triangulation, relaxing"
        ),
        other => debug!(
            target: "mesh_gen::relax",
            reason = %other,
            "Mesh not eligible for relaxation, returning engine output unchanged"
        ),
    }
}

/// Log relaxation statistics.
pub fn log_relax_result(stats: &RelaxStats, elapsed_ms: f64) {
    if stats.converged {
        info!(
            target: "mesh_gen::relax",
            steps = stats.steps,
            edges_flipped = stats.edges_flipped,
            quality_before = format!("{:.4}", stats.min_quality_before),
            quality_after = format!("{:.4}", stats.min_quality_after),
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Relaxation converged"
        );
    } else {
        info!(
            target: "mesh_gen::relax",
            steps = stats.steps,
            edges_flipped = stats.edges_flipped,
            quality_before = format!("{:.4}", stats.min_quality_before),
            quality_after = format!("{:.4}", stats.min_quality_after),
            max_move = format!("{:.3e}", stats.max_final_move),
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Relaxation stopped at step budget"
        );
    }
}

/// Log a file I/O operation.
pub fn log_io_operation(operation: &str, path: &Path, success: bool) {
    if success {
        debug!(
            target: "mesh_gen::io",
            operation = operation,
            path = %path.display(),
            "I/O operation completed"
        );
    } else {
        warn!(
            target: "mesh_gen::io",
            operation = operation,
            path = %path.display(),
            "I/O operation failed"
        );
    }
}

/// Create a span carrying the mesh size.
#[macro_export]
macro_rules! mesh_span {
    ($name:expr, $mesh:expr) => {
        tracing::info_span!(
            $name,
            points = $mesh.point_count(),
            cells = $mesh.cell_count()
        )
    };
    ($name:expr, $mesh:expr, $($field:tt)*) => {
        tracing::info_span!(
            $name,
            points = $mesh.point_count(),
            cells = $mesh.cell_count(),
            $($field)*
        )
    };
}
