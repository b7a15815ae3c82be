//! Generating meshes end to end.
//!
//! A generation run goes through these stages:
//!
//! 1. Render the geometry to script text ([`GeoScript`]).
//! 2. Run the engine on it and decode the output ([`EngineDriver`]).
//! 3. Decide whether the mesh is a planar single-region triangulation
//!    ([`classify`]).
//! 4. If it is, project the triangles onto the points they use, relax that
//!    subset, and merge the result back ([`project`], [`relax`], [`merge`]).
//!
//! Meshes that are not eligible come back exactly as the engine produced them.
//!
//! # Example
//!
//! ```no_run
//! use mesh_gen::{EngineConfig, Generator, Geometry};
//! use nalgebra::Point3;
//!
//! let mut geometry = Geometry::new();
//! geometry.add_polygon(
//!     &[
//!         Point3::new(0.0, 0.0, 0.0),
//!         Point3::new(1.0, 0.0, 0.0),
//!         Point3::new(1.0, 1.0, 0.0),
//!         Point3::new(0.0, 1.0, 0.0),
//!     ],
//!     Some(0.1),
//! )?;
//!
//! let result = Generator::new(EngineConfig::detect())
//!     .lloyd_steps(200)
//!     .generate(&geometry)?;
//!
//! println!("{} points", result.mesh.point_count());
//! for line in &result.operation_log {
//!     println!("{}", line);
//! }
//! # Ok::<(), mesh_gen::MeshError>(())
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::{Eligibility, classify};
use crate::engine::{EngineConfig, EngineDriver, EngineEvent, EngineOptions};
use crate::error::MeshResult;
use crate::geometry::GeoScript;
use crate::lloyd::LloydRelaxer;
use crate::merge::merge;
use crate::progress::{CancellationToken, ProgressCallback};
use crate::relax::{RelaxParams, RelaxStats, Relaxer, relax};
use crate::subset::{Projection, project};
use crate::tracing_ext::{OperationTimer, log_eligibility, log_mesh_stats};
use crate::types::Mesh;

/// Parameters for a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateParams {
    /// Ask the engine to optimize element quality (`-optimize`).
    /// Default: true
    pub optimize: bool,

    /// Lloyd iterations run inside the engine (`-optimize_lloyd`); 0 skips them.
    /// Default: 10
    pub num_quad_lloyd_steps: usize,

    /// Step budget for relaxing eligible meshes; 0 skips relaxation.
    /// Default: 1000
    pub num_lloyd_steps: usize,

    /// Stream engine output and log relaxation steps.
    /// Default: true
    pub verbose: bool,

    /// Delaunay flips before every k-th relaxation step; 0 disables flips.
    /// Default: 1
    pub flip_frequency: usize,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            optimize: true,
            num_quad_lloyd_steps: 10,
            num_lloyd_steps: 1000,
            verbose: true,
            flip_frequency: 1,
        }
    }
}

impl GenerateParams {
    /// Quiet run without relaxation; the engine output is returned as is.
    pub fn engine_only() -> Self {
        Self {
            num_lloyd_steps: 0,
            verbose: false,
            ..Default::default()
        }
    }

    /// The engine flags for these parameters.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            optimize: self.optimize,
            lloyd_iterations: self.num_quad_lloyd_steps,
            verbose: self.verbose,
        }
    }

    /// The relaxation parameters for these parameters.
    pub fn relax_params(&self) -> RelaxParams {
        RelaxParams {
            target_quality: 0.0,
            max_steps: self.num_lloyd_steps,
            flip_frequency: self.flip_frequency,
            verbose: self.verbose,
        }
    }
}

/// What relaxation did to an eligible mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelaxSummary {
    /// Region tag shared by all triangles.
    pub region: i32,
    /// Points handed to the relaxer.
    pub vertices: usize,
    /// Triangles handed to the relaxer.
    pub triangles: usize,
    /// Name of the relaxer.
    pub relaxer: &'static str,
    pub stats: RelaxStats,
}

/// Result of a generation run.
#[derive(Debug)]
pub struct GenerateResult {
    /// The generated mesh.
    pub mesh: Mesh,
    /// Classifier verdict on the engine output.
    pub eligibility: Eligibility,
    /// Present when relaxation ran.
    pub relaxation: Option<RelaxSummary>,
    /// Log of stages performed.
    pub operation_log: Vec<String>,
}

/// Generate a mesh for `geometry` with the stock relaxer.
///
/// This is the one-call form of [`Generator`].
pub fn generate_mesh(
    geometry: &(impl GeoScript + ?Sized),
    params: &GenerateParams,
    config: &EngineConfig,
) -> MeshResult<Mesh> {
    Generator::new(config.clone())
        .params(params.clone())
        .generate(geometry)
        .map(|result| result.mesh)
}

/// Relax an already decoded mesh in place when it is eligible.
///
/// Returns `None` when the mesh is not a planar single-region triangulation
/// or the step budget is zero; the mesh is then untouched.
pub fn relax_mesh(
    mesh: &mut Mesh,
    params: &RelaxParams,
    relaxer: &dyn Relaxer,
) -> MeshResult<Option<RelaxSummary>> {
    relax_mesh_with_progress(mesh, params, relaxer, None)
}

/// [`relax_mesh`] with progress reporting.
pub fn relax_mesh_with_progress(
    mesh: &mut Mesh,
    params: &RelaxParams,
    relaxer: &dyn Relaxer,
    progress: Option<&ProgressCallback>,
) -> MeshResult<Option<RelaxSummary>> {
    let eligibility = classify(mesh);
    log_eligibility(&eligibility);
    relax_classified(mesh, &eligibility, params, relaxer, progress)
}

fn relax_classified(
    mesh: &mut Mesh,
    eligibility: &Eligibility,
    params: &RelaxParams,
    relaxer: &dyn Relaxer,
    progress: Option<&ProgressCallback>,
) -> MeshResult<Option<RelaxSummary>> {
    let Some(region) = eligibility.region() else {
        return Ok(None);
    };
    if params.max_steps == 0 {
        debug!(target: "mesh_gen::relax", "Relaxation step budget is zero, skipping");
        return Ok(None);
    }

    let Projection {
        subset,
        original_index,
    } = project(mesh)?;
    let vertices = subset.point_count();
    let triangles = subset.triangle_count();

    let result = relax(subset, params, relaxer, progress)?;
    merge(mesh, &result.mesh, &original_index)?;

    Ok(Some(RelaxSummary {
        region,
        vertices,
        triangles,
        relaxer: relaxer.name(),
        stats: result.stats,
    }))
}

/// Boxed sink for engine events.
pub type EventSink = Box<dyn FnMut(&EngineEvent) + Send>;

/// Fluent builder for generation runs.
///
/// # Example
///
/// ```no_run
/// use mesh_gen::{EngineConfig, EngineEvent, Generator};
///
/// let result = Generator::new(EngineConfig::detect())
///     .optimize(false)
///     .lloyd_steps(0)
///     .with_events(Box::new(|event: &EngineEvent| {
///         if let EngineEvent::OutputLine(line) = event {
///             eprintln!("gmsh: {}", line);
///         }
///     }))
///     .generate("Point(1) = {0, 0, 0, 0.1};")?;
/// # Ok::<(), mesh_gen::MeshError>(())
/// ```
pub struct Generator {
    config: EngineConfig,
    params: GenerateParams,
    events: Option<EventSink>,
    progress_callback: Option<ProgressCallback>,
    relaxer: Box<dyn Relaxer>,
    cancel: CancellationToken,
    operation_log: Vec<String>,
}

impl Generator {
    /// Start a generator for the given engine with default parameters.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            params: GenerateParams::default(),
            events: None,
            progress_callback: None,
            relaxer: Box::new(LloydRelaxer::default()),
            cancel: CancellationToken::new(),
            operation_log: Vec::new(),
        }
    }

    /// Replace all parameters.
    pub fn params(mut self, params: GenerateParams) -> Self {
        self.params = params;
        self
    }

    /// Toggle engine-side optimization.
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.params.optimize = optimize;
        self
    }

    /// Engine-side Lloyd iterations.
    pub fn engine_lloyd_steps(mut self, steps: usize) -> Self {
        self.params.num_quad_lloyd_steps = steps;
        self
    }

    /// Relaxation step budget.
    pub fn lloyd_steps(mut self, steps: usize) -> Self {
        self.params.num_lloyd_steps = steps;
        self
    }

    /// Stream engine output and log relaxation steps.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.params.verbose = verbose;
        self
    }

    /// Delaunay flip frequency during relaxation.
    pub fn flip_frequency(mut self, every: usize) -> Self {
        self.params.flip_frequency = every;
        self
    }

    /// Receive engine output lines and the exit event.
    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Set a progress callback for relaxation.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Use a different relaxer.
    pub fn with_relaxer(mut self, relaxer: Box<dyn Relaxer>) -> Self {
        self.relaxer = relaxer;
        self
    }

    /// Stop the engine run when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Current parameters.
    pub fn current_params(&self) -> &GenerateParams {
        &self.params
    }

    /// Run all stages on `geometry`.
    pub fn generate(mut self, geometry: &(impl GeoScript + ?Sized)) -> MeshResult<GenerateResult> {
        let _timer = OperationTimer::new("generate");
        let script = geometry.get_code();
        self.log(format!("Rendered geometry script ({} bytes)", script.len()));

        let driver = EngineDriver::new(self.config.clone()).with_cancellation(self.cancel.clone());
        let sink = self
            .events
            .as_deref_mut()
            .map(|f| f as &mut dyn FnMut(&EngineEvent));
        let mut mesh = driver.run(&script, &self.params.engine_options(), sink)?;
        log_mesh_stats(&mesh, "engine output");
        self.log(format!(
            "Meshed with {} ({} points, {} cells)",
            self.config.executable.display(),
            mesh.point_count(),
            mesh.cell_count()
        ));

        let span = crate::mesh_span!("relax_stage", mesh);
        let _guard = span.enter();

        let eligibility = classify(&mesh);
        log_eligibility(&eligibility);
        self.log(format!("Classified mesh: {}", eligibility));

        let relaxation = relax_classified(
            &mut mesh,
            &eligibility,
            &self.params.relax_params(),
            self.relaxer.as_ref(),
            self.progress_callback.as_ref(),
        )?;
        match &relaxation {
            Some(summary) => {
                log_mesh_stats(&mesh, "relaxed");
                self.log(format!(
                    "Relaxed {} triangles in region {} with {} ({} steps, {} flips)",
                    summary.triangles,
                    summary.region,
                    summary.relaxer,
                    summary.stats.steps,
                    summary.stats.edges_flipped
                ));
            }
            None => self.log("Skipped relaxation".to_string()),
        }

        info!(
            target: "mesh_gen::timing",
            points = mesh.point_count(),
            cells = mesh.cell_count(),
            relaxed = relaxation.is_some(),
            "Mesh generated"
        );
        Ok(GenerateResult {
            mesh,
            eligibility,
            relaxation,
            operation_log: self.operation_log,
        })
    }

    fn log(&mut self, message: String) {
        self.operation_log.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MeshError;
    use crate::relax::RelaxResult;
    use crate::subset::SubsetMesh;
    use crate::types::{CellGroup, CellType};
    use nalgebra::Point3;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Moves nothing and counts its calls.
    struct Identity(Arc<AtomicUsize>);

    impl Relaxer for Identity {
        fn name(&self) -> &'static str {
            "identity"
        }

        fn relax(
            &self,
            mesh: SubsetMesh,
            params: &RelaxParams,
            _progress: Option<&ProgressCallback>,
        ) -> MeshResult<RelaxResult> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RelaxResult {
                mesh,
                stats: RelaxStats {
                    steps: params.max_steps,
                    ..Default::default()
                },
            })
        }
    }

    fn fan(tags: Vec<i32>) -> Mesh {
        let mut mesh = Mesh::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.3, 0.4, 0.0),
        ]);
        mesh.insert_cells(
            CellGroup::from_rows(CellType::Triangle, &[[0, 1, 4], [1, 2, 4], [2, 3, 4], [3, 0, 4]])
                .unwrap()
                .with_geometrical(tags),
        );
        mesh
    }

    #[test]
    fn test_params_default() {
        let params = GenerateParams::default();
        assert!(params.optimize);
        assert_eq!(params.num_quad_lloyd_steps, 10);
        assert_eq!(params.num_lloyd_steps, 1000);
        assert!(params.verbose);

        let options = params.engine_options();
        assert_eq!(options, EngineOptions::default());
        let relax = params.relax_params();
        assert_eq!(relax.max_steps, 1000);
        assert_eq!(relax.target_quality, 0.0);
        assert_eq!(relax.flip_frequency, 1);
    }

    #[test]
    fn test_params_partial_json() {
        let params: GenerateParams = serde_json::from_str(r#"{"num_lloyd_steps": 5}"#).unwrap();
        assert_eq!(params.num_lloyd_steps, 5);
        assert!(params.optimize);
    }

    #[test]
    fn test_builder_setters() {
        let generator = Generator::new(EngineConfig::new("gmsh"))
            .optimize(false)
            .engine_lloyd_steps(0)
            .lloyd_steps(3)
            .verbose(false)
            .flip_frequency(2);
        let params = generator.current_params();
        assert!(!params.optimize);
        assert_eq!(params.num_quad_lloyd_steps, 0);
        assert_eq!(params.num_lloyd_steps, 3);
        assert!(!params.verbose);
        assert_eq!(params.flip_frequency, 2);
    }

    #[test]
    fn test_relax_mesh_eligible() {
        let mut mesh = fan(vec![7; 4]);
        let summary = relax_mesh(&mut mesh, &RelaxParams::with_max_steps(50), &LloydRelaxer::default())
            .unwrap()
            .unwrap();
        assert_eq!(summary.region, 7);
        assert_eq!(summary.vertices, 5);
        assert_eq!(summary.triangles, 4);
        assert_eq!(summary.relaxer, "lloyd");
        // Corners are boundary points.
        assert_eq!(mesh.points[0], Point3::new(0.0, 0.0, 0.0));
        assert!((mesh.points[4].x - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_relax_mesh_skips_mixed_regions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mesh = fan(vec![1, 1, 2, 1]);
        let before = mesh.clone();
        let summary =
            relax_mesh(&mut mesh, &RelaxParams::default(), &Identity(calls.clone())).unwrap();
        assert!(summary.is_none());
        assert_eq!(mesh, before);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_relax_mesh_zero_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mesh = fan(vec![1; 4]);
        let summary =
            relax_mesh(&mut mesh, &RelaxParams::with_max_steps(0), &Identity(calls.clone()))
                .unwrap();
        assert!(summary.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_relax_mesh_identity_round_trip() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mesh = fan(vec![4; 4]);
        mesh.points.push(Point3::new(9.0, 9.0, 0.0));
        let before = mesh.clone();
        let summary =
            relax_mesh(&mut mesh, &RelaxParams::with_max_steps(1), &Identity(calls.clone()))
                .unwrap()
                .unwrap();
        assert_eq!(summary.stats.steps, 1);
        assert_eq!(summary.vertices, 5);
        assert_eq!(mesh, before);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_generate_rejects_empty_script() {
        let err = Generator::new(EngineConfig::new("gmsh"))
            .generate("   ")
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidScript { .. }));
    }

    #[test]
    fn test_generate_missing_engine() {
        let err = generate_mesh(
            &"Point(1) = {0, 0, 0};",
            &GenerateParams::engine_only(),
            &EngineConfig::new("/nonexistent/mesh-gen-engine"),
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::EngineSpawn { .. }));
    }
}
