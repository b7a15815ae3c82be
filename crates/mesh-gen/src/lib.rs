//! Mesh generation through an external gmsh engine, with Lloyd relaxation
//! of planar single-region triangulations.
//!
//! The crate turns a geometry description into a mesh in four stages:
//!
//! - **Script**: a [`Geometry`] (or any [`GeoScript`]) renders gmsh `.geo` code.
//! - **Engine**: [`EngineDriver`] runs gmsh on a scratch copy of the script
//!   and decodes the `.msh` it writes ([`msh`]).
//! - **Classify**: [`classify`] decides whether the mesh is a flat
//!   triangulation of a single region.
//! - **Relax**: eligible meshes have their triangles projected onto the
//!   points they use ([`project`]), relaxed by a [`Relaxer`] (Lloyd by
//!   default), and merged back ([`merge`]).
//!
//! Anything that is not eligible (volume meshes, surfaces in 3D, several
//! regions) comes back exactly as the engine wrote it.
//!
//! # Engine
//!
//! The engine executable is resolved once into an [`EngineConfig`]:
//! [`EngineConfig::detect`] honours the `MESH_GEN_GMSH` environment variable
//! and falls back to the platform default (`gmsh` on the `PATH`, the app
//! bundle on macOS). Every run gets its own scratch files, removed on every
//! exit path.
//!
//! # Quick Start
//!
//! ```no_run
//! use mesh_gen::{EngineConfig, GenerateParams, Geometry, generate_mesh};
//!
//! let mut geometry = Geometry::new();
//! geometry.add_rectangle((0.0, 2.0), (0.0, 1.0), 0.0, Some(0.1))?;
//!
//! let mesh = generate_mesh(&geometry, &GenerateParams::default(), &EngineConfig::detect())?;
//! println!("{} points, {} cells", mesh.point_count(), mesh.cell_count());
//! # Ok::<(), mesh_gen::MeshError>(())
//! ```
//!
//! # Relaxing an Existing Mesh
//!
//! ```no_run
//! use mesh_gen::{LloydRelaxer, RelaxParams, load_mesh, relax_mesh, write_msh};
//! use std::path::Path;
//!
//! let mut mesh = load_mesh(Path::new("square.msh"))?;
//! if let Some(summary) = relax_mesh(&mut mesh, &RelaxParams::default(), &LloydRelaxer::default())? {
//!     println!("relaxed region {} in {} steps", summary.region, summary.stats.steps);
//! }
//! write_msh(&mesh, Path::new("square-relaxed.msh"))?;
//! # Ok::<(), mesh_gen::MeshError>(())
//! ```
//!
//! # Features
//!
//! - `config`: TOML/JSON generator configuration files ([`config`]).

mod error;
mod pipeline;
pub mod tracing_ext;
mod types;

pub mod classify;
pub mod engine;
pub mod geometry;
pub mod lloyd;
pub mod merge;
pub mod msh;
pub mod progress;
pub mod relax;
pub mod subset;

#[cfg(feature = "config")]
pub mod config;

// Re-export core types at crate root
pub use error::{ErrorCode, MeshError, MeshLocation, MeshResult, RecoverySuggestion};
pub use types::{CellGroup, CellType, FieldArray, Mesh};

pub use classify::{Eligibility, PLANAR_TOLERANCE, classify, is_relaxable};
pub use engine::{EngineConfig, EngineDriver, EngineEvent, EngineOptions, engine_args};
pub use geometry::{GeoScript, Geometry, rotation_matrix};
pub use lloyd::LloydRelaxer;
pub use merge::merge;
pub use msh::{load_mesh, parse_msh, read_msh, write_msh};
pub use progress::{CancellationToken, Progress, ProgressCallback};
pub use relax::{RelaxParams, RelaxResult, RelaxStats, Relaxer, relax};
pub use subset::{Projection, SubsetMesh, project};

pub use pipeline::{
    EventSink, GenerateParams, GenerateResult, Generator, RelaxSummary, generate_mesh, relax_mesh,
    relax_mesh_with_progress,
};

#[cfg(feature = "config")]
pub use config::{EngineSettings, GeneratorConfig};
