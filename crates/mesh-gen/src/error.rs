//! Error types for mesh generation with rich diagnostics.
//!
//! This module provides:
//! - Machine-readable error codes for programmatic handling
//! - Context for every failure (exit code, file path, offending cell)
//! - Recovery suggestions for common issues
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `MESH-XXXX`:
//! - `MESH-1xxx`: I/O and decode errors (reading, writing, parsing mesh files)
//! - `MESH-2xxx`: Data model errors (indices, row counts, missing groups)
//! - `MESH-3xxx`: Relaxation errors
//! - `MESH-5xxx`: Engine errors (the external mesh generator)
//!
//! # Example
//!
//! ```
//! use mesh_gen::{ErrorCode, MeshError};
//!
//! let err = MeshError::engine_failure(1);
//! assert_eq!(err.code(), ErrorCode::EngineFailure);
//! assert!(err.to_string().contains('1'));
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mesh generation operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes.
///
/// Codes follow the pattern `MESH-XXXX` where:
/// - 1xxx = I/O and decode errors
/// - 2xxx = Data model errors
/// - 3xxx = Relaxation errors
/// - 5xxx = Engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// MESH-1001: Failed to read file
    IoRead = 1001,
    /// MESH-1002: Failed to write file
    IoWrite = 1002,
    /// MESH-1003: Mesh file is malformed or unreadable
    DecodeFailure = 1003,
    /// MESH-1004: Unsupported file format
    UnsupportedFormat = 1004,

    // Data model errors (2xxx)
    /// MESH-2001: Cell references invalid point index
    InvalidVertexIndex = 2001,
    /// MESH-2002: Per-item data does not match the item count
    RowCountMismatch = 2002,
    /// MESH-2003: Required cell group is absent
    MissingCellGroup = 2003,
    /// MESH-2004: Required cell field is absent
    MissingCellField = 2004,
    /// MESH-2005: Subset mesh does not match its index mapping
    SubsetMismatch = 2005,

    // Relaxation errors (3xxx)
    /// MESH-3001: Relaxation failed on the subset mesh
    RelaxationFailure = 3001,

    // Engine errors (5xxx)
    /// MESH-5001: Engine exited with a non-zero status
    EngineFailure = 5001,
    /// MESH-5002: Engine could not be started
    EngineSpawn = 5002,
    /// MESH-5003: Engine run was cancelled by the caller
    EngineCancelled = 5003,
    /// MESH-5004: Engine run exceeded its time limit
    EngineTimeout = 5004,
    /// MESH-5005: Geometry script is unusable
    InvalidScript = 5005,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `MESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "MESH-1001",
            ErrorCode::IoWrite => "MESH-1002",
            ErrorCode::DecodeFailure => "MESH-1003",
            ErrorCode::UnsupportedFormat => "MESH-1004",
            ErrorCode::InvalidVertexIndex => "MESH-2001",
            ErrorCode::RowCountMismatch => "MESH-2002",
            ErrorCode::MissingCellGroup => "MESH-2003",
            ErrorCode::MissingCellField => "MESH-2004",
            ErrorCode::SubsetMismatch => "MESH-2005",
            ErrorCode::RelaxationFailure => "MESH-3001",
            ErrorCode::EngineFailure => "MESH-5001",
            ErrorCode::EngineSpawn => "MESH-5002",
            ErrorCode::EngineCancelled => "MESH-5003",
            ErrorCode::EngineTimeout => "MESH-5004",
            ErrorCode::InvalidScript => "MESH-5005",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for mesh errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Check the engine installation or its configuration.
    CheckEngine { checks: Vec<String> },
    /// Inspect the geometry script the engine was given.
    CheckGeometry { checks: Vec<String> },
    /// Ask the engine for a different output format.
    UseDifferentFormat { suggested: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Manual intervention may be required.
    ManualIntervention { description: String },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckEngine { checks } => {
                write!(f, "Check the mesh engine: {}", checks.join(", "))
            }
            RecoverySuggestion::CheckGeometry { checks } => {
                write!(f, "Check the geometry for: {}", checks.join(", "))
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::ManualIntervention { description } => {
                write!(f, "{}", description)
            }
            RecoverySuggestion::None => {
                write!(f, "No automatic recovery available")
            }
        }
    }
}

/// Location information for mesh errors.
#[derive(Debug, Clone)]
pub enum MeshLocation {
    /// Error at a specific point.
    Point { index: usize },
    /// Error at a specific cell of a cell group.
    Cell { cell_type: String, index: usize },
    /// Error in a file, optionally at a specific line.
    File { path: PathBuf, line: Option<usize> },
    /// No specific location.
    Unknown,
}

impl std::fmt::Display for MeshLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshLocation::Point { index } => write!(f, "point {}", index),
            MeshLocation::Cell { cell_type, index } => {
                write!(f, "{} cell {}", cell_type, index)
            }
            MeshLocation::File { path, line } => {
                let mut result = path.display().to_string();
                if let Some(l) = line {
                    result.push_str(&format!(":{}", l));
                }
                write!(f, "{}", result)
            }
            MeshLocation::Unknown => write!(f, "unknown location"),
        }
    }
}

/// Errors that can occur while generating, decoding or relaxing a mesh.
///
/// Each error variant includes:
/// - A human-readable message
/// - A machine-readable error code
/// - Optional location information
/// - Recovery suggestions when available
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error reading from a file.
    #[error("failed to read {path}")]
    #[diagnostic(
        code(mesh::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(mesh::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Mesh file is malformed or unreadable.
    #[error("failed to decode mesh from {path}{}: {details}", line_suffix(.line))]
    #[diagnostic(
        code(mesh::decode::failed),
        help("Only ASCII MSH 2.2 and 4.1 files are understood. Re-run the engine with `-format msh22` if in doubt.")
    )]
    DecodeFailure {
        path: PathBuf,
        line: Option<usize>,
        details: String,
    },

    /// Unsupported file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(code(mesh::format::unsupported), help("Supported formats: MSH (gmsh)"))]
    UnsupportedFormat { extension: Option<String> },

    /// Cell references a point that does not exist.
    #[error(
        "invalid point index: {cell_type} cell {cell_index} references point {point_index}, but mesh only has {point_count} points"
    )]
    #[diagnostic(code(mesh::model::point_index))]
    InvalidVertexIndex {
        cell_type: String,
        cell_index: usize,
        point_index: usize,
        point_count: usize,
    },

    /// Per-item data has the wrong number of rows.
    #[error("{owner} field '{field}' has {actual} rows, expected {expected}")]
    #[diagnostic(code(mesh::model::row_count))]
    RowCountMismatch {
        owner: String,
        field: String,
        expected: usize,
        actual: usize,
    },

    /// The mesh has no cell group of the requested type.
    #[error("mesh has no '{cell_type}' cells")]
    #[diagnostic(code(mesh::model::missing_group))]
    MissingCellGroup { cell_type: String },

    /// The cell group carries no field with the requested name.
    #[error("'{cell_type}' cells carry no '{field}' data")]
    #[diagnostic(code(mesh::model::missing_field))]
    MissingCellField { cell_type: String, field: String },

    /// Subset mesh and its index mapping disagree.
    #[error("subset mesh does not match the full mesh: {details}")]
    #[diagnostic(code(mesh::model::subset))]
    SubsetMismatch { details: String },

    /// The relaxation optimizer failed.
    #[error("relaxation failed: {details}")]
    #[diagnostic(
        code(mesh::relax::failed),
        help("The triangulation is likely degenerate. Inspect it with `meshgen info --detailed`.")
    )]
    RelaxationFailure { details: String },

    /// The engine exited with a non-zero status.
    #[error("mesh engine exited with error (return code {exit_code})")]
    #[diagnostic(
        code(mesh::engine::failed),
        help("Re-run with verbose output to see the engine log.")
    )]
    EngineFailure { exit_code: i32 },

    /// The engine process could not be started.
    #[error("failed to start mesh engine {executable}")]
    #[diagnostic(
        code(mesh::engine::spawn),
        help("Install gmsh or point MESH_GEN_GMSH / --gmsh at the executable.")
    )]
    EngineSpawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine run was cancelled.
    #[error("mesh engine run was cancelled")]
    #[diagnostic(code(mesh::engine::cancelled))]
    EngineCancelled,

    /// The engine run exceeded its time limit.
    #[error("mesh engine did not finish within {seconds:.1}s")]
    #[diagnostic(code(mesh::engine::timeout))]
    EngineTimeout { seconds: f64 },

    /// The geometry script cannot be handed to the engine.
    #[error("invalid geometry script: {details}")]
    #[diagnostic(code(mesh::engine::script))]
    InvalidScript { details: String },
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" (line {})", l)).unwrap_or_default()
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::IoRead { .. } => ErrorCode::IoRead,
            MeshError::IoWrite { .. } => ErrorCode::IoWrite,
            MeshError::DecodeFailure { .. } => ErrorCode::DecodeFailure,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::InvalidVertexIndex { .. } => ErrorCode::InvalidVertexIndex,
            MeshError::RowCountMismatch { .. } => ErrorCode::RowCountMismatch,
            MeshError::MissingCellGroup { .. } => ErrorCode::MissingCellGroup,
            MeshError::MissingCellField { .. } => ErrorCode::MissingCellField,
            MeshError::SubsetMismatch { .. } => ErrorCode::SubsetMismatch,
            MeshError::RelaxationFailure { .. } => ErrorCode::RelaxationFailure,
            MeshError::EngineFailure { .. } => ErrorCode::EngineFailure,
            MeshError::EngineSpawn { .. } => ErrorCode::EngineSpawn,
            MeshError::EngineCancelled => ErrorCode::EngineCancelled,
            MeshError::EngineTimeout { .. } => ErrorCode::EngineTimeout,
            MeshError::InvalidScript { .. } => ErrorCode::InvalidScript,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            MeshError::IoRead { .. } => RecoverySuggestion::ManualIntervention {
                description: "Check that the file exists and is readable".into(),
            },
            MeshError::IoWrite { .. } => RecoverySuggestion::ManualIntervention {
                description: "Check that the output directory exists and is writable".into(),
            },
            MeshError::DecodeFailure { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["MSH 2.2 ASCII".into(), "MSH 4.1 ASCII".into()],
            },
            MeshError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["MSH".into()],
            },
            MeshError::InvalidVertexIndex { .. } | MeshError::RowCountMismatch { .. } => {
                RecoverySuggestion::CheckGeometry {
                    checks: vec!["engine output integrity".into()],
                }
            }
            MeshError::MissingCellGroup { .. } | MeshError::MissingCellField { .. } => {
                RecoverySuggestion::CheckGeometry {
                    checks: vec!["a meshed surface exists".into(), "element tags".into()],
                }
            }
            MeshError::SubsetMismatch { .. } => RecoverySuggestion::ManualIntervention {
                description: "The relaxer changed the vertex count; it must preserve it".into(),
            },
            MeshError::RelaxationFailure { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("num_lloyd_steps".into(), "0 to skip relaxation".into())],
            },
            MeshError::EngineFailure { .. } => RecoverySuggestion::CheckGeometry {
                checks: vec!["script syntax".into(), "closed line loops".into()],
            },
            MeshError::EngineSpawn { .. } => RecoverySuggestion::CheckEngine {
                checks: vec!["gmsh is installed".into(), "executable path".into()],
            },
            MeshError::EngineCancelled => RecoverySuggestion::None,
            MeshError::EngineTimeout { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![
                    ("timeout".into(), "try a larger value".into()),
                    ("characteristic length".into(), "try a coarser mesh".into()),
                ],
            },
            MeshError::InvalidScript { .. } => RecoverySuggestion::CheckGeometry {
                checks: vec!["the geometry produces code".into()],
            },
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<MeshLocation> {
        match self {
            MeshError::InvalidVertexIndex {
                cell_type,
                cell_index,
                ..
            } => Some(MeshLocation::Cell {
                cell_type: cell_type.clone(),
                index: *cell_index,
            }),
            MeshError::DecodeFailure { path, line, .. } => Some(MeshLocation::File {
                path: path.clone(),
                line: *line,
            }),
            MeshError::IoRead { path, .. } | MeshError::IoWrite { path, .. } => {
                Some(MeshLocation::File {
                    path: path.clone(),
                    line: None,
                })
            }
            _ => None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a DecodeFailure error.
    pub fn decode_failure(
        path: impl Into<PathBuf>,
        line: Option<usize>,
        details: impl Into<String>,
    ) -> Self {
        MeshError::DecodeFailure {
            path: path.into(),
            line,
            details: details.into(),
        }
    }

    /// Create a MissingCellField error.
    pub fn missing_cell_field(cell_type: impl Into<String>, field: impl Into<String>) -> Self {
        MeshError::MissingCellField {
            cell_type: cell_type.into(),
            field: field.into(),
        }
    }

    /// Create a SubsetMismatch error.
    pub fn subset_mismatch(details: impl Into<String>) -> Self {
        MeshError::SubsetMismatch {
            details: details.into(),
        }
    }

    /// Create a RelaxationFailure error.
    pub fn relaxation_failure(details: impl Into<String>) -> Self {
        MeshError::RelaxationFailure {
            details: details.into(),
        }
    }

    /// Create an EngineFailure error.
    pub fn engine_failure(exit_code: i32) -> Self {
        MeshError::EngineFailure { exit_code }
    }
}
