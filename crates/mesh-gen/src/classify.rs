//! Deciding whether a mesh can be relaxed.
//!
//! Relaxation only makes sense for a flat triangulation of a single region:
//! every point lies in the `z = 0` plane, there is a triangle group, and all
//! triangles carry the same geometrical tag.
//!
//! A planar single-region mesh with local refinement also passes; relaxing it
//! evens out the refinement. Callers who rely on graded meshes should set the
//! relaxation budget to zero.

use std::fmt;

use crate::types::Mesh;

/// Points with `|z|` below this count as lying in the plane.
pub const PLANAR_TOLERANCE: f64 = 1e-15;

/// Outcome of [`classify`], naming the first predicate that failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eligibility {
    /// The mesh can be relaxed.
    Eligible { region: i32, triangles: usize },
    /// A point lies off the `z = 0` plane.
    NotPlanar { point: usize, z: f64 },
    /// There are no triangles.
    NoTriangles,
    /// The triangles carry no geometrical tags.
    MissingRegionTag,
    /// Triangles belong to more than one region.
    MixedRegions { first: i32, other: i32, cell: usize },
}

impl Eligibility {
    /// Whether relaxation should run.
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }

    /// The region tag shared by all triangles, when eligible.
    pub fn region(&self) -> Option<i32> {
        match self {
            Eligibility::Eligible { region, .. } => Some(*region),
            _ => None,
        }
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eligibility::Eligible { region, triangles } => {
                write!(f, "eligible ({} triangles in region {})", triangles, region)
            }
            Eligibility::NotPlanar { point, z } => {
                write!(f, "not planar (point {} has z = {:e})", point, z)
            }
            Eligibility::NoTriangles => write!(f, "no triangles"),
            Eligibility::MissingRegionTag => write!(f, "triangles carry no region tags"),
            Eligibility::MixedRegions { first, other, cell } => write!(
                f,
                "mixed regions (triangle {} is in region {}, expected {})",
                cell, other, first
            ),
        }
    }
}

/// Check the predicates in order and report the first failure.
pub fn classify(mesh: &Mesh) -> Eligibility {
    if let Some((point, p)) = mesh
        .points
        .iter()
        .enumerate()
        .find(|(_, p)| !(p.z.abs() < PLANAR_TOLERANCE))
    {
        return Eligibility::NotPlanar { point, z: p.z };
    }

    let Ok(triangles) = mesh.triangles() else {
        return Eligibility::NoTriangles;
    };
    if triangles.is_empty() {
        return Eligibility::NoTriangles;
    }

    let Ok(tags) = triangles.geometrical() else {
        return Eligibility::MissingRegionTag;
    };
    let Some(&first) = tags.first() else {
        return Eligibility::MissingRegionTag;
    };
    if let Some((cell, &other)) = tags.iter().enumerate().find(|&(_, &t)| t != first) {
        return Eligibility::MixedRegions { first, other, cell };
    }

    Eligibility::Eligible {
        region: first,
        triangles: triangles.len(),
    }
}

/// Whether the mesh is a planar single-region triangulation.
pub fn is_relaxable(mesh: &Mesh) -> bool {
    classify(mesh).is_eligible()
}
