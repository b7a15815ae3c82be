//! Writing a relaxed subset back into the full mesh.
//!
//! Subset point `i` replaces full-mesh point `original_index[i]`, and the
//! triangle connectivity is rebuilt from the subset triangles. Points no
//! triangle uses, other cell groups, tags and data arrays are left alone.

use tracing::debug;

use crate::error::{MeshError, MeshResult};
use crate::subset::SubsetMesh;
use crate::types::Mesh;

/// Merge `subset` into `mesh` through `original_index`.
///
/// Nothing is modified unless every check passes.
pub fn merge(mesh: &mut Mesh, subset: &SubsetMesh, original_index: &[usize]) -> MeshResult<()> {
    if subset.point_count() != original_index.len() {
        return Err(MeshError::subset_mismatch(format!(
            "{} subset points but {} index entries",
            subset.point_count(),
            original_index.len()
        )));
    }
    let point_count = mesh.points.len();
    if let Some(&bad) = original_index.iter().find(|&&i| i >= point_count) {
        return Err(MeshError::subset_mismatch(format!(
            "index entry {} is out of range for {} points",
            bad, point_count
        )));
    }
    if let Some(&bad) = subset
        .triangles
        .iter()
        .flatten()
        .find(|&&v| v >= original_index.len())
    {
        return Err(MeshError::subset_mismatch(format!(
            "subset triangle references point {}, but the subset has {} points",
            bad,
            original_index.len()
        )));
    }

    let existing = mesh.triangles()?.len();
    if subset.triangle_count() != existing {
        return Err(MeshError::subset_mismatch(format!(
            "{} relaxed triangles for {} triangles in the mesh",
            subset.triangle_count(),
            existing
        )));
    }

    let connectivity: Vec<usize> = subset
        .triangles
        .iter()
        .flat_map(|t| t.map(|v| original_index[v]))
        .collect();
    mesh.triangles_mut()?.replace_connectivity(connectivity)?;

    for (p, &target) in subset.points.iter().zip(original_index) {
        mesh.points[target] = *p;
    }

    debug!(
        target: "mesh_gen::merge",
        points = original_index.len(),
        triangles = existing,
        "Merged relaxed subset"
    );
    Ok(())
}
