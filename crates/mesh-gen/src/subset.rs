//! Extracting the triangle subset of a mesh with dense indices.
//!
//! A decoded mesh has points that no triangle references (corner points of
//! the geometry, for instance). The relaxer only sees the points the
//! triangles use, renumbered `0..M`; `original_index[i]` remembers where
//! subset point `i` came from.

use nalgebra::Point3;

use crate::error::{MeshError, MeshResult};
use crate::types::Mesh;

/// A triangle-only mesh with dense point indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubsetMesh {
    pub points: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl SubsetMesh {
    /// Create a subset mesh from parts.
    pub fn new(points: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        Self { points, triangles }
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// A subset mesh plus the mapping back into the full mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub subset: SubsetMesh,
    /// Sorted, de-duplicated full-mesh indices of the subset points.
    pub original_index: Vec<usize>,
}

/// Project the triangle group onto the points it references.
pub fn project(mesh: &Mesh) -> MeshResult<Projection> {
    let triangles = mesh.triangles()?;

    let mut original_index = triangles.connectivity().to_vec();
    original_index.sort_unstable();
    original_index.dedup();

    if let Some(&last) = original_index.last() {
        if last >= mesh.points.len() {
            return Err(MeshError::InvalidVertexIndex {
                cell_type: triangles.cell_type().name().into(),
                cell_index: triangles
                    .cells()
                    .position(|c| c.contains(&last))
                    .unwrap_or_default(),
                point_index: last,
                point_count: mesh.points.len(),
            });
        }
    }

    // Every connectivity entry is in `original_index`, so the search hits.
    let local = |i: usize| original_index.binary_search(&i).unwrap_or_default();
    let subset_triangles = triangles
        .cells()
        .map(|c| [local(c[0]), local(c[1]), local(c[2])])
        .collect();
    let points = original_index.iter().map(|&i| mesh.points[i]).collect();

    Ok(Projection {
        subset: SubsetMesh::new(points, subset_triangles),
        original_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellGroup, CellType};

    #[test]
    fn test_projection_drops_unreferenced_points() {
        let mut mesh = Mesh::from_points(vec![
            Point3::new(9.0, 9.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(8.0, 8.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        mesh.insert_cells(CellGroup::from_rows(CellType::Triangle, &[[4, 1, 3]]).unwrap());
        mesh.insert_cells(CellGroup::from_rows(CellType::Vertex, &[[0], [2]]).unwrap());

        let projection = project(&mesh).unwrap();
        assert_eq!(projection.original_index, vec![1, 3, 4]);
        assert_eq!(projection.subset.triangles, vec![[2, 0, 1]]);
        assert_eq!(projection.subset.points[2], Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_projection_indices_are_dense() {
        let mut mesh = Mesh::from_points((0..6).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect());
        mesh.insert_cells(
            CellGroup::from_rows(CellType::Triangle, &[[5, 3, 1], [1, 3, 0]]).unwrap(),
        );
        let projection = project(&mesh).unwrap();
        let m = projection.subset.point_count();
        assert_eq!(m, projection.original_index.len());
        assert!(projection.subset.triangles.iter().flatten().all(|&i| i < m));
        for (i, &orig) in projection.original_index.iter().enumerate() {
            assert_eq!(projection.subset.points[i], mesh.points[orig]);
        }
    }

    #[test]
    fn test_projection_without_triangles() {
        let mesh = Mesh::from_points(vec![Point3::origin()]);
        assert!(matches!(
            project(&mesh),
            Err(MeshError::MissingCellGroup { .. })
        ));
    }

    #[test]
    fn test_projection_rejects_dangling_index() {
        let mut mesh = Mesh::from_points(vec![Point3::origin(); 3]);
        mesh.insert_cells(CellGroup::from_rows(CellType::Triangle, &[[0, 1, 7]]).unwrap());
        assert!(matches!(
            project(&mesh),
            Err(MeshError::InvalidVertexIndex { point_index: 7, .. })
        ));
    }
}
