//! Core mesh data types.
//!
//! A [`Mesh`] holds points, one [`CellGroup`] per element type, and named
//! per-point and global data arrays. Cell-level data lives on the group it
//! belongs to, so the region tag of a triangle is reached through
//! [`CellGroup::geometrical`] rather than a chain of string lookups.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::Point3;

use crate::error::{MeshError, MeshResult};

/// Element types understood by the decoder, keyed by their gmsh element id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CellType {
    Vertex,
    Line,
    Triangle,
    Quad,
    Tetra,
    Hexahedron,
    Wedge,
    Pyramid,
    Line3,
    Triangle6,
    Quad9,
    Tetra10,
}

impl CellType {
    /// All supported element types.
    pub const ALL: [CellType; 12] = [
        CellType::Vertex,
        CellType::Line,
        CellType::Triangle,
        CellType::Quad,
        CellType::Tetra,
        CellType::Hexahedron,
        CellType::Wedge,
        CellType::Pyramid,
        CellType::Line3,
        CellType::Triangle6,
        CellType::Quad9,
        CellType::Tetra10,
    ];

    /// Number of nodes per element.
    pub fn nodes_per_cell(&self) -> usize {
        match self {
            CellType::Vertex => 1,
            CellType::Line => 2,
            CellType::Triangle => 3,
            CellType::Quad => 4,
            CellType::Tetra => 4,
            CellType::Hexahedron => 8,
            CellType::Wedge => 6,
            CellType::Pyramid => 5,
            CellType::Line3 => 3,
            CellType::Triangle6 => 6,
            CellType::Quad9 => 9,
            CellType::Tetra10 => 10,
        }
    }

    /// Topological dimension of the element.
    pub fn dimension(&self) -> usize {
        match self {
            CellType::Vertex => 0,
            CellType::Line | CellType::Line3 => 1,
            CellType::Triangle | CellType::Quad | CellType::Triangle6 | CellType::Quad9 => 2,
            CellType::Tetra
            | CellType::Hexahedron
            | CellType::Wedge
            | CellType::Pyramid
            | CellType::Tetra10 => 3,
        }
    }

    /// The gmsh element type id.
    pub fn gmsh_id(&self) -> u32 {
        match self {
            CellType::Line => 1,
            CellType::Triangle => 2,
            CellType::Quad => 3,
            CellType::Tetra => 4,
            CellType::Hexahedron => 5,
            CellType::Wedge => 6,
            CellType::Pyramid => 7,
            CellType::Line3 => 8,
            CellType::Triangle6 => 9,
            CellType::Quad9 => 10,
            CellType::Tetra10 => 11,
            CellType::Vertex => 15,
        }
    }

    /// Look up an element type from its gmsh id.
    pub fn from_gmsh_id(id: u32) -> Option<Self> {
        CellType::ALL.into_iter().find(|t| t.gmsh_id() == id)
    }

    /// Conventional lowercase name (`"triangle"`, `"tetra"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            CellType::Vertex => "vertex",
            CellType::Line => "line",
            CellType::Triangle => "triangle",
            CellType::Quad => "quad",
            CellType::Tetra => "tetra",
            CellType::Hexahedron => "hexahedron",
            CellType::Wedge => "wedge",
            CellType::Pyramid => "pyramid",
            CellType::Line3 => "line3",
            CellType::Triangle6 => "triangle6",
            CellType::Quad9 => "quad9",
            CellType::Tetra10 => "tetra10",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CellType {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| MeshError::MissingCellGroup {
                cell_type: s.to_string(),
            })
    }
}

/// A row-major array of `f64` values with a fixed number of components per row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldArray {
    /// Values per row (1 for scalars, 3 for vectors, ...).
    pub components: usize,
    /// Flattened row-major values.
    pub values: Vec<f64>,
}

impl FieldArray {
    /// Create an array, checking that `values` splits into whole rows.
    pub fn new(components: usize, values: Vec<f64>) -> Option<Self> {
        if components == 0 || values.len() % components != 0 {
            return None;
        }
        Some(Self { components, values })
    }

    /// A single-component array.
    pub fn scalars(values: Vec<f64>) -> Self {
        Self {
            components: 1,
            values,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.values.len() / self.components.max(1)
    }

    /// Row `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.components..(i + 1) * self.components]
    }
}

/// All cells of one element type, with the data attached to them.
#[derive(Debug, Clone, PartialEq)]
pub struct CellGroup {
    cell_type: CellType,
    connectivity: Vec<usize>,
    /// Physical group tag per cell, when the source file carries one.
    pub physical: Option<Vec<i32>>,
    /// Geometric entity (region) tag per cell.
    pub geometrical: Option<Vec<i32>>,
    /// Additional named per-cell fields.
    pub fields: BTreeMap<String, FieldArray>,
}

impl CellGroup {
    /// Create an empty group.
    pub fn new(cell_type: CellType) -> Self {
        Self {
            cell_type,
            connectivity: Vec::new(),
            physical: None,
            geometrical: None,
            fields: BTreeMap::new(),
        }
    }

    /// Create a group from rows of point indices.
    pub fn from_rows<R: AsRef<[usize]>>(cell_type: CellType, rows: &[R]) -> MeshResult<Self> {
        let mut group = Self::new(cell_type);
        for row in rows {
            group.push(row.as_ref())?;
        }
        Ok(group)
    }

    /// Attach region tags (builder style).
    pub fn with_geometrical(mut self, tags: Vec<i32>) -> Self {
        self.geometrical = Some(tags);
        self
    }

    /// Attach physical tags (builder style).
    pub fn with_physical(mut self, tags: Vec<i32>) -> Self {
        self.physical = Some(tags);
        self
    }

    /// Element type of the group.
    #[inline]
    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.connectivity.len() / self.cell_type.nodes_per_cell()
    }

    /// Whether the group holds no cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.connectivity.is_empty()
    }

    /// Append one cell.
    pub fn push(&mut self, nodes: &[usize]) -> MeshResult<()> {
        let expected = self.cell_type.nodes_per_cell();
        if nodes.len() != expected {
            return Err(MeshError::RowCountMismatch {
                owner: format!("{} cell {}", self.cell_type, self.len()),
                field: "connectivity".into(),
                expected,
                actual: nodes.len(),
            });
        }
        self.connectivity.extend_from_slice(nodes);
        Ok(())
    }

    /// Point indices of cell `i`.
    pub fn cell(&self, i: usize) -> &[usize] {
        let n = self.cell_type.nodes_per_cell();
        &self.connectivity[i * n..(i + 1) * n]
    }

    /// Iterate over cells as index slices.
    pub fn cells(&self) -> impl Iterator<Item = &[usize]> {
        self.connectivity
            .chunks_exact(self.cell_type.nodes_per_cell())
    }

    /// Flat connectivity, `nodes_per_cell` indices per cell.
    #[inline]
    pub fn connectivity(&self) -> &[usize] {
        &self.connectivity
    }

    /// Replace the connectivity wholesale; the cell count must stay the same
    /// so attached per-cell data remains aligned.
    pub fn replace_connectivity(&mut self, connectivity: Vec<usize>) -> MeshResult<()> {
        let n = self.cell_type.nodes_per_cell();
        if connectivity.len() != self.connectivity.len() || connectivity.len() % n != 0 {
            return Err(MeshError::RowCountMismatch {
                owner: format!("{} cells", self.cell_type),
                field: "connectivity".into(),
                expected: self.len(),
                actual: connectivity.len() / n,
            });
        }
        self.connectivity = connectivity;
        Ok(())
    }

    /// Region tags, or a typed error when the source carried none.
    pub fn geometrical(&self) -> MeshResult<&[i32]> {
        self.geometrical
            .as_deref()
            .ok_or_else(|| MeshError::missing_cell_field(self.cell_type.name(), "geometrical"))
    }

    /// Physical group tags, or a typed error when the source carried none.
    pub fn physical(&self) -> MeshResult<&[i32]> {
        self.physical
            .as_deref()
            .ok_or_else(|| MeshError::missing_cell_field(self.cell_type.name(), "physical"))
    }

    /// A named per-cell field.
    pub fn field(&self, name: &str) -> MeshResult<&FieldArray> {
        self.fields
            .get(name)
            .ok_or_else(|| MeshError::missing_cell_field(self.cell_type.name(), name))
    }

    fn check_row_counts(&self) -> MeshResult<()> {
        let expected = self.len();
        let owner = || format!("{} cells", self.cell_type);
        for (name, tags) in [("physical", &self.physical), ("geometrical", &self.geometrical)] {
            match tags {
                Some(tags) if tags.len() != expected => {
                    return Err(MeshError::RowCountMismatch {
                        owner: owner(),
                        field: name.into(),
                        expected,
                        actual: tags.len(),
                    });
                }
                _ => {}
            }
        }
        for (name, field) in &self.fields {
            if field.rows() != expected {
                return Err(MeshError::RowCountMismatch {
                    owner: owner(),
                    field: name.clone(),
                    expected,
                    actual: field.rows(),
                });
            }
        }
        Ok(())
    }
}

/// A decoded mesh: points, cell groups, and attached data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Point coordinates, indexed `0..N`.
    pub points: Vec<Point3<f64>>,

    /// One group per element type.
    pub cells: BTreeMap<CellType, CellGroup>,

    /// Named per-point arrays.
    pub point_data: BTreeMap<String, FieldArray>,

    /// Global named arrays (physical names map to `[tag, dim]`).
    pub field_data: BTreeMap<String, FieldArray>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from points with no cells.
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            ..Default::default()
        }
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Total number of cells over all groups.
    pub fn cell_count(&self) -> usize {
        self.cells.values().map(CellGroup::len).sum()
    }

    /// Check if mesh is empty (no points or no cells).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() || self.cells.values().all(CellGroup::is_empty)
    }

    /// Insert (or replace) a cell group.
    pub fn insert_cells(&mut self, group: CellGroup) -> Option<CellGroup> {
        self.cells.insert(group.cell_type(), group)
    }

    /// The group for `cell_type`, if present.
    pub fn cell_group(&self, cell_type: CellType) -> Option<&CellGroup> {
        self.cells.get(&cell_type)
    }

    /// The triangle group, or a typed error.
    pub fn triangles(&self) -> MeshResult<&CellGroup> {
        self.cells
            .get(&CellType::Triangle)
            .ok_or_else(|| MeshError::MissingCellGroup {
                cell_type: CellType::Triangle.name().into(),
            })
    }

    /// Mutable triangle group, or a typed error.
    pub fn triangles_mut(&mut self) -> MeshResult<&mut CellGroup> {
        self.cells
            .get_mut(&CellType::Triangle)
            .ok_or_else(|| MeshError::MissingCellGroup {
                cell_type: CellType::Triangle.name().into(),
            })
    }

    /// Compute axis-aligned bounding box.
    ///
    /// Returns `None` if the mesh has no points.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &self.points[1..] {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }

    /// Check the structural invariants: every cell index addresses an
    /// existing point, and every per-item array has one row per item.
    pub fn check_invariants(&self) -> MeshResult<()> {
        let point_count = self.points.len();
        for group in self.cells.values() {
            for (cell_index, cell) in group.cells().enumerate() {
                if let Some(&point_index) = cell.iter().find(|&&i| i >= point_count) {
                    return Err(MeshError::InvalidVertexIndex {
                        cell_type: group.cell_type().name().into(),
                        cell_index,
                        point_index,
                        point_count,
                    });
                }
            }
            group.check_row_counts()?;
        }
        for (name, field) in &self.point_data {
            if field.rows() != point_count {
                return Err(MeshError::RowCountMismatch {
                    owner: "point".into(),
                    field: name.clone(),
                    expected: point_count,
                    actual: field.rows(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Mesh {
        let mut mesh = Mesh::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]);
        let tris = CellGroup::from_rows(CellType::Triangle, &[[0, 1, 2], [0, 2, 3]])
            .unwrap()
            .with_geometrical(vec![1, 1]);
        mesh.insert_cells(tris);
        mesh
    }

    #[test]
    fn test_cell_type_ids_roundtrip() {
        for t in CellType::ALL {
            assert_eq!(CellType::from_gmsh_id(t.gmsh_id()), Some(t));
            assert_eq!(t.name().parse::<CellType>().unwrap(), t);
        }
        assert_eq!(CellType::from_gmsh_id(99), None);
    }

    #[test]
    fn test_group_push_checks_arity() {
        let mut group = CellGroup::new(CellType::Triangle);
        assert!(group.push(&[0, 1, 2]).is_ok());
        assert!(group.push(&[0, 1]).is_err());
        assert_eq!(group.len(), 1);
        assert_eq!(group.cell(0), &[0, 1, 2]);
    }

    #[test]
    fn test_missing_field_is_typed_error() {
        let group = CellGroup::from_rows(CellType::Triangle, &[[0, 1, 2]]).unwrap();
        match group.geometrical() {
            Err(MeshError::MissingCellField { cell_type, field }) => {
                assert_eq!(cell_type, "triangle");
                assert_eq!(field, "geometrical");
            }
            other => panic!("Expected MissingCellField, got {:?}", other),
        }
    }

    #[test]
    fn test_invariants_hold_for_valid_mesh() {
        let mesh = unit_square();
        assert!(mesh.check_invariants().is_ok());
        assert_eq!(mesh.cell_count(), 2);
    }

    #[test]
    fn test_invariants_catch_bad_index() {
        let mut mesh = unit_square();
        mesh.triangles_mut()
            .unwrap()
            .replace_connectivity(vec![0, 1, 2, 0, 2, 9])
            .unwrap();
        assert!(matches!(
            mesh.check_invariants(),
            Err(MeshError::InvalidVertexIndex { point_index: 9, .. })
        ));
    }

    #[test]
    fn test_invariants_catch_row_count() {
        let mut mesh = unit_square();
        mesh.triangles_mut().unwrap().geometrical = Some(vec![1]);
        assert!(matches!(
            mesh.check_invariants(),
            Err(MeshError::RowCountMismatch { .. })
        ));
    }

    #[test]
    fn test_bounds() {
        let mesh = unit_square();
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
        assert!(Mesh::new().bounds().is_none());
    }

    #[test]
    fn test_field_array_rows() {
        let field = FieldArray::new(3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(field.rows(), 2);
        assert_eq!(field.row(1), &[3.0, 4.0, 5.0]);
        assert!(FieldArray::new(4, vec![0.0; 6]).is_none());
    }
}
