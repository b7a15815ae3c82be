//! Reading and writing gmsh `.msh` files.
//!
//! The reader understands the ASCII variants of MSH 2.x and MSH 4.1:
//! physical names, entities, nodes, elements, and node/element data blocks.
//! Other sections are skipped. Binary files are rejected with a
//! [`MeshError::DecodeFailure`].
//!
//! Cell tags follow the classic layout: each cell group gets a `physical`
//! and a `geometrical` array. In MSH 4.1 the geometrical tag is the entity
//! the element block belongs to and the physical tag is the first physical
//! group of that entity. Physical names land in `field_data` as
//! `name -> [tag, dim]`.
//!
//! The writer emits MSH 2.2 ASCII.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::{debug, info};

use crate::error::{MeshError, MeshResult};
use crate::tracing_ext::log_io_operation;
use crate::types::{CellGroup, CellType, FieldArray, Mesh};

/// Load a mesh, checking that the extension names a supported format.
pub fn load_mesh(path: &Path) -> MeshResult<Mesh> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match extension.as_deref() {
        Some("msh") => read_msh(path),
        _ => Err(MeshError::UnsupportedFormat { extension }),
    }
}

/// Read a `.msh` file.
pub fn read_msh(path: &Path) -> MeshResult<Mesh> {
    let bytes = std::fs::read(path).map_err(|e| {
        log_io_operation("read", path, false);
        MeshError::io_read(path, e)
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let mesh = parse_msh(&text, path)?;
    log_io_operation("read", path, true);
    info!(
        points = mesh.point_count(),
        cells = mesh.cell_count(),
        "Loaded mesh from {:?}",
        path
    );
    Ok(mesh)
}

/// Parse `.msh` text. `source` is only used in error messages.
pub fn parse_msh(text: &str, source: &Path) -> MeshResult<Mesh> {
    let mut decoder = Decoder::new(text, source);
    while let Some(line) = decoder.cursor.next() {
        match line {
            "$MeshFormat" => decoder.mesh_format()?,
            "$PhysicalNames" => decoder.physical_names()?,
            "$Entities" => decoder.entities()?,
            "$Nodes" => decoder.nodes()?,
            "$Elements" => decoder.elements()?,
            "$NodeData" => decoder.node_data()?,
            "$ElementData" => decoder.element_data()?,
            section if section.starts_with('$') && !section.starts_with("$End") => {
                debug!(section, "Skipping unsupported MSH section");
                let end = format!("$End{}", &section[1..]);
                decoder.cursor.skip_to(&end)?;
            }
            other => {
                let shown: String = other.chars().take(40).collect();
                return Err(decoder.cursor.fail(format!("unexpected content '{}'", shown)));
            }
        }
    }
    decoder.finish()
}

/// Write a mesh as MSH 2.2 ASCII.
pub fn write_msh(mesh: &Mesh, path: &Path) -> MeshResult<()> {
    mesh.check_invariants()?;
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    write_msh_to(mesh, &mut writer).map_err(|e| MeshError::io_write(path, e))?;
    writer.flush().map_err(|e| MeshError::io_write(path, e))?;
    log_io_operation("write", path, true);
    info!(
        points = mesh.point_count(),
        cells = mesh.cell_count(),
        "Saved mesh to {:?} (MSH 2.2)",
        path
    );
    Ok(())
}

/// Write a mesh as MSH 2.2 ASCII to any writer.
///
/// The mesh should satisfy [`Mesh::check_invariants`]; missing tag rows are
/// written as `0`.
pub fn write_msh_to<W: Write>(mesh: &Mesh, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "$MeshFormat")?;
    writeln!(out, "2.2 0 8")?;
    writeln!(out, "$EndMeshFormat")?;

    let names: Vec<(&String, i64, i64)> = mesh
        .field_data
        .iter()
        .filter(|(_, f)| f.components == 2 && f.rows() == 1)
        .map(|(name, f)| (name, f.values[0] as i64, f.values[1] as i64))
        .collect();
    if !names.is_empty() {
        writeln!(out, "$PhysicalNames")?;
        writeln!(out, "{}", names.len())?;
        for (name, tag, dim) in names {
            writeln!(out, "{} {} \"{}\"", dim, tag, name)?;
        }
        writeln!(out, "$EndPhysicalNames")?;
    }

    writeln!(out, "$Nodes")?;
    writeln!(out, "{}", mesh.points.len())?;
    for (i, p) in mesh.points.iter().enumerate() {
        writeln!(out, "{} {:?} {:?} {:?}", i + 1, p.x, p.y, p.z)?;
    }
    writeln!(out, "$EndNodes")?;

    writeln!(out, "$Elements")?;
    writeln!(out, "{}", mesh.cell_count())?;
    let mut first_tag = BTreeMap::new();
    let mut tag = 1usize;
    for group in mesh.cells.values() {
        first_tag.insert(group.cell_type(), tag);
        for (row, cell) in group.cells().enumerate() {
            let at = |tags: &Option<Vec<i32>>| tags.as_ref().and_then(|t| t.get(row).copied());
            let tags: Vec<i32> = match (at(&group.physical), at(&group.geometrical)) {
                (Some(p), Some(g)) => vec![p, g],
                (Some(p), None) => vec![p],
                (None, Some(g)) => vec![0, g],
                (None, None) => Vec::new(),
            };
            write!(out, "{} {} {}", tag, group.cell_type().gmsh_id(), tags.len())?;
            for t in &tags {
                write!(out, " {}", t)?;
            }
            for node in cell {
                write!(out, " {}", node + 1)?;
            }
            writeln!(out)?;
            tag += 1;
        }
    }
    writeln!(out, "$EndElements")?;

    for (name, field) in &mesh.point_data {
        write_data_block(out, "NodeData", name, field, 1)?;
    }
    for group in mesh.cells.values() {
        let offset = first_tag.get(&group.cell_type()).copied().unwrap_or(1);
        for (name, field) in &group.fields {
            write_data_block(out, "ElementData", name, field, offset)?;
        }
    }
    Ok(())
}

fn write_data_block<W: Write>(
    out: &mut W,
    section: &str,
    name: &str,
    field: &FieldArray,
    first_tag: usize,
) -> std::io::Result<()> {
    writeln!(out, "${}", section)?;
    writeln!(out, "1")?;
    writeln!(out, "\"{}\"", name)?;
    writeln!(out, "1")?;
    writeln!(out, "0.0")?;
    writeln!(out, "3")?;
    writeln!(out, "0")?;
    writeln!(out, "{}", field.components)?;
    writeln!(out, "{}", field.rows())?;
    for row in 0..field.rows() {
        write!(out, "{}", first_tag + row)?;
        for v in field.row(row) {
            write!(out, " {:?}", v)?;
        }
        writeln!(out)?;
    }
    writeln!(out, "$End{}", section)
}

/// Upper bound on preallocation driven by counts read from the file.
const MAX_PREALLOC: usize = 1 << 20;

/// Gmsh data blocks hold scalars, vectors or tensors.
const MAX_COMPONENTS: usize = 9;

/// Line cursor that tracks line numbers for error messages.
struct Cursor<'a> {
    path: &'a Path,
    lines: std::str::Lines<'a>,
    line_no: usize,
}

impl<'a> Cursor<'a> {
    /// Next non-blank line, trimmed.
    fn next(&mut self) -> Option<&'a str> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }

    fn expect(&mut self, what: &str) -> MeshResult<&'a str> {
        match self.next() {
            Some(line) => Ok(line),
            None => Err(self.fail(format!("unexpected end of file, expected {}", what))),
        }
    }

    fn fail(&self, details: impl Into<String>) -> MeshError {
        MeshError::decode_failure(self.path, Some(self.line_no), details)
    }

    fn parse<T: FromStr>(&self, token: Option<&str>, what: &str) -> MeshResult<T> {
        let token = token.ok_or_else(|| self.fail(format!("missing {}", what)))?;
        token
            .parse()
            .map_err(|_| self.fail(format!("invalid {} '{}'", what, token)))
    }

    /// A line of at least `min` whitespace-separated numbers.
    fn numbers<T: FromStr>(&mut self, min: usize, what: &str) -> MeshResult<Vec<T>> {
        let line = self.expect(what)?;
        let values = line
            .split_whitespace()
            .map(|t| self.parse(Some(t), what))
            .collect::<MeshResult<Vec<T>>>()?;
        if values.len() < min {
            return Err(self.fail(format!(
                "expected {} values in {}, found {}",
                min,
                what,
                values.len()
            )));
        }
        Ok(values)
    }

    fn count(&mut self, what: &str) -> MeshResult<usize> {
        Ok(self.numbers::<usize>(1, what)?[0])
    }

    fn expect_end(&mut self, end: &str) -> MeshResult<()> {
        let line = self.expect(end)?;
        if line != end {
            return Err(self.fail(format!("expected {}, found '{}'", end, line)));
        }
        Ok(())
    }

    fn skip_to(&mut self, end: &str) -> MeshResult<()> {
        while self.expect(end)? != end {}
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MshVersion {
    V2,
    V41,
}

#[derive(Debug, Default)]
struct GroupBuilder {
    connectivity: Vec<usize>,
    physical: Vec<Option<i32>>,
    geometrical: Vec<Option<i32>>,
}

impl GroupBuilder {
    fn len(&self) -> usize {
        self.geometrical.len()
    }
}

struct Decoder<'a> {
    cursor: Cursor<'a>,
    version: Option<MshVersion>,
    points: Vec<Point3<f64>>,
    node_index: HashMap<usize, usize>,
    entity_physical: HashMap<(usize, i32), i32>,
    groups: BTreeMap<CellType, GroupBuilder>,
    element_index: HashMap<usize, (CellType, usize)>,
    point_data: BTreeMap<String, FieldArray>,
    cell_fields: BTreeMap<CellType, BTreeMap<String, FieldArray>>,
    field_data: BTreeMap<String, FieldArray>,
}

impl<'a> Decoder<'a> {
    fn new(text: &'a str, path: &'a Path) -> Self {
        Self {
            cursor: Cursor {
                path,
                lines: text.lines(),
                line_no: 0,
            },
            version: None,
            points: Vec::new(),
            node_index: HashMap::new(),
            entity_physical: HashMap::new(),
            groups: BTreeMap::new(),
            element_index: HashMap::new(),
            point_data: BTreeMap::new(),
            cell_fields: BTreeMap::new(),
            field_data: BTreeMap::new(),
        }
    }

    fn version(&self) -> MeshResult<MshVersion> {
        self.version
            .ok_or_else(|| self.cursor.fail("section appears before $MeshFormat"))
    }

    fn mesh_format(&mut self) -> MeshResult<()> {
        let line = self.cursor.expect("format line")?;
        let mut tokens = line.split_whitespace();
        let version = tokens.next().unwrap_or_default();
        let file_type: u32 = self.cursor.parse(tokens.next(), "file type")?;
        if file_type != 0 {
            return Err(self.cursor.fail("binary MSH files are not supported"));
        }
        self.version = match version {
            "4.1" => Some(MshVersion::V41),
            v if v == "2" || v.starts_with("2.") => Some(MshVersion::V2),
            other => {
                return Err(self
                    .cursor
                    .fail(format!("unsupported MSH version {}", other)));
            }
        };
        self.cursor.expect_end("$EndMeshFormat")
    }

    fn physical_names(&mut self) -> MeshResult<()> {
        let n = self.cursor.count("physical name count")?;
        for _ in 0..n {
            let line = self.cursor.expect("physical name")?;
            let mut tokens = line.splitn(3, char::is_whitespace);
            let dim: i64 = self.cursor.parse(tokens.next(), "physical dimension")?;
            let tag: i64 = self.cursor.parse(tokens.next(), "physical tag")?;
            let name = tokens.next().unwrap_or_default().trim().trim_matches('"');
            self.field_data.insert(
                name.to_string(),
                FieldArray {
                    components: 2,
                    values: vec![tag as f64, dim as f64],
                },
            );
        }
        self.cursor.expect_end("$EndPhysicalNames")
    }

    fn entities(&mut self) -> MeshResult<()> {
        if self.version()? != MshVersion::V41 {
            return self.cursor.skip_to("$EndEntities");
        }
        let counts = self.cursor.numbers::<usize>(4, "entity counts")?;
        for (dim, &count) in counts.iter().take(4).enumerate() {
            // Points carry x y z; higher entities carry a bounding box.
            let physical_at = if dim == 0 { 4 } else { 7 };
            for _ in 0..count {
                let line = self.cursor.expect("entity")?;
                let tokens: Vec<&str> = line.split_whitespace().collect();
                let tag: i32 = self.cursor.parse(tokens.first().copied(), "entity tag")?;
                let n_physical: usize = self
                    .cursor
                    .parse(tokens.get(physical_at).copied(), "physical tag count")?;
                if n_physical > 0 {
                    let physical: i32 = self
                        .cursor
                        .parse(tokens.get(physical_at + 1).copied(), "physical tag")?;
                    self.entity_physical.insert((dim, tag), physical);
                }
            }
        }
        self.cursor.expect_end("$EndEntities")
    }

    fn nodes(&mut self) -> MeshResult<()> {
        match self.version()? {
            MshVersion::V2 => {
                let n = self.cursor.count("node count")?;
                self.points.reserve(n.min(MAX_PREALLOC));
                for _ in 0..n {
                    let line = self.cursor.expect("node")?;
                    let mut tokens = line.split_whitespace();
                    let tag: usize = self.cursor.parse(tokens.next(), "node tag")?;
                    let coords = self.coordinates(&mut tokens)?;
                    self.add_node(tag, coords)?;
                }
            }
            MshVersion::V41 => {
                let header = self.cursor.numbers::<usize>(4, "node header")?;
                self.points.reserve(header[1].min(MAX_PREALLOC));
                for _ in 0..header[0] {
                    let block = self.cursor.numbers::<usize>(4, "node block header")?;
                    let n = block[3];
                    let mut tags = Vec::with_capacity(n.min(MAX_PREALLOC));
                    for _ in 0..n {
                        tags.push(self.cursor.count("node tag")?);
                    }
                    for tag in tags {
                        let line = self.cursor.expect("node coordinates")?;
                        let coords = self.coordinates(&mut line.split_whitespace())?;
                        self.add_node(tag, coords)?;
                    }
                }
            }
        }
        self.cursor.expect_end("$EndNodes")
    }

    fn coordinates<'t>(&self, tokens: &mut impl Iterator<Item = &'t str>) -> MeshResult<Point3<f64>> {
        let x = self.cursor.parse(tokens.next(), "x coordinate")?;
        let y = self.cursor.parse(tokens.next(), "y coordinate")?;
        let z = self.cursor.parse(tokens.next(), "z coordinate")?;
        Ok(Point3::new(x, y, z))
    }

    fn add_node(&mut self, tag: usize, p: Point3<f64>) -> MeshResult<()> {
        if self.node_index.insert(tag, self.points.len()).is_some() {
            return Err(self.cursor.fail(format!("duplicate node tag {}", tag)));
        }
        self.points.push(p);
        Ok(())
    }

    fn elements(&mut self) -> MeshResult<()> {
        match self.version()? {
            MshVersion::V2 => {
                let n = self.cursor.count("element count")?;
                for _ in 0..n {
                    let values = self.cursor.numbers::<i64>(3, "element")?;
                    let tag = self.element_tag(values[0])?;
                    let cell_type = self.cell_type(values[1])?;
                    let n_tags = usize::try_from(values[2])
                        .map_err(|_| self.cursor.fail(format!("invalid tag count {}", values[2])))?;
                    let nodes = values.get(n_tags.saturating_add(3)..).unwrap_or_default();
                    if nodes.len() != cell_type.nodes_per_cell() {
                        return Err(self.cursor.fail(format!(
                            "{} element {} has {} nodes, expected {}",
                            cell_type,
                            tag,
                            nodes.len(),
                            cell_type.nodes_per_cell()
                        )));
                    }
                    let physical = (n_tags >= 1)
                        .then(|| self.region_tag(values[3]))
                        .transpose()?;
                    let geometrical = (n_tags >= 2)
                        .then(|| self.region_tag(values[4]))
                        .transpose()?;
                    self.add_element(tag, cell_type, nodes, physical, geometrical)?;
                }
            }
            MshVersion::V41 => {
                let header = self.cursor.numbers::<usize>(4, "element header")?;
                for _ in 0..header[0] {
                    let block = self.cursor.numbers::<i64>(4, "element block header")?;
                    let dim = usize::try_from(block[0])
                        .map_err(|_| self.cursor.fail(format!("invalid dimension {}", block[0])))?;
                    let entity = self.region_tag(block[1])?;
                    let cell_type = self.cell_type(block[2])?;
                    let physical = self.entity_physical.get(&(dim, entity)).copied();
                    for _ in 0..block[3] {
                        let values = self.cursor.numbers::<i64>(1, "element")?;
                        let nodes = &values[1..];
                        if nodes.len() != cell_type.nodes_per_cell() {
                            return Err(self.cursor.fail(format!(
                                "{} element {} has {} nodes, expected {}",
                                cell_type,
                                values[0],
                                nodes.len(),
                                cell_type.nodes_per_cell()
                            )));
                        }
                        let tag = self.element_tag(values[0])?;
                        self.add_element(tag, cell_type, nodes, physical, Some(entity))?;
                    }
                }
            }
        }
        self.cursor.expect_end("$EndElements")
    }

    fn element_tag(&self, value: i64) -> MeshResult<usize> {
        usize::try_from(value).map_err(|_| self.cursor.fail(format!("invalid element tag {}", value)))
    }

    fn region_tag(&self, value: i64) -> MeshResult<i32> {
        i32::try_from(value).map_err(|_| self.cursor.fail(format!("tag {} out of range", value)))
    }

    fn cell_type(&self, id: i64) -> MeshResult<CellType> {
        u32::try_from(id)
            .ok()
            .and_then(CellType::from_gmsh_id)
            .ok_or_else(|| self.cursor.fail(format!("unsupported element type {}", id)))
    }

    fn add_element(
        &mut self,
        tag: usize,
        cell_type: CellType,
        node_tags: &[i64],
        physical: Option<i32>,
        geometrical: Option<i32>,
    ) -> MeshResult<()> {
        let mut nodes = Vec::with_capacity(node_tags.len());
        for &node in node_tags {
            let index = usize::try_from(node)
                .ok()
                .and_then(|n| self.node_index.get(&n).copied())
                .ok_or_else(|| {
                    self.cursor
                        .fail(format!("element {} references unknown node {}", tag, node))
                })?;
            nodes.push(index);
        }
        let group = self.groups.entry(cell_type).or_default();
        let row = group.len();
        group.connectivity.extend_from_slice(&nodes);
        group.physical.push(physical);
        group.geometrical.push(geometrical);
        self.element_index.insert(tag, (cell_type, row));
        Ok(())
    }

    /// Reads the tag header of a data block, returning (name, components, rows).
    fn data_header(&mut self) -> MeshResult<(String, usize, usize)> {
        let n_strings = self.cursor.count("string tag count")?;
        let mut name = String::from("data");
        for i in 0..n_strings {
            let line = self.cursor.expect("string tag")?;
            if i == 0 {
                name = line.trim_matches('"').to_string();
            }
        }
        let n_reals = self.cursor.count("real tag count")?;
        for _ in 0..n_reals {
            self.cursor.expect("real tag")?;
        }
        let n_ints = self.cursor.count("integer tag count")?;
        let mut ints = Vec::with_capacity(n_ints.min(MAX_PREALLOC));
        for _ in 0..n_ints {
            ints.push(self.cursor.count("integer tag")?);
        }
        if ints.len() < 3 || ints[1] == 0 {
            return Err(self
                .cursor
                .fail("data block needs time step, component and row counts"));
        }
        if ints[1] > MAX_COMPONENTS {
            return Err(self
                .cursor
                .fail(format!("data block has {} components", ints[1])));
        }
        Ok((name, ints[1], ints[2]))
    }

    fn node_data(&mut self) -> MeshResult<()> {
        let (name, components, rows) = self.data_header()?;
        let mut values = vec![f64::NAN; self.points.len() * components];
        for _ in 0..rows {
            let line = self.cursor.expect("node data row")?;
            let mut tokens = line.split_whitespace();
            let tag: usize = self.cursor.parse(tokens.next(), "node tag")?;
            let index = *self
                .node_index
                .get(&tag)
                .ok_or_else(|| self.cursor.fail(format!("data for unknown node {}", tag)))?;
            for c in 0..components {
                values[index * components + c] = self.cursor.parse(tokens.next(), "data value")?;
            }
        }
        self.point_data.insert(name, FieldArray { components, values });
        self.cursor.expect_end("$EndNodeData")
    }

    fn element_data(&mut self) -> MeshResult<()> {
        let (name, components, rows) = self.data_header()?;
        for _ in 0..rows {
            let line = self.cursor.expect("element data row")?;
            let mut tokens = line.split_whitespace();
            let tag: usize = self.cursor.parse(tokens.next(), "element tag")?;
            let (cell_type, row) = *self
                .element_index
                .get(&tag)
                .ok_or_else(|| self.cursor.fail(format!("data for unknown element {}", tag)))?;
            let mut row_values = Vec::with_capacity(components);
            for _ in 0..components {
                row_values.push(self.cursor.parse::<f64>(tokens.next(), "data value")?);
            }
            let group_len = self.groups.get(&cell_type).map_or(0, GroupBuilder::len);
            let field = self
                .cell_fields
                .entry(cell_type)
                .or_default()
                .entry(name.clone())
                .or_insert_with(|| FieldArray {
                    components,
                    values: vec![f64::NAN; group_len * components],
                });
            if field.components != components {
                return Err(self.cursor.fail(format!(
                    "element data '{}' changes component count",
                    name
                )));
            }
            // Elements may arrive in several sections; grow the field with the group.
            let width = group_len * components;
            if field.values.len() < width {
                field.values.resize(width, f64::NAN);
            }
            let Some(slot) = field
                .values
                .get_mut(row * components..(row + 1) * components)
            else {
                return Err(self.cursor.fail(format!(
                    "element data '{}' does not fit element {}",
                    name, tag
                )));
            };
            slot.copy_from_slice(&row_values);
        }
        self.cursor.expect_end("$EndElementData")
    }

    fn finish(mut self) -> MeshResult<Mesh> {
        self.version()?;
        let mut mesh = Mesh::from_points(self.points);
        mesh.point_data = self.point_data;
        mesh.field_data = self.field_data;
        for (cell_type, builder) in self.groups {
            let mut group = CellGroup::new(cell_type);
            for cell in builder
                .connectivity
                .chunks_exact(cell_type.nodes_per_cell())
            {
                group.push(cell)?;
            }
            group.physical = builder.physical.into_iter().collect();
            group.geometrical = builder.geometrical.into_iter().collect();
            if let Some(mut fields) = self.cell_fields.remove(&cell_type) {
                for field in fields.values_mut() {
                    field.values.resize(group.len() * field.components, f64::NAN);
                }
                group.fields = fields;
            }
            mesh.insert_cells(group);
        }
        debug!(
            points = mesh.point_count(),
            groups = mesh.cells.len(),
            "Decoded MSH data"
        );
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SQUARE_V2: &str = "\
$MeshFormat
2.2 0 8
$EndMeshFormat
$PhysicalNames
1
2 1 \"domain\"
$EndPhysicalNames
$Nodes
4
1 0 0 0
2 1 0 0
3 1 1 0
4 0 1 0
$EndNodes
$Elements
5
1 15 2 0 1 1
2 1 2 0 1 1 2
3 2 2 1 7 1 2 3
4 2 2 1 7 1 3 4
5 1 2 0 2 2 3
$EndElements
$NodeData
1
\"temperature\"
1
0.0
3
0
1
4
1 10.0
2 11.0
3 12.0
4 13.0
$EndNodeData
";

    const SQUARE_V41: &str = "\
$MeshFormat
4.1 0 8
$EndMeshFormat
$PhysicalNames
1
2 3 \"plate\"
$EndPhysicalNames
$Entities
4 4 1 0
1 0 0 0 0
2 1 0 0 0
3 1 1 0 0
4 0 1 0 0
1 0 0 0 1 0 0 0 2 1 -2
2 1 0 0 1 1 0 0 2 2 -3
3 0 1 0 1 1 0 0 2 3 -4
4 0 0 0 0 1 0 0 2 4 -1
5 0 0 0 1 1 0 1 3 4 1 2 3 4
$EndEntities
$Nodes
2 4 1 4
0 1 0 1
1
0 0 0
2 5 0 3
2
3
4
1 0 0
1 1 0
0 1 0
$EndNodes
$Elements
2 3 1 3
1 1 1 1
1 1 2
2 5 2 2
2 1 2 3
3 1 3 4
$EndElements
";

    fn parse(text: &str) -> MeshResult<Mesh> {
        parse_msh(text, Path::new("test.msh"))
    }

    #[test]
    fn test_parse_v2_groups_and_tags() {
        let mesh = parse(SQUARE_V2).unwrap();
        assert_eq!(mesh.point_count(), 4);
        assert_eq!(mesh.cells.len(), 3);

        let tris = mesh.triangles().unwrap();
        assert_eq!(tris.len(), 2);
        assert_eq!(tris.cell(1), &[0, 2, 3]);
        assert_eq!(tris.geometrical().unwrap(), &[7, 7]);
        assert_eq!(tris.physical().unwrap(), &[1, 1]);

        let lines = mesh.cell_group(CellType::Line).unwrap();
        assert_eq!(lines.geometrical().unwrap(), &[1, 2]);
        assert!(mesh.cell_group(CellType::Vertex).is_some());

        assert_eq!(mesh.field_data["domain"].values, vec![1.0, 2.0]);
        assert_eq!(mesh.point_data["temperature"].values, vec![10.0, 11.0, 12.0, 13.0]);
        assert!(mesh.check_invariants().is_ok());
    }

    #[test]
    fn test_parse_v41_entities() {
        let mesh = parse(SQUARE_V41).unwrap();
        assert_eq!(mesh.point_count(), 4);
        let tris = mesh.triangles().unwrap();
        assert_eq!(tris.geometrical().unwrap(), &[5, 5]);
        assert_eq!(tris.physical().unwrap(), &[3, 3]);

        // Curve entities carry no physical group.
        let lines = mesh.cell_group(CellType::Line).unwrap();
        assert_eq!(lines.geometrical().unwrap(), &[1]);
        assert!(lines.physical.is_none());

        assert_eq!(mesh.field_data["plate"].values, vec![3.0, 2.0]);
    }

    #[test]
    fn test_non_contiguous_node_tags() {
        let text = "\
$MeshFormat
2.2 0 8
$EndMeshFormat
$Nodes
3
10 0 0 0
20 1 0 0
30 0 1 0
$EndNodes
$Elements
1
1 2 2 0 4 30 10 20
$EndElements
";
        let mesh = parse(text).unwrap();
        assert_eq!(mesh.triangles().unwrap().cell(0), &[2, 0, 1]);
    }

    #[test]
    fn test_binary_rejected() {
        let text = "$MeshFormat\n2.2 1 8\n";
        let err = parse(text).unwrap_err();
        match err {
            MeshError::DecodeFailure { details, line, .. } => {
                assert!(details.contains("binary"));
                assert_eq!(line, Some(2));
            }
            other => panic!("Expected DecodeFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_node_reference() {
        let text = SQUARE_V2.replace("4 2 2 1 7 1 3 4", "4 2 2 1 7 1 3 9");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("unknown node 9"));
        assert!(matches!(err, MeshError::DecodeFailure { line: Some(20), .. }));
    }

    #[test]
    fn test_truncated_file() {
        let text = "$MeshFormat\n2.2 0 8\n$EndMeshFormat\n$Nodes\n3\n1 0 0 0\n";
        let err = parse(text).unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));
    }

    #[test]
    fn test_unsupported_version() {
        let err = parse("$MeshFormat\n4.0 0 8\n$EndMeshFormat\n").unwrap_err();
        assert!(err.to_string().contains("unsupported MSH version 4.0"));
    }

    #[test]
    fn test_unknown_sections_skipped() {
        let text = SQUARE_V2.replace(
            "$Nodes",
            "$Periodic\n0\n$EndPeriodic\n$Comments\nanything\n$EndComments\n$Nodes",
        );
        assert_eq!(parse(&text).unwrap().point_count(), 4);
    }

    #[test]
    fn test_missing_format_header() {
        let err = parse("$Nodes\n0\n$EndNodes\n").unwrap_err();
        assert!(err.to_string().contains("before $MeshFormat"));
    }

    #[test]
    fn test_element_data_across_element_sections() {
        let data = |row: &str| {
            format!(
                "$ElementData\n1\n\"quality\"\n1\n0.0\n3\n0\n1\n1\n{}\n$EndElementData\n",
                row
            )
        };
        let text = format!(
            "$MeshFormat\n2.2 0 8\n$EndMeshFormat\n\
             $Nodes\n4\n1 0 0 0\n2 1 0 0\n3 1 1 0\n4 0 1 0\n$EndNodes\n\
             $Elements\n1\n1 2 2 0 1 1 2 3\n$EndElements\n{}\
             $Elements\n1\n2 2 2 0 1 1 3 4\n$EndElements\n{}",
            data("1 0.5"),
            data("2 0.75")
        );
        let mesh = parse(&text).unwrap();
        let tris = mesh.triangles().unwrap();
        assert_eq!(tris.len(), 2);
        assert_eq!(tris.field("quality").unwrap().values, vec![0.5, 0.75]);
        mesh.check_invariants().unwrap();
    }

    #[test]
    fn test_element_data_padded_for_later_elements() {
        let text = "$MeshFormat\n2.2 0 8\n$EndMeshFormat\n\
             $Nodes\n4\n1 0 0 0\n2 1 0 0\n3 1 1 0\n4 0 1 0\n$EndNodes\n\
             $Elements\n1\n1 2 2 0 1 1 2 3\n$EndElements\n\
             $ElementData\n1\n\"quality\"\n1\n0.0\n3\n0\n1\n1\n1 0.5\n$EndElementData\n\
             $Elements\n1\n2 2 2 0 1 1 3 4\n$EndElements\n";
        let mesh = parse(text).unwrap();
        let values = &mesh.triangles().unwrap().field("quality").unwrap().values;
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], 0.5);
        assert!(values[1].is_nan());
        mesh.check_invariants().unwrap();
    }

    #[test]
    fn test_out_of_range_tags_rejected() {
        let text = SQUARE_V2.replace("3 2 2 1 7 1 2 3", "3 2 2 1 4294967303 1 2 3");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("tag 4294967303 out of range"));
        assert!(matches!(err, MeshError::DecodeFailure { line: Some(19), .. }));
    }

    #[test]
    fn test_write_then_read() {
        let mut mesh = parse(SQUARE_V2).unwrap();
        mesh.points[2] = Point3::new(0.9, 1.1, 0.0);
        mesh.triangles_mut().unwrap().fields.insert(
            "quality".into(),
            FieldArray::scalars(vec![0.5, 0.75]),
        );

        let file = NamedTempFile::with_suffix(".msh").unwrap();
        write_msh(&mesh, file.path()).unwrap();
        let reread = read_msh(file.path()).unwrap();

        assert_eq!(reread, mesh);
    }

    #[test]
    fn test_load_checks_extension() {
        let mut file = NamedTempFile::with_suffix(".stl").unwrap();
        writeln!(file, "solid x").unwrap();
        let err = load_mesh(file.path()).unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedFormat { .. }));

        let mut file = NamedTempFile::with_suffix(".msh").unwrap();
        file.write_all(SQUARE_V41.as_bytes()).unwrap();
        assert_eq!(load_mesh(file.path()).unwrap().cell_count(), 3);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_msh(Path::new("/nonexistent/mesh.msh")).unwrap_err();
        assert!(matches!(err, MeshError::IoRead { .. }));
    }
}
