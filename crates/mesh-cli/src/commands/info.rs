//! meshgen info command - display mesh statistics.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use mesh_gen::relax::min_quality;
use mesh_gen::{Mesh, classify, load_mesh, project};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    points: usize,
    cells: usize,
    groups: Vec<GroupInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    eligibility: String,
    relaxable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<DetailedInfo>,
}

#[derive(Serialize)]
struct GroupInfo {
    cell_type: String,
    count: usize,
    regions: Vec<i32>,
    physical: Vec<i32>,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

#[derive(Serialize)]
struct DetailedInfo {
    physical_names: Vec<String>,
    point_data: Vec<String>,
    cell_data: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_triangle_quality: Option<f64>,
    unused_points: usize,
}

fn distinct(tags: Option<&[i32]>) -> Vec<i32> {
    tags.map(|t| t.iter().copied().collect::<BTreeSet<_>>().into_iter().collect())
        .unwrap_or_default()
}

fn details(mesh: &Mesh) -> DetailedInfo {
    let projection = project(mesh).ok();
    let cell_data: BTreeSet<String> = mesh
        .cells
        .values()
        .flat_map(|g| g.fields.keys().cloned())
        .collect();

    DetailedInfo {
        physical_names: mesh.field_data.keys().cloned().collect(),
        point_data: mesh.point_data.keys().cloned().collect(),
        cell_data: cell_data.into_iter().collect(),
        min_triangle_quality: projection.as_ref().map(|p| min_quality(&p.subset)),
        unused_points: mesh.point_count()
            - projection
                .as_ref()
                .map(|p| p.original_index.len())
                .unwrap_or_default(),
    }
}

pub fn run(input: &Path, detailed: bool, cli: &Cli) -> Result<()> {
    let mesh = load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;

    let groups = mesh
        .cells
        .values()
        .map(|g| GroupInfo {
            cell_type: g.cell_type().name().to_string(),
            count: g.len(),
            regions: distinct(g.geometrical.as_deref()),
            physical: distinct(g.physical.as_deref()),
        })
        .collect();
    let bounds = mesh.bounds().map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });
    let eligibility = classify(&mesh);

    let info = MeshInfo {
        path: input.display().to_string(),
        points: mesh.point_count(),
        cells: mesh.cell_count(),
        groups,
        bounds,
        eligibility: eligibility.to_string(),
        relaxable: eligibility.is_eligible(),
        details: detailed.then(|| details(&mesh)),
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&info, cli.format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Mesh Information".bold().underline());
                println!("  {}: {}", "File".cyan(), input.display());
                println!("  {}: {}", "Points".cyan(), info.points);
                println!("  {}: {}", "Cells".cyan(), info.cells);
                for group in &info.groups {
                    println!(
                        "    {}: {} (regions {:?})",
                        group.cell_type, group.count, group.regions
                    );
                }

                if let Some(ref b) = info.bounds {
                    println!(
                        "  {}: {:.3} x {:.3} x {:.3}",
                        "Dimensions".cyan(),
                        b.dimensions[0],
                        b.dimensions[1],
                        b.dimensions[2]
                    );
                    println!(
                        "  {}: ({:.3}, {:.3}, {:.3})",
                        "Min bounds".cyan(),
                        b.min[0],
                        b.min[1],
                        b.min[2]
                    );
                    println!(
                        "  {}: ({:.3}, {:.3}, {:.3})",
                        "Max bounds".cyan(),
                        b.max[0],
                        b.max[1],
                        b.max[2]
                    );
                }

                let verdict = if info.relaxable {
                    info.eligibility.green()
                } else {
                    info.eligibility.yellow()
                };
                println!("  {}: {}", "Relaxation".cyan(), verdict);

                if let Some(ref d) = info.details {
                    if !d.physical_names.is_empty() {
                        println!("  {}: {}", "Physical names".cyan(), d.physical_names.join(", "));
                    }
                    if !d.point_data.is_empty() {
                        println!("  {}: {}", "Point data".cyan(), d.point_data.join(", "));
                    }
                    if !d.cell_data.is_empty() {
                        println!("  {}: {}", "Cell data".cyan(), d.cell_data.join(", "));
                    }
                    if let Some(q) = d.min_triangle_quality {
                        println!("  {}: {:.4}", "Min triangle quality".cyan(), q);
                    }
                    println!("  {}: {}", "Points outside triangles".cyan(), d.unused_points);
                }
            }
        }
    }

    Ok(())
}
