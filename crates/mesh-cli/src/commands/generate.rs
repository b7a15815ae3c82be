//! meshgen generate command - run gmsh and relax the result.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use mesh_gen::{EngineEvent, GeneratorConfig, Generator, GeoScript, Geometry, write_msh};
use nalgebra::Point3;
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Args)]
pub struct GenerateArgs {
    /// Geometry script (.geo)
    #[arg(required_unless_present = "polygon", conflicts_with = "polygon")]
    pub input: Option<PathBuf>,

    /// Mesh a polygon in the z = 0 plane instead: "x,y;x,y;..."
    #[arg(long)]
    pub polygon: Option<String>,

    /// Characteristic length at the polygon corners
    #[arg(long, requires = "polygon")]
    pub lcar: Option<f64>,

    /// Output mesh file (.msh)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Do not pass -optimize to the engine
    #[arg(long)]
    pub no_optimize: bool,

    /// Lloyd iterations inside the engine (0 skips them)
    #[arg(long)]
    pub engine_lloyd_steps: Option<usize>,

    /// Relaxation step budget for planar single-region meshes (0 skips relaxation)
    #[arg(long)]
    pub lloyd_steps: Option<usize>,

    /// Delaunay flips before every N-th relaxation step (0 disables flips)
    #[arg(long)]
    pub flip_frequency: Option<usize>,

    /// gmsh executable (default: $MESH_GEN_GMSH, then the platform default)
    #[arg(long)]
    pub gmsh: Option<PathBuf>,

    /// Kill the engine after this many seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Generator configuration file (.toml or .json); flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Serialize)]
struct GenerateReport {
    output: String,
    engine: String,
    points: usize,
    cells: usize,
    eligibility: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    relaxation: Option<mesh_gen::RelaxSummary>,
    operation_log: Vec<String>,
}

pub fn run(args: &GenerateArgs, cli: &Cli) -> Result<()> {
    let config = load_config(args)?;
    let script = match (&args.input, &args.polygon) {
        (Some(path), _) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read geometry script {:?}", path))?,
        (None, Some(corners)) => polygon_script(corners, args.lcar)?,
        (None, None) => bail!("either a geometry script or --polygon is required"),
    };

    let engine = config.engine.to_engine_config();
    let engine_name = engine.executable.display().to_string();
    let mut generator = Generator::new(engine).params(config.generate.clone());
    if config.generate.verbose && !cli.quiet && cli.format == OutputFormat::Text {
        generator = generator.with_events(Box::new(|event: &EngineEvent| {
            if let EngineEvent::OutputLine(line) = event {
                eprintln!("{}", line.dimmed());
            }
        }));
    }

    let result = generator
        .generate(script.as_str())
        .with_context(|| format!("Mesh generation with {} failed", engine_name))?;

    write_msh(&result.mesh, &args.output)
        .with_context(|| format!("Failed to save mesh to {:?}", args.output))?;

    let report = GenerateReport {
        output: args.output.display().to_string(),
        engine: engine_name,
        points: result.mesh.point_count(),
        cells: result.mesh.cell_count(),
        eligibility: result.eligibility.to_string(),
        relaxation: result.relaxation,
        operation_log: result.operation_log,
    };

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("Mesh saved to {}", args.output.display()),
                    cli.format,
                    cli.quiet,
                );
                println!("  {}: {}", "Points".cyan(), report.points);
                println!("  {}: {}", "Cells".cyan(), report.cells);
                match &report.relaxation {
                    Some(summary) => println!(
                        "  {}: {} steps on region {}, min quality {:.3} → {:.3}",
                        "Relaxed".green(),
                        summary.stats.steps,
                        summary.region,
                        summary.stats.min_quality_before,
                        summary.stats.min_quality_after
                    ),
                    None => println!("  {}: {}", "Not relaxed".yellow(), report.eligibility),
                }
            }
        }
    }

    Ok(())
}

fn load_config(args: &GenerateArgs) -> Result<GeneratorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = GeneratorConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {:?}", path))?;
            tracing::debug!(path = ?path, name = ?config.name, "Loaded generator configuration");
            config
        }
        None => GeneratorConfig::default(),
    };

    if args.no_optimize {
        config.generate.optimize = false;
    }
    if let Some(steps) = args.engine_lloyd_steps {
        config.generate.num_quad_lloyd_steps = steps;
    }
    if let Some(steps) = args.lloyd_steps {
        config.generate.num_lloyd_steps = steps;
    }
    if let Some(every) = args.flip_frequency {
        config.generate.flip_frequency = every;
    }
    if let Some(gmsh) = &args.gmsh {
        config.engine.executable = Some(gmsh.clone());
    }
    if let Some(timeout) = args.timeout {
        config.engine.timeout_secs = Some(timeout);
    }
    Ok(config)
}

/// Script for a polygon given as "x,y;x,y;...", tagged as physical surface 1.
fn polygon_script(polygon: &str, lcar: Option<f64>) -> Result<String> {
    let corners = parse_polygon(polygon)?;
    let mut geometry = Geometry::new();
    let polygon = geometry
        .add_polygon(&corners, lcar)
        .context("Invalid polygon")?;
    geometry.add_physical_surface(&[polygon.surface], 1);
    Ok(geometry.get_code())
}

fn parse_polygon(polygon: &str) -> Result<Vec<Point3<f64>>> {
    polygon.split(';')
        .map(str::trim)
        .filter(|corner| !corner.is_empty())
        .map(|corner| {
            let coords = corner
                .split(',')
                .map(|c| c.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Invalid polygon corner {:?}", corner))?;
            match coords.as_slice() {
                [x, y] => Ok(Point3::new(*x, *y, 0.0)),
                _ => bail!("Polygon corner {:?} must be \"x,y\"", corner),
            }
        })
        .collect()
}
