//! mesh-cli: Command-line interface for mesh generation.
//!
//! Runs gmsh on a geometry script, relaxes planar single-region results,
//! and inspects or relaxes existing `.msh` files.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=mesh_gen=info` - Basic operation logging and engine output
//! - `RUST_LOG=mesh_gen=debug` - Detailed progress logging
//! - `RUST_LOG=mesh_gen::timing=info` - Stage timing
//! - `RUST_LOG=mesh_gen::relax=trace` - Every relaxation step
//!
//! # Example
//!
//! ```bash
//! # Mesh a unit square and relax it
//! meshgen generate --polygon "0,0;1,0;1,1;0,1" --lcar 0.1 -o square.msh
//!
//! # Mesh a geometry script with a specific gmsh
//! meshgen generate part.geo --gmsh /opt/gmsh/bin/gmsh -o part.msh
//!
//! # Inspect the result
//! meshgen info square.msh --detailed --format json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{generate, info, relax};

/// meshgen - Generate meshes with gmsh and relax planar triangulations.
#[derive(Parser)]
#[command(name = "meshgen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Mesh a geometry script (or a polygon) and relax the result
    Generate(generate::GenerateArgs),

    /// Display mesh statistics and relaxation eligibility
    Info {
        /// Input mesh file (.msh)
        input: PathBuf,

        /// Show tags, data arrays and triangle quality
        #[arg(long)]
        detailed: bool,
    },

    /// Relax an existing planar single-region mesh
    Relax {
        /// Input mesh file (.msh)
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Maximum relaxation steps
        #[arg(long, default_value = "1000")]
        steps: usize,

        /// Stop once every triangle reaches this quality (0 runs all steps)
        #[arg(long, default_value = "0.0")]
        target_quality: f64,

        /// Delaunay flips before every N-th step (0 disables flips)
        #[arg(long, default_value = "1")]
        flip_frequency: usize,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "mesh_gen=info",
            2 => "mesh_gen=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Generate(args) => generate::run(args, &cli),
        Commands::Info { input, detailed } => info::run(input, *detailed, &cli),
        Commands::Relax {
            input,
            output,
            steps,
            target_quality,
            flip_frequency,
        } => relax::run(input, output, *steps, *target_quality, *flip_frequency, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            eprintln!("{}: {}", "Error".red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {}", "Caused by".yellow(), cause);
            }
            if let Some(mesh_err) = e.downcast_ref::<mesh_gen::MeshError>() {
                eprintln!("  {}: {}", "Code".cyan(), mesh_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    mesh_err.recovery_suggestion()
                );
                if let Some(location) = mesh_err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
