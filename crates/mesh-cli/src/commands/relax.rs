//! meshgen relax command - Lloyd relaxation of an existing mesh.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use mesh_gen::{LloydRelaxer, RelaxParams, RelaxSummary, classify, load_mesh, relax_mesh, write_msh};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct RelaxReport {
    input: String,
    output: String,
    relaxed: bool,
    eligibility: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<RelaxSummary>,
}

pub fn run(
    input: &Path,
    output_path: &Path,
    steps: usize,
    target_quality: f64,
    flip_frequency: usize,
    cli: &Cli,
) -> Result<()> {
    let mut mesh =
        load_mesh(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let eligibility = classify(&mesh);

    let params = RelaxParams {
        target_quality,
        max_steps: steps,
        flip_frequency,
        verbose: cli.verbose > 0,
    };
    let summary = relax_mesh(&mut mesh, &params, &LloydRelaxer::default())
        .with_context(|| "Relaxation failed")?;

    write_msh(&mesh, output_path)
        .with_context(|| format!("Failed to save mesh to {:?}", output_path))?;

    let report = RelaxReport {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        relaxed: summary.is_some(),
        eligibility: eligibility.to_string(),
        summary,
    };

    match cli.format {
        OutputFormat::Json => {
            output::print(&report, cli.format, cli.quiet);
        }
        OutputFormat::Text => match &report.summary {
            Some(s) => {
                output::success(
                    &format!("Relaxed mesh saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
                if !cli.quiet {
                    println!(
                        "  {}: {} ({})",
                        "Steps".cyan(),
                        s.stats.steps,
                        if s.stats.converged { "converged" } else { "budget reached" }
                    );
                    println!("  {}: {}", "Edges flipped".cyan(), s.stats.edges_flipped);
                    println!(
                        "  {}: {:.4} → {:.4}",
                        "Min quality".cyan(),
                        s.stats.min_quality_before,
                        s.stats.min_quality_after
                    );
                }
            }
            None => output::warning(
                &format!(
                    "Mesh left unchanged ({}), saved to {}",
                    report.eligibility,
                    output_path.display()
                ),
                cli.format,
                cli.quiet,
            ),
        },
    }

    Ok(())
}
