use crate::artifact::load_matrix;
use crate::config::SOLUTION_EPSILON;
use crate::error::SolveError;
use crate::lp::{formulate, AnalysisConfig};
use crate::matrix::RecipeMatrix;
use anyhow::Result;
use ndarray::Array1;
use std::path::Path;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeUsage {
    pub name: String,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRate {
    pub name: String,
    pub unit: String,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub objective: f64,
    pub x: Array1<f64>,
    /// Columns with a non-negligible scale, largest first
    pub used: Vec<RecipeUsage>,
    /// Non-zero net rates `M·x`, in row order
    pub rates: Vec<ResourceRate>,
}

pub fn analyse(matrix: &RecipeMatrix, config: &AnalysisConfig) -> Result<AnalysisReport, SolveError> {
    let lp = formulate(matrix, config)?;
    let solution = lp.solve()?;

    let mut used: Vec<RecipeUsage> = lp
        .labels
        .iter()
        .zip(solution.x.iter())
        .filter(|(_, scale)| **scale > SOLUTION_EPSILON)
        .map(|(name, scale)| RecipeUsage {
            name: name.clone(),
            scale: *scale,
        })
        .collect();
    used.sort_by(|a, b| b.scale.total_cmp(&a.scale).then_with(|| a.name.cmp(&b.name)));

    let net = matrix.values.dot(&solution.x);
    let rates = matrix
        .meta
        .resources
        .iter()
        .zip(net.iter())
        .filter(|(_, rate)| rate.abs() > SOLUTION_EPSILON)
        .map(|(resource, rate)| ResourceRate {
            name: resource.name.clone(),
            unit: resource.unit.clone(),
            rate: *rate,
        })
        .collect();

    Ok(AnalysisReport {
        objective: solution.objective,
        x: solution.x,
        used,
        rates,
    })
}

/// Loads the matrix written by preprocess, solves and prints the plan.
pub fn run_analyse(output_dir: &Path, config_path: Option<&Path>) -> Result<()> {
    let start = Instant::now();
    let matrix = load_matrix(output_dir)?;
    info!(
        resources = matrix.resources(),
        recipes = matrix.recipes(),
        nnz = matrix.nnz(),
        density = matrix.density(),
        "Matrix loaded"
    );
    println!(
        "Loaded {}x{} matrix, {} nnz, {:.1}% density",
        matrix.resources(),
        matrix.recipes(),
        matrix.nnz(),
        matrix.density() * 100.0
    );

    let config = match config_path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    info!(
        objective = ?config.objective,
        constraints = config.constraints.len(),
        sustainable = config.sustainable,
        "Analysis config"
    );

    let report = analyse(&matrix, &config)?;
    let elapsed = start.elapsed();

    println!();
    println!("=== Summary ===");
    println!("Analysis time:      {:.2}s", elapsed.as_secs_f64());
    println!("Objective:          {:.6}", report.objective);
    println!("Recipes used:       {}", report.used.len());
    println!();
    for usage in &report.used {
        println!("  {:>12.4}  {}", usage.scale, usage.name);
    }
    if !report.rates.is_empty() {
        println!();
        println!("Net rates:");
        for rate in &report.rates {
            println!("  {:>12.4} {:<8} {}", rate.rate, rate.unit, rate.name);
        }
    }

    Ok(())
}
