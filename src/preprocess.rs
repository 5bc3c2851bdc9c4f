use crate::artifact::{load_fetch, save_matrix, write_table};
use crate::fields::ParseWarning;
use crate::matrix::{build_matrix, DroppedRecipe, RecipeMatrix};
use crate::models::FetchDocument;
use crate::recipe::{extract_recipes, machine_specs};
use crate::rules::ParseRules;
use crate::stats::PreprocessStats;
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything one preprocessing run derives from a fetch document.
#[derive(Debug)]
pub struct PreprocessOutput {
    pub matrix: RecipeMatrix,
    pub dropped: Vec<DroppedRecipe>,
    pub warnings: Vec<ParseWarning>,
    pub stats: PreprocessStats,
}

/// Pure transformation from fetch document to matrix; no I/O.
pub fn preprocess(doc: &FetchDocument, rules: &ParseRules) -> Result<PreprocessOutput> {
    let mut warnings = Vec::new();

    let machines = machine_specs(doc, rules).take(&mut warnings);
    let recipes = extract_recipes(doc, rules).take(&mut warnings);
    debug!(machines = machines.len(), recipes = recipes.len(), "Recipes extracted");

    // Items flagged at fetch time and titles from the archived category.
    let archived: BTreeSet<String> = doc
        .items
        .values()
        .filter(|item| item.archived)
        .map(|item| item.title.clone())
        .chain(doc.archived.iter().cloned())
        .collect();

    let built = build_matrix(&recipes, &machines, &archived, rules)?;
    warnings.extend(built.warnings);

    let live = doc
        .items
        .values()
        .filter(|item| !item.archived && !doc.is_archived(&item.title));
    let mut not_interesting = 0;
    for item in live.clone().filter(|item| !item.has_recipe_data(&rules.recipe_field)) {
        debug!(item = %item.title, "Not interesting: no recipe, cost or table");
        not_interesting += 1;
    }

    let stats = PreprocessStats {
        items: live.count(),
        not_interesting,
        machines: machines.len(),
        recipes: recipes.len(),
        columns: built.matrix.recipes(),
        resources: built.matrix.resources(),
        dropped: built.dropped.len(),
        duplicates: built.duplicates,
        conflicts: built.conflicts,
        warnings: warnings.len(),
        nnz: built.matrix.nnz(),
        density: built.matrix.density(),
    };

    Ok(PreprocessOutput {
        matrix: built.matrix,
        dropped: built.dropped,
        warnings,
        stats,
    })
}

/// Preprocess stage entry point: load the fetch document, build the matrix
/// and write the table, binary matrix and metadata next to it.
pub fn run_preprocess(output_dir: &Path, rules: &ParseRules) -> Result<PreprocessOutput> {
    let start = Instant::now();
    let doc = load_fetch(output_dir)?;
    if !doc.errors.is_empty() {
        warn!(count = doc.errors.len(), "Fetch document lists pages that failed to fetch");
    }

    let output = preprocess(&doc, rules)?;

    for warning in &output.warnings {
        debug!(field = %warning.field, raw = %warning.raw, reason = %warning.reason, "Parse warning");
    }
    if !output.warnings.is_empty() {
        warn!(
            count = output.warnings.len(),
            "Fields defaulted to zero or fell back; rerun with -vv for details"
        );
    }
    for dropped in &output.dropped {
        warn!(column = %dropped.column, reason = %dropped.reason, "Recipe dropped");
    }

    let table_path = write_table(&output.matrix, output_dir)?;
    let (matrix_path, meta_path) = save_matrix(&output.matrix, output_dir)?;
    info!(table = ?table_path, matrix = ?matrix_path, meta = ?meta_path, "Artifacts written");

    output.stats.print_summary(start.elapsed());
    Ok(output)
}
