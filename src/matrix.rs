//! The dense recipe matrix: rows are resources, columns are recipes run on one
//! machine, cells are net rates per second (negative = consumed).

use crate::config::FORMAT_VERSION;
use crate::fields::{EnergySource, ParseWarning};
use crate::recipe::{resolve_machine, MachineSpec, Recipe};
use crate::rules::ParseRules;
use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// An item some column produces
    Intermediate,
    /// An item no column produces
    Raw,
    Energy,
    Pollution,
    Manual,
}

impl ResourceKind {
    pub fn is_item(self) -> bool {
        matches!(self, ResourceKind::Intermediate | ResourceKind::Raw)
    }

    /// Kinds whose natural sign in the matrix is negative.
    pub fn is_consumption(self) -> bool {
        matches!(
            self,
            ResourceKind::Raw | ResourceKind::Energy | ResourceKind::Manual
        )
    }

    pub fn unit(self) -> &'static str {
        match self {
            ResourceKind::Intermediate | ResourceKind::Raw | ResourceKind::Pollution => "/s",
            ResourceKind::Energy => "kW",
            ResourceKind::Manual => "crafters",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub name: String,
    pub kind: ResourceKind,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeMeta {
    /// Column label, `<recipe> (<machine>)`
    pub name: String,
    pub recipe: String,
    pub machine: String,
}

/// Row and column labels; persisted as the sidecar of the binary matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixMeta {
    pub version: u32,
    pub resources: Vec<ResourceMeta>,
    pub recipes: Vec<RecipeMeta>,
}

impl MatrixMeta {
    pub fn new(resources: Vec<ResourceMeta>, recipes: Vec<RecipeMeta>) -> Self {
        Self {
            version: FORMAT_VERSION,
            resources,
            recipes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipeMatrix {
    pub meta: MatrixMeta,
    pub values: Array2<f64>,
}

impl RecipeMatrix {
    pub fn new(meta: MatrixMeta, values: Array2<f64>) -> Result<Self> {
        let expected = (meta.resources.len(), meta.recipes.len());
        if values.dim() != expected {
            bail!(
                "Matrix shape {:?} does not match labels: {} resources x {} recipes",
                values.dim(),
                expected.0,
                expected.1
            );
        }
        Ok(Self { meta, values })
    }

    pub fn resources(&self) -> usize {
        self.values.nrows()
    }

    pub fn recipes(&self) -> usize {
        self.values.ncols()
    }

    pub fn resource_index(&self, name: &str) -> Option<usize> {
        self.meta.resources.iter().position(|r| r.name == name)
    }

    /// Columns matching `name`, either exactly by label or by recipe across all machines.
    pub fn recipe_columns(&self, name: &str) -> Vec<usize> {
        if let Some(j) = self.meta.recipes.iter().position(|r| r.name == name) {
            return vec![j];
        }
        self.meta
            .recipes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.recipe == name)
            .map(|(j, _)| j)
            .collect()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.values.row(i)
    }

    pub fn nnz(&self) -> usize {
        self.values.iter().filter(|v| **v != 0.0).count()
    }

    pub fn density(&self) -> f64 {
        let size = self.values.len();
        if size == 0 {
            0.0
        } else {
            self.nnz() as f64 / size as f64
        }
    }

    /// Columns lacking a strictly negative or a strictly positive item entry.
    pub fn implausible_columns(&self) -> Vec<usize> {
        self.values
            .axis_iter(Axis(1))
            .enumerate()
            .filter(|(_, column)| {
                let items = column
                    .iter()
                    .zip(&self.meta.resources)
                    .filter(|(_, r)| r.kind.is_item())
                    .map(|(v, _)| *v);
                let (mut neg, mut pos) = (false, false);
                for v in items {
                    neg |= v < 0.0;
                    pos |= v > 0.0;
                }
                !(neg && pos)
            })
            .map(|(j, _)| j)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRecipe {
    pub column: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct MatrixBuild {
    pub matrix: RecipeMatrix,
    pub dropped: Vec<DroppedRecipe>,
    /// Identical columns seen more than once
    pub duplicates: usize,
    /// Columns with the same label but different rates; the first one is kept
    pub conflicts: usize,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone, PartialEq)]
struct Column {
    recipe: String,
    machine: String,
    entries: BTreeMap<String, f64>,
}

/// Builds the matrix from extracted recipes.
///
/// Every (recipe, producer) pair becomes one column. Columns touching an
/// archived item, columns with no crafting time and columns that do not both
/// consume and produce an item are dropped.
pub fn build_matrix(
    recipes: &[Recipe],
    machines: &BTreeMap<String, MachineSpec>,
    archived: &BTreeSet<String>,
    rules: &ParseRules,
) -> Result<MatrixBuild> {
    let synthetic = synthetic_rows(rules);
    let mut warnings = Vec::new();
    let mut dropped = Vec::new();
    let mut duplicates = 0;
    let mut conflicts = 0;
    let mut columns: BTreeMap<String, Column> = BTreeMap::new();

    for recipe in recipes {
        for producer in &recipe.producers {
            let label = format!("{} ({})", recipe.name, producer);
            let spec = resolve_machine(producer, machines, rules).take(&mut warnings);

            let column = match recipe_column(recipe, &spec, archived, rules) {
                Ok(column) => column,
                Err(reason) => {
                    dropped.push(DroppedRecipe {
                        column: label,
                        reason,
                    });
                    continue;
                }
            };
            if let Err(reason) = check_plausible(&column, &synthetic) {
                dropped.push(DroppedRecipe {
                    column: label,
                    reason,
                });
                continue;
            }

            match columns.get(&label) {
                None => {
                    columns.insert(label, column);
                }
                Some(existing) if *existing == column => {
                    debug!(column = %label, "Duplicate recipe column");
                    duplicates += 1;
                }
                Some(_) => {
                    warn!(column = %label, "Conflicting definitions, keeping the first");
                    conflicts += 1;
                }
            }
        }
    }

    let matrix = assemble(&columns, &synthetic)?;
    Ok(MatrixBuild {
        matrix,
        dropped,
        duplicates,
        conflicts,
        warnings,
    })
}

fn synthetic_rows(rules: &ParseRules) -> BTreeMap<String, ResourceKind> {
    [
        (&rules.electric_row, ResourceKind::Energy),
        (&rules.burner_row, ResourceKind::Energy),
        (&rules.pollution_row, ResourceKind::Pollution),
        (&rules.manual_row, ResourceKind::Manual),
    ]
    .into_iter()
    .map(|(name, kind)| (name.clone(), kind))
    .collect()
}

/// Net rates of one recipe on one machine, or the reason it cannot be a column.
fn recipe_column(
    recipe: &Recipe,
    spec: &MachineSpec,
    archived: &BTreeSet<String>,
    rules: &ParseRules,
) -> std::result::Result<Column, String> {
    if let Some((name, _)) = recipe
        .inputs
        .iter()
        .chain(&recipe.outputs)
        .find(|(name, _)| archived.contains(name))
    {
        return Err(format!("uses archived item {}", name));
    }
    if recipe.time <= 0.0 {
        return Err("no crafting time".to_string());
    }
    if spec.speed <= 0.0 {
        return Err(format!("machine {} has no crafting speed", spec.name));
    }

    let cycles_per_sec = spec.speed / recipe.time;
    let mut entries: BTreeMap<String, f64> = BTreeMap::new();
    for (name, qty) in &recipe.inputs {
        *entries.entry(name.clone()).or_default() -= qty * cycles_per_sec;
    }
    for (name, qty) in &recipe.outputs {
        *entries.entry(name.clone()).or_default() += qty * cycles_per_sec;
    }

    if let Some(energy) = spec.energy.filter(|e| e.kw > 0.0) {
        let row = match energy.source {
            EnergySource::Electric => &rules.electric_row,
            EnergySource::Burner => &rules.burner_row,
        };
        *entries.entry(row.clone()).or_default() -= energy.kw;
    }
    if spec.pollution_per_sec > 0.0 {
        *entries.entry(rules.pollution_row.clone()).or_default() += spec.pollution_per_sec;
    }
    if rules.is_manual(&spec.name) {
        *entries.entry(rules.manual_row.clone()).or_default() -= 1.0;
    }

    entries.retain(|_, v| *v != 0.0);
    Ok(Column {
        recipe: recipe.name.clone(),
        machine: spec.name.clone(),
        entries,
    })
}

fn check_plausible(
    column: &Column,
    synthetic: &BTreeMap<String, ResourceKind>,
) -> std::result::Result<(), String> {
    let items = column
        .entries
        .iter()
        .filter(|(name, _)| !synthetic.contains_key(*name));
    let (mut neg, mut pos) = (false, false);
    for (_, v) in items {
        neg |= *v < 0.0;
        pos |= *v > 0.0;
    }
    match (neg, pos) {
        (true, true) => Ok(()),
        (false, _) => Err("consumes no item".to_string()),
        (_, false) => Err("produces no item".to_string()),
    }
}

fn assemble(
    columns: &BTreeMap<String, Column>,
    synthetic: &BTreeMap<String, ResourceKind>,
) -> Result<RecipeMatrix> {
    let mut kinds: BTreeMap<&str, ResourceKind> = BTreeMap::new();
    for column in columns.values() {
        for (name, value) in &column.entries {
            let kind = match synthetic.get(name) {
                Some(kind) => *kind,
                None if *value > 0.0 => ResourceKind::Intermediate,
                None => ResourceKind::Raw,
            };
            kinds
                .entry(name.as_str())
                .and_modify(|k| {
                    if kind == ResourceKind::Intermediate {
                        *k = kind;
                    }
                })
                .or_insert(kind);
        }
    }

    let mut rows: Vec<(ResourceKind, &str)> = kinds.into_iter().map(|(n, k)| (k, n)).collect();
    rows.sort();

    let index: BTreeMap<&str, usize> = rows.iter().enumerate().map(|(i, (_, n))| (*n, i)).collect();
    let mut values = Array2::zeros((rows.len(), columns.len()));
    for (j, column) in columns.values().enumerate() {
        for (name, value) in &column.entries {
            values[[index[name.as_str()], j]] = *value;
        }
    }

    let resources = rows
        .iter()
        .map(|(kind, name)| ResourceMeta {
            name: name.to_string(),
            kind: *kind,
            unit: kind.unit().to_string(),
        })
        .collect();
    let recipes = columns
        .iter()
        .map(|(label, column)| RecipeMeta {
            name: label.clone(),
            recipe: column.recipe.clone(),
            machine: column.machine.clone(),
        })
        .collect();

    RecipeMatrix::new(MatrixMeta::new(resources, recipes), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Energy;
    use crate::recipe::RecipeSource;

    fn recipe(name: &str, producers: &[&str], time: f64, inputs: &[(&str, f64)], outputs: &[(&str, f64)]) -> Recipe {
        let list = |xs: &[(&str, f64)]| xs.iter().map(|(n, q)| (n.to_string(), *q)).collect();
        Recipe {
            name: name.to_string(),
            producers: producers.iter().map(|p| p.to_string()).collect(),
            time,
            inputs: list(inputs),
            outputs: list(outputs),
            source: RecipeSource::Infobox,
        }
    }

    fn build(recipes: &[Recipe]) -> MatrixBuild {
        build_matrix(recipes, &BTreeMap::new(), &BTreeSet::new(), &ParseRules::default()).unwrap()
    }

    fn cell(m: &RecipeMatrix, resource: &str, column: &str) -> f64 {
        let i = m.resource_index(resource).unwrap();
        let j = m.recipe_columns(column)[0];
        m.values[[i, j]]
    }

    #[test]
    fn rates_scale_with_machine_speed() {
        let gear = recipe(
            "Iron gear wheel",
            &["Assembling machine 1", "Assembling machine 2"],
            0.5,
            &[("Iron plate", 2.0)],
            &[("Iron gear wheel", 1.0)],
        );
        let m = build(&[gear]).matrix;
        assert_eq!(m.recipes(), 2);
        assert_eq!(cell(&m, "Iron plate", "Iron gear wheel (Assembling machine 1)"), -2.0);
        assert_eq!(cell(&m, "Iron gear wheel", "Iron gear wheel (Assembling machine 1)"), 1.0);
        assert_eq!(cell(&m, "Iron plate", "Iron gear wheel (Assembling machine 2)"), -3.0);
    }

    #[test]
    fn rows_sorted_by_kind_then_name() {
        let m = build(&[
            recipe("B", &["Manual"], 1.0, &[("Z ore", 1.0)], &[("B", 1.0)]),
            recipe("A", &["Manual"], 1.0, &[("B", 1.0)], &[("A", 1.0)]),
        ])
        .matrix;
        let rows: Vec<(&str, ResourceKind)> = m
            .meta
            .resources
            .iter()
            .map(|r| (r.name.as_str(), r.kind))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("A", ResourceKind::Intermediate),
                ("B", ResourceKind::Intermediate),
                ("Z ore", ResourceKind::Raw),
                ("Manual labour", ResourceKind::Manual),
            ]
        );
        let columns: Vec<&str> = m.meta.recipes.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(columns, vec!["A (Manual)", "B (Manual)"]);
    }

    #[test]
    fn machine_energy_and_pollution_rows() {
        let mut machines = BTreeMap::new();
        machines.insert(
            "Stone furnace".to_string(),
            MachineSpec {
                name: "Stone furnace".to_string(),
                speed: 1.0,
                energy: Some(Energy {
                    kw: 90.0,
                    source: EnergySource::Burner,
                }),
                pollution_per_sec: 2.0 / 60.0,
            },
        );
        let plate = recipe("Iron plate", &["Stone furnace"], 3.2, &[("Iron ore", 1.0)], &[("Iron plate", 1.0)]);
        let built = build_matrix(&[plate], &machines, &BTreeSet::new(), &ParseRules::default()).unwrap();
        let m = built.matrix;

        assert_eq!(cell(&m, "Burner fuel", "Iron plate"), -90.0);
        assert!((cell(&m, "Pollution", "Iron plate") - 2.0 / 60.0).abs() < 1e-12);
        assert!((cell(&m, "Iron plate", "Iron plate") - 1.0 / 3.2).abs() < 1e-12);
        assert!(m.resource_index("Manual labour").is_none());
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn unknown_machine_uses_default_speed_with_warning() {
        let built = build(&[recipe("X", &["Mystery box"], 2.0, &[("A", 1.0)], &[("X", 1.0)])]);
        assert_eq!(cell(&built.matrix, "X", "X"), 0.5);
        assert_eq!(built.warnings.len(), 1);
    }

    #[test]
    fn free_production_is_dropped() {
        let built = build(&[
            recipe("Wood", &["Manual"], 1.0, &[], &[("Wood", 4.0)]),
            recipe("Void", &["Manual"], 1.0, &[("Wood", 1.0)], &[]),
        ]);
        assert_eq!(built.matrix.recipes(), 0);
        assert_eq!(built.dropped.len(), 2);
        assert_eq!(built.dropped[0].reason, "consumes no item");
        assert_eq!(built.dropped[1].reason, "produces no item");
    }

    #[test]
    fn zero_time_is_dropped() {
        let built = build(&[recipe("X", &["Manual"], 0.0, &[("A", 1.0)], &[("X", 1.0)])]);
        assert_eq!(built.matrix.recipes(), 0);
        assert_eq!(built.dropped[0].reason, "no crafting time");
    }

    #[test]
    fn archived_items_never_become_rows() {
        let archived: BTreeSet<String> = ["Small plane".to_string()].into_iter().collect();
        let recipes = [
            recipe("Small plane", &["Manual"], 1.0, &[("Iron plate", 1.0)], &[("Small plane", 1.0)]),
            recipe("Pipe", &["Manual"], 0.5, &[("Iron plate", 1.0)], &[("Pipe", 1.0)]),
        ];
        let built = build_matrix(&recipes, &BTreeMap::new(), &archived, &ParseRules::default()).unwrap();
        assert!(built.matrix.resource_index("Small plane").is_none());
        assert_eq!(built.matrix.recipes(), 1);
        assert!(built.dropped[0].reason.contains("archived"));
    }

    #[test]
    fn duplicates_and_conflicts() {
        let a = recipe("X", &["Manual"], 1.0, &[("A", 1.0)], &[("X", 1.0)]);
        let conflicting = recipe("X", &["Manual"], 1.0, &[("A", 2.0)], &[("X", 1.0)]);
        let built = build(&[a.clone(), a, conflicting]);
        assert_eq!(built.matrix.recipes(), 1);
        assert_eq!(built.duplicates, 1);
        assert_eq!(built.conflicts, 1);
        assert_eq!(cell(&built.matrix, "A", "X"), -1.0);
    }

    #[test]
    fn catalyst_nets_out() {
        let kovarex = recipe(
            "Kovarex enrichment process",
            &["Centrifuge"],
            60.0,
            &[("Uranium-235", 40.0), ("Uranium-238", 5.0)],
            &[("Uranium-235", 41.0), ("Uranium-238", 2.0)],
        );
        let m = build(&[kovarex]).matrix;
        assert!((cell(&m, "Uranium-235", "Kovarex enrichment process") - 1.0 / 60.0).abs() < 1e-12);
        assert!((cell(&m, "Uranium-238", "Kovarex enrichment process") + 3.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn built_matrix_has_no_implausible_columns() {
        let built = build(&[
            recipe("X", &["Manual", "Assembling machine 1"], 1.0, &[("A", 1.0)], &[("X", 1.0)]),
            recipe("Y", &["Manual"], 1.0, &[("X", 1.0)], &[("Y", 2.0)]),
        ]);
        assert!(built.matrix.implausible_columns().is_empty());
        assert_eq!(built.matrix.nnz(), 3 + 2 + 3);
    }

    #[test]
    fn new_rejects_mismatched_shape() {
        let meta = MatrixMeta::new(Vec::new(), Vec::new());
        assert!(RecipeMatrix::new(meta, Array2::zeros((1, 1))).is_err());
    }

    #[test]
    fn density_of_empty_matrix() {
        let m = RecipeMatrix::new(MatrixMeta::new(Vec::new(), Vec::new()), Array2::zeros((0, 0))).unwrap();
        assert_eq!(m.density(), 0.0);
    }
}
