//! Linear program formulation over a [`RecipeMatrix`].
//!
//! Variables are recipe scales `x` (one per column, `x >= 0`). With `M` the
//! matrix, `M·x` is the net rate of every resource, so:
//!
//! - the objective is `c·x` with `c = expense·M` (minimized),
//! - sustainability asks `M_i·x >= 0` for every intermediate row `i`,
//!   written as `-M_i·x <= 0`,
//! - targets fix `M_i·x` exactly, caps bound consumption or production.

use crate::error::SolveError;
use crate::matrix::{RecipeMatrix, ResourceKind};
use anyhow::{Context, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Objective {
    /// Minimize `expense·M·x`
    MinimizeExpense,
    MaximizeResource { resource: String },
    MinimizeResource { resource: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Net rate of `resource` equals `rate`
    Target { resource: String, rate: f64 },
    /// Net rate of `resource` is at least `rate`
    AtLeast { resource: String, rate: f64 },
    /// Consumption (for raw, energy and manual rows) or production (otherwise) of `resource` is at most `limit`
    Cap { resource: String, limit: f64 },
    /// Scale of every column of `recipe` is at most `max`
    RecipeLimit { recipe: String, max: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub objective: Objective,
    /// Weight per resource; a row's contribution to `c` is `weight * M_i`
    pub expense: BTreeMap<String, f64>,
    /// Weight for raw rows missing from `expense`. Raw entries are negative,
    /// so a negative weight makes raw consumption costly.
    pub default_raw_expense: f64,
    pub constraints: Vec<Constraint>,
    /// Require non-negative net production of every intermediate resource
    pub sustainable: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            objective: Objective::MinimizeExpense,
            expense: BTreeMap::new(),
            default_raw_expense: -1.0,
            constraints: Vec::new(),
            sustainable: true,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read analysis config: {:?}", path))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse analysis config: {:?}", path))
    }
}

/// `minimize c·x  s.t.  A_ub·x <= b_ub,  A_eq·x = b_eq,  lo <= x <= hi`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearProgram {
    pub c: Array1<f64>,
    pub a_ub: Array2<f64>,
    pub b_ub: Array1<f64>,
    pub a_eq: Array2<f64>,
    pub b_eq: Array1<f64>,
    pub bounds: Vec<(f64, f64)>,
    /// Column labels, in variable order
    pub labels: Vec<String>,
}

/// One weight per matrix row, from the config map and the raw default.
pub fn expense_vector(matrix: &RecipeMatrix, config: &AnalysisConfig) -> Result<Array1<f64>, SolveError> {
    let mut expense: Array1<f64> = matrix
        .meta
        .resources
        .iter()
        .map(|r| match r.kind {
            ResourceKind::Raw => config.default_raw_expense,
            _ => 0.0,
        })
        .collect();

    for (name, weight) in &config.expense {
        let i = matrix
            .resource_index(name)
            .ok_or_else(|| SolveError::UnknownResource(name.clone()))?;
        expense[i] = *weight;
    }
    Ok(expense)
}

/// `c = expense · M`: the weighted cost of running each recipe at unit scale.
pub fn objective_from_expense(expense: &Array1<f64>, values: &Array2<f64>) -> Result<Array1<f64>, SolveError> {
    if expense.len() != values.nrows() {
        return Err(SolveError::DimensionMismatch {
            expected: values.nrows(),
            got: expense.len(),
        });
    }
    Ok(expense.dot(values))
}

pub fn formulate(matrix: &RecipeMatrix, config: &AnalysisConfig) -> Result<LinearProgram, SolveError> {
    let n = matrix.recipes();

    let c = match &config.objective {
        Objective::MinimizeExpense => {
            objective_from_expense(&expense_vector(matrix, config)?, &matrix.values)?
        }
        Objective::MaximizeResource { resource } => -resource_row(matrix, resource)?.to_owned(),
        Objective::MinimizeResource { resource } => resource_row(matrix, resource)?.to_owned(),
    };

    let mut upper: Vec<(Array1<f64>, f64)> = Vec::new();
    let mut equal: Vec<(Array1<f64>, f64)> = Vec::new();
    let mut bounds = vec![(0.0, f64::INFINITY); n];

    if config.sustainable {
        for (i, resource) in matrix.meta.resources.iter().enumerate() {
            if resource.kind == ResourceKind::Intermediate {
                upper.push((-matrix.row(i).to_owned(), 0.0));
            }
        }
    }

    for constraint in &config.constraints {
        match constraint {
            Constraint::Target { resource, rate } => {
                equal.push((resource_row(matrix, resource)?.to_owned(), *rate));
            }
            Constraint::AtLeast { resource, rate } => {
                upper.push((-resource_row(matrix, resource)?.to_owned(), -*rate));
            }
            Constraint::Cap { resource, limit } => {
                let i = matrix
                    .resource_index(resource)
                    .ok_or_else(|| SolveError::UnknownResource(resource.clone()))?;
                let row = matrix.row(i).to_owned();
                if matrix.meta.resources[i].kind.is_consumption() {
                    upper.push((-row, *limit));
                } else {
                    upper.push((row, *limit));
                }
            }
            Constraint::RecipeLimit { recipe, max } => {
                if !(*max >= 0.0) {
                    return Err(SolveError::InvalidBound {
                        name: recipe.clone(),
                        value: *max,
                    });
                }
                let columns = matrix.recipe_columns(recipe);
                if columns.is_empty() {
                    return Err(SolveError::UnknownRecipe(recipe.clone()));
                }
                for j in columns {
                    bounds[j].1 = bounds[j].1.min(*max);
                }
            }
        }
    }

    let (a_ub, b_ub) = stack(upper, n);
    let (a_eq, b_eq) = stack(equal, n);
    Ok(LinearProgram {
        c,
        a_ub,
        b_ub,
        a_eq,
        b_eq,
        bounds,
        labels: matrix.meta.recipes.iter().map(|r| r.name.clone()).collect(),
    })
}

fn resource_row<'a>(matrix: &'a RecipeMatrix, name: &str) -> Result<ArrayView1<'a, f64>, SolveError> {
    matrix
        .resource_index(name)
        .map(|i| matrix.row(i))
        .ok_or_else(|| SolveError::UnknownResource(name.to_string()))
}

fn stack(rows: Vec<(Array1<f64>, f64)>, n: usize) -> (Array2<f64>, Array1<f64>) {
    let mut a = Array2::zeros((rows.len(), n));
    let mut b = Array1::zeros(rows.len());
    for (k, (row, rhs)) in rows.into_iter().enumerate() {
        a.row_mut(k).assign(&row);
        b[k] = rhs;
    }
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{MatrixMeta, RecipeMeta, ResourceMeta};
    use ndarray::array;

    fn resource(name: &str, kind: ResourceKind) -> ResourceMeta {
        ResourceMeta {
            name: name.to_string(),
            kind,
            unit: kind.unit().to_string(),
        }
    }

    fn column(name: &str) -> RecipeMeta {
        RecipeMeta {
            name: format!("{} (Manual)", name),
            recipe: name.to_string(),
            machine: "Manual".to_string(),
        }
    }

    /// Gears from plates, plates from ore; electric power on the plate column.
    fn toy() -> RecipeMatrix {
        let meta = MatrixMeta::new(
            vec![
                resource("Gear", ResourceKind::Intermediate),
                resource("Plate", ResourceKind::Intermediate),
                resource("Ore", ResourceKind::Raw),
                resource("Electric power", ResourceKind::Energy),
            ],
            vec![column("Gear"), column("Plate")],
        );
        let values = array![
            [1.0, 0.0],
            [-2.0, 1.0],
            [0.0, -1.0],
            [0.0, -90.0],
        ];
        RecipeMatrix::new(meta, values).unwrap()
    }

    #[test]
    fn objective_is_expense_dot_matrix() {
        let values = array![[1.0, -2.0], [3.0, 4.0]];
        let expense = array![0.5, -1.0];
        let c = objective_from_expense(&expense, &values).unwrap();
        // [0.5*1 + -1*3, 0.5*-2 + -1*4]
        assert_eq!(c, array![-2.5, -5.0]);
    }

    #[test]
    fn objective_rejects_wrong_length() {
        let err = objective_from_expense(&array![1.0], &array![[1.0], [2.0]]).unwrap_err();
        assert_eq!(err, SolveError::DimensionMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn default_expense_penalizes_raw_rows() {
        let m = toy();
        let expense = expense_vector(&m, &AnalysisConfig::default()).unwrap();
        assert_eq!(expense, array![0.0, 0.0, -1.0, 0.0]);

        let lp = formulate(&m, &AnalysisConfig::default()).unwrap();
        assert_eq!(lp.c, array![0.0, 1.0]);
    }

    #[test]
    fn configured_expense_overrides_default() {
        let config = AnalysisConfig {
            expense: [("Electric power".to_string(), -0.01), ("Ore".to_string(), 0.0)]
                .into_iter()
                .collect(),
            ..AnalysisConfig::default()
        };
        let lp = formulate(&toy(), &config).unwrap();
        assert!((lp.c[1] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn unknown_expense_resource() {
        let config = AnalysisConfig {
            expense: [("Unobtainium".to_string(), 1.0)].into_iter().collect(),
            ..AnalysisConfig::default()
        };
        assert_eq!(
            formulate(&toy(), &config).unwrap_err(),
            SolveError::UnknownResource("Unobtainium".to_string())
        );
    }

    #[test]
    fn sustainability_rows_for_intermediates_only() {
        let lp = formulate(&toy(), &AnalysisConfig::default()).unwrap();
        assert_eq!(lp.a_ub, array![[-1.0, 0.0], [2.0, -1.0]]);
        assert_eq!(lp.b_ub, array![0.0, 0.0]);
        assert_eq!(lp.a_eq.nrows(), 0);
        assert_eq!(lp.bounds, vec![(0.0, f64::INFINITY); 2]);
    }

    #[test]
    fn constraints_translate_to_rows() {
        let config = AnalysisConfig {
            sustainable: false,
            constraints: vec![
                Constraint::Target {
                    resource: "Gear".to_string(),
                    rate: 10.0,
                },
                Constraint::AtLeast {
                    resource: "Plate".to_string(),
                    rate: 1.0,
                },
                Constraint::Cap {
                    resource: "Electric power".to_string(),
                    limit: 900.0,
                },
                Constraint::RecipeLimit {
                    recipe: "Plate".to_string(),
                    max: 50.0,
                },
            ],
            ..AnalysisConfig::default()
        };
        let lp = formulate(&toy(), &config).unwrap();

        assert_eq!(lp.a_eq, array![[1.0, 0.0]]);
        assert_eq!(lp.b_eq, array![10.0]);
        assert_eq!(lp.a_ub, array![[2.0, -1.0], [0.0, 90.0]]);
        assert_eq!(lp.b_ub, array![-1.0, 900.0]);
        assert_eq!(lp.bounds[1], (0.0, 50.0));
        assert_eq!(lp.labels, vec!["Gear (Manual)", "Plate (Manual)"]);
    }

    #[test]
    fn maximize_resource_negates_row() {
        let config = AnalysisConfig {
            objective: Objective::MaximizeResource {
                resource: "Gear".to_string(),
            },
            ..AnalysisConfig::default()
        };
        assert_eq!(formulate(&toy(), &config).unwrap().c, array![-1.0, -0.0]);
    }

    #[test]
    fn negative_recipe_limit_is_invalid() {
        let config = AnalysisConfig {
            constraints: vec![Constraint::RecipeLimit {
                recipe: "Gear".to_string(),
                max: -1.0,
            }],
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            formulate(&toy(), &config),
            Err(SolveError::InvalidBound { .. })
        ));
    }

    #[test]
    fn unknown_recipe_limit() {
        let config = AnalysisConfig {
            constraints: vec![Constraint::RecipeLimit {
                recipe: "Rocket".to_string(),
                max: 1.0,
            }],
            ..AnalysisConfig::default()
        };
        assert_eq!(
            formulate(&toy(), &config).unwrap_err(),
            SolveError::UnknownRecipe("Rocket".to_string())
        );
    }

    #[test]
    fn config_from_json() {
        let json = r#"{
            "objective": {"kind": "maximize_resource", "resource": "Gear"},
            "constraints": [{"kind": "cap", "resource": "Electric power", "limit": 1000}]
        }"#;
        let config: AnalysisConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.objective,
            Objective::MaximizeResource {
                resource: "Gear".to_string()
            }
        );
        assert_eq!(config.default_raw_expense, -1.0);
        assert!(config.sustainable);
        assert_eq!(config.constraints.len(), 1);
    }
}
