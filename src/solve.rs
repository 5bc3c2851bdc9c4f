use crate::error::SolveError;
use crate::lp::LinearProgram;
use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Variable};
use ndarray::{Array1, ArrayView1};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Scale of each recipe column, never negative
    pub x: Array1<f64>,
    pub objective: f64,
}

impl LinearProgram {
    /// Solves with the dense simplex in `minilp`.
    ///
    /// Infeasible and unbounded programs are reported as such and never retried.
    pub fn solve(&self) -> Result<Solution, SolveError> {
        let n = self.c.len();
        self.check_dimensions()?;

        let mut problem = Problem::new(OptimizationDirection::Minimize);
        let vars: Vec<Variable> = self
            .c
            .iter()
            .zip(&self.bounds)
            .map(|(c, (lo, hi))| problem.add_var(*c, (*lo, *hi)))
            .collect();

        for (row, rhs) in self.a_ub.rows().into_iter().zip(self.b_ub.iter()) {
            add_row(&mut problem, &vars, row, ComparisonOp::Le, *rhs)?;
        }
        for (row, rhs) in self.a_eq.rows().into_iter().zip(self.b_eq.iter()) {
            add_row(&mut problem, &vars, row, ComparisonOp::Eq, *rhs)?;
        }

        if n == 0 {
            return Ok(Solution {
                x: Array1::zeros(0),
                objective: 0.0,
            });
        }

        debug!(
            variables = n,
            inequalities = self.a_ub.nrows(),
            equalities = self.a_eq.nrows(),
            "Solving linear program"
        );
        let solution = problem.solve().map_err(|e| match e {
            minilp::Error::Infeasible => SolveError::Infeasible,
            minilp::Error::Unbounded => SolveError::Unbounded,
        })?;

        let x: Array1<f64> = vars.iter().map(|v| solution[*v].max(0.0)).collect();
        Ok(Solution {
            objective: self.c.dot(&x),
            x,
        })
    }

    fn check_dimensions(&self) -> Result<(), SolveError> {
        let n = self.c.len();
        let checks = [
            (n, self.bounds.len()),
            (n, self.a_ub.ncols()),
            (n, self.a_eq.ncols()),
            (self.a_ub.nrows(), self.b_ub.len()),
            (self.a_eq.nrows(), self.b_eq.len()),
        ];
        for (expected, got) in checks {
            if expected != got {
                return Err(SolveError::DimensionMismatch { expected, got });
            }
        }
        for (label, (lo, hi)) in self.labels.iter().zip(&self.bounds) {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(SolveError::InvalidBound {
                    name: label.clone(),
                    value: *hi,
                });
            }
        }
        Ok(())
    }
}

/// Adds one constraint row. A row with no coefficients is decided here
/// directly, since `0 op rhs` either always or never holds.
fn add_row(
    problem: &mut Problem,
    vars: &[Variable],
    row: ArrayView1<'_, f64>,
    op: ComparisonOp,
    rhs: f64,
) -> Result<(), SolveError> {
    let mut expr = LinearExpr::empty();
    let mut terms = 0;
    for (var, coef) in vars.iter().zip(row.iter()) {
        if *coef != 0.0 {
            expr.add(*var, *coef);
            terms += 1;
        }
    }

    if terms == 0 {
        let holds = match op {
            ComparisonOp::Le => 0.0 <= rhs,
            ComparisonOp::Eq => rhs == 0.0,
            ComparisonOp::Ge => 0.0 >= rhs,
        };
        return if holds { Ok(()) } else { Err(SolveError::Infeasible) };
    }

    problem.add_constraint(expr, op, rhs);
    Ok(())
}
