use thiserror::Error;

/// Failures of the analysis stage.
///
/// `Infeasible` and `Unbounded` are the solver's own verdicts: the constraint
/// configuration contradicts itself or leaves the objective open, and running
/// again will not change that.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error("infeasible: no non-negative recipe mix satisfies the constraints")]
    Infeasible,

    #[error("unbounded: the objective can be improved without limit")]
    Unbounded,

    #[error("unknown resource: {0}")]
    UnknownResource(String),

    #[error("unknown recipe: {0}")]
    UnknownRecipe(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid bound for {name}: {value}")]
    InvalidBound { name: String, value: f64 },
}
