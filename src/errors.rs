use crate::linalg::LinAlgError;
use thiserror::Error;

/// Error type for improperly defined equilibrium problems and convergence
/// problems.
#[derive(Error, Debug)]
pub enum ChemEqError {
    #[error("{0}")]
    Error(String),
    #[error("`{0}` did not converge within the maximum number of iterations.")]
    NotConverged(String),
    #[error("`{0}` encountered illegal values during the iteration.")]
    IterationFailed(String),
    #[error("The solver is initialized for {0} species while the input specifies {1} species.")]
    IncompatibleComponents(usize, usize),
    #[error("Invalid state in {0}: {1} = {2}.")]
    InvalidState(String, String, f64),
    #[error("Unknown species `{0}`.")]
    UnknownSpecies(String),
    #[error(transparent)]
    LinAlgError(#[from] LinAlgError),
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
}

/// Convenience type for `Result<T, ChemEqError>`.
pub type ChemEqResult<T> = Result<T, ChemEqError>;
