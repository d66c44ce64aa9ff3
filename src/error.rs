//! Error type shared by the finite-element model and the optimizer.

use thiserror::Error;

/// Errors produced while validating inputs or computing frequencies.
#[derive(Debug, Error)]
pub enum FemError {
    /// Non-positive geometry, inconsistent bounds and similar caller mistakes.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A cut falls outside the bar's admissible lambda/height window.
    #[error("invalid cut: {0}")]
    InvalidCut(String),

    /// An element's Jacobian determinant collapsed at a Gauss point.
    #[error("degenerate element {element}: det(J) = {det:e}")]
    DegenerateElement { element: usize, det: f64 },

    #[error("singular matrix: {0}")]
    Singular(String),

    #[error("matrix is not positive definite: {0}")]
    NotPositiveDefinite(String),

    /// Fewer elastic modes survived rigid-body filtering than were needed.
    #[error("insufficient modes: requested {requested}, found {found}")]
    InsufficientModes { requested: usize, found: usize },

    #[error("eigensolver failure: {0}")]
    EigenSolver(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FemError {
    fn from(err: serde_json::Error) -> Self {
        FemError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = FemError::InsufficientModes { requested: 3, found: 1 };
        assert_eq!(err.to_string(), "insufficient modes: requested 3, found 1");

        let err = FemError::DegenerateElement { element: 4, det: 0.0 };
        assert!(err.to_string().starts_with("degenerate element 4"));
    }

    #[test]
    fn json_errors_become_config_errors() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: FemError = parse.unwrap_err().into();
        assert!(matches!(err, FemError::Config(_)));
    }
}
