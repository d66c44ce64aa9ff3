//! Type aliases, constants, and core enums shared by the beam and solid models.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

pub type NodeCoords = SMatrix<f64, 8, 3>;
pub type Matrix6 = SMatrix<f64, 6, 6>;
pub type Matrix6x24 = SMatrix<f64, 6, 24>;
pub type Matrix3x8 = SMatrix<f64, 3, 8>;
pub type Matrix24 = SMatrix<f64, 24, 24>;
pub type Matrix4 = SMatrix<f64, 4, 4>;

pub const DOF_PER_NODE: usize = 3;
pub const DEFAULT_CORNER_TOL: f64 = 1e-6;
pub const Z_DIR_INDEX: usize = 2;

// 1/sqrt(3) Gauss point coordinate for 2x2x2 quadrature
pub const GAUSS_G: f64 = 0.577_350_269_189_625_8;
pub const MIN_DET_J: f64 = 1e-12;

/// Eigenvalue (omega^2) cutoff separating rigid-body from elastic modes in the solid model.
pub const RIGID_BODY_LAMBDA_THRESHOLD: f64 = 100.0;

/// Eigenvalue cutoff for the beam model, whose two rigid-body modes sit at round-off level.
pub const BEAM_RIGID_BODY_THRESHOLD: f64 = 1.0;

/// Shift used by the shift-invert Lanczos solve. Negative so `K - sigma*M` stays positive definite
/// even with the rigid-body null space of a free-free bar.
pub const DEFAULT_SHIFT: f64 = -1.0;

/// DOF count above which the solid model switches to sparse assembly and Lanczos.
pub const SPARSE_DOF_THRESHOLD: usize = 500;

pub const MAX_LANCZOS_ITER: usize = 300;
/// Lanczos residual norm, relative to the largest Ritz value, treated as an invariant subspace.
pub const LANCZOS_BREAKDOWN_TOL: f64 = 1e-14;

/// Rigid-body modes of an unconstrained solid.
pub const RIGID_BODY_MODES_3D: usize = 6;

/// Solver type for eigenvalue computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EigenSolver {
    /// Full dense decomposition. Best below a few hundred DOFs.
    Dense,
    /// Shift-invert Lanczos on sparse matrices.
    Sparse,
    /// Pick by DOF count.
    #[default]
    Auto,
}

impl EigenSolver {
    pub fn use_sparse(self, num_dofs: usize) -> bool {
        match self {
            EigenSolver::Dense => false,
            EigenSolver::Sparse => true,
            EigenSolver::Auto => num_dofs > SPARSE_DOF_THRESHOLD,
        }
    }
}

/// Mode families in the solid model, following the Soares top-corner displacement method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModeType {
    VerticalBending,
    Torsional,
    Lateral,
    Axial,
    Unknown,
}

impl ModeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeType::VerticalBending => "vertical_bending",
            ModeType::Torsional => "torsional",
            ModeType::Lateral => "lateral",
            ModeType::Axial => "axial",
            ModeType::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_solver_switches_at_threshold() {
        assert!(!EigenSolver::Auto.use_sparse(SPARSE_DOF_THRESHOLD));
        assert!(EigenSolver::Auto.use_sparse(SPARSE_DOF_THRESHOLD + 1));
        assert!(EigenSolver::Sparse.use_sparse(10));
        assert!(!EigenSolver::Dense.use_sparse(100_000));
    }
}
