//! Lanczos eigensolver for large symmetric problems.
//!
//! [`eigsh`] builds a Krylov basis of size `min(2k + 1, n)` with full
//! reorthogonalization, diagonalizes the resulting tridiagonal matrix by shifted
//! QR and lifts the Ritz vectors back to the full space. The generalized solve
//! `K x = lambda M x` runs it on the shift-inverted operator `(K - sigma M)^{-1} M`,
//! which is self-adjoint in the M inner product.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::assembly::csr_to_dense;
use crate::eigen::{generalized_eigen_dense, tridiagonal_qr, QrSettings, SymmetricEigenpairs};
use crate::error::{FemError, Result};
use crate::types::{LANCZOS_BREAKDOWN_TOL, MAX_LANCZOS_ITER, SPARSE_DOF_THRESHOLD};

/// A symmetric linear map, possibly self-adjoint only in a custom inner product.
pub trait LinearOperator {
    fn dim(&self) -> usize;

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>>;

    /// Inner product in which the operator is self-adjoint.
    fn inner(&self, x: &DVector<f64>, y: &DVector<f64>) -> f64 {
        x.dot(y)
    }
}

impl LinearOperator for DMatrix<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        Ok(self * x)
    }
}

impl LinearOperator for CsrMatrix<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        Ok(self * x)
    }
}

/// Which end of the spectrum [`eigsh`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Which {
    LargestMagnitude,
    SmallestMagnitude,
    LargestAlgebraic,
    SmallestAlgebraic,
}

impl Which {
    fn priority(self, value: f64) -> f64 {
        match self {
            Which::LargestMagnitude => -value.abs(),
            Which::SmallestMagnitude => value.abs(),
            Which::LargestAlgebraic => -value,
            Which::SmallestAlgebraic => value,
        }
    }
}

/// `k` eigenpairs of a symmetric operator, ordered by `which`.
///
/// Eigenvectors are returned as columns with unit norm in the operator's inner
/// product. Fails if `k == 0` or `k >= n`.
pub fn eigsh<O, R>(op: &O, k: usize, which: Which, rng: &mut R) -> Result<SymmetricEigenpairs>
where
    O: LinearOperator + ?Sized,
    R: Rng + ?Sized,
{
    let n = op.dim();
    if k == 0 || k >= n {
        return Err(FemError::InvalidInput(format!(
            "eigsh needs 0 < k < n, got k={k}, n={n}"
        )));
    }
    let m = (2 * k + 1).min(n).min(MAX_LANCZOS_ITER.max(k + 1));

    let mut basis: Vec<DVector<f64>> = Vec::with_capacity(m);
    let mut alpha = Vec::with_capacity(m);
    let mut beta = Vec::with_capacity(m);

    let mut v = random_unit_vector(op, &basis, rng)?;
    for j in 0..m {
        let mut w = op.apply(&v)?;
        let a = op.inner(&v, &w);
        alpha.push(a);
        basis.push(v);

        // two passes of full reorthogonalization
        for _ in 0..2 {
            for q in &basis {
                let c = op.inner(q, &w);
                w.axpy(-c, q, 1.0);
            }
        }

        if j + 1 == m {
            break;
        }

        let b = op.inner(&w, &w).max(0.0).sqrt();
        let scale = alpha.iter().fold(0.0_f64, |acc, x| acc.max(x.abs())).max(f64::MIN_POSITIVE);
        if b <= LANCZOS_BREAKDOWN_TOL * scale {
            // invariant subspace; continue with a fresh direction
            log::debug!("Lanczos breakdown at step {j}, restarting with a random vector");
            beta.push(0.0);
            v = random_unit_vector(op, &basis, rng)?;
        } else {
            beta.push(b);
            v = w / b;
        }
    }

    let size = alpha.len();
    let mut diag = alpha;
    let mut off = beta;
    off.resize(size.saturating_sub(1), 0.0);
    let mut s = DMatrix::<f64>::identity(size, size);
    if !tridiagonal_qr(&mut diag, &mut off, Some(&mut s), &QrSettings::wilkinson(size)) {
        return Err(FemError::EigenSolver(
            "tridiagonal QR did not converge on the Lanczos matrix".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..size).collect();
    order.sort_by(|&a, &b| which.priority(diag[a]).total_cmp(&which.priority(diag[b])));
    order.truncate(k);

    let mut values = Vec::with_capacity(k);
    let mut vectors = DMatrix::<f64>::zeros(n, k);
    for (col, &idx) in order.iter().enumerate() {
        let mut y = DVector::<f64>::zeros(n);
        for (j, q) in basis.iter().enumerate() {
            y.axpy(s[(j, idx)], q, 1.0);
        }
        let norm = op.inner(&y, &y).max(0.0).sqrt();
        if norm > 0.0 {
            y /= norm;
        }
        values.push(diag[idx]);
        vectors.set_column(col, &y);
    }

    Ok(SymmetricEigenpairs {
        values,
        vectors: Some(vectors),
        converged: true,
    })
}

/// Random start vector, orthogonal to `basis` and unit in the operator's norm.
fn random_unit_vector<O, R>(op: &O, basis: &[DVector<f64>], rng: &mut R) -> Result<DVector<f64>>
where
    O: LinearOperator + ?Sized,
    R: Rng + ?Sized,
{
    let n = op.dim();
    for _ in 0..10 {
        let mut v = DVector::<f64>::from_fn(n, |_, _| rng.sample(StandardNormal));
        for _ in 0..2 {
            for q in basis {
                let c = op.inner(q, &v);
                v.axpy(-c, q, 1.0);
            }
        }
        let norm = op.inner(&v, &v).max(0.0).sqrt();
        if norm > 1e-12 {
            return Ok(v / norm);
        }
    }
    Err(FemError::EigenSolver(
        "could not draw a start vector outside the Krylov basis".to_string(),
    ))
}

/// `x -> (K - sigma M)^{-1} M x`, self-adjoint in the M inner product.
pub struct ShiftInvertOperator<'a> {
    factor: CscCholesky<f64>,
    mass: &'a CsrMatrix<f64>,
}

impl<'a> ShiftInvertOperator<'a> {
    /// Factor `K - sigma (M + eps diag(M))`, escalating `eps` until the factorization succeeds.
    pub fn new(k: &CsrMatrix<f64>, m: &'a CsrMatrix<f64>, sigma: f64) -> Result<Self> {
        for reg in [0.0, 1e-10, 1e-8, 1e-6] {
            let shifted = shifted_matrix(k, m, sigma, reg);
            match CscCholesky::factor(&shifted) {
                Ok(factor) => {
                    if reg > 0.0 {
                        log::warn!("shifted matrix factorized with mass regularization {reg:e}");
                    }
                    return Ok(Self { factor, mass: m });
                }
                Err(err) => log::debug!("Cholesky of K - sigma*M failed with regularization {reg:e}: {err:?}"),
            }
        }
        Err(FemError::NotPositiveDefinite(format!(
            "K - ({sigma})M after mass regularization up to 1e-6"
        )))
    }
}

impl LinearOperator for ShiftInvertOperator<'_> {
    fn dim(&self) -> usize {
        self.mass.nrows()
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>> {
        let mx: DVector<f64> = self.mass * x;
        let rhs = DMatrix::from_column_slice(mx.len(), 1, mx.as_slice());
        let solved = self.factor.solve(&rhs);
        Ok(solved.column(0).into_owned())
    }

    fn inner(&self, x: &DVector<f64>, y: &DVector<f64>) -> f64 {
        let my: DVector<f64> = self.mass * y;
        x.dot(&my)
    }
}

fn shifted_matrix(k: &CsrMatrix<f64>, m: &CsrMatrix<f64>, sigma: f64, reg: f64) -> CscMatrix<f64> {
    let mut coo = CooMatrix::new(k.nrows(), k.ncols());
    for (i, j, &v) in k.triplet_iter() {
        coo.push(i, j, v);
    }
    for (i, j, &v) in m.triplet_iter() {
        coo.push(i, j, -sigma * v);
        if i == j && reg > 0.0 {
            coo.push(i, j, -sigma * reg * v.abs());
        }
    }
    CscMatrix::from(&coo)
}

/// The `num_modes` eigenpairs of `K x = lambda M x` nearest `sigma`, ascending.
///
/// Problems at or below `SPARSE_DOF_THRESHOLD` DOFs, and larger problems whose
/// shifted matrix cannot be factorized, are solved densely when small enough.
/// Eigenvectors are M-orthonormal.
pub fn generalized_shift_invert<R: Rng + ?Sized>(
    k: &CsrMatrix<f64>,
    m: &CsrMatrix<f64>,
    num_modes: usize,
    sigma: f64,
    rng: &mut R,
) -> Result<SymmetricEigenpairs> {
    let n = k.nrows();
    if k.ncols() != n || m.nrows() != n || m.ncols() != n {
        return Err(FemError::InvalidInput("K and M must be square and the same size".to_string()));
    }

    if n <= SPARSE_DOF_THRESHOLD {
        log::debug!("{n} DOFs, using the dense generalized solver");
        return dense_nearest(k, m, num_modes, sigma);
    }

    let op = ShiftInvertOperator::new(k, m, sigma)?;
    let k_req = num_modes.min(n - 1);
    let pairs = eigsh(&op, k_req, Which::LargestMagnitude, rng)?;

    let mut lifted: Vec<(f64, usize)> = pairs
        .values
        .iter()
        .enumerate()
        .filter(|(_, theta)| theta.abs() > f64::MIN_POSITIVE)
        .map(|(i, theta)| (sigma + 1.0 / theta, i))
        .collect();
    lifted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let ritz = pairs
        .vectors
        .ok_or_else(|| FemError::EigenSolver("Lanczos returned no vectors".to_string()))?;
    let vectors = DMatrix::from_fn(n, lifted.len(), |r, c| ritz[(r, lifted[c].1)]);

    Ok(SymmetricEigenpairs {
        values: lifted.into_iter().map(|(lambda, _)| lambda).collect(),
        vectors: Some(vectors),
        converged: pairs.converged,
    })
}

fn dense_nearest(k: &CsrMatrix<f64>, m: &CsrMatrix<f64>, num_modes: usize, sigma: f64) -> Result<SymmetricEigenpairs> {
    let n = k.nrows();
    let full = generalized_eigen_dense(&csr_to_dense(k), &csr_to_dense(m), true, &QrSettings::wilkinson(n))?;
    let vectors = full
        .vectors
        .ok_or_else(|| FemError::EigenSolver("dense solve returned no vectors".to_string()))?;

    let mut order: Vec<usize> = (0..full.values.len()).collect();
    order.sort_by(|&a, &b| (full.values[a] - sigma).abs().total_cmp(&(full.values[b] - sigma).abs()));
    order.truncate(num_modes);
    order.sort_by(|&a, &b| full.values[a].total_cmp(&full.values[b]));

    Ok(SymmetricEigenpairs {
        values: order.iter().map(|&i| full.values[i]).collect(),
        vectors: Some(DMatrix::from_fn(n, order.len(), |r, c| vectors[(r, order[c])])),
        converged: full.converged,
    })
}
