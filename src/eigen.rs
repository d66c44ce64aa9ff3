//! Dense symmetric eigensolvers.
//!
//! The generalized problem `K x = lambda M x` is reduced to standard form with a
//! Cholesky factor of `M`, tridiagonalized with Householder reflections and then
//! diagonalized by QR iteration on the tridiagonal. The classical unshifted sweep
//! is kept for the beam model; the Lanczos solver uses Wilkinson shifts because
//! its Ritz values cluster.

use nalgebra::linalg::{Cholesky, SymmetricTridiagonal};
use nalgebra::DMatrix;

use crate::error::{FemError, Result};

/// Matrices up to this size are diagonalized by Gram-Schmidt QR directly.
pub const DENSE_QR_LIMIT: usize = 32;

/// Shift strategy for tridiagonal QR sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrShift {
    /// Plain `A = QR, A' = RQ` sweeps.
    None,
    /// Shift by the eigenvalue of the trailing 2x2 block closest to its last entry.
    Wilkinson,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QrSettings {
    pub max_sweeps: usize,
    /// Off-diagonal entries below `tol * (|d_i| + |d_{i+1}|)`, or below
    /// `n * eps * ||T||`, are treated as zero.
    pub tol: f64,
    pub shift: QrShift,
}

impl QrSettings {
    /// Unshifted QR, 100 sweeps, tolerance 1e-10.
    pub const CLASSICAL: QrSettings = QrSettings {
        max_sweeps: 100,
        tol: 1e-10,
        shift: QrShift::None,
    };

    /// Unshifted QR with the sweep cap scaled to `30 * n`, for matrices too
    /// large to settle in the fixed 100 sweeps of [`QrSettings::CLASSICAL`].
    pub fn classical(n: usize) -> Self {
        QrSettings {
            max_sweeps: 30 * n.max(1),
            ..QrSettings::CLASSICAL
        }
    }

    /// Wilkinson-shifted QR with a cap of `30 * n` sweeps.
    pub fn wilkinson(n: usize) -> Self {
        QrSettings {
            max_sweeps: 30 * n.max(1),
            tol: f64::EPSILON,
            shift: QrShift::Wilkinson,
        }
    }
}

/// Eigenvalues in ascending order and, optionally, matching unit eigenvectors as columns.
#[derive(Debug, Clone)]
pub struct SymmetricEigenpairs {
    pub values: Vec<f64>,
    pub vectors: Option<DMatrix<f64>>,
    /// Whether every off-diagonal entry fell below tolerance before the sweep cap.
    pub converged: bool,
}

fn wilkinson_shift(a: f64, b: f64, c: f64) -> f64 {
    // eigenvalue of [[a, b], [b, c]] closer to c
    let d = 0.5 * (a - c);
    if b == 0.0 {
        return c;
    }
    let sign = if d >= 0.0 { 1.0 } else { -1.0 };
    c - b * b / (d + sign * d.hypot(b))
}

/// One implicit QR sweep with shift `mu` on the block `lo..=hi`.
fn implicit_qr_sweep(
    diag: &mut [f64],
    off: &mut [f64],
    lo: usize,
    hi: usize,
    mu: f64,
    mut vectors: Option<&mut DMatrix<f64>>,
) {
    let mut x = diag[lo] - mu;
    let mut z = off[lo];

    for k in lo..hi {
        let r = x.hypot(z);
        let (c, s) = if r == 0.0 { (1.0, 0.0) } else { (x / r, z / r) };
        if k > lo {
            off[k - 1] = r;
        }

        let (a, b, cc) = (diag[k], off[k], diag[k + 1]);
        diag[k] = c * c * a + 2.0 * c * s * b + s * s * cc;
        diag[k + 1] = s * s * a - 2.0 * c * s * b + c * c * cc;
        off[k] = c * s * (cc - a) + (c * c - s * s) * b;

        if k + 1 < hi {
            x = off[k];
            z = s * off[k + 1];
            off[k + 1] *= c;
        }

        if let Some(q) = vectors.as_deref_mut() {
            for row in 0..q.nrows() {
                let qk = q[(row, k)];
                let qk1 = q[(row, k + 1)];
                q[(row, k)] = c * qk + s * qk1;
                q[(row, k + 1)] = -s * qk + c * qk1;
            }
        }
    }
}

/// Diagonalize a symmetric tridiagonal matrix in place.
///
/// `off[i]` couples `diag[i]` and `diag[i + 1]`. When `vectors` is given, the
/// rotations are accumulated into it from the right, so passing the Householder
/// basis yields eigenvectors of the original matrix.
///
/// # Returns
/// `true` if every off-diagonal entry converged within `settings.max_sweeps`.
pub fn tridiagonal_qr(
    diag: &mut [f64],
    off: &mut [f64],
    vectors: Option<&mut DMatrix<f64>>,
    settings: &QrSettings,
) -> bool {
    let n = diag.len();
    tridiagonal_qr_lowest(diag, off, vectors, n, settings)
}

/// Like [`tridiagonal_qr`], but stops once the trailing `count` entries have
/// deflated. Unshifted sweeps settle the smallest-magnitude eigenvalues at the
/// bottom first, so with [`QrShift::None`] these are the `count` smallest.
///
/// # Returns
/// `true` if those entries converged within `settings.max_sweeps`.
pub fn tridiagonal_qr_lowest(
    diag: &mut [f64],
    off: &mut [f64],
    mut vectors: Option<&mut DMatrix<f64>>,
    count: usize,
    settings: &QrSettings,
) -> bool {
    let n = diag.len();
    if n < 2 {
        return true;
    }

    // absolute floor so clusters of near-zero eigenvalues still deflate
    let max_abs = |xs: &[f64]| xs.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()));
    let norm = max_abs(&diag[..]) + 2.0 * max_abs(&off[..]);
    let floor = n as f64 * f64::EPSILON * norm;

    let mut sweeps = 0;
    let mut hi = n - 1;

    loop {
        for i in 0..hi {
            let e = off[i].abs();
            if e <= floor || e <= settings.tol * (diag[i].abs() + diag[i + 1].abs()) {
                off[i] = 0.0;
            }
        }
        while hi > 0 && off[hi - 1] == 0.0 {
            hi -= 1;
        }
        if hi == 0 || n - 1 - hi >= count {
            return true;
        }
        if sweeps >= settings.max_sweeps {
            return false;
        }

        let mut lo = hi - 1;
        while lo > 0 && off[lo - 1] != 0.0 {
            lo -= 1;
        }

        let mu = match settings.shift {
            QrShift::None => 0.0,
            QrShift::Wilkinson => wilkinson_shift(diag[hi - 1], off[hi - 1], diag[hi]),
        };
        implicit_qr_sweep(diag, off, lo, hi, mu, vectors.as_deref_mut());
        sweeps += 1;
    }
}

/// Sort eigenvalues ascending, permuting eigenvector columns to match.
fn sorted_pairs(values: Vec<f64>, vectors: Option<DMatrix<f64>>, converged: bool) -> SymmetricEigenpairs {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));

    let sorted_values = order.iter().map(|&i| values[i]).collect();
    let sorted_vectors = vectors.map(|q| DMatrix::from_fn(q.nrows(), order.len(), |r, c| q[(r, order[c])]));

    SymmetricEigenpairs {
        values: sorted_values,
        vectors: sorted_vectors,
        converged,
    }
}

/// Eigen-decomposition of a dense symmetric matrix via Householder tridiagonalization
/// followed by tridiagonal QR.
pub fn symmetric_eigen(a: DMatrix<f64>, with_vectors: bool, settings: &QrSettings) -> SymmetricEigenpairs {
    let n = a.nrows();
    symmetric_eigen_lowest(a, with_vectors, n, settings)
}

/// [`symmetric_eigen`] that only waits for the `count` lowest eigenvalues to
/// converge. Use with unshifted settings; the remaining values are diagonal
/// entries of the unconverged block and only bound its spectrum.
pub fn symmetric_eigen_lowest(
    a: DMatrix<f64>,
    with_vectors: bool,
    count: usize,
    settings: &QrSettings,
) -> SymmetricEigenpairs {
    let n = a.nrows();
    if n == 0 {
        return SymmetricEigenpairs {
            values: Vec::new(),
            vectors: with_vectors.then(|| DMatrix::zeros(0, 0)),
            converged: true,
        };
    }
    if n == 1 {
        return SymmetricEigenpairs {
            values: vec![a[(0, 0)]],
            vectors: with_vectors.then(|| DMatrix::identity(1, 1)),
            converged: true,
        };
    }

    let tri = SymmetricTridiagonal::new(a);
    let (mut q, diag, off) = if with_vectors {
        let (q, d, e) = tri.unpack();
        (Some(q), d, e)
    } else {
        let (d, e) = tri.unpack_tridiagonal();
        (None, d, e)
    };

    let mut diag: Vec<f64> = diag.iter().copied().collect();
    let mut off: Vec<f64> = off.iter().copied().collect();
    let converged = tridiagonal_qr_lowest(&mut diag, &mut off, q.as_mut(), count, settings);

    sorted_pairs(diag, q, converged)
}

/// Classical QR algorithm with Gram-Schmidt factorization.
///
/// Iterates `A = QR, A' = RQ` until the summed off-diagonal magnitude drops below
/// `tol * n^2` relative to the largest diagonal entry, or `max_iter` is reached.
///
/// # Returns
/// The final diagonal, unsorted, and whether the tolerance was met.
pub fn gram_schmidt_qr_eigenvalues(a: &DMatrix<f64>, max_iter: usize, tol: f64) -> (Vec<f64>, bool) {
    let n = a.nrows();
    let mut ak = a.clone();
    let mut converged = n < 2;

    for _ in 0..max_iter {
        if converged {
            break;
        }
        let mut q = DMatrix::<f64>::zeros(n, n);
        let mut r = DMatrix::<f64>::zeros(n, n);

        for j in 0..n {
            let mut v = ak.column(j).clone_owned();
            // second pass restores orthogonality lost to cancellation
            for _ in 0..2 {
                for k in 0..j {
                    let dot = q.column(k).dot(&v);
                    r[(k, j)] += dot;
                    v.axpy(-dot, &q.column(k), 1.0);
                }
            }

            let norm = v.norm();
            r[(j, j)] = norm;
            if norm > 1e-14 {
                q.set_column(j, &(v / norm));
            } else {
                // dependent column
                q[(j, j)] = 1.0;
            }
        }

        ak = &r * &q;

        let scale = ak.diagonal().amax().max(f64::MIN_POSITIVE);
        let off_diag: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| ak[(i, j)].abs())
            .sum();
        converged = off_diag < tol * (n * n) as f64 * scale;
    }

    (ak.diagonal().iter().copied().collect(), converged)
}

/// Cholesky factor of `m` with the small relative diagonal regularization used by
/// the generalized solvers, retrying once with an absolute `1e-8` on failure.
pub fn regularized_cholesky(m: &DMatrix<f64>) -> Result<Cholesky<f64, nalgebra::Dyn>> {
    let mut m_reg = m.clone();
    for i in 0..m.nrows() {
        m_reg[(i, i)] += 1e-12 * m[(i, i)].abs().max(1e-20);
    }

    if let Some(chol) = Cholesky::new(m_reg.clone()) {
        return Ok(chol);
    }

    log::debug!("mass matrix Cholesky failed, retrying with 1e-8 regularization");
    for i in 0..m.nrows() {
        m_reg[(i, i)] += 1e-8;
    }
    Cholesky::new(m_reg).ok_or_else(|| {
        FemError::NotPositiveDefinite("mass matrix after regularization".to_string())
    })
}

/// Solve `K x = lambda M x` for dense symmetric `K` and SPD `M`.
///
/// Eigenvectors, when requested, are returned M-orthonormal.
pub fn generalized_eigen_dense(
    k: &DMatrix<f64>,
    m: &DMatrix<f64>,
    with_vectors: bool,
    settings: &QrSettings,
) -> Result<SymmetricEigenpairs> {
    if k.shape() != m.shape() || !k.is_square() {
        return Err(FemError::InvalidInput(format!(
            "stiffness {:?} and mass {:?} shapes differ",
            k.shape(),
            m.shape()
        )));
    }

    let chol = regularized_cholesky(m)?;
    let l = chol.l();

    // K~ = L^{-1} K L^{-T}
    let y = l
        .solve_lower_triangular(k)
        .ok_or_else(|| FemError::Singular("Cholesky factor of mass matrix".to_string()))?;
    let reduced = l
        .solve_lower_triangular(&y.transpose())
        .ok_or_else(|| FemError::Singular("Cholesky factor of mass matrix".to_string()))?;
    let reduced = (&reduced + reduced.transpose()) * 0.5;

    let mut pairs = if !with_vectors && reduced.nrows() <= DENSE_QR_LIMIT {
        let (values, converged) = gram_schmidt_qr_eigenvalues(&reduced, settings.max_sweeps, settings.tol);
        sorted_pairs(values, None, converged)
    } else {
        symmetric_eigen(reduced, with_vectors, settings)
    };

    if let Some(vectors) = pairs.vectors.take() {
        let lifted = l
            .transpose()
            .solve_upper_triangular(&vectors)
            .ok_or_else(|| FemError::Singular("Cholesky factor of mass matrix".to_string()))?;
        pairs.vectors = Some(lifted);
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laplacian(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| match i.abs_diff(j) {
            0 => 2.0,
            1 => -1.0,
            _ => 0.0,
        })
    }

    fn laplacian_eigenvalues(n: usize) -> Vec<f64> {
        (1..=n)
            .map(|k| 2.0 - 2.0 * (k as f64 * std::f64::consts::PI / (n as f64 + 1.0)).cos())
            .collect()
    }

    #[test]
    fn wilkinson_qr_matches_closed_form() {
        let n = 12;
        let pairs = symmetric_eigen(laplacian(n), true, &QrSettings::wilkinson(n));
        assert!(pairs.converged);

        for (got, want) in pairs.values.iter().zip(laplacian_eigenvalues(n)) {
            assert!((got - want).abs() < 1e-10, "{got} vs {want}");
        }

        let q = pairs.vectors.unwrap();
        let a = laplacian(n);
        for (col, &lambda) in pairs.values.iter().enumerate() {
            let v = q.column(col);
            assert!((v.norm() - 1.0).abs() < 1e-10);
            assert!((&a * v - v * lambda).norm() < 1e-9);
        }
    }

    #[test]
    fn unshifted_qr_settles_lowest_eigenvalues_first() {
        let n = 60;
        let pairs = symmetric_eigen_lowest(laplacian(n), true, 3, &QrSettings::classical(n));
        assert!(pairs.converged);

        let a = laplacian(n);
        let q = pairs.vectors.unwrap();
        for (col, want) in laplacian_eigenvalues(n).into_iter().take(3).enumerate() {
            let got = pairs.values[col];
            assert!((got - want).abs() < 1e-10, "{got} vs {want}");
            let v = q.column(col);
            assert!((&a * v - v * got).norm() < 1e-6);
        }
    }

    #[test]
    fn sweep_cap_is_reported() {
        let settings = QrSettings {
            max_sweeps: 1,
            ..QrSettings::CLASSICAL
        };
        let pairs = symmetric_eigen_lowest(laplacian(40), false, 40, &settings);
        assert!(!pairs.converged);

        let (_, converged) = gram_schmidt_qr_eigenvalues(&laplacian(20), 1, 1e-14);
        assert!(!converged);
    }

    #[test]
    fn classical_qr_resolves_well_separated_spectrum() {
        let a = DMatrix::from_fn(4, 4, |i, j| {
            if i == j {
                [1.0, 10.0, 100.0, 1000.0][i]
            } else {
                0.1
            }
        });
        let pairs = symmetric_eigen(a.clone(), false, &QrSettings::CLASSICAL);
        let reference = a.symmetric_eigenvalues();
        let mut expected: Vec<f64> = reference.iter().copied().collect();
        expected.sort_by(|x, y| x.partial_cmp(y).unwrap());

        for (got, want) in pairs.values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-8 * want.abs().max(1.0));
        }
    }

    #[test]
    fn gram_schmidt_qr_converges_on_small_matrix() {
        let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 1.0]);
        let (mut values, converged) = gram_schmidt_qr_eigenvalues(&a, 500, 1e-14);
        assert!(converged);
        values.sort_by(|x, y| x.partial_cmp(y).unwrap());

        let mut expected: Vec<f64> = a.symmetric_eigenvalues().iter().copied().collect();
        expected.sort_by(|x, y| x.partial_cmp(y).unwrap());
        for (got, want) in values.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn generalized_vectors_are_mass_orthonormal() {
        let k = laplacian(6) * 1000.0;
        let m = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, 2.0, 1.0, 3.0, 1.0, 2.0]));

        let pairs = generalized_eigen_dense(&k, &m, true, &QrSettings::wilkinson(6)).unwrap();
        let x = pairs.vectors.unwrap();
        let gram = x.transpose() * &m * &x;
        assert!((gram - DMatrix::identity(6, 6)).abs().max() < 1e-8);

        for (col, &lambda) in pairs.values.iter().enumerate() {
            let v = x.column(col);
            let residual = (&k * v - (&m * v) * lambda).norm() / (lambda * (&m * v).norm());
            assert!(residual < 1e-8);
        }
    }

    #[test]
    fn generalized_small_path_matches_tridiagonal_path() {
        let k = laplacian(8) * 50.0;
        let m = DMatrix::identity(8, 8) * 2.0;

        let small = generalized_eigen_dense(&k, &m, false, &QrSettings { max_sweeps: 2000, ..QrSettings::CLASSICAL }).unwrap();
        let full = generalized_eigen_dense(&k, &m, true, &QrSettings::wilkinson(8)).unwrap();
        for (a, b) in small.values.iter().zip(full.values.iter()) {
            assert!((a - b).abs() < 1e-6 * b.abs());
        }
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let k = DMatrix::identity(3, 3);
        let m = DMatrix::identity(4, 4);
        assert!(generalized_eigen_dense(&k, &m, false, &QrSettings::CLASSICAL).is_err());
    }
}
