//! Symmetric banded matrices for the beam model.
//!
//! A beam mesh couples only neighbouring nodes, so its global matrices have a
//! half-bandwidth of three. Storing the lower band keeps assembly and the Cholesky
//! factorization linear in the number of DOFs.

use nalgebra::DMatrix;

use crate::error::{FemError, Result};

/// Symmetric matrix storing only the diagonal and `bandwidth` sub-diagonals.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricBandMatrix {
    n: usize,
    bandwidth: usize,
    /// Row-major lower band: row `i` holds entries `(i, i - bandwidth) ..= (i, i)`.
    data: Vec<f64>,
}

impl SymmetricBandMatrix {
    pub fn zeros(n: usize, bandwidth: usize) -> Self {
        Self {
            n,
            bandwidth,
            data: vec![0.0; n * (bandwidth + 1)],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn bandwidth(&self) -> usize {
        self.bandwidth
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> Option<usize> {
        let (i, j) = if row >= col { (row, col) } else { (col, row) };
        if i >= self.n || i - j > self.bandwidth {
            return None;
        }
        Some(i * (self.bandwidth + 1) + self.bandwidth - (i - j))
    }

    /// Entry `(row, col)`; zero outside the band.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.index(row, col).map_or(0.0, |k| self.data[k])
    }

    /// Add `value` at `(row, col)`. Only the lower triangle is stored, so callers
    /// scattering a full symmetric block should skip `col > row`.
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let k = self.index(row, col).ok_or_else(|| {
            FemError::InvalidInput(format!(
                "entry ({row}, {col}) outside band of width {} in {}x{} matrix",
                self.bandwidth, self.n, self.n
            ))
        })?;
        self.data[k] += value;
        Ok(())
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.get(i, i)).collect()
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n, self.n, |i, j| self.get(i, j))
    }

    /// Band Cholesky factorization `A = L L^T`.
    pub fn cholesky(&self) -> Result<BandCholesky> {
        let bw = self.bandwidth;
        let mut l = SymmetricBandMatrix::zeros(self.n, bw);

        for i in 0..self.n {
            let j_start = i.saturating_sub(bw);
            for j in j_start..=i {
                let k_start = i.saturating_sub(bw).max(j.saturating_sub(bw));
                let mut sum = self.get(i, j);
                for k in k_start..j {
                    sum -= l.get(i, k) * l.get(j, k);
                }

                let value = if i == j {
                    if sum.is_nan() || sum <= 0.0 {
                        return Err(FemError::NotPositiveDefinite(format!(
                            "pivot {sum:e} at row {i}"
                        )));
                    }
                    sum.sqrt()
                } else {
                    sum / l.get(j, j)
                };
                l.add(i, j, value)?;
            }
        }

        Ok(BandCholesky { l })
    }
}

/// Lower-triangular band factor from [`SymmetricBandMatrix::cholesky`].
#[derive(Debug, Clone)]
pub struct BandCholesky {
    l: SymmetricBandMatrix,
}

impl BandCholesky {
    /// Solve `L y = b` in place.
    pub fn solve_lower_in_place(&self, b: &mut [f64]) {
        let bw = self.l.bandwidth;
        for i in 0..b.len() {
            let mut sum = b[i];
            for k in i.saturating_sub(bw)..i {
                sum -= self.l.get(i, k) * b[k];
            }
            b[i] = sum / self.l.get(i, i);
        }
    }

    /// Solve `L^T x = y` in place.
    pub fn solve_upper_in_place(&self, y: &mut [f64]) {
        let bw = self.l.bandwidth;
        let n = y.len();
        for i in (0..n).rev() {
            let mut sum = y[i];
            for k in (i + 1)..n.min(i + bw + 1) {
                sum -= self.l.get(k, i) * y[k];
            }
            y[i] = sum / self.l.get(i, i);
        }
    }

    /// Reduce `K x = lambda M x` to standard form: `L^{-1} K L^{-T}`, symmetrized.
    pub fn congruence(&self, k: &SymmetricBandMatrix) -> DMatrix<f64> {
        let n = self.l.n;

        // Y = L^{-1} K, column by column (K is symmetric so its columns are its rows)
        let mut y = DMatrix::<f64>::zeros(n, n);
        let mut column = vec![0.0; n];
        for j in 0..n {
            for (i, value) in column.iter_mut().enumerate() {
                *value = k.get(i, j);
            }
            self.solve_lower_in_place(&mut column);
            y.column_mut(j).copy_from_slice(&column);
        }

        // L^{-1} K L^{-T} = L^{-1} Y^T
        let mut reduced = DMatrix::<f64>::zeros(n, n);
        for j in 0..n {
            for (i, value) in column.iter_mut().enumerate() {
                *value = y[(j, i)];
            }
            self.solve_lower_in_place(&mut column);
            reduced.column_mut(j).copy_from_slice(&column);
        }

        let transposed = reduced.transpose();
        (reduced + transposed) * 0.5
    }

    /// Map a standard-form eigenvector back to the original problem: `x = L^{-T} y`.
    pub fn back_transform(&self, y: &mut [f64]) {
        self.solve_upper_in_place(y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiagonal_spd(n: usize) -> SymmetricBandMatrix {
        let mut a = SymmetricBandMatrix::zeros(n, 1);
        for i in 0..n {
            a.add(i, i, 4.0).unwrap();
            if i > 0 {
                a.add(i, i - 1, -1.0).unwrap();
            }
        }
        a
    }

    #[test]
    fn storage_is_symmetric_and_banded() {
        let mut a = SymmetricBandMatrix::zeros(5, 2);
        a.add(3, 1, 2.5).unwrap();
        assert_eq!(a.get(3, 1), 2.5);
        assert_eq!(a.get(1, 3), 2.5);
        assert_eq!(a.get(4, 0), 0.0);
        assert!(a.add(4, 0, 1.0).is_err());
    }

    #[test]
    fn cholesky_reproduces_matrix() {
        let a = tridiagonal_spd(6);
        let chol = a.cholesky().unwrap();
        let l = DMatrix::from_fn(6, 6, |i, j| if i >= j { chol.l.get(i, j) } else { 0.0 });
        let diff = (&l * l.transpose() - a.to_dense()).abs().max();
        assert!(diff < 1e-12);
    }

    #[test]
    fn cholesky_rejects_indefinite() {
        let mut a = SymmetricBandMatrix::zeros(2, 1);
        a.add(0, 0, 1.0).unwrap();
        a.add(1, 1, 1.0).unwrap();
        a.add(1, 0, 2.0).unwrap();
        assert!(matches!(a.cholesky(), Err(FemError::NotPositiveDefinite(_))));
    }

    #[test]
    fn triangular_solves_invert_matrix() {
        let a = tridiagonal_spd(5);
        let chol = a.cholesky().unwrap();
        let b = [1.0, 2.0, 3.0, 4.0, 5.0];

        let mut x = b;
        chol.solve_lower_in_place(&mut x);
        chol.solve_upper_in_place(&mut x);

        let ax = a.to_dense() * nalgebra::DVector::from_column_slice(&x);
        for (lhs, rhs) in ax.iter().zip(b.iter()) {
            assert!((lhs - rhs).abs() < 1e-12);
        }
    }

    #[test]
    fn congruence_with_identity_mass_is_identity_map() {
        let mut m = SymmetricBandMatrix::zeros(4, 1);
        for i in 0..4 {
            m.add(i, i, 1.0).unwrap();
        }
        let k = tridiagonal_spd(4);
        let reduced = m.cholesky().unwrap().congruence(&k);
        assert!((reduced - k.to_dense()).abs().max() < 1e-14);
    }
}
