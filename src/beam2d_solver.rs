//! Beam model assembly and modal analysis.
//!
//! Element matrices are scattered into banded global matrices of size
//! `2 * (Ne + 1)`. The generalized problem is reduced with a band Cholesky
//! factor of the mass matrix and diagonalized by classical unshifted QR
//! iteration: Gram-Schmidt QR on the full matrix for systems of at most
//! `DENSE_QR_LIMIT` DOFs, Householder tridiagonalization followed by
//! tridiagonal QR above that.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::banded::{BandCholesky, SymmetricBandMatrix};
use crate::beam2d::{TimoshenkoElement, DOF_PER_NODE_2D};
use crate::cuts::{generate_adaptive_mesh_1d, generate_element_heights, Cut};
use crate::eigen::{gram_schmidt_qr_eigenvalues, symmetric_eigen_lowest, QrSettings, DENSE_QR_LIMIT};
use crate::error::{FemError, Result};
use crate::optimization::types::{BarParameters, Material};
use crate::resolution::AdaptiveMesh;
use crate::types::BEAM_RIGID_BODY_THRESHOLD;

/// Half-bandwidth of the assembled beam matrices (two nodes of two DOFs each).
const BEAM_BANDWIDTH: usize = 2 * DOF_PER_NODE_2D - 1;

/// Frequencies and transverse mode shapes of the beam model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeamModes {
    /// Natural frequencies (Hz), ascending.
    pub frequencies: Vec<f64>,
    /// Node positions along the bar (m).
    pub x_positions: Vec<f64>,
    /// Transverse displacement at each node, one vector per mode, scaled to unit peak.
    pub shapes: Vec<Vec<f64>>,
}

fn check_inputs(heights: &[f64], lengths: &[f64], width: f64, material: &Material) -> Result<()> {
    if heights.is_empty() {
        return Err(FemError::InvalidInput("beam needs at least one element".to_string()));
    }
    if heights.len() != lengths.len() {
        return Err(FemError::InvalidInput(format!(
            "{} element heights for {} element lengths",
            heights.len(),
            lengths.len()
        )));
    }
    if let Some(h) = heights.iter().find(|h| !(h.is_finite() && **h > 0.0)) {
        return Err(FemError::InvalidInput(format!("element height {h} must be positive")));
    }
    if let Some(le) = lengths.iter().find(|le| !(le.is_finite() && **le > 0.0)) {
        return Err(FemError::InvalidInput(format!("element length {le} must be positive")));
    }
    if !(width > 0.0) {
        return Err(FemError::InvalidInput(format!("bar width {width} must be positive")));
    }
    material.validate()
}

/// Assemble global stiffness and mass matrices.
///
/// # Arguments
/// * `element_heights` - Height of each element (m)
/// * `element_lengths` - Length of each element (m)
/// * `width` - Bar width (m)
/// * `material` - Elastic constants and density
///
/// # Returns
/// Tuple of (K, M) in banded storage
pub fn assemble_global_matrices_2d(
    element_heights: &[f64],
    element_lengths: &[f64],
    width: f64,
    material: &Material,
) -> Result<(SymmetricBandMatrix, SymmetricBandMatrix)> {
    check_inputs(element_heights, element_lengths, width, material)?;

    let num_dof = DOF_PER_NODE_2D * (element_heights.len() + 1);
    let mut k_global = SymmetricBandMatrix::zeros(num_dof, BEAM_BANDWIDTH);
    let mut m_global = SymmetricBandMatrix::zeros(num_dof, BEAM_BANDWIDTH);

    for (elem, (&h, &le)) in element_heights.iter().zip(element_lengths).enumerate() {
        let element = TimoshenkoElement::rectangular(le, width, h, material);
        let ke = element.stiffness();
        let me = element.mass();

        let first = DOF_PER_NODE_2D * elem;
        for i in 0..4 {
            for j in 0..=i {
                k_global.add(first + i, first + j, ke[(i, j)])?;
                m_global.add(first + i, first + j, me[(i, j)])?;
            }
        }
    }

    Ok((k_global, m_global))
}

/// Band Cholesky of the mass matrix with relative diagonal regularization,
/// escalating to an absolute `1e-8` if the first attempt fails.
fn factor_mass(m: &SymmetricBandMatrix) -> Result<BandCholesky> {
    let mut m_reg = m.clone();
    for (i, mii) in m.diagonal().into_iter().enumerate() {
        m_reg.add(i, i, 1e-12 * mii.abs().max(1e-20))?;
    }

    match m_reg.cholesky() {
        Ok(chol) => Ok(chol),
        Err(err) => {
            log::debug!("beam mass Cholesky failed ({err}), retrying with 1e-8 regularization");
            for i in 0..m.size() {
                m_reg.add(i, i, 1e-8)?;
            }
            m_reg.cholesky()
        }
    }
}

/// Free-free beams carry one translation and one rotation.
const BEAM_RIGID_BODY_MODES: usize = 2;

fn warn_unconverged(converged: bool, dofs: usize, settings: &QrSettings) {
    if !converged {
        log::warn!(
            "beam QR iteration hit its {}-sweep cap on {dofs} DOFs; frequencies may be inaccurate",
            settings.max_sweeps
        );
    }
}

#[inline]
fn to_hz(eigenvalue: f64) -> f64 {
    eigenvalue.sqrt() / (2.0 * PI)
}

/// Solve `K phi = omega^2 M phi` and return the lowest `num_modes` elastic frequencies.
///
/// Eigenvalues at or below the rigid-body threshold are discarded. Fewer than
/// `num_modes` frequencies are returned if the mesh has too few elastic modes.
pub fn solve_generalized_eigenvalue(
    k: &SymmetricBandMatrix,
    m: &SymmetricBandMatrix,
    num_modes: usize,
) -> Result<Vec<f64>> {
    let chol = factor_mass(m)?;
    let reduced = chol.congruence(k);

    let dofs = reduced.nrows();
    let settings = QrSettings::classical(dofs);
    let (mut eigenvalues, converged) = if dofs <= DENSE_QR_LIMIT {
        gram_schmidt_qr_eigenvalues(&reduced, settings.max_sweeps, settings.tol)
    } else {
        let pairs = symmetric_eigen_lowest(reduced, false, num_modes + BEAM_RIGID_BODY_MODES, &settings);
        (pairs.values, pairs.converged)
    };
    warn_unconverged(converged, dofs, &settings);
    eigenvalues.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Ok(eigenvalues
        .into_iter()
        .filter(|&ev| ev > BEAM_RIGID_BODY_THRESHOLD)
        .take(num_modes)
        .map(to_hz)
        .collect())
}

/// Like [`solve_generalized_eigenvalue`], also returning mass-normalized eigenvectors
/// (full DOF vectors, one per returned frequency).
pub fn solve_generalized_eigenpairs(
    k: &SymmetricBandMatrix,
    m: &SymmetricBandMatrix,
    num_modes: usize,
) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let chol = factor_mass(m)?;
    let reduced = chol.congruence(k);
    let dofs = reduced.nrows();
    let settings = QrSettings::classical(dofs);
    let pairs = symmetric_eigen_lowest(reduced, true, num_modes + BEAM_RIGID_BODY_MODES, &settings);
    warn_unconverged(pairs.converged, dofs, &settings);
    let vectors = pairs
        .vectors
        .ok_or_else(|| FemError::EigenSolver("eigenvectors were not computed".to_string()))?;

    let mut frequencies = Vec::with_capacity(num_modes);
    let mut shapes = Vec::with_capacity(num_modes);
    for (col, &ev) in pairs.values.iter().enumerate() {
        if ev <= BEAM_RIGID_BODY_THRESHOLD {
            continue;
        }
        if frequencies.len() == num_modes {
            break;
        }
        let mut phi: Vec<f64> = vectors.column(col).iter().copied().collect();
        chol.back_transform(&mut phi);
        frequencies.push(to_hz(ev));
        shapes.push(phi);
    }

    Ok((frequencies, shapes))
}

/// Frequencies of a beam with given element heights and lengths.
pub fn compute_frequencies_from_mesh(
    element_heights: &[f64],
    element_lengths: &[f64],
    width: f64,
    material: &Material,
    num_modes: usize,
) -> Result<Vec<f64>> {
    let (k, m) = assemble_global_matrices_2d(element_heights, element_lengths, width, material)?;
    solve_generalized_eigenvalue(&k, &m, num_modes)
}

/// Frequencies of a bar with the given cuts on a uniform mesh.
///
/// Element heights use the smoothed profile, so elements straddling a cut edge
/// get a stiffness-equivalent height.
pub fn compute_frequencies_2d(
    cuts: &[Cut],
    bar: &BarParameters,
    material: &Material,
    num_elements: usize,
    num_modes: usize,
) -> Result<Vec<f64>> {
    bar.validate()?;
    if num_elements == 0 {
        return Err(FemError::InvalidInput("number of elements must be positive".to_string()));
    }
    let heights = generate_element_heights(cuts, bar.length, bar.h0, num_elements);
    let lengths = vec![bar.length / num_elements as f64; num_elements];
    compute_frequencies_from_mesh(&heights, &lengths, bar.width, material, num_modes)
}

/// Frequencies on a mesh refined around cut edges.
pub fn compute_frequencies_2d_adaptive(
    cuts: &[Cut],
    bar: &BarParameters,
    material: &Material,
    base_elements: usize,
    mesh: AdaptiveMesh,
    num_modes: usize,
) -> Result<Vec<f64>> {
    bar.validate()?;
    let (x_positions, heights) = generate_adaptive_mesh_1d(
        cuts,
        bar.length,
        bar.h0,
        base_elements,
        mesh.refinement_factor,
        mesh.transition_width,
    );
    let lengths: Vec<f64> = x_positions.windows(2).map(|w| w[1] - w[0]).collect();
    compute_frequencies_from_mesh(&heights, &lengths, bar.width, material, num_modes)
}

/// Frequencies and transverse mode shapes on a uniform mesh, for plotting.
pub fn compute_frequencies_2d_with_shapes(
    cuts: &[Cut],
    bar: &BarParameters,
    material: &Material,
    num_elements: usize,
    num_modes: usize,
) -> Result<BeamModes> {
    bar.validate()?;
    if num_elements == 0 {
        return Err(FemError::InvalidInput("number of elements must be positive".to_string()));
    }
    let le = bar.length / num_elements as f64;
    let heights = generate_element_heights(cuts, bar.length, bar.h0, num_elements);
    let lengths = vec![le; num_elements];

    let (k, m) = assemble_global_matrices_2d(&heights, &lengths, bar.width, material)?;
    let (frequencies, vectors) = solve_generalized_eigenpairs(&k, &m, num_modes)?;

    let shapes = vectors
        .into_iter()
        .map(|phi| {
            let w: Vec<f64> = phi.iter().step_by(DOF_PER_NODE_2D).copied().collect();
            let peak = w.iter().fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { *v } else { acc });
            if peak == 0.0 {
                w
            } else {
                w.into_iter().map(|v| v / peak).collect()
            }
        })
        .collect();

    Ok(BeamModes {
        frequencies,
        x_positions: (0..=num_elements).map(|i| i as f64 * le).collect(),
        shapes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam2d::KAPPA;

    fn steel() -> Material {
        Material::new("Steel", 2.0e11, 7850.0, 0.3)
    }

    fn sapele_bar() -> (BarParameters, Material) {
        (BarParameters::new(0.35, 0.032, 0.024, 0.002), Material::sapele())
    }

    #[test]
    fn uniform_beam_matches_timoshenko_closed_form() {
        let bar = BarParameters::new(0.5, 0.03, 0.01, 0.001);
        let mat = steel();

        let freqs = compute_frequencies_2d(&[], &bar, &mat, 150, 2).unwrap();
        assert_eq!(freqs.len(), 2);

        // Euler-Bernoulli free-free root with first-order shear and rotary inertia correction
        let beta_l = 4.730_040_745;
        let area = bar.width * bar.h0;
        let inertia = bar.width * bar.h0.powi(3) / 12.0;
        let f_eb = beta_l * beta_l / (2.0 * PI * bar.length.powi(2)) * (mat.e * inertia / (mat.rho * area)).sqrt();
        let r2 = inertia / area;
        let e_over_kg = 2.0 * (1.0 + mat.nu) / KAPPA;
        let f_timoshenko = f_eb * (1.0 - 0.5 * (beta_l / bar.length).powi(2) * r2 * (1.0 + e_over_kg));

        let rel = (freqs[0] - f_timoshenko).abs() / f_timoshenko;
        assert!(rel < 0.005, "f1 = {:.3}, closed form {:.3}", freqs[0], f_timoshenko);

        let ratio = freqs[1] / freqs[0];
        assert!((ratio - 2.756).abs() < 0.03, "f2/f1 = {ratio}");
    }

    #[test]
    fn frequencies_are_sorted_and_positive() {
        let (bar, mat) = sapele_bar();
        let freqs = compute_frequencies_2d(&[], &bar, &mat, 60, 5).unwrap();
        assert_eq!(freqs.len(), 5);
        assert!(freqs.iter().all(|f| *f > 0.0));
        assert!(freqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn lowest_modes_match_a_full_shifted_solve() {
        let (bar, mat) = sapele_bar();
        let cuts = [Cut::new(0.1, 0.012)];
        let heights = generate_element_heights(&cuts, bar.length, bar.h0, 80);
        let lengths = vec![bar.length / 80.0; 80];
        let (k, m) = assemble_global_matrices_2d(&heights, &lengths, bar.width, &mat).unwrap();

        let freqs = solve_generalized_eigenvalue(&k, &m, 4).unwrap();

        let n = k.size();
        let settings = QrSettings::wilkinson(n);
        let full = crate::eigen::generalized_eigen_dense(&k.to_dense(), &m.to_dense(), false, &settings).unwrap();
        let reference: Vec<f64> = full
            .values
            .into_iter()
            .filter(|&ev| ev > BEAM_RIGID_BODY_THRESHOLD)
            .take(4)
            .map(to_hz)
            .collect();

        assert_eq!(freqs.len(), 4);
        for (got, want) in freqs.iter().zip(&reference) {
            assert!((got - want).abs() / want < 1e-6, "{got} vs {want}");
        }

        // the near-zero rigid-body pair must not hold up deflation
        let reduced = factor_mass(&m).unwrap().congruence(&k);
        let settings = QrSettings::classical(n);
        let pairs = symmetric_eigen_lowest(reduced, false, 4 + BEAM_RIGID_BODY_MODES, &settings);
        assert!(pairs.converged);
    }

    #[test]
    fn small_mesh_uses_dense_qr_consistently() {
        let (bar, mat) = sapele_bar();
        // 10 elements -> 22 DOFs, below the dense QR limit
        let coarse = compute_frequencies_2d(&[], &bar, &mat, 10, 2).unwrap();
        let fine = compute_frequencies_2d(&[], &bar, &mat, 100, 2).unwrap();
        assert!((coarse[0] - fine[0]).abs() / fine[0] < 0.01);
    }

    #[test]
    fn central_cut_lowers_fundamental() {
        let (bar, mat) = sapele_bar();
        let uncut = compute_frequencies_2d(&[], &bar, &mat, 100, 3).unwrap();
        let cut = compute_frequencies_2d(&[Cut::new(0.08, 0.012)], &bar, &mat, 100, 3).unwrap();
        assert!(cut[0] < uncut[0]);
    }

    #[test]
    fn assembled_matrices_have_expected_size_and_mass() {
        let (bar, mat) = sapele_bar();
        let n = 20;
        let heights = vec![bar.h0; n];
        let lengths = vec![bar.length / n as f64; n];
        let (k, m) = assemble_global_matrices_2d(&heights, &lengths, bar.width, &mat).unwrap();

        assert_eq!(k.size(), 2 * (n + 1));
        assert_eq!(m.size(), 2 * (n + 1));

        // Sum of the translational block of M equals the bar mass.
        let dense = m.to_dense();
        let mut total = 0.0;
        for i in (0..dense.nrows()).step_by(2) {
            for j in (0..dense.ncols()).step_by(2) {
                total += dense[(i, j)];
            }
        }
        let mass = mat.rho * bar.length * bar.width * bar.h0;
        assert!((total - mass).abs() / mass < 1e-9);
    }

    #[test]
    fn adaptive_mesh_agrees_with_fine_uniform_mesh() {
        let (bar, mat) = sapele_bar();
        let cuts = [Cut::new(0.09, 0.01), Cut::new(0.05, 0.007)];
        let adaptive = compute_frequencies_2d_adaptive(&cuts, &bar, &mat, 60, AdaptiveMesh::default(), 3).unwrap();
        let fine = compute_frequencies_2d(&cuts, &bar, &mat, 300, 3).unwrap();
        for (a, f) in adaptive.iter().zip(fine.iter()) {
            assert!((a - f).abs() / f < 0.01, "{a} vs {f}");
        }
    }

    #[test]
    fn mode_shapes_match_frequencies() {
        let (bar, mat) = sapele_bar();
        let modes = compute_frequencies_2d_with_shapes(&[], &bar, &mat, 60, 3).unwrap();
        let plain = compute_frequencies_2d(&[], &bar, &mat, 60, 3).unwrap();

        assert_eq!(modes.shapes.len(), 3);
        assert_eq!(modes.x_positions.len(), 61);
        for (a, b) in modes.frequencies.iter().zip(plain.iter()) {
            assert!((a - b).abs() / b < 1e-6);
        }

        // first bending mode of a free-free bar is symmetric with two nodes
        let w = &modes.shapes[0];
        assert!((w[0] - w[60]).abs() < 1e-6);
        let sign_changes = w.windows(2).filter(|p| p[0].signum() != p[1].signum()).count();
        assert_eq!(sign_changes, 2);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let mat = steel();
        assert!(assemble_global_matrices_2d(&[0.01, -0.01], &[0.1, 0.1], 0.03, &mat).is_err());
        assert!(assemble_global_matrices_2d(&[0.01], &[0.1, 0.1], 0.03, &mat).is_err());
        assert!(assemble_global_matrices_2d(&[], &[], 0.03, &mat).is_err());
    }
}
