//! Modal analysis of the hexahedral bar model.
//!
//! Small meshes are solved densely; above [`SPARSE_DOF_THRESHOLD`] DOFs the global
//! matrices stay sparse and the lowest modes come from shift-invert Lanczos.
//! Six extra modes are always requested so the rigid-body modes of the free bar
//! can be dropped by the eigenvalue threshold.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::assembly::{global_matrices_dense, global_matrices_sparse};
use crate::eigen::{generalized_eigen_dense, QrSettings, SymmetricEigenpairs};
use crate::error::{FemError, Result};
use crate::lanczos::generalized_shift_invert;
use crate::mesh::{generate_bar_mesh_3d, generate_bar_mesh_3d_adaptive, Mesh3d};
use crate::modes::{classify_all_modes, ModeFamilies};
use crate::optimization::types::Material;
use crate::types::{
    EigenSolver, ModeType, DEFAULT_SHIFT, RIGID_BODY_LAMBDA_THRESHOLD, RIGID_BODY_MODES_3D, SPARSE_DOF_THRESHOLD,
};

// fixed so repeated evaluations of one profile agree
const LANCZOS_SEED: u64 = 0x00C0_FFEE;

/// Cross-section discretization and eigensolver choice for the solid model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolidOptions {
    /// Elements across the width.
    pub ny: usize,
    /// Elements through the thickness.
    pub nz: usize,
    pub solver: EigenSolver,
}

impl Default for SolidOptions {
    fn default() -> Self {
        Self {
            ny: 2,
            nz: 2,
            solver: EigenSolver::Auto,
        }
    }
}

/// Elastic modes of a solid mesh.
#[derive(Debug, Clone)]
pub struct SolidModes {
    /// Frequencies in Hz, ascending.
    pub frequencies: Vec<f64>,
    /// M-orthonormal mode shapes as columns, matching `frequencies`.
    pub shapes: DMatrix<f64>,
}

/// Classified modal analysis result.
#[derive(Debug, Clone)]
pub struct ClassifiedModes {
    pub frequencies: Vec<f64>,
    pub shapes: DMatrix<f64>,
    pub families: ModeFamilies,
    pub mesh: Mesh3d,
}

impl ClassifiedModes {
    /// Frequencies of one family, ascending.
    pub fn family_frequencies(&self, mode_type: ModeType) -> Vec<f64> {
        self.families
            .get(&mode_type)
            .map(|modes| modes.iter().map(|m| m.frequency).collect())
            .unwrap_or_default()
    }
}

#[inline]
fn lambda_to_hz(lambda: f64) -> f64 {
    lambda.abs().sqrt() / (2.0 * std::f64::consts::PI)
}

fn solve_pairs(mesh: &Mesh3d, material: &Material, num_modes: usize, solver: EigenSolver, with_vectors: bool) -> Result<SymmetricEigenpairs> {
    let n = mesh.num_dofs();
    let request = num_modes + RIGID_BODY_MODES_3D;

    if solver.use_sparse(n) {
        let (k, m) = global_matrices_sparse(mesh, material)?;
        let mut rng = StdRng::seed_from_u64(LANCZOS_SEED);
        generalized_shift_invert(&k, &m, request, DEFAULT_SHIFT, &mut rng)
    } else {
        if n > SPARSE_DOF_THRESHOLD {
            log::debug!("dense solve forced on {n} DOFs");
        }
        let (k, m) = global_matrices_dense(mesh, material)?;
        generalized_eigen_dense(&k, &m, with_vectors, &QrSettings::wilkinson(n))
    }
}

/// Elastic modes (eigenvalue above the rigid-body threshold) of `mesh`, lowest first.
///
/// Fewer than `num_modes` are returned when the solve yields fewer elastic modes.
pub fn solve_modes_3d(mesh: &Mesh3d, material: &Material, num_modes: usize, solver: EigenSolver) -> Result<SolidModes> {
    material.validate()?;
    let pairs = solve_pairs(mesh, material, num_modes, solver, true)?;
    let vectors = pairs
        .vectors
        .ok_or_else(|| FemError::EigenSolver("eigensolver returned no mode shapes".to_string()))?;

    let elastic: Vec<usize> = (0..pairs.values.len())
        .filter(|&i| pairs.values[i] > RIGID_BODY_LAMBDA_THRESHOLD)
        .take(num_modes)
        .collect();

    Ok(SolidModes {
        frequencies: elastic.iter().map(|&i| lambda_to_hz(pairs.values[i])).collect(),
        shapes: DMatrix::from_fn(vectors.nrows(), elastic.len(), |r, c| vectors[(r, elastic[c])]),
    })
}

/// Lowest `num_modes` elastic frequencies (Hz) of a bar with the given element column heights.
pub fn compute_frequencies_3d(
    element_heights: &[f64],
    length: f64,
    width: f64,
    material: &Material,
    num_modes: usize,
    options: &SolidOptions,
) -> Result<Vec<f64>> {
    material.validate()?;
    let mesh = generate_bar_mesh_3d(length, width, element_heights, options.ny, options.nz)?;
    let pairs = solve_pairs(&mesh, material, num_modes, options.solver, false)?;

    Ok(pairs
        .values
        .iter()
        .copied()
        .filter(|&lambda| lambda > RIGID_BODY_LAMBDA_THRESHOLD)
        .take(num_modes)
        .map(lambda_to_hz)
        .collect())
}

fn classify_mesh(mesh: Mesh3d, material: &Material, num_modes: usize, solver: EigenSolver) -> Result<ClassifiedModes> {
    let modes = solve_modes_3d(&mesh, material, num_modes, solver)?;
    let families = classify_all_modes(&modes.frequencies, &modes.shapes, &mesh.nodes)?;
    Ok(ClassifiedModes {
        frequencies: modes.frequencies,
        shapes: modes.shapes,
        families,
        mesh,
    })
}

/// Elastic modes with shapes, grouped into vertical bending, torsional, lateral and axial families.
pub fn compute_frequencies_3d_classified(
    element_heights: &[f64],
    length: f64,
    width: f64,
    material: &Material,
    num_modes: usize,
    options: &SolidOptions,
) -> Result<ClassifiedModes> {
    let mesh = generate_bar_mesh_3d(length, width, element_heights, options.ny, options.nz)?;
    classify_mesh(mesh, material, num_modes, options.solver)
}

/// Classified modes on a mesh whose element columns are bounded by `x_positions`.
pub fn compute_frequencies_3d_adaptive(
    x_positions: &[f64],
    element_heights: &[f64],
    width: f64,
    material: &Material,
    num_modes: usize,
    options: &SolidOptions,
) -> Result<ClassifiedModes> {
    let mesh = generate_bar_mesh_3d_adaptive(width, x_positions, element_heights, options.ny, options.nz)?;
    classify_mesh(mesh, material, num_modes, options.solver)
}

/// The first `num_bending_modes` vertical bending frequencies, the ones comparable
/// to the beam model. Requests `4 * n + 6` elastic modes to find them.
pub fn get_bending_frequencies_3d(
    element_heights: &[f64],
    length: f64,
    width: f64,
    material: &Material,
    num_bending_modes: usize,
    options: &SolidOptions,
) -> Result<Vec<f64>> {
    let request = num_bending_modes * 4 + 6;
    let classified = compute_frequencies_3d_classified(element_heights, length, width, material, request, options)?;

    let mut bending = classified.family_frequencies(ModeType::VerticalBending);
    bending.truncate(num_bending_modes);
    Ok(bending)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aluminum() -> Material {
        Material::new("Aluminum", 70e9, 2700.0, 0.33)
    }

    /// Free-free Euler-Bernoulli fundamental of a rectangular bar.
    fn euler_bernoulli_f1(length: f64, height: f64, material: &Material) -> f64 {
        let beta_l: f64 = 4.730_040_7;
        let ei_over_rho_a = material.e * height * height / (12.0 * material.rho);
        beta_l * beta_l / (2.0 * std::f64::consts::PI * length * length) * ei_over_rho_a.sqrt()
    }

    #[test]
    fn dense_frequencies_are_elastic_and_sorted() {
        let freqs =
            compute_frequencies_3d(&[0.02; 6], 0.2, 0.03, &aluminum(), 5, &SolidOptions::default()).unwrap();

        assert_eq!(freqs.len(), 5);
        assert!(freqs.windows(2).all(|w| w[0] <= w[1]));
        let rigid_cutoff = lambda_to_hz(RIGID_BODY_LAMBDA_THRESHOLD);
        assert!(freqs.iter().all(|&f| f.is_finite() && f > rigid_cutoff));
    }

    #[test]
    fn flat_bar_bends_vertically_first() {
        // cubic elements keep the stiffening of full integration small
        let (length, width, height) = (0.3, 0.04, 0.02);
        let classified = compute_frequencies_3d_classified(
            &[height; 30],
            length,
            width,
            &aluminum(),
            6,
            &SolidOptions::default(),
        )
        .unwrap();

        let bending = &classified.families[&ModeType::VerticalBending];
        assert_eq!(bending[0].mode_index, 0);
        assert_eq!(bending[0].family_rank, 1);

        let f_eb = euler_bernoulli_f1(length, height, &aluminum());
        let ratio = classified.frequencies[0] / f_eb;
        assert!(ratio > 0.9 && ratio < 1.8, "ratio {ratio}");

        let total: usize = classified.families.values().map(Vec::len).sum();
        assert_eq!(total, classified.frequencies.len());
    }

    #[test]
    fn sparse_solver_matches_dense() {
        // 21 x 3 x 3 nodes is above the sparse threshold
        let heights = [0.02; 20];
        let sparse_opts = SolidOptions::default();
        let dense_opts = SolidOptions { solver: EigenSolver::Dense, ..SolidOptions::default() };

        let sparse = compute_frequencies_3d(&heights, 0.3, 0.03, &aluminum(), 4, &sparse_opts).unwrap();
        let dense = compute_frequencies_3d(&heights, 0.3, 0.03, &aluminum(), 4, &dense_opts).unwrap();

        assert_eq!(sparse.len(), 4);
        for (s, d) in sparse.iter().zip(&dense) {
            assert!((s - d).abs() / d < 1e-4, "sparse {s} vs dense {d}");
        }
    }

    #[test]
    fn bending_frequencies_are_a_subset() {
        let options = SolidOptions::default();
        let bending = get_bending_frequencies_3d(&[0.015; 8], 0.25, 0.04, &aluminum(), 2, &options).unwrap();
        let all = compute_frequencies_3d(&[0.015; 8], 0.25, 0.04, &aluminum(), 14, &options).unwrap();

        assert_eq!(bending.len(), 2);
        assert!(bending[0] < bending[1]);
        for f in &bending {
            assert!(all.iter().any(|g| (g - f).abs() < 1e-6 * f));
        }
    }

    #[test]
    fn adaptive_mesh_agrees_with_uniform_for_uniform_bar() {
        let xs: Vec<f64> = (0..=8).map(|i| i as f64 * 0.025).collect();
        let options = SolidOptions::default();
        let adaptive = compute_frequencies_3d_adaptive(&xs, &[0.02; 8], 0.03, &aluminum(), 3, &options).unwrap();
        let uniform = compute_frequencies_3d(&[0.02; 8], 0.2, 0.03, &aluminum(), 3, &options).unwrap();

        for (a, u) in adaptive.frequencies.iter().zip(&uniform) {
            assert!((a - u).abs() / u < 1e-8);
        }
    }

    #[test]
    fn invalid_material_is_rejected() {
        let bad = Material::new("Bad", -1.0, 2700.0, 0.33);
        assert!(compute_frequencies_3d(&[0.02; 4], 0.2, 0.03, &bad, 3, &SolidOptions::default()).is_err());
    }
}
