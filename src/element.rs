//! 8-node hexahedral (Hex8) solid element.
//!
//! Trilinear shape functions on the reference cube `[-1, 1]^3`, integrated with
//! 2x2x2 Gauss quadrature into 24x24 stiffness and consistent mass matrices.

use nalgebra::{Matrix3, SVector, Vector3};

use crate::error::{FemError, Result};
use crate::optimization::types::Material;
use crate::types::{Matrix24, Matrix3x8, Matrix6, Matrix6x24, NodeCoords, GAUSS_G, MIN_DET_J};

/// Reference-cube corner of each local node, counter-clockwise on the bottom face
/// then the top face.
pub const NODE_SIGNS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// 2x2x2 Gauss points (in node order) and unit weights.
pub fn gauss_points_3d() -> ([Vector3<f64>; 8], SVector<f64, 8>) {
    let points = NODE_SIGNS.map(|[sx, sy, sz]| Vector3::new(sx * GAUSS_G, sy * GAUSS_G, sz * GAUSS_G));
    (points, SVector::<f64, 8>::from_element(1.0))
}

/// Hex8 shape functions at (xi, eta, zeta).
pub fn shape_functions_hex8(xi: f64, eta: f64, zeta: f64) -> SVector<f64, 8> {
    SVector::<f64, 8>::from_fn(|i, _| {
        let [sx, sy, sz] = NODE_SIGNS[i];
        0.125 * (1.0 + sx * xi) * (1.0 + sy * eta) * (1.0 + sz * zeta)
    })
}

/// Shape function derivatives with respect to the natural coordinates (rows xi, eta, zeta).
pub fn shape_function_derivatives_hex8(xi: f64, eta: f64, zeta: f64) -> Matrix3x8 {
    Matrix3x8::from_fn(|row, i| {
        let [sx, sy, sz] = NODE_SIGNS[i];
        let (fx, fy, fz) = (1.0 + sx * xi, 1.0 + sy * eta, 1.0 + sz * zeta);
        match row {
            0 => 0.125 * sx * fy * fz,
            1 => 0.125 * sy * fx * fz,
            _ => 0.125 * sz * fx * fy,
        }
    })
}

/// Isotropic 6x6 elasticity matrix in Voigt order (xx, yy, zz, xy, yz, xz).
pub fn elasticity_matrix_3d(e: f64, nu: f64) -> Matrix6 {
    let factor = e / ((1.0 + nu) * (1.0 - 2.0 * nu));
    let normal = factor * (1.0 - nu);
    let coupling = factor * nu;
    let shear = factor * (1.0 - 2.0 * nu) / 2.0;

    Matrix6::from_fn(|i, j| match (i < 3, j < 3) {
        (true, true) if i == j => normal,
        (true, true) => coupling,
        (false, false) if i == j => shear,
        _ => 0.0,
    })
}

/// Strain-displacement matrix from physical shape function derivatives.
fn strain_displacement(d_n_phys: &Matrix3x8) -> Matrix6x24 {
    let mut b = Matrix6x24::zeros();
    for i in 0..8 {
        let col = 3 * i;
        let (dx, dy, dz) = (d_n_phys[(0, i)], d_n_phys[(1, i)], d_n_phys[(2, i)]);

        b[(0, col)] = dx;
        b[(1, col + 1)] = dy;
        b[(2, col + 2)] = dz;
        b[(3, col)] = dy;
        b[(3, col + 1)] = dx;
        b[(4, col + 1)] = dz;
        b[(4, col + 2)] = dy;
        b[(5, col)] = dz;
        b[(5, col + 2)] = dx;
    }
    b
}

/// Compute stiffness and consistent mass matrices for one hexahedron.
///
/// # Arguments
/// * `node_coords` - 8x3 node coordinates in local node order
/// * `material` - Elastic constants and density
///
/// # Returns
/// `(Ke, Me)`, or [`FemError::DegenerateElement`] (with element index 0; the
/// caller fills in the real index) if the Jacobian determinant at any Gauss
/// point is not safely positive.
pub fn compute_hex8_matrices(node_coords: &NodeCoords, material: &Material) -> Result<(Matrix24, Matrix24)> {
    let d = elasticity_matrix_3d(material.e, material.nu);
    let mut ke = Matrix24::zeros();
    let mut me = Matrix24::zeros();

    let (points, weights) = gauss_points_3d();

    for (point, &w) in points.iter().zip(weights.iter()) {
        let n = shape_functions_hex8(point.x, point.y, point.z);
        let d_n_nat = shape_function_derivatives_hex8(point.x, point.y, point.z);

        let j: Matrix3<f64> = d_n_nat * node_coords;
        let det_j = j.determinant();
        if !(det_j > MIN_DET_J) {
            return Err(FemError::DegenerateElement { element: 0, det: det_j });
        }
        let j_inv = j
            .try_inverse()
            .ok_or(FemError::DegenerateElement { element: 0, det: det_j })?;

        let weight = w * det_j;
        let b = strain_displacement(&(j_inv * d_n_nat));
        ke += weight * (b.transpose() * d * b);

        // N^T N expanded per displacement component
        let mass_weight = weight * material.rho;
        for a in 0..8 {
            for c in 0..8 {
                let m_ac = mass_weight * n[a] * n[c];
                for dim in 0..3 {
                    me[(3 * a + dim, 3 * c + dim)] += m_ac;
                }
            }
        }
    }

    ke = 0.5 * (ke + ke.transpose());
    Ok((ke, me))
}
