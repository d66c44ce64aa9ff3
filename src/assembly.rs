//! Global matrix assembly for the solid model.
//!
//! Element matrices are computed independently (in parallel with the `parallel`
//! feature) and scattered into either a sparse CSR matrix or a dense matrix
//! using 3 DOFs per node.

use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::element::compute_hex8_matrices;
use crate::error::{FemError, Result};
use crate::mesh::Mesh3d;
use crate::optimization::types::Material;
use crate::types::{Matrix24, DOF_PER_NODE};

/// Per-element stiffness and mass matrices in mesh element order.
#[derive(Debug, Clone)]
pub struct ElementMatrices {
    pub stiffness: Vec<Matrix24>,
    pub mass: Vec<Matrix24>,
}

#[inline]
fn dof_map(nodes: &[usize; 8]) -> [usize; 24] {
    let mut map = [0; 24];
    for (a, &node) in nodes.iter().enumerate() {
        for dim in 0..DOF_PER_NODE {
            map[DOF_PER_NODE * a + dim] = DOF_PER_NODE * node + dim;
        }
    }
    map
}

fn element_matrices(mesh: &Mesh3d, material: &Material, elem: usize) -> Result<(Matrix24, Matrix24)> {
    compute_hex8_matrices(&mesh.element_coords(elem), material).map_err(|err| match err {
        FemError::DegenerateElement { det, .. } => FemError::DegenerateElement { element: elem, det },
        other => other,
    })
}

/// Compute all element matrices, failing on the first degenerate element.
pub fn compute_element_matrices(mesh: &Mesh3d, material: &Material) -> Result<ElementMatrices> {
    #[cfg(feature = "parallel")]
    let results: Vec<Result<(Matrix24, Matrix24)>> = (0..mesh.elements.len())
        .into_par_iter()
        .map(|elem| element_matrices(mesh, material, elem))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<(Matrix24, Matrix24)>> = (0..mesh.elements.len())
        .map(|elem| element_matrices(mesh, material, elem))
        .collect();

    let mut stiffness = Vec::with_capacity(results.len());
    let mut mass = Vec::with_capacity(results.len());
    for result in results {
        let (ke, me) = result?;
        stiffness.push(ke);
        mass.push(me);
    }

    Ok(ElementMatrices { stiffness, mass })
}

/// Scatter element matrices into a sparse global matrix. Duplicate entries are summed.
pub fn assemble_global_sparse(
    num_dofs: usize,
    elements: &[[usize; 8]],
    element_matrices: &[Matrix24],
) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(num_dofs, num_dofs);

    for (nodes, local) in elements.iter().zip(element_matrices) {
        let map = dof_map(nodes);
        for i in 0..24 {
            for j in 0..24 {
                let val = local[(i, j)];
                if val != 0.0 {
                    coo.push(map[i], map[j], val);
                }
            }
        }
    }

    CsrMatrix::from(&coo)
}

/// Dense assembly for meshes below the sparse threshold.
pub fn assemble_global_dense(
    num_dofs: usize,
    elements: &[[usize; 8]],
    element_matrices: &[Matrix24],
) -> DMatrix<f64> {
    let mut mat = DMatrix::<f64>::zeros(num_dofs, num_dofs);

    for (nodes, local) in elements.iter().zip(element_matrices) {
        let map = dof_map(nodes);
        for i in 0..24 {
            for j in 0..24 {
                mat[(map[i], map[j])] += local[(i, j)];
            }
        }
    }

    mat
}

/// Sparse global `(K, M)` for a mesh.
pub fn global_matrices_sparse(mesh: &Mesh3d, material: &Material) -> Result<(CsrMatrix<f64>, CsrMatrix<f64>)> {
    let elems = compute_element_matrices(mesh, material)?;
    let n = mesh.num_dofs();
    Ok((
        assemble_global_sparse(n, &mesh.elements, &elems.stiffness),
        assemble_global_sparse(n, &mesh.elements, &elems.mass),
    ))
}

/// Dense global `(K, M)` for a mesh.
pub fn global_matrices_dense(mesh: &Mesh3d, material: &Material) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    let elems = compute_element_matrices(mesh, material)?;
    let n = mesh.num_dofs();
    Ok((
        assemble_global_dense(n, &mesh.elements, &elems.stiffness),
        assemble_global_dense(n, &mesh.elements, &elems.mass),
    ))
}

/// Copy a CSR matrix into dense storage.
pub fn csr_to_dense(a: &CsrMatrix<f64>) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(a.nrows(), a.ncols());
    for (i, j, &v) in a.triplet_iter() {
        dense[(i, j)] += v;
    }
    dense
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::generate_bar_mesh_3d;

    fn aluminum() -> Material {
        Material::new("Aluminum", 70e9, 2700.0, 0.33)
    }

    #[test]
    fn sparse_assembly_sums_shared_entries() {
        let local = Matrix24::identity();
        let elements = [[0, 1, 2, 3, 4, 5, 6, 7], [1, 8, 9, 2, 5, 10, 11, 6]];
        let csr = assemble_global_sparse(36, &elements, &[local, local]);

        assert_eq!(csr.nrows(), 36);
        // four shared nodes, twelve shared DOFs
        assert_eq!(csr.nnz(), 36);
        let dense = csr_to_dense(&csr);
        assert_eq!(dense[(3, 3)], 2.0);
        assert_eq!(dense[(0, 0)], 1.0);
    }

    #[test]
    fn sparse_and_dense_assembly_agree() {
        let mesh = generate_bar_mesh_3d(0.1, 0.02, &[0.02, 0.015, 0.02], 1, 1).unwrap();
        let (ks, ms) = global_matrices_sparse(&mesh, &aluminum()).unwrap();
        let (kd, md) = global_matrices_dense(&mesh, &aluminum()).unwrap();

        assert!((csr_to_dense(&ks) - &kd).abs().max() < 1e-6 * kd.abs().max());
        assert!((csr_to_dense(&ms) - &md).abs().max() < 1e-15);
    }

    #[test]
    fn assembled_mass_matches_bar_mass() {
        let mesh = generate_bar_mesh_3d(0.2, 0.03, &[0.02; 4], 2, 2).unwrap();
        let (_, m) = global_matrices_dense(&mesh, &aluminum()).unwrap();

        // x-translation picks out every x DOF
        let mut total = 0.0;
        for i in (0..m.nrows()).step_by(3) {
            for j in (0..m.ncols()).step_by(3) {
                total += m[(i, j)];
            }
        }
        let expected = 2700.0 * 0.2 * 0.03 * 0.02;
        assert!((total - expected).abs() / expected < 1e-10);
    }

    #[test]
    fn degenerate_element_reports_index() {
        let mut mesh = generate_bar_mesh_3d(0.2, 0.03, &[0.02; 3], 1, 1).unwrap();
        // collapse the top face of the last column onto the bottom face
        for node in mesh.nodes.iter_mut() {
            if node.x > 0.13 {
                node.z = 0.0;
            }
        }
        let err = compute_element_matrices(&mesh, &aluminum()).unwrap_err();
        assert!(matches!(err, FemError::DegenerateElement { element: 2, .. }));
    }
}
