//! Hexahedral meshes of undercut bars.
//!
//! The bar occupies `x in [0, L]`, `y in [0, b]` and `z in [0, h(x)]`. Cuts are
//! taken from the underside, so node columns are stretched in `z` to follow the
//! local profile height. Interior node columns take the mean height of the two
//! elements they join.

use std::path::Path;

use nalgebra::{RowVector3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{FemError, Result};
use crate::types::{NodeCoords, DOF_PER_NODE};

#[derive(Debug, Clone)]
pub struct Mesh3d {
    pub nodes: Vec<Vector3<f64>>,
    /// Node indices of each hexahedron: bottom face then top face, counter-clockwise.
    pub elements: Vec<[usize; 8]>,
    /// Profile height of the column each element belongs to.
    pub heights_per_element: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableNode {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshMetadata {
    pub num_nodes: usize,
    pub num_elements: usize,
    pub num_dof: usize,
    pub bbox_min: [f64; 3],
    pub bbox_max: [f64; 3],
}

/// JSON-friendly view of a [`Mesh3d`] for plotting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializableMesh {
    pub nodes: Vec<SerializableNode>,
    pub elements: Vec<[usize; 8]>,
    pub element_heights: Vec<f64>,
    pub metadata: MeshMetadata,
}

impl Mesh3d {
    pub fn num_dofs(&self) -> usize {
        DOF_PER_NODE * self.nodes.len()
    }

    /// 8x3 coordinates of element `elem` in local node order.
    pub fn element_coords(&self, elem: usize) -> NodeCoords {
        let conn = &self.elements[elem];
        NodeCoords::from_rows(&conn.map(|n| {
            let p = self.nodes[n];
            RowVector3::new(p.x, p.y, p.z)
        }))
    }

    pub fn to_serializable(&self) -> SerializableMesh {
        let mut bbox_min = [f64::INFINITY; 3];
        let mut bbox_max = [f64::NEG_INFINITY; 3];
        for node in &self.nodes {
            for axis in 0..3 {
                bbox_min[axis] = bbox_min[axis].min(node[axis]);
                bbox_max[axis] = bbox_max[axis].max(node[axis]);
            }
        }

        SerializableMesh {
            nodes: self
                .nodes
                .iter()
                .map(|v| SerializableNode { x: v.x, y: v.y, z: v.z })
                .collect(),
            elements: self.elements.clone(),
            element_heights: self.heights_per_element.clone(),
            metadata: MeshMetadata {
                num_nodes: self.nodes.len(),
                num_elements: self.elements.len(),
                num_dof: self.num_dofs(),
                bbox_min,
                bbox_max,
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_serializable())?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_serializable())?)
    }

    /// Write the pretty-printed JSON export to `path`.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// Generate a mesh with uniform spacing along the bar.
///
/// # Arguments
/// * `length` - Bar length (m)
/// * `width` - Bar width (m)
/// * `element_heights` - Profile height of each element column; its length sets `nx`
/// * `ny` - Elements across the width
/// * `nz` - Elements through the thickness
pub fn generate_bar_mesh_3d(
    length: f64,
    width: f64,
    element_heights: &[f64],
    ny: usize,
    nz: usize,
) -> Result<Mesh3d> {
    let nx = element_heights.len();
    let dx = length / nx.max(1) as f64;
    let x_positions: Vec<f64> = (0..=nx).map(|ix| ix as f64 * dx).collect();
    generate_bar_mesh_3d_adaptive(width, &x_positions, element_heights, ny, nz)
}

/// Generate a mesh whose element columns are bounded by `x_positions`.
///
/// `x_positions` must be strictly increasing with one more entry than `element_heights`.
pub fn generate_bar_mesh_3d_adaptive(
    width: f64,
    x_positions: &[f64],
    element_heights: &[f64],
    ny: usize,
    nz: usize,
) -> Result<Mesh3d> {
    let nx = element_heights.len();
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(FemError::InvalidInput(format!(
            "mesh needs at least one element per direction (nx={nx}, ny={ny}, nz={nz})"
        )));
    }
    if x_positions.len() != nx + 1 {
        return Err(FemError::InvalidInput(format!(
            "{} x positions for {} element columns",
            x_positions.len(),
            nx
        )));
    }
    if x_positions.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(FemError::InvalidInput("x positions must be strictly increasing".to_string()));
    }
    if !(width > 0.0) || element_heights.iter().any(|h| !(*h > 0.0)) {
        return Err(FemError::InvalidInput("width and heights must be positive".to_string()));
    }

    let dy = width / ny as f64;
    let (nny, nnz) = (ny + 1, nz + 1);
    let node_idx = |ix: usize, iy: usize, iz: usize| ix * (nny * nnz) + iy * nnz + iz;

    let mut nodes = Vec::with_capacity(x_positions.len() * nny * nnz);
    for (ix, &x) in x_positions.iter().enumerate() {
        let h = match ix {
            0 => element_heights[0],
            _ if ix == nx => element_heights[nx - 1],
            _ => 0.5 * (element_heights[ix - 1] + element_heights[ix]),
        };
        let dz = h / nz as f64;

        for iy in 0..nny {
            for iz in 0..nnz {
                nodes.push(Vector3::new(x, iy as f64 * dy, iz as f64 * dz));
            }
        }
    }

    let mut elements = Vec::with_capacity(nx * ny * nz);
    let mut heights = Vec::with_capacity(nx * ny * nz);
    for (ix, &h) in element_heights.iter().enumerate() {
        for iy in 0..ny {
            for iz in 0..nz {
                elements.push([
                    node_idx(ix, iy, iz),
                    node_idx(ix + 1, iy, iz),
                    node_idx(ix + 1, iy + 1, iz),
                    node_idx(ix, iy + 1, iz),
                    node_idx(ix, iy, iz + 1),
                    node_idx(ix + 1, iy, iz + 1),
                    node_idx(ix + 1, iy + 1, iz + 1),
                    node_idx(ix, iy + 1, iz + 1),
                ]);
                heights.push(h);
            }
        }
    }

    Ok(Mesh3d {
        nodes,
        elements,
        heights_per_element: heights,
    })
}
