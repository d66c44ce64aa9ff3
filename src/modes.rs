//! Mode family classification for the solid model.
//!
//! Each mode is labelled from the displacement of the two top corners at the
//! `x = 0` end of the bar. The dominant direction at the first corner separates
//! lateral (y) and axial (x) modes from the z-dominated ones. For those, matching
//! z signs at both corners mean vertical bending and opposite signs mean torsion.
//! Closely spaced mode pairs can be mislabelled; the rule is applied as is.

use std::collections::HashMap;

use nalgebra::{DMatrix, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{FemError, Result};
use crate::types::{ModeType, DEFAULT_CORNER_TOL, DOF_PER_NODE, Z_DIR_INDEX};

/// A mode placed in its family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedMode {
    pub frequency: f64,
    /// Column of the mode shape matrix.
    pub mode_index: usize,
    /// 1-based position within the family by frequency (V1, V2, T1, ...).
    pub family_rank: usize,
}

pub type ModeFamilies = HashMap<ModeType, Vec<ClassifiedMode>>;

/// Top-surface nodes at the `x = min` end with the largest and smallest y.
pub fn find_corner_nodes(nodes: &[Vector3<f64>], tol: f64) -> Option<(usize, usize)> {
    let x_min = nodes.iter().map(|n| n.x).fold(f64::INFINITY, f64::min);
    let end: Vec<usize> = (0..nodes.len())
        .filter(|&i| (nodes[i].x - x_min).abs() < tol)
        .collect();

    let z_max = end.iter().map(|&i| nodes[i].z).fold(f64::NEG_INFINITY, f64::max);
    let top: Vec<usize> = end
        .into_iter()
        .filter(|&i| (nodes[i].z - z_max).abs() < tol)
        .collect();
    if top.len() < 2 {
        return None;
    }

    let s1 = top.iter().copied().max_by(|&a, &b| nodes[a].y.total_cmp(&nodes[b].y))?;
    let s2 = top.iter().copied().min_by(|&a, &b| nodes[a].y.total_cmp(&nodes[b].y))?;
    Some((s1, s2))
}

/// Label one mode shape (`[ux0, uy0, uz0, ux1, ...]`) from its corner displacements.
pub fn classify_mode_soares(mode_shape: &[f64], corners: (usize, usize)) -> ModeType {
    let (s1, s2) = corners;
    if mode_shape.len() < (s1.max(s2) + 1) * DOF_PER_NODE {
        return ModeType::Unknown;
    }

    let psi1 = &mode_shape[s1 * DOF_PER_NODE..(s1 + 1) * DOF_PER_NODE];
    let psi2 = &mode_shape[s2 * DOF_PER_NODE..(s2 + 1) * DOF_PER_NODE];

    // first maximum wins ties
    let mut max_dir = 0;
    for dir in 1..DOF_PER_NODE {
        if psi1[dir].abs() > psi1[max_dir].abs() {
            max_dir = dir;
        }
    }

    match max_dir {
        0 => ModeType::Axial,
        1 => ModeType::Lateral,
        _ if sign_class(psi1[Z_DIR_INDEX]) == sign_class(psi2[Z_DIR_INDEX]) => ModeType::VerticalBending,
        _ => ModeType::Torsional,
    }
}

/// Three-way sign: a zero displacement is its own class, distinct from either direction.
fn sign_class(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

fn classify_batch(frequencies: &[f64], shapes: &DMatrix<f64>, corners: (usize, usize)) -> Vec<(f64, usize, ModeType)> {
    let count = frequencies.len().min(shapes.ncols());
    let classify = |idx: usize| {
        let column = shapes.column(idx);
        (frequencies[idx], idx, classify_mode_soares(column.as_slice(), corners))
    };

    #[cfg(feature = "parallel")]
    {
        (0..count).into_par_iter().map(classify).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..count).map(classify).collect()
    }
}

/// Group modes into families, each sorted by frequency with 1-based ranks.
///
/// Every family key is present, possibly empty. Fails if the mesh has no pair of
/// top corners at its `x = min` end.
pub fn classify_all_modes(
    frequencies: &[f64],
    mode_shapes: &DMatrix<f64>,
    nodes: &[Vector3<f64>],
) -> Result<ModeFamilies> {
    let corners = find_corner_nodes(nodes, DEFAULT_CORNER_TOL)
        .ok_or_else(|| FemError::InvalidInput("mesh has no top corner nodes at x = 0".to_string()))?;

    let mut families: ModeFamilies = [
        ModeType::VerticalBending,
        ModeType::Torsional,
        ModeType::Lateral,
        ModeType::Axial,
        ModeType::Unknown,
    ]
    .into_iter()
    .map(|t| (t, Vec::new()))
    .collect();

    for (frequency, mode_index, mode_type) in classify_batch(frequencies, mode_shapes, corners) {
        families.entry(mode_type).or_default().push(ClassifiedMode {
            frequency,
            mode_index,
            family_rank: 0,
        });
    }

    for modes in families.values_mut() {
        modes.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        for (rank, mode) in modes.iter_mut().enumerate() {
            mode.family_rank = rank + 1;
        }
    }

    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 1.0),
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(0.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn corners_are_top_nodes_at_x_min() {
        assert_eq!(find_corner_nodes(&unit_cube(), DEFAULT_CORNER_TOL), Some((7, 4)));
        assert_eq!(find_corner_nodes(&[], DEFAULT_CORNER_TOL), None);
    }

    #[test]
    fn stationary_corner_is_not_same_signed() {
        // corner s2 sits on a nodal line while s1 moves up
        let shape = [0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        assert_eq!(classify_mode_soares(&shape, (0, 1)), ModeType::Torsional);

        let shape = [0.0, 0.0, 1.0, 0.0, 0.0, 0.5];
        assert_eq!(classify_mode_soares(&shape, (0, 1)), ModeType::VerticalBending);

        let shape = [0.0, 0.0, 1.0, 0.0, 0.0, -0.0];
        assert_eq!(classify_mode_soares(&shape, (0, 1)), ModeType::Torsional);
    }

    #[test]
    fn soares_rule_separates_families() {
        let nodes = unit_cube();
        let mut shapes = DMatrix::<f64>::zeros(24, 4);

        // bending: both corners move up
        shapes[(4 * 3 + 2, 0)] = 1.0;
        shapes[(7 * 3 + 2, 0)] = 1.0;
        // torsion: corners move in opposite z directions
        shapes[(4 * 3 + 2, 1)] = 1.0;
        shapes[(7 * 3 + 2, 1)] = -1.0;
        // lateral: y dominates at the first corner
        shapes[(7 * 3 + 1, 2)] = 1.0;
        // axial: x dominates at the first corner
        shapes[(7 * 3, 3)] = 1.0;

        let families = classify_all_modes(&[100.0, 200.0, 300.0, 400.0], &shapes, &nodes).unwrap();

        assert_eq!(families[&ModeType::VerticalBending][0].mode_index, 0);
        assert_eq!(families[&ModeType::Torsional][0].mode_index, 1);
        assert_eq!(families[&ModeType::Lateral][0].mode_index, 2);
        assert_eq!(families[&ModeType::Axial][0].mode_index, 3);
        assert!(families[&ModeType::Unknown].is_empty());
    }

    #[test]
    fn family_ranks_follow_frequency() {
        let nodes = unit_cube();
        let mut shapes = DMatrix::<f64>::zeros(24, 3);
        for col in 0..3 {
            shapes[(4 * 3 + 2, col)] = 1.0;
            shapes[(7 * 3 + 2, col)] = 0.5;
        }

        let families = classify_all_modes(&[900.0, 300.0, 600.0], &shapes, &nodes).unwrap();
        let bending = &families[&ModeType::VerticalBending];
        let ranked: Vec<(usize, usize)> = bending.iter().map(|m| (m.mode_index, m.family_rank)).collect();
        assert_eq!(ranked, vec![(1, 1), (2, 2), (0, 3)]);
    }

    #[test]
    fn short_shape_is_unknown() {
        assert_eq!(classify_mode_soares(&[0.0; 6], (7, 4)), ModeType::Unknown);
    }
}
