//! Mesh resolution analysis for undercut profiles.
//!
//! Narrow cuts and closely spaced cut edges need at least two elements across
//! them for the beam model to see the step in stiffness. These checks compare
//! the geometry against the element size and recommend a finer mesh.

use serde::{Deserialize, Serialize};

use crate::cuts::Cut;

/// Refinement settings of an adaptive 1D mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveMesh {
    pub refinement_factor: usize,
    /// Transition zone around each edge, as a fraction of bar length.
    pub transition_width: f64,
}

impl Default for AdaptiveMesh {
    fn default() -> Self {
        Self {
            refinement_factor: 4,
            transition_width: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    /// The innermost cut is narrower than two elements.
    CutWidth,
    /// Two adjacent cut edges are closer than two elements.
    CutSpacing,
}

/// One under-resolved geometric feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshResolutionWarning {
    pub feature_type: FeatureType,
    pub feature_size_mm: f64,
    pub element_size_mm: f64,
    /// Element size over half the feature size; above 1 means under-resolved.
    pub ratio: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshResolutionStats {
    pub num_elements: usize,
    pub base_element_size_mm: f64,
    pub min_element_size_mm: f64,
    pub adaptive: bool,
    pub num_cuts: usize,
    /// Cut half-widths in mm, ascending.
    pub boundaries_mm: Vec<f64>,
    pub smallest_feature_mm: f64,
    pub resolution_adequate: bool,
    pub recommended_element_size_mm: Option<f64>,
    pub recommended_num_elements: Option<usize>,
    pub recommended_refinement: Option<usize>,
}

/// Analyze whether the mesh can resolve the cut geometry.
///
/// # Arguments
/// * `cuts` - Cuts in any order
/// * `length` - Bar length (m)
/// * `num_elements` - Element count of the uniform (or base) mesh
/// * `adaptive` - Refinement settings when an adaptive mesh is used
///
/// # Returns
/// Warnings for each under-resolved feature, plus summary statistics with a
/// recommended element size (three elements across the smallest feature).
pub fn analyze_mesh_resolution(
    cuts: &[Cut],
    length: f64,
    num_elements: usize,
    adaptive: Option<AdaptiveMesh>,
) -> (Vec<MeshResolutionWarning>, MeshResolutionStats) {
    let length_mm = length * 1000.0;
    let base_element_size_mm = length_mm / num_elements.max(1) as f64;
    let min_element_size_mm = match adaptive {
        Some(mesh) => base_element_size_mm / mesh.refinement_factor.max(1) as f64,
        None => base_element_size_mm,
    };

    let mut boundaries_mm: Vec<f64> = cuts
        .iter()
        .filter(|c| c.lambda > 0.0)
        .map(|c| c.lambda * 1000.0)
        .collect();
    boundaries_mm.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut stats = MeshResolutionStats {
        num_elements,
        base_element_size_mm,
        min_element_size_mm,
        adaptive: adaptive.is_some(),
        num_cuts: boundaries_mm.len(),
        boundaries_mm: boundaries_mm.clone(),
        smallest_feature_mm: f64::INFINITY,
        resolution_adequate: true,
        recommended_element_size_mm: None,
        recommended_num_elements: None,
        recommended_refinement: None,
    };
    let mut warnings = Vec::new();

    let Some(&innermost_mm) = boundaries_mm.first() else {
        return (warnings, stats);
    };

    let cut_width_mm = 2.0 * innermost_mm;
    stats.smallest_feature_mm = cut_width_mm;
    if cut_width_mm < 2.0 * min_element_size_mm {
        warnings.push(MeshResolutionWarning {
            feature_type: FeatureType::CutWidth,
            feature_size_mm: cut_width_mm,
            element_size_mm: min_element_size_mm,
            ratio: min_element_size_mm / (cut_width_mm / 2.0),
            message: format!(
                "Innermost cut region ({:.1}mm wide) may be under-resolved. \
                 Element size {:.1}mm should be <{:.1}mm for accuracy.",
                cut_width_mm,
                min_element_size_mm,
                cut_width_mm / 2.0
            ),
        });
        stats.resolution_adequate = false;
    }

    for pair in boundaries_mm.windows(2) {
        let spacing_mm = pair[1] - pair[0];
        stats.smallest_feature_mm = stats.smallest_feature_mm.min(spacing_mm);

        if spacing_mm < 2.0 * min_element_size_mm {
            warnings.push(MeshResolutionWarning {
                feature_type: FeatureType::CutSpacing,
                feature_size_mm: spacing_mm,
                element_size_mm: min_element_size_mm,
                ratio: min_element_size_mm / (spacing_mm / 2.0),
                message: format!(
                    "Cut boundary spacing ({:.1}mm) may be under-resolved. \
                     Element size {:.1}mm should be <{:.1}mm.",
                    spacing_mm,
                    min_element_size_mm,
                    spacing_mm / 2.0
                ),
            });
            stats.resolution_adequate = false;
        }
    }

    if stats.smallest_feature_mm > 0.0 && stats.smallest_feature_mm.is_finite() {
        let element_size = stats.smallest_feature_mm / 3.0;
        let recommended = (length_mm / element_size).ceil() as usize;
        stats.recommended_element_size_mm = Some(element_size);
        stats.recommended_num_elements = Some(recommended);

        if recommended > num_elements && adaptive.is_some() {
            stats.recommended_refinement = Some((base_element_size_mm / element_size).ceil() as usize + 1);
        }
    }

    (warnings, stats)
}

/// Log any resolution warnings and return whether the mesh is adequate.
pub fn check_mesh_resolution(
    cuts: &[Cut],
    length: f64,
    num_elements: usize,
    adaptive: Option<AdaptiveMesh>,
) -> bool {
    let (warnings, stats) = analyze_mesh_resolution(cuts, length, num_elements, adaptive);

    if warnings.is_empty() {
        return true;
    }

    for warning in &warnings {
        log::warn!("Mesh resolution: {}", warning.message);
    }
    match (adaptive, stats.recommended_refinement, stats.recommended_num_elements) {
        (Some(mesh), Some(refinement), _) => log::warn!(
            "Recommendation: use refinement_factor={} (currently {})",
            refinement,
            mesh.refinement_factor
        ),
        (None, _, Some(recommended)) => log::warn!(
            "Recommendation: use {} elements (currently {})",
            recommended,
            num_elements
        ),
        _ => {}
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cuts_is_adequate() {
        let (warnings, stats) = analyze_mesh_resolution(&[], 0.5, 100, None);
        assert!(warnings.is_empty());
        assert!(stats.resolution_adequate);
        assert_eq!(stats.num_cuts, 0);
        assert!(stats.smallest_feature_mm.is_infinite());
        assert!(stats.recommended_num_elements.is_none());
    }

    #[test]
    fn narrow_cut_is_flagged() {
        // 500 mm / 50 elements = 10 mm elements; a 2 mm half-width cut is 4 mm wide.
        let cuts = [Cut::new(0.002, 0.01)];
        let (warnings, stats) = analyze_mesh_resolution(&cuts, 0.5, 50, None);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].feature_type, FeatureType::CutWidth);
        assert!((warnings[0].feature_size_mm - 4.0).abs() < 1e-9);
        assert!((warnings[0].ratio - 5.0).abs() < 1e-9);
        assert!(!stats.resolution_adequate);

        let recommended = stats.recommended_num_elements.unwrap();
        assert!((375..=376).contains(&recommended));
    }

    #[test]
    fn close_edges_are_flagged() {
        let cuts = [Cut::new(0.1015625, 0.02), Cut::new(0.09765625, 0.015)];
        let (warnings, stats) = analyze_mesh_resolution(&cuts, 0.5, 100, None);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].feature_type, FeatureType::CutSpacing);
        assert!((stats.smallest_feature_mm - 3.90625).abs() < 1e-9);
        assert_eq!(stats.boundaries_mm.len(), 2);
        assert!(stats.boundaries_mm[0] < stats.boundaries_mm[1]);
    }

    #[test]
    fn adaptive_mesh_recommends_refinement() {
        let cuts = [Cut::new(0.1015625, 0.02), Cut::new(0.09765625, 0.015)];
        let adaptive = Some(AdaptiveMesh::default());
        let (_, stats) = analyze_mesh_resolution(&cuts, 0.5, 100, adaptive);

        assert!((stats.min_element_size_mm - 1.25).abs() < 1e-9);
        // 5 mm base over a 1.30 mm recommended size
        assert_eq!(stats.recommended_refinement, Some(5));
    }

    #[test]
    fn check_reports_adequacy() {
        assert!(check_mesh_resolution(&[Cut::new(0.1, 0.02)], 0.5, 150, None));
        assert!(!check_mesh_resolution(&[Cut::new(0.001, 0.02)], 0.5, 50, None));
    }
}
