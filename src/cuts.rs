//! Undercut profile model.
//!
//! A bar is described by a set of symmetric, nested rectangular undercuts. Each cut
//! removes material from the underside within `lambda` of the bar centre, leaving a
//! remaining thickness `h`. The innermost containing cut (smallest `lambda`) sets
//! the local height; outside every cut the bar keeps its original thickness `h0`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{FemError, Result};
use crate::optimization::types::BarParameters;

/// Offset used to sample the height on either side of a cut boundary (m).
const BOUNDARY_PROBE: f64 = 1e-4;

/// Height jumps below this are not treated as discontinuities (m).
const DISCONTINUITY_TOL: f64 = 1e-9;

/// Single rectangular cut defining the undercut profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    /// Half-width measured from the bar centre (m), 0 <= lambda <= L/2.
    pub lambda: f64,
    /// Remaining thickness inside the cut (m).
    pub h: f64,
}

impl Cut {
    pub fn new(lambda: f64, h: f64) -> Self {
        Cut { lambda, h }
    }
}

/// A step in the height profile at position `x`, with the height just left and right of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discontinuity {
    pub x: f64,
    pub h_left: f64,
    pub h_right: f64,
}

fn by_lambda_desc(a: &Cut, b: &Cut) -> Ordering {
    b.lambda.partial_cmp(&a.lambda).unwrap_or(Ordering::Equal)
}

/// Copy of `cuts` ordered outermost first.
pub fn sorted_by_lambda_desc(cuts: &[Cut]) -> Vec<Cut> {
    let mut sorted = cuts.to_vec();
    sorted.sort_by(by_lambda_desc);
    sorted
}

/// Compute the bar profile height H(x) at a given position.
///
/// The profile is symmetric about x = L/2. Cuts with `lambda <= 0` are ignored.
///
/// # Arguments
/// * `x` - Position along bar (m), 0 <= x <= L
/// * `cuts` - Cuts in any order
/// * `length` - Bar length (m)
/// * `h0` - Original bar height (m)
///
/// # Returns
/// Height of the innermost cut covering `x`, or `h0` if none does. Among cuts
/// sharing the innermost `lambda`, the last one listed wins.
pub fn compute_height(x: f64, cuts: &[Cut], length: f64, h0: f64) -> f64 {
    let dist_from_center = (x - length / 2.0).abs();

    cuts.iter()
        .rev()
        .filter(|cut| cut.lambda > 0.0 && dist_from_center <= cut.lambda)
        .min_by(|a, b| a.lambda.partial_cmp(&b.lambda).unwrap_or(Ordering::Equal))
        .map(|cut| cut.h)
        .unwrap_or(h0)
}

/// Locate every height step of the profile, sorted by position.
///
/// Both edges of each cut are checked; edges hidden by an enclosing cut of equal
/// height produce no step and are dropped.
pub fn find_discontinuities(cuts: &[Cut], length: f64, h0: f64) -> Vec<Discontinuity> {
    let center_x = length / 2.0;
    let mut steps = Vec::with_capacity(cuts.len() * 2);

    for cut in cuts.iter().filter(|c| c.lambda > 0.0) {
        for edge in [center_x - cut.lambda, center_x + cut.lambda] {
            let h_left = compute_height(edge - BOUNDARY_PROBE, cuts, length, h0);
            let h_right = compute_height(edge + BOUNDARY_PROBE, cuts, length, h0);
            if (h_left - h_right).abs() > DISCONTINUITY_TOL {
                steps.push(Discontinuity { x: edge, h_left, h_right });
            }
        }
    }

    steps.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
    steps
}

/// Stiffness-equivalent height of an element split by a step at `step.x`.
fn smoothed_height(step: &Discontinuity, x_start: f64, x_end: f64) -> f64 {
    let dx1 = step.x - x_start;
    let dx2 = x_end - step.x;
    ((step.h_left * step.h_left * dx1 + step.h_right * step.h_right * dx2) / (dx1 + dx2)).sqrt()
}

/// Heights for the elements bounded by consecutive `x_positions`.
///
/// An element strictly containing a step gets the quadratic mean of both sides
/// weighted by sub-length; every other element takes the midpoint height.
pub fn heights_for_positions(cuts: &[Cut], length: f64, h0: f64, x_positions: &[f64]) -> Vec<f64> {
    let steps = find_discontinuities(cuts, length, h0);

    x_positions
        .windows(2)
        .map(|span| {
            let (x_start, x_end) = (span[0], span[1]);
            steps
                .iter()
                .find(|step| step.x > x_start && step.x < x_end)
                .map(|step| smoothed_height(step, x_start, x_end))
                .unwrap_or_else(|| compute_height(0.5 * (x_start + x_end), cuts, length, h0))
        })
        .collect()
}

/// Generate element heights for a uniform mesh of `num_elements` elements.
///
/// Elements spanning a step use `sqrt((h1^2*dx1 + h2^2*dx2) / (dx1 + dx2))`.
pub fn generate_element_heights(cuts: &[Cut], length: f64, h0: f64, num_elements: usize) -> Vec<f64> {
    let element_length = length / num_elements as f64;
    let x_positions: Vec<f64> = (0..=num_elements).map(|i| i as f64 * element_length).collect();
    heights_for_positions(cuts, length, h0, &x_positions)
}

/// Convert a gene vector into cuts sorted by lambda descending.
///
/// Genes are read as `[lambda_1, h_1, lambda_2, h_2, ...]`. Pairs with a non-finite
/// value are skipped and an unpaired trailing value is ignored; stripping a length
/// adjustment gene is the caller's job.
pub fn genes_to_cuts(genes: &[f64]) -> Vec<Cut> {
    let mut cuts: Vec<Cut> = genes
        .chunks_exact(2)
        .filter(|pair| pair[0].is_finite() && pair[1].is_finite())
        .map(|pair| Cut::new(pair[0], pair[1]))
        .collect();
    cuts.sort_by(by_lambda_desc);
    cuts
}

/// Flatten cuts into `[lambda_1, h_1, ...]`, outermost first.
pub fn cuts_to_genes(cuts: &[Cut]) -> Vec<f64> {
    sorted_by_lambda_desc(cuts)
        .into_iter()
        .flat_map(|cut| [cut.lambda, cut.h])
        .collect()
}

/// Number of cuts that can be the innermost cover somewhere on the bar.
///
/// Duplicated lambdas and zero-width cuts do not count.
pub fn count_effective_cuts(cuts: &[Cut]) -> usize {
    let mut count = 0;
    let mut last_lambda = f64::INFINITY;

    for cut in sorted_by_lambda_desc(cuts) {
        if cut.lambda < last_lambda && cut.lambda > 0.0 {
            count += 1;
            last_lambda = cut.lambda;
        }
    }

    count
}

/// Check every cut against the bar's admissible window.
pub fn validate_cuts(cuts: &[Cut], bar: &BarParameters) -> Result<()> {
    let half_length = bar.length / 2.0;

    for (i, cut) in cuts.iter().enumerate() {
        if !(0.0..=half_length).contains(&cut.lambda) {
            return Err(FemError::InvalidCut(format!(
                "Cut {} lambda ({}) out of bounds [0, {}]",
                i + 1,
                cut.lambda,
                half_length
            )));
        }
        if !(bar.h_min..=bar.h0).contains(&cut.h) {
            return Err(FemError::InvalidCut(format!(
                "Cut {} height ({}) out of bounds [{}, {}]",
                i + 1,
                cut.h,
                bar.h_min,
                bar.h0
            )));
        }
    }

    Ok(())
}

/// Generate an adaptive 1D mesh refined around cut boundaries.
///
/// Elements within `transition_width * length` of a cut edge are `refinement_factor`
/// times smaller than the base size `length / base_elements`.
///
/// # Returns
/// Tuple of (x_positions, element_heights), with `x_positions` running from 0 to `length`.
pub fn generate_adaptive_mesh_1d(
    cuts: &[Cut],
    length: f64,
    h0: f64,
    base_elements: usize,
    refinement_factor: usize,
    transition_width: f64,
) -> (Vec<f64>, Vec<f64>) {
    let center_x = length / 2.0;
    let edges: Vec<f64> = cuts
        .iter()
        .filter(|c| c.lambda > 0.0)
        .flat_map(|c| [center_x - c.lambda, center_x + c.lambda])
        .collect();

    let transition_dist = transition_width * length;
    let near_edge = |x: f64| edges.iter().any(|&edge| (x - edge).abs() < transition_dist);

    let base_dx = length / base_elements.max(1) as f64;
    let fine_dx = base_dx / refinement_factor.max(1) as f64;

    let mut x_positions = vec![0.0];
    let mut current_x = 0.0;
    while current_x < length - 1e-10 {
        let dx = if near_edge(current_x) || near_edge(current_x + base_dx) {
            fine_dx
        } else {
            base_dx
        };
        current_x = (current_x + dx).min(length);
        x_positions.push(current_x);
    }
    if let Some(last) = x_positions.last_mut() {
        *last = length;
    }

    let heights = heights_for_positions(cuts, length, h0, &x_positions);
    (x_positions, heights)
}

/// Sample the profile for plotting.
///
/// Returns `num_points + 1` evenly spaced `(x, h)` pairs plus a pair of points
/// `L/10000` either side of every cut edge strictly inside the bar, sorted by x.
pub fn generate_profile_points(cuts: &[Cut], length: f64, h0: f64, num_points: usize) -> Vec<(f64, f64)> {
    let n = num_points.max(1);
    let mut points: Vec<(f64, f64)> = (0..=n)
        .map(|i| {
            let x = i as f64 / n as f64 * length;
            (x, compute_height(x, cuts, length, h0))
        })
        .collect();

    let epsilon = length / 10_000.0;
    for cut in cuts {
        for edge in [length / 2.0 - cut.lambda, length / 2.0 + cut.lambda] {
            if edge > 0.0 && edge < length {
                for x in [edge - epsilon, edge + epsilon] {
                    points.push((x, compute_height(x, cuts, length, h0)));
                }
            }
        }
    }

    points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    points
}
