//! Blank length for a target fundamental.
//!
//! The fundamental of an uncut bar falls monotonically with length, so the
//! length is found by bisection. Lengths and cross-section are in mm here,
//! since that is how stock is measured and cut.

use serde::Serialize;

use crate::beam2d_solver::compute_frequencies_2d;
use crate::error::{FemError, Result};
use crate::notes::{frequency_error_cents, NoteInfo};
use crate::optimization::types::{AnalysisMode, BarParameters, Material};
use crate::solver::{get_bending_frequencies_3d, SolidOptions};
use crate::types::EigenSolver;

const MM: f64 = 1e-3;
/// Bisection stops once the bracket is narrower than this (mm).
const LENGTH_RESOLUTION_MM: f64 = 0.01;
const FREE_FREE_BETA1: f64 = 4.730_040_74;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthSearchOptions {
    pub min_length: f64,
    pub max_length: f64,
    pub tolerance_cents: f64,
    pub max_iterations: usize,
    pub num_elements: usize,
    pub analysis_mode: AnalysisMode,
    /// The search aims at `target * (1 + frequency_offset)`.
    pub frequency_offset: f64,
    pub ny: usize,
    pub nz: usize,
}

impl Default for LengthSearchOptions {
    fn default() -> Self {
        Self {
            min_length: 100.0,
            max_length: 1000.0,
            tolerance_cents: 1.0,
            max_iterations: 50,
            num_elements: 80,
            analysis_mode: AnalysisMode::Beam2d,
            frequency_offset: 0.0,
            ny: 2,
            nz: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LengthSearchResult {
    /// mm
    pub length: f64,
    pub computed_freq: f64,
    pub iterations: usize,
    /// Against the requested target, not the offset one.
    pub error_cents: f64,
}

/// State of one bisection step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthSearchProgress {
    pub iteration: usize,
    pub max_iterations: usize,
    pub current_length: f64,
    pub current_frequency: f64,
    pub error_cents: f64,
    /// Bracket width before this step (mm)
    pub search_range: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarLengthResult {
    pub note_name: String,
    pub note_frequency: f64,
    pub note_midi_number: i32,
    pub target_frequency: f64,
    pub optimal_length: f64,
    pub computed_frequency: f64,
    pub error_cents: f64,
    pub search_iterations: usize,
}

/// Fundamental of an uncut bar, dimensions in mm.
pub fn compute_f1_for_uniform_bar(
    length: f64,
    width: f64,
    thickness: f64,
    material: &Material,
    options: &LengthSearchOptions,
) -> Result<f64> {
    let h0 = thickness * MM;
    let bar = BarParameters::new(length * MM, width * MM, h0, h0 / 10.0);

    let frequencies = match options.analysis_mode {
        AnalysisMode::Beam2d => compute_frequencies_2d(&[], &bar, material, options.num_elements, 1)?,
        AnalysisMode::Solid3d => {
            bar.validate()?;
            let solid = SolidOptions {
                ny: options.ny,
                nz: options.nz,
                solver: EigenSolver::Auto,
            };
            let heights = vec![h0; options.num_elements];
            get_bending_frequencies_3d(&heights, bar.length, bar.width, material, 1, &solid)?
        }
    };

    frequencies
        .first()
        .copied()
        .ok_or(FemError::InsufficientModes { requested: 1, found: 0 })
}

pub fn find_optimal_length(
    target_frequency: f64,
    width: f64,
    thickness: f64,
    material: &Material,
    options: &LengthSearchOptions,
) -> Result<LengthSearchResult> {
    find_optimal_length_with_progress(target_frequency, width, thickness, material, options, |_| {})
}

/// Bisection on length until the fundamental is within the cent tolerance.
///
/// Targets outside what the length range can reach return the nearer end
/// of the range after one iteration.
pub fn find_optimal_length_with_progress<F: FnMut(&LengthSearchProgress)>(
    target_frequency: f64,
    width: f64,
    thickness: f64,
    material: &Material,
    options: &LengthSearchOptions,
    mut on_progress: F,
) -> Result<LengthSearchResult> {
    if !(target_frequency > 0.0) {
        return Err(FemError::InvalidInput(format!("target frequency must be positive, got {target_frequency}")));
    }
    if !(options.min_length > 0.0 && options.min_length < options.max_length) {
        return Err(FemError::InvalidInput(format!(
            "length range [{}, {}] mm is empty",
            options.min_length, options.max_length
        )));
    }

    let f1_at = |length: f64| compute_f1_for_uniform_bar(length, width, thickness, material, options);
    let effective_target = target_frequency * (1.0 + options.frequency_offset);

    let f_short = f1_at(options.min_length)?;
    let f_long = f1_at(options.max_length)?;
    let at_end = |length: f64, f: f64| LengthSearchResult {
        length,
        computed_freq: f,
        iterations: 1,
        error_cents: frequency_error_cents(f, target_frequency),
    };
    if effective_target >= f_short {
        log::warn!("{target_frequency:.2} Hz needs a bar shorter than {} mm", options.min_length);
        return Ok(at_end(options.min_length, f_short));
    }
    if effective_target <= f_long {
        log::warn!("{target_frequency:.2} Hz needs a bar longer than {} mm", options.max_length);
        return Ok(at_end(options.max_length, f_long));
    }

    let (mut low, mut high) = (options.min_length, options.max_length);
    let mut best = LengthSearchResult {
        length: (low + high) / 2.0,
        computed_freq: 0.0,
        iterations: 0,
        error_cents: f64::INFINITY,
    };
    // ranked against the offset target; error_cents stays against the raw one
    let mut best_aim = f64::INFINITY;

    while best.iterations < options.max_iterations && high - low > LENGTH_RESOLUTION_MM {
        best.iterations += 1;
        let mid = (low + high) / 2.0;
        let f1 = f1_at(mid)?;

        let report_cents = frequency_error_cents(f1, target_frequency);
        let aim_cents = frequency_error_cents(f1, effective_target);
        if aim_cents.abs() < best_aim {
            best_aim = aim_cents.abs();
            best.length = mid;
            best.computed_freq = f1;
            best.error_cents = report_cents;
        }

        on_progress(&LengthSearchProgress {
            iteration: best.iterations,
            max_iterations: options.max_iterations,
            current_length: mid,
            current_frequency: f1,
            error_cents: report_cents,
            search_range: high - low,
        });

        if aim_cents.abs() <= options.tolerance_cents {
            break;
        }
        // too sharp means too short
        if f1 > effective_target {
            low = mid;
        } else {
            high = mid;
        }
    }

    log::debug!(
        "{target_frequency:.2} Hz: {:.2} mm after {} iterations ({:+.2} cents)",
        best.length,
        best.iterations,
        best.error_cents
    );
    Ok(best)
}

/// Blank lengths for a list of notes; stops at the first failure.
pub fn find_lengths_for_notes(
    notes: &[NoteInfo],
    width: f64,
    thickness: f64,
    material: &Material,
    options: &LengthSearchOptions,
) -> Result<Vec<BarLengthResult>> {
    notes
        .iter()
        .map(|note| {
            let found = find_optimal_length(note.frequency, width, thickness, material, options)?;
            Ok(BarLengthResult {
                note_name: note.name.clone(),
                note_frequency: note.frequency,
                note_midi_number: note.midi_number,
                target_frequency: note.frequency,
                optimal_length: found.length,
                computed_frequency: found.computed_freq,
                error_cents: found.error_cents,
                search_iterations: found.iterations,
            })
        })
        .collect()
}

/// Euler-Bernoulli estimate of the length (mm) whose fundamental is
/// `target_frequency`. Slightly long for thick bars, where shear lowers f1.
pub fn estimate_length_from_theory(target_frequency: f64, width: f64, thickness: f64, material: &Material) -> f64 {
    let b = width * MM;
    let h = thickness * MM;
    let ei = material.e * b * h.powi(3) / 12.0;
    let rho_a = material.rho * b * h;

    let factor = FREE_FREE_BETA1 * FREE_FREE_BETA1 / (2.0 * std::f64::consts::PI * target_frequency);
    (factor * (ei / rho_a).sqrt()).sqrt() / MM
}
