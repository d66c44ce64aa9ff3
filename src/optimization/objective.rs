//! Objective function and geometric penalties.
//!
//! Fitness is the weighted mean squared relative frequency error in percent,
//! optionally blended with a volume or roughness penalty:
//!
//! ```text
//! error   = 100 * sum(w_m * ((f_m - t_m) / t_m)^2) / sum(w_m)
//! fitness = (1 - alpha) * error + alpha * penalty
//! ```
//!
//! `w_0` is the fundamental's priority, every other mode weighs 1.

use crate::beam2d_solver::compute_frequencies_2d;
use crate::cuts::{generate_element_heights, sorted_by_lambda_desc, Cut};
use crate::error::{FemError, Result};
use crate::solver::{get_bending_frequencies_3d, SolidOptions};

use super::types::{AnalysisMode, BarParameters, DetailedEvaluation, Material, PenaltyType, RunRequest};

/// Weighted squared tuning error in percent.
///
/// Targets of 0 are skipped. Returns infinity when nothing can be compared.
pub fn compute_tuning_error(computed: &[f64], targets: &[f64], f1_priority: f64) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (m, (&f, &t)) in computed.iter().zip(targets).enumerate() {
        if t == 0.0 {
            continue;
        }
        let w = if m == 0 { f1_priority } else { 1.0 };
        let rel = (f - t) / t;
        weighted += w * rel * rel;
        total_weight += w;
    }

    if total_weight > 0.0 {
        100.0 * weighted / total_weight
    } else {
        f64::INFINITY
    }
}

/// Largest squared relative error in percent.
pub fn compute_max_tuning_error(computed: &[f64], targets: &[f64]) -> f64 {
    if computed.is_empty() || targets.is_empty() {
        return f64::INFINITY;
    }

    let worst = computed
        .iter()
        .zip(targets)
        .filter(|&(_, &t)| t != 0.0)
        .map(|(&f, &t)| ((f - t) / t).powi(2))
        .fold(0.0, f64::max);
    100.0 * worst
}

/// Percentage of the half-bar side area removed by the cuts.
///
/// Cuts are nested, so each annulus between consecutive lambdas (innermost
/// outwards) removes `h0 - h` of the cut that owns it.
pub fn compute_volume_penalty(cuts: &[Cut], length: f64, h0: f64) -> f64 {
    if cuts.is_empty() || length <= 0.0 || h0 <= 0.0 {
        return 0.0;
    }

    let mut removed = 0.0;
    let mut prev_lambda = 0.0;
    for cut in sorted_by_lambda_desc(cuts).iter().rev() {
        if cut.lambda > prev_lambda && cut.lambda > 0.0 {
            removed += (cut.lambda - prev_lambda) * (h0 - cut.h);
            prev_lambda = cut.lambda;
        }
    }

    (100.0 * removed / (length / 2.0 * h0)).clamp(0.0, 100.0)
}

/// Mean absolute height step at the cut edges, as a percentage of `h0`.
pub fn compute_roughness_penalty(cuts: &[Cut], h0: f64) -> f64 {
    let sorted = sorted_by_lambda_desc(cuts);
    let Some(outer) = sorted.first() else {
        return 0.0;
    };

    let mut total = (h0 - outer.h).abs();
    let mut steps = 1usize;
    for pair in sorted.windows(2) {
        // an equal lambda hides the inner cut entirely
        if pair[1].lambda < pair[0].lambda {
            total += (pair[0].h - pair[1].h).abs();
            steps += 1;
        }
    }

    100.0 * total / (steps as f64 * h0)
}

/// `(1 - alpha) * error + alpha * penalty`
#[inline]
pub fn combined_objective(tuning_error: f64, penalty: f64, alpha: f64) -> f64 {
    (1.0 - alpha) * tuning_error + alpha * penalty
}

/// Pitch error in cents, positive when sharp. Zero for a non-positive target.
pub fn compute_cents_error(computed: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    1200.0 * (computed / target).log2()
}

pub fn compute_cents_errors(computed: &[f64], targets: &[f64]) -> Vec<f64> {
    computed
        .iter()
        .zip(targets)
        .map(|(&f, &t)| compute_cents_error(f, t))
        .collect()
}

/// Largest absolute cents error, signed.
pub fn max_cents_error(cents: &[f64]) -> f64 {
    cents.iter().copied().fold(0.0, |acc, c| if c.abs() > acc.abs() { c } else { acc })
}

/// Read-only configuration shared by every fitness evaluation of a run.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub bar: BarParameters,
    pub material: Material,
    pub targets: Vec<f64>,
    pub num_cuts: usize,
    pub penalty: PenaltyType,
    pub penalty_weight: f64,
    pub num_elements: usize,
    pub f1_priority: f64,
    /// Genes end with a length-adjust value.
    pub length_adjust: bool,
    pub analysis_mode: AnalysisMode,
    pub solid: SolidOptions,
}

impl EvaluationContext {
    /// Context for the search itself, with targets scaled by the frequency offset.
    pub fn from_request(request: &RunRequest) -> Self {
        let scale = 1.0 + request.params.frequency_offset;
        let mut ctx = Self::for_reporting(request);
        ctx.targets.iter_mut().for_each(|t| *t *= scale);
        ctx
    }

    /// Context that compares against the targets as given.
    pub fn for_reporting(request: &RunRequest) -> Self {
        let params = &request.params;
        Self {
            bar: request.bar,
            material: request.material.clone(),
            targets: request.target_frequencies.clone(),
            num_cuts: request.num_cuts,
            penalty: request.penalty,
            penalty_weight: request.penalty_weight,
            num_elements: params.num_elements,
            f1_priority: params.f1_priority,
            length_adjust: params.has_length_adjust(),
            analysis_mode: params.analysis_mode,
            solid: params.solid_options(),
        }
    }

    pub fn length_adjust_of(&self, genes: &[f64]) -> f64 {
        if self.length_adjust {
            genes.get(self.num_cuts * 2).copied().unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Bar after applying the genes' length adjustment.
    pub fn effective_bar(&self, genes: &[f64]) -> BarParameters {
        self.bar.with_length_adjust(self.length_adjust_of(genes))
    }

    pub fn cuts_of(&self, genes: &[f64]) -> Vec<Cut> {
        let end = (self.num_cuts * 2).min(genes.len());
        crate::cuts::genes_to_cuts(&genes[..end])
    }

    /// Lowest `num_modes` frequencies of the geometry, failing if fewer are found.
    ///
    /// The solid model reports vertical bending modes only so both models
    /// answer the same question.
    pub fn compute_frequencies(&self, genes: &[f64], num_modes: usize) -> Result<Vec<f64>> {
        let bar = self.effective_bar(genes);
        let cuts = self.cuts_of(genes);

        let frequencies = match self.analysis_mode {
            AnalysisMode::Beam2d => compute_frequencies_2d(&cuts, &bar, &self.material, self.num_elements, num_modes)?,
            AnalysisMode::Solid3d => {
                bar.validate()?;
                let heights = generate_element_heights(&cuts, bar.length, bar.h0, self.num_elements);
                get_bending_frequencies_3d(&heights, bar.length, bar.width, &self.material, num_modes, &self.solid)?
            }
        };

        if frequencies.len() < num_modes {
            return Err(FemError::InsufficientModes {
                requested: num_modes,
                found: frequencies.len(),
            });
        }
        Ok(frequencies)
    }

    fn penalty_of(&self, cuts: &[Cut], length: f64) -> f64 {
        match self.penalty {
            PenaltyType::None => 0.0,
            PenaltyType::Volume => compute_volume_penalty(cuts, length, self.bar.h0),
            PenaltyType::Roughness => compute_roughness_penalty(cuts, self.bar.h0),
        }
    }

    /// Fitness of one gene vector, or the reason it could not be scored.
    pub fn fitness(&self, genes: &[f64]) -> Result<f64> {
        let computed = self.compute_frequencies(genes, self.targets.len())?;
        let error = compute_tuning_error(&computed, &self.targets, self.f1_priority);

        if self.penalty == PenaltyType::None || self.penalty_weight == 0.0 {
            return Ok(error);
        }
        let bar = self.effective_bar(genes);
        let penalty = self.penalty_of(&self.cuts_of(genes), bar.length);
        Ok(combined_objective(error, penalty, self.penalty_weight))
    }

    /// Scores used in reports: unweighted tuning error, both penalties and cents.
    pub fn evaluate_detailed(&self, genes: &[f64]) -> Result<DetailedEvaluation> {
        let computed = self.compute_frequencies(genes, self.targets.len())?;
        let bar = self.effective_bar(genes);
        let cuts = self.cuts_of(genes);

        let tuning_error = compute_tuning_error(&computed, &self.targets, 1.0);
        let volume_penalty = compute_volume_penalty(&cuts, bar.length, bar.h0);
        let roughness_penalty = compute_roughness_penalty(&cuts, bar.h0);
        let combined_fitness = match self.penalty {
            PenaltyType::Volume if self.penalty_weight > 0.0 => {
                combined_objective(tuning_error, volume_penalty, self.penalty_weight)
            }
            PenaltyType::Roughness if self.penalty_weight > 0.0 => {
                combined_objective(tuning_error, roughness_penalty, self.penalty_weight)
            }
            _ => tuning_error,
        };
        let cents_errors = compute_cents_errors(&computed, &self.targets);

        Ok(DetailedEvaluation {
            max_cents_error: max_cents_error(&cents_errors),
            computed_frequencies: computed,
            target_frequencies: self.targets.clone(),
            tuning_error,
            volume_penalty,
            roughness_penalty,
            combined_fitness,
            cents_errors,
        })
    }
}

/// Fitness with every failure mapped to infinity, so selection discards it.
pub fn evaluate_fitness(genes: &[f64], ctx: &EvaluationContext) -> f64 {
    match ctx.fitness(genes) {
        Ok(fitness) if fitness.is_nan() => f64::INFINITY,
        Ok(fitness) => fitness,
        Err(err) => {
            log::debug!("evaluation failed for {genes:?}: {err}");
            f64::INFINITY
        }
    }
}
