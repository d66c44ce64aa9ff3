//! Parameter, population and result types for the bar tuning optimizer.
//!
//! Everything a run needs is carried by a [`RunRequest`]; it deserializes from
//! camelCase JSON with defaults for any EA parameter that is left out.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cuts::Cut;
use crate::error::{FemError, Result};
use crate::solver::SolidOptions;
use crate::types::EigenSolver;

/// Which finite-element model scores an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisMode {
    /// Timoshenko beam elements. Fast; accurate for slender bars.
    #[default]
    Beam2d,
    /// Hexahedral solid elements, compared on vertical bending modes only.
    Solid3d,
}

/// Isotropic material constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    #[serde(default)]
    pub name: String,
    /// Young's modulus (Pa)
    pub e: f64,
    /// Density (kg/m³)
    pub rho: f64,
    /// Poisson's ratio
    pub nu: f64,
}

impl Material {
    pub fn new(name: impl Into<String>, e: f64, rho: f64, nu: f64) -> Self {
        Self {
            name: name.into(),
            e,
            rho,
            nu,
        }
    }

    /// Sapele, a common marimba wood.
    pub fn sapele() -> Self {
        Self::new("Sapele", 12.0e9, 640.0, 0.35)
    }

    /// Aluminum 6061, the usual vibraphone alloy.
    pub fn aluminum() -> Self {
        Self::new("Aluminum 6061", 68.9e9, 2700.0, 0.33)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.e.is_finite() && self.e > 0.0) {
            return Err(FemError::InvalidInput(format!(
                "{}: Young's modulus must be positive, got {}",
                self.name, self.e
            )));
        }
        if !(self.rho.is_finite() && self.rho > 0.0) {
            return Err(FemError::InvalidInput(format!(
                "{}: density must be positive, got {}",
                self.name, self.rho
            )));
        }
        if !(self.nu > 0.0 && self.nu < 0.5) {
            return Err(FemError::InvalidInput(format!(
                "{}: Poisson's ratio must lie in (0, 0.5), got {}",
                self.name, self.nu
            )));
        }
        Ok(())
    }
}

/// Bar geometry in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarParameters {
    pub length: f64,
    pub width: f64,
    /// Original thickness
    pub h0: f64,
    /// Thinnest allowed remaining thickness, typically 10% of h0
    pub h_min: f64,
}

impl BarParameters {
    pub fn new(length: f64, width: f64, h0: f64, h_min: f64) -> Self {
        Self {
            length,
            width,
            h0,
            h_min,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.length.is_finite() && self.length > 0.0) {
            return Err(FemError::InvalidInput(format!("bar length must be positive, got {}", self.length)));
        }
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(FemError::InvalidInput(format!("bar width must be positive, got {}", self.width)));
        }
        if !(self.h_min > 0.0 && self.h_min <= self.h0 && self.h0.is_finite()) {
            return Err(FemError::InvalidInput(format!(
                "thickness must satisfy 0 < hMin <= h0, got hMin={} h0={}",
                self.h_min, self.h0
            )));
        }
        Ok(())
    }

    /// Same bar with `adjust` trimmed from each end (negative extends it).
    pub fn with_length_adjust(&self, adjust: f64) -> Self {
        Self {
            length: self.length - 2.0 * adjust,
            ..*self
        }
    }
}

/// User limits on cut geometry and length adjustment. Zero disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoundsConstraints {
    /// Minimum spacing between neighbouring cut boundaries (m)
    pub min_cut_width: f64,
    /// Maximum spacing between neighbouring cut boundaries (m)
    pub max_cut_width: f64,
    /// Minimum depth h0 - h (m)
    pub min_cut_depth: f64,
    /// Maximum depth h0 - h (m)
    pub max_cut_depth: f64,
    /// Maximum trim from each end (m)
    pub max_length_trim: f64,
    /// Maximum extension at each end (m)
    pub max_length_extend: f64,
}

/// Search box for every gene, fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableBounds {
    pub lambda_min: f64,
    pub lambda_max: f64,
    pub h_min: f64,
    pub h_max: f64,
    pub min_cut_width: f64,
    pub max_cut_width: f64,
    pub max_length_trim: f64,
    pub max_length_extend: f64,
    /// Genes carry a trailing length-adjust value.
    pub length_adjust: bool,
}

impl VariableBounds {
    pub fn from_bar(bar: &BarParameters, constraints: &BoundsConstraints) -> Self {
        // depth is h0 - h, so a minimum depth caps h from above
        let h_max = if constraints.min_cut_depth > 0.0 {
            bar.h_min.max(bar.h0 - constraints.min_cut_depth)
        } else {
            bar.h0
        };
        let h_min = if constraints.max_cut_depth > 0.0 {
            bar.h_min.max(bar.h0 - constraints.max_cut_depth)
        } else {
            bar.h_min
        };

        Self {
            lambda_min: 0.0,
            lambda_max: bar.length / 2.0,
            h_min,
            h_max,
            min_cut_width: constraints.min_cut_width,
            max_cut_width: constraints.max_cut_width,
            max_length_trim: constraints.max_length_trim,
            max_length_extend: constraints.max_length_extend,
            length_adjust: constraints.max_length_trim > 0.0 || constraints.max_length_extend > 0.0,
        }
    }

    pub fn has_length_adjust(&self) -> bool {
        self.length_adjust
    }

    /// Number of genes for `num_cuts` cuts.
    pub fn num_genes(&self, num_cuts: usize) -> usize {
        num_cuts * 2 + usize::from(self.length_adjust)
    }

    /// Allowed interval of gene `idx`.
    pub fn gene_range(&self, idx: usize, num_cuts: usize) -> (f64, f64) {
        if self.length_adjust && idx == num_cuts * 2 {
            (-self.max_length_extend, self.max_length_trim)
        } else if idx % 2 == 0 {
            (self.lambda_min, self.lambda_max)
        } else {
            (self.h_min, self.h_max)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.lambda_min > self.lambda_max {
            return Err(FemError::InvalidInput(format!(
                "lambda bounds are inverted: [{}, {}]",
                self.lambda_min, self.lambda_max
            )));
        }
        if self.h_min > self.h_max {
            return Err(FemError::InvalidInput(format!(
                "height bounds are inverted: [{}, {}] (check min/max cut depth)",
                self.h_min, self.h_max
            )));
        }
        if self.max_cut_width > 0.0 && self.min_cut_width > self.max_cut_width {
            return Err(FemError::InvalidInput(format!(
                "minimum cut width {} exceeds maximum {}",
                self.min_cut_width, self.max_cut_width
            )));
        }
        if self.min_cut_width < 0.0 || self.max_length_trim < 0.0 || self.max_length_extend < 0.0 {
            return Err(FemError::InvalidInput("cut width and length limits must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// One candidate geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Individual {
    /// `[lambda_1, h_1, ..., lambda_N, h_N, length_adjust?]`
    pub genes: Vec<f64>,
    /// Lower is better; infinite until evaluated.
    pub fitness: f64,
    /// Per-gene step sizes of the self-adaptive variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigmas: Option<Vec<f64>>,
}

impl Individual {
    pub fn new(genes: Vec<f64>) -> Self {
        Self {
            genes,
            fitness: f64::INFINITY,
            sigmas: None,
        }
    }

    pub fn with_fitness(genes: Vec<f64>, fitness: f64) -> Self {
        Self {
            genes,
            fitness,
            sigmas: None,
        }
    }

    pub fn with_sigmas(genes: Vec<f64>, sigmas: Vec<f64>) -> Self {
        Self {
            genes,
            fitness: f64::INFINITY,
            sigmas: Some(sigmas),
        }
    }

    /// Trailing length-adjust gene, or 0 when absent.
    pub fn length_adjust(&self, num_cuts: usize) -> f64 {
        self.genes.get(num_cuts * 2).copied().unwrap_or(0.0)
    }

    /// Cuts encoded by the first `2 * num_cuts` genes.
    pub fn cuts(&self, num_cuts: usize) -> Vec<Cut> {
        let end = (num_cuts * 2).min(self.genes.len());
        crate::cuts::genes_to_cuts(&self.genes[..end])
    }
}

/// Geometric penalty blended into the fitness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyType {
    #[default]
    None,
    /// Share of the half-bar cross-section removed by the cuts.
    Volume,
    /// Mean height jump at the cut edges.
    Roughness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMethod {
    /// Probability proportional to 1 / fitness.
    #[default]
    Roulette,
    Tournament,
    Rank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CrossoverMethod {
    /// `c = p1 + r * (p2 - p1)` with one `r` per pair.
    #[default]
    Heuristic,
    SinglePoint,
    TwoPoint,
    Uniform,
    /// BLX-alpha with alpha = 0.5.
    Blend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationMethod {
    /// `±sigma * range * U(-1, 1)` on a random subset of genes.
    #[default]
    Uniform,
    GaussianAdaptive,
    Polynomial,
}

/// Evolutionary algorithm settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EAParameters {
    pub population_size: usize,
    /// Share of the population copied unchanged (0-100)
    pub elitism_percent: f64,
    /// Share produced by crossover (0-100)
    pub crossover_percent: f64,
    /// Share produced by mutation; mutation fills whatever is left
    pub mutation_percent: f64,
    /// Mutation step as a fraction of each gene's range
    pub mutation_strength: f64,
    pub max_generations: usize,
    /// Stop once the best fitness is at or below this value
    pub target_error: f64,
    /// Elements along the bar
    pub num_elements: usize,
    /// Weight of the fundamental in the tuning error
    pub f1_priority: f64,
    pub min_cut_width: f64,
    pub max_cut_width: f64,
    pub min_cut_depth: f64,
    pub max_cut_depth: f64,
    pub max_length_trim: f64,
    pub max_length_extend: f64,
    /// Worker threads for population evaluation, 0 = all cores
    pub max_cores: usize,
    pub analysis_mode: AnalysisMode,
    /// Solid model: elements across the width
    pub num_elements_y: usize,
    /// Solid model: elements through the thickness
    pub num_elements_z: usize,
    pub eigen_solver: EigenSolver,
    /// Targets are scaled by `1 + frequency_offset` during the search
    pub frequency_offset: f64,
    pub selection: SelectionMethod,
    pub crossover: CrossoverMethod,
    pub mutation: MutationMethod,
}

impl Default for EAParameters {
    fn default() -> Self {
        Self {
            population_size: 50,
            elitism_percent: 10.0,
            crossover_percent: 30.0,
            mutation_percent: 60.0,
            mutation_strength: 0.1,
            max_generations: 100,
            target_error: 0.01,
            num_elements: 150,
            f1_priority: 1.0,
            min_cut_width: 0.0,
            max_cut_width: 0.0,
            min_cut_depth: 0.0,
            max_cut_depth: 0.0,
            max_length_trim: 0.0,
            max_length_extend: 0.0,
            max_cores: 0,
            analysis_mode: AnalysisMode::Beam2d,
            num_elements_y: 2,
            num_elements_z: 2,
            eigen_solver: EigenSolver::Auto,
            frequency_offset: 0.0,
            selection: SelectionMethod::Roulette,
            crossover: CrossoverMethod::Heuristic,
            mutation: MutationMethod::Uniform,
        }
    }
}

impl EAParameters {
    /// Defaults with a population of `max(30, 10 * num_cuts)`.
    pub fn for_num_cuts(num_cuts: usize) -> Self {
        Self {
            population_size: 30.max(num_cuts * 10),
            ..Default::default()
        }
    }

    pub fn bounds_constraints(&self) -> BoundsConstraints {
        BoundsConstraints {
            min_cut_width: self.min_cut_width,
            max_cut_width: self.max_cut_width,
            min_cut_depth: self.min_cut_depth,
            max_cut_depth: self.max_cut_depth,
            max_length_trim: self.max_length_trim,
            max_length_extend: self.max_length_extend,
        }
    }

    pub fn has_length_adjust(&self) -> bool {
        self.max_length_trim > 0.0 || self.max_length_extend > 0.0
    }

    pub fn solid_options(&self) -> SolidOptions {
        SolidOptions {
            ny: self.num_elements_y,
            nz: self.num_elements_z,
            solver: self.eigen_solver,
        }
    }

    /// At least one elite survives each generation.
    pub fn num_elite(&self) -> usize {
        ((self.population_size as f64 * self.elitism_percent / 100.0).floor() as usize).max(1)
    }

    pub fn num_crossover(&self) -> usize {
        (self.population_size as f64 * self.crossover_percent / 100.0).floor() as usize
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FemError::InvalidInput(msg));

        if self.population_size < 2 {
            return invalid(format!("population size must be at least 2, got {}", self.population_size));
        }
        for (name, pct) in [
            ("elitism", self.elitism_percent),
            ("crossover", self.crossover_percent),
            ("mutation", self.mutation_percent),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return invalid(format!("{name} percentage must lie in [0, 100], got {pct}"));
            }
        }
        if self.elitism_percent + self.crossover_percent > 100.0 {
            return invalid("elitism and crossover percentages exceed 100".to_string());
        }
        if !(self.mutation_strength >= 0.0) {
            return invalid(format!("mutation strength must be non-negative, got {}", self.mutation_strength));
        }
        if self.num_elements == 0 {
            return invalid("number of elements must be positive".to_string());
        }
        if !(self.f1_priority >= 1.0) {
            return invalid(format!("f1 priority must be at least 1, got {}", self.f1_priority));
        }
        for (name, value) in [
            ("min cut width", self.min_cut_width),
            ("max cut width", self.max_cut_width),
            ("min cut depth", self.min_cut_depth),
            ("max cut depth", self.max_cut_depth),
            ("max length trim", self.max_length_trim),
            ("max length extend", self.max_length_extend),
        ] {
            if !(value >= 0.0) {
                return invalid(format!("{name} must be non-negative, got {value}"));
            }
        }
        if self.max_cut_depth > 0.0 && self.min_cut_depth > self.max_cut_depth {
            return invalid(format!(
                "min cut depth {} exceeds max cut depth {}",
                self.min_cut_depth, self.max_cut_depth
            ));
        }
        if self.num_elements_y == 0 || self.num_elements_z == 0 {
            return invalid("solid mesh needs at least one element across width and thickness".to_string());
        }
        if !(self.frequency_offset > -1.0) {
            return invalid(format!("frequency offset must exceed -1, got {}", self.frequency_offset));
        }
        Ok(())
    }
}

/// Everything needed to start an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub bar: BarParameters,
    pub material: Material,
    /// Target frequencies in Hz, fundamental first
    pub target_frequencies: Vec<f64>,
    pub num_cuts: usize,
    #[serde(default)]
    pub penalty: PenaltyType,
    /// Weight alpha of the penalty, 0-1
    #[serde(default)]
    pub penalty_weight: f64,
    #[serde(default)]
    pub params: EAParameters,
    /// Starting geometry; the rest of the population is random.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_genes: Option<Vec<f64>>,
}

impl RunRequest {
    pub fn new(bar: BarParameters, material: Material, target_frequencies: Vec<f64>, num_cuts: usize) -> Self {
        Self {
            bar,
            material,
            target_frequencies,
            num_cuts,
            penalty: PenaltyType::None,
            penalty_weight: 0.0,
            params: EAParameters::for_num_cuts(num_cuts),
            seed_genes: None,
        }
    }

    pub fn with_params(mut self, params: EAParameters) -> Self {
        self.params = params;
        self
    }

    pub fn with_penalty(mut self, penalty: PenaltyType, weight: f64) -> Self {
        self.penalty = penalty;
        self.penalty_weight = weight;
        self
    }

    pub fn with_seed(mut self, seed_genes: Vec<f64>) -> Self {
        self.seed_genes = Some(seed_genes);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn bounds(&self) -> VariableBounds {
        VariableBounds::from_bar(&self.bar, &self.params.bounds_constraints())
    }

    /// Check the whole request before any work starts.
    pub fn validate(&self) -> Result<()> {
        self.bar.validate()?;
        self.material.validate()?;
        self.params.validate()?;
        self.bounds().validate()?;

        if self.target_frequencies.is_empty() {
            return Err(FemError::InvalidInput("at least one target frequency is required".to_string()));
        }
        if let Some(f) = self.target_frequencies.iter().find(|f| !(f.is_finite() && **f > 0.0)) {
            return Err(FemError::InvalidInput(format!("target frequencies must be positive, got {f}")));
        }
        if !(0.0..=1.0).contains(&self.penalty_weight) {
            return Err(FemError::InvalidInput(format!(
                "penalty weight must lie in [0, 1], got {}",
                self.penalty_weight
            )));
        }
        if let Some(seed) = &self.seed_genes {
            let cut_genes = self.num_cuts * 2;
            if seed.len() != cut_genes && seed.len() != cut_genes + 1 {
                return Err(FemError::InvalidInput(format!(
                    "seed has {} genes, expected {} or {} for {} cuts",
                    seed.len(),
                    cut_genes,
                    cut_genes + 1,
                    self.num_cuts
                )));
            }
            if seed.iter().any(|g| !g.is_finite()) {
                return Err(FemError::InvalidInput("seed genes must be finite".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationStats {
    pub best_fitness: f64,
    pub worst_fitness: f64,
    pub average_fitness: f64,
    pub median_fitness: f64,
    pub standard_deviation: f64,
}

/// Full breakdown of one geometry's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedEvaluation {
    pub computed_frequencies: Vec<f64>,
    pub target_frequencies: Vec<f64>,
    pub tuning_error: f64,
    pub volume_penalty: f64,
    pub roughness_penalty: f64,
    pub combined_fitness: f64,
    pub cents_errors: Vec<f64>,
    pub max_cents_error: f64,
}

/// Snapshot sent to the observer after the baseline and after every generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub generation: usize,
    pub best_fitness: f64,
    pub best_individual: Individual,
    pub average_fitness: f64,
    /// `None` when the best geometry could not be re-solved.
    pub computed_frequencies: Option<Vec<f64>>,
    pub errors_in_cents: Option<Vec<f64>>,
    pub length_trim: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub best_individual: Individual,
    /// Cuts of the best individual, outermost first
    pub cuts: Vec<Cut>,
    pub computed_frequencies: Vec<f64>,
    pub target_frequencies: Vec<f64>,
    pub tuning_error: f64,
    pub max_error_cents: f64,
    pub errors_in_cents: Vec<f64>,
    pub volume_percent: f64,
    pub roughness_percent: f64,
    pub generations: usize,
    pub length_trim: f64,
    pub effective_length: f64,
}

impl OptimizationResult {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization finished after {} generations", self.generations)?;
        writeln!(
            f,
            "  tuning error {:.4}% (worst mode {:+.1} cents)",
            self.tuning_error, self.max_error_cents
        )?;
        writeln!(
            f,
            "  volume removed {:.1}%, roughness {:.1}%",
            self.volume_percent, self.roughness_percent
        )?;
        if self.length_trim != 0.0 {
            writeln!(
                f,
                "  length trim {:.2} mm per end, effective length {:.1} mm",
                self.length_trim * 1000.0,
                self.effective_length * 1000.0
            )?;
        }

        writeln!(f, "  mode  computed (Hz)  target (Hz)   cents")?;
        for (i, (computed, target)) in self.computed_frequencies.iter().zip(&self.target_frequencies).enumerate() {
            let cents = self.errors_in_cents.get(i).copied().unwrap_or(0.0);
            writeln!(f, "  f{:<4}{:>13.2}{:>13.2}{:>+8.1}", i + 1, computed, target, cents)?;
        }

        writeln!(f, "  cuts (outermost first):")?;
        for (i, cut) in self.cuts.iter().enumerate() {
            writeln!(
                f,
                "    #{}: lambda {:.2} mm, h {:.2} mm",
                i + 1,
                cut.lambda * 1000.0,
                cut.h * 1000.0
            )?;
        }
        Ok(())
    }
}
