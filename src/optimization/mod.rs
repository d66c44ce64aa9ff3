//! Evolutionary optimization of undercut geometries.
//!
//! # Example
//!
//! ```no_run
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use undercut_fem::optimization::{
//!     run_evolution, BarParameters, ClosureObserver, EAParameters, Material, ProgressUpdate, RunRequest,
//! };
//!
//! let mut params = EAParameters::for_num_cuts(2);
//! params.max_generations = 50;
//!
//! let request = RunRequest::new(
//!     BarParameters::new(0.5, 0.03, 0.024, 0.01),
//!     Material::sapele(),
//!     vec![350.0, 1400.0, 3500.0],
//!     2,
//! )
//! .with_params(params);
//!
//! let mut observer = ClosureObserver::new(|u: &ProgressUpdate| println!("{}: {:.4}", u.generation, u.best_fitness));
//! let mut rng = StdRng::seed_from_u64(1);
//! let result = run_evolution(&request, &mut rng, &mut observer)?;
//!
//! for cut in &result.cuts {
//!     println!("lambda {:.4} m, h {:.4} m", cut.lambda, cut.h);
//! }
//! # Ok::<(), undercut_fem::FemError>(())
//! ```

pub mod algorithm;
pub mod crossover;
pub mod evaluator;
pub mod materials;
pub mod mutation;
pub mod objective;
pub mod population;
pub mod selection;
pub mod types;

pub use algorithm::{
    run_adaptive_evolution, run_evolution, run_evolution_with_evaluator, run_evolution_with_seed, ClosureObserver,
    NoProgress, ProgressObserver,
};
pub use crossover::perform_crossover;
pub use evaluator::{evaluate_population, BatchEvaluator, CpuEvaluator};
pub use materials::{get_material, MaterialCategory};
pub use mutation::{perform_mutation, FrequencyError};
pub use objective::{
    compute_cents_error, compute_cents_errors, compute_max_tuning_error, compute_roughness_penalty,
    compute_tuning_error, compute_volume_penalty, evaluate_fitness, EvaluationContext,
};
pub use population::{clamp_to_bounds, initialize_population};
pub use selection::{select_elite, select_mating_pairs, select_parents};
pub use types::{
    AnalysisMode, BarParameters, BoundsConstraints, CrossoverMethod, DetailedEvaluation, EAParameters,
    Individual, Material, MutationMethod, OptimizationResult, PenaltyType, PopulationStats, ProgressUpdate,
    RunRequest, SelectionMethod, VariableBounds,
};
