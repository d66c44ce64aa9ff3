//! Evolutionary search for undercut geometries.
//!
//! Each generation keeps an elite, breeds children from roulette-selected
//! pairs and fills the rest of the population with mutants. The uncut bar is
//! scored before the search starts, reported as generation 0 and seeds the
//! best-ever individual.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{FemError, Result};

use super::crossover::perform_crossover;
use super::evaluator::{evaluate_population, BatchEvaluator, CpuEvaluator};
use super::mutation::{
    adaptive_length_mutation, gaussian_self_adaptive_mutation, perform_mutation, FrequencyError, INITIAL_SIGMA,
};
use super::objective::{compute_cents_errors, EvaluationContext};
use super::population::{
    calculate_population_stats, create_uncut_bar_individual, get_best_individual, initialize_population,
    sorted_by_fitness,
};
use super::selection::{select_elite, select_mating_pairs};
use super::types::{Individual, MutationMethod, OptimizationResult, ProgressUpdate, RunRequest, VariableBounds};

/// Chance that the length gene moves toward fixing the fundamental.
const LENGTH_BIAS: f64 = 0.7;

/// Receives progress reports and may cancel a run.
pub trait ProgressObserver {
    /// Called after the baseline (generation 0) and after every generation.
    fn on_progress(&mut self, update: &ProgressUpdate);

    /// Polled at the start of every generation.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _update: &ProgressUpdate) {}
}

fn never_stop() -> bool {
    false
}

/// Adapts a progress closure, and optionally a stop predicate, to [`ProgressObserver`].
pub struct ClosureObserver<F, S = fn() -> bool> {
    progress: F,
    stop: S,
}

impl<F: FnMut(&ProgressUpdate)> ClosureObserver<F> {
    pub fn new(progress: F) -> Self {
        Self {
            progress,
            stop: never_stop,
        }
    }
}

impl<F, S> ClosureObserver<F, S> {
    pub fn with_stop<S2: Fn() -> bool>(self, stop: S2) -> ClosureObserver<F, S2> {
        ClosureObserver {
            progress: self.progress,
            stop,
        }
    }
}

impl<F: FnMut(&ProgressUpdate), S: Fn() -> bool> ProgressObserver for ClosureObserver<F, S> {
    fn on_progress(&mut self, update: &ProgressUpdate) {
        (self.progress)(update)
    }

    fn should_stop(&self) -> bool {
        (self.stop)()
    }
}

/// State shared by both loop variants.
struct Search<'a, E: BatchEvaluator + ?Sized> {
    request: &'a RunRequest,
    ctx: EvaluationContext,
    bounds: VariableBounds,
    evaluator: &'a E,
    tag: &'static str,
}

impl<'a, E: BatchEvaluator + ?Sized> Search<'a, E> {
    fn new(request: &'a RunRequest, evaluator: &'a E, tag: &'static str) -> Result<Self> {
        request.validate()?;
        let bounds = request.bounds();
        bounds.validate()?;
        Ok(Self {
            request,
            ctx: EvaluationContext::from_request(request),
            bounds,
            evaluator,
            tag,
        })
    }

    fn num_cuts(&self) -> usize {
        self.request.num_cuts
    }

    fn snapshot(&self, generation: usize, best: &Individual, average_fitness: f64) -> ProgressUpdate {
        let computed = self.ctx.compute_frequencies(&best.genes, self.ctx.targets.len()).ok();
        let errors_in_cents = computed.as_ref().map(|f| compute_cents_errors(f, &self.ctx.targets));
        ProgressUpdate {
            generation,
            best_fitness: best.fitness,
            best_individual: best.clone(),
            average_fitness,
            computed_frequencies: computed,
            errors_in_cents,
            length_trim: self.ctx.length_adjust_of(&best.genes),
        }
    }

    /// Scores the uncut bar and reports it as generation 0.
    fn baseline(&self, observer: &mut dyn ProgressObserver) -> Individual {
        let uncut = create_uncut_bar_individual(self.num_cuts(), &self.bounds, self.request.bar.h0);
        let uncut = evaluate_population(self.evaluator, vec![uncut]).pop().unwrap_or_else(|| {
            Individual::new(vec![0.0; self.bounds.num_genes(self.num_cuts())])
        });
        log::info!("[{}] Uncut bar baseline fitness: {:.4}", self.tag, uncut.fitness);

        observer.on_progress(&self.snapshot(0, &uncut, uncut.fitness));
        uncut
    }

    fn stop_reason(&self, best_ever: &Individual, observer: &dyn ProgressObserver) -> Option<&'static str> {
        if observer.should_stop() {
            Some("stopped by observer")
        } else if best_ever.fitness <= self.request.params.target_error {
            Some("target error reached")
        } else {
            None
        }
    }

    fn finish_generation(
        &self,
        generation: usize,
        population: &[Individual],
        best_ever: &mut Individual,
        observer: &mut dyn ProgressObserver,
    ) {
        if let Some(best) = get_best_individual(population) {
            if best.fitness < best_ever.fitness {
                *best_ever = best.clone();
            }
        }

        let stats = calculate_population_stats(population);
        log::info!(
            "[{}] Generation {}/{} | Population: {} | Best: {:.4} | Avg: {:.4}",
            self.tag,
            generation,
            self.request.params.max_generations,
            population.len(),
            best_ever.fitness,
            stats.average_fitness
        );
        observer.on_progress(&self.snapshot(generation, best_ever, stats.average_fitness));
    }

    /// Detailed scores of the best geometry against the targets as given.
    fn result(&self, best_ever: Individual, generations: usize) -> Result<OptimizationResult> {
        if !best_ever.fitness.is_finite() {
            return Err(FemError::EigenSolver("no geometry could be evaluated".to_string()));
        }

        let report = EvaluationContext::for_reporting(self.request);
        let detailed = report.evaluate_detailed(&best_ever.genes)?;
        let length_trim = report.length_adjust_of(&best_ever.genes);

        Ok(OptimizationResult {
            cuts: report.cuts_of(&best_ever.genes),
            effective_length: report.effective_bar(&best_ever.genes).length,
            best_individual: best_ever,
            computed_frequencies: detailed.computed_frequencies,
            target_frequencies: detailed.target_frequencies,
            tuning_error: detailed.tuning_error,
            max_error_cents: detailed.max_cents_error,
            errors_in_cents: detailed.cents_errors,
            volume_percent: detailed.volume_penalty,
            roughness_percent: detailed.roughness_penalty,
            generations,
            length_trim,
        })
    }

    /// The parent's fundamental error, used to steer the length gene.
    fn f1_error(&self, parent: &Individual) -> Option<FrequencyError> {
        let f1 = self.ctx.compute_frequencies(&parent.genes, 1).ok()?;
        Some(FrequencyError {
            f1_error: f1[0] - self.ctx.targets[0],
        })
    }
}

fn log_start(tag: &str, request: &RunRequest) {
    let params = &request.params;
    log::info!("[{tag}] Starting optimization");
    log::info!(
        "[{tag}] Population size: {}, Max generations: {}, cuts: {}",
        params.population_size,
        params.max_generations,
        request.num_cuts
    );
}

/// Runs the evolutionary search with the CPU evaluator.
pub fn run_evolution<R: Rng + ?Sized>(
    request: &RunRequest,
    rng: &mut R,
    observer: &mut dyn ProgressObserver,
) -> Result<OptimizationResult> {
    request.validate()?;
    let evaluator = CpuEvaluator::new(EvaluationContext::from_request(request), request.params.max_cores)?;
    run_evolution_with_evaluator(request, &evaluator, rng, observer)
}

/// Runs the search with a fixed seed and no observer.
pub fn run_evolution_with_seed(request: &RunRequest, seed: u64) -> Result<OptimizationResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    run_evolution(request, &mut rng, &mut NoProgress)
}

/// Runs the evolutionary search, scoring every batch with `evaluator`.
pub fn run_evolution_with_evaluator<E: BatchEvaluator + ?Sized, R: Rng + ?Sized>(
    request: &RunRequest,
    evaluator: &E,
    rng: &mut R,
    observer: &mut dyn ProgressObserver,
) -> Result<OptimizationResult> {
    let search = Search::new(request, evaluator, "EA")?;
    let params = &request.params;
    let num_cuts = request.num_cuts;
    let pop_size = params.population_size;
    log_start(search.tag, request);

    let mut best_ever = search.baseline(observer);

    let population = initialize_population(pop_size, num_cuts, &search.bounds, request.seed_genes.as_deref(), rng);
    let mut population = evaluate_population(evaluator, population);
    if let Some(best) = get_best_individual(&population) {
        if best.fitness < best_ever.fitness {
            best_ever = best.clone();
        }
    }

    let num_elite = params.num_elite();
    let num_crossover = params.num_crossover();
    let num_pairs = (num_crossover + 1) / 2;
    let steer_length = search.bounds.has_length_adjust() && params.mutation == MutationMethod::Uniform;

    let mut generation = 0;
    while generation < params.max_generations {
        if let Some(reason) = search.stop_reason(&best_ever, observer) {
            log::info!("[{}] {reason} after {generation} generations", search.tag);
            break;
        }

        let mut next = select_elite(&population, num_elite);
        let mut offspring = Vec::with_capacity(pop_size.saturating_sub(next.len()));

        if num_crossover > 0 {
            for (p1, p2) in select_mating_pairs(&population, num_pairs, params.selection, rng) {
                let (c1, c2) = perform_crossover(&p1, &p2, &search.bounds, num_cuts, params.crossover, rng);
                offspring.push(c1);
                if next.len() + offspring.len() < pop_size {
                    offspring.push(c2);
                }
            }
        }

        // mutants come from the upper-middle of the ranking
        let sorted = sorted_by_fitness(&population);
        let mut steering: Option<(usize, Option<FrequencyError>)> = None;
        while !sorted.is_empty() && next.len() + offspring.len() < pop_size {
            let share = ((num_elite + num_crossover) as f64 / pop_size as f64).min(0.5);
            let depth = 1.0 + 0.5 * (1.0 - next.len() as f64 / pop_size as f64);
            let idx = ((sorted.len() as f64 * share * depth).floor() as usize).min(sorted.len() - 1);
            let parent = &sorted[idx];

            let mutant = if steer_length {
                let freq_error = match steering {
                    Some((cached, err)) if cached == idx => err,
                    _ => {
                        let err = search.f1_error(parent);
                        steering = Some((idx, err));
                        err
                    }
                };
                adaptive_length_mutation(
                    parent,
                    params.mutation_strength,
                    &search.bounds,
                    num_cuts,
                    freq_error,
                    LENGTH_BIAS,
                    rng,
                )
            } else {
                perform_mutation(parent, &search.bounds, num_cuts, params.mutation, params.mutation_strength, rng)
            };
            offspring.push(mutant);
        }

        next.extend(evaluate_population(evaluator, offspring));
        population = next;
        generation += 1;
        search.finish_generation(generation, &population, &mut best_ever, observer);
    }

    if generation == params.max_generations {
        log::info!("[{}] generation limit reached", search.tag);
    }
    search.result(best_ever, generation)
}

/// Self-adaptive variant: elitism plus Gaussian mutation with per-gene step
/// sizes, no crossover.
pub fn run_adaptive_evolution<R: Rng + ?Sized>(
    request: &RunRequest,
    rng: &mut R,
    observer: &mut dyn ProgressObserver,
) -> Result<OptimizationResult> {
    request.validate()?;
    let evaluator = CpuEvaluator::new(EvaluationContext::from_request(request), request.params.max_cores)?;
    let search = Search::new(request, &evaluator, "EA-Adaptive")?;
    let params = &request.params;
    let num_cuts = request.num_cuts;
    let pop_size = params.population_size;
    log_start(search.tag, request);

    let mut best_ever = search.baseline(observer);

    let num_genes = search.bounds.num_genes(num_cuts);
    let mut population =
        initialize_population(pop_size, num_cuts, &search.bounds, request.seed_genes.as_deref(), rng);
    for ind in &mut population {
        ind.sigmas = Some(vec![INITIAL_SIGMA; num_genes]);
    }
    let mut population = evaluate_population(&evaluator, population);
    if let Some(best) = get_best_individual(&population) {
        if best.fitness < best_ever.fitness {
            best_ever = best.clone();
        }
    }

    let num_elite = params.num_elite();
    let mut generation = 0;
    while generation < params.max_generations {
        if let Some(reason) = search.stop_reason(&best_ever, observer) {
            log::info!("[{}] {reason} after {generation} generations", search.tag);
            break;
        }

        let next_elite = select_elite(&population, num_elite);
        let sorted = sorted_by_fitness(&population);
        let mut offspring = Vec::with_capacity(pop_size.saturating_sub(next_elite.len()));

        while !sorted.is_empty() && next_elite.len() + offspring.len() < pop_size {
            let depth = 0.5 * (1.0 - offspring.len() as f64 / pop_size as f64);
            let idx = ((sorted.len() as f64 * depth).floor() as usize).min(sorted.len() - 1);
            offspring.push(gaussian_self_adaptive_mutation(
                &sorted[idx],
                params.mutation_strength,
                &search.bounds,
                num_cuts,
                rng,
            ));
        }

        let mut next = next_elite;
        next.extend(evaluate_population(&evaluator, offspring));
        population = next;
        generation += 1;
        search.finish_generation(generation, &population, &mut best_ever, observer);
    }

    search.result(best_ever, generation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::types::{BarParameters, EAParameters, Material};
    use std::cell::Cell;

    fn quick_request() -> RunRequest {
        let mut params = EAParameters::for_num_cuts(1);
        params.population_size = 8;
        params.max_generations = 3;
        params.num_elements = 40;
        params.target_error = 0.0;
        params.max_cores = 1;

        RunRequest::new(
            BarParameters::new(0.3, 0.03, 0.02, 0.002),
            Material::new("Steel", 2.0e11, 7850.0, 0.3),
            vec![300.0, 1900.0],
            1,
        )
        .with_params(params)
    }

    #[test]
    fn reports_baseline_then_every_generation() {
        let request = quick_request();
        let mut generations = Vec::new();
        let mut observer = ClosureObserver::new(|u: &ProgressUpdate| generations.push(u.generation));

        let mut rng = StdRng::seed_from_u64(1);
        let result = run_evolution(&request, &mut rng, &mut observer).unwrap();

        assert_eq!(result.generations, 3);
        assert_eq!(generations, vec![0, 1, 2, 3]);
        assert_eq!(result.computed_frequencies.len(), 2);
        assert_eq!(result.cuts.len(), 1);
    }

    #[test]
    fn best_fitness_never_increases() {
        let request = quick_request();
        let mut history = Vec::new();
        let mut observer = ClosureObserver::new(|u: &ProgressUpdate| history.push(u.best_fitness));

        let mut rng = StdRng::seed_from_u64(2);
        run_evolution(&request, &mut rng, &mut observer).unwrap();

        assert!(history.windows(2).all(|w| w[1] <= w[0]), "{history:?}");
    }

    #[test]
    fn observer_can_cancel() {
        let request = quick_request();
        let calls = Cell::new(0);
        let mut observer = ClosureObserver::new(|_: &ProgressUpdate| calls.set(calls.get() + 1)).with_stop(|| true);

        let mut rng = StdRng::seed_from_u64(3);
        let result = run_evolution(&request, &mut rng, &mut observer).unwrap();

        assert_eq!(result.generations, 0);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn same_seed_same_result() {
        let request = quick_request();
        let a = run_evolution_with_seed(&request, 42).unwrap();
        let b = run_evolution_with_seed(&request, 42).unwrap();
        assert_eq!(a.best_individual.genes, b.best_individual.genes);
    }

    #[test]
    fn invalid_request_fails_before_searching() {
        let mut request = quick_request();
        request.target_frequencies.clear();
        assert!(run_evolution_with_seed(&request, 0).is_err());
    }

    #[test]
    fn adaptive_variant_carries_step_sizes() {
        let request = quick_request();
        let mut rng = StdRng::seed_from_u64(4);
        let result = run_adaptive_evolution(&request, &mut rng, &mut NoProgress).unwrap();

        assert_eq!(result.generations, 3);
        assert!(result.tuning_error.is_finite());
    }

    #[test]
    fn length_gene_is_reported() {
        let mut request = quick_request();
        request.params.max_length_trim = 0.01;
        request.params.max_length_extend = 0.01;

        let result = run_evolution_with_seed(&request, 5).unwrap();
        assert_eq!(result.best_individual.genes.len(), 3);
        assert!((result.effective_length - (0.3 - 2.0 * result.length_trim)).abs() < 1e-12);
        assert!(result.length_trim.abs() <= 0.01 + 1e-12);
    }
}
