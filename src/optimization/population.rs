//! Population creation, clamping and statistics.

use std::cmp::Ordering;

use rand::Rng;

use super::types::{Individual, PopulationStats, VariableBounds};

fn by_fitness(a: &Individual, b: &Individual) -> Ordering {
    a.fitness.partial_cmp(&b.fitness).unwrap_or(Ordering::Equal)
}

/// Random individual inside `bounds`, with lambdas drawn outside-in so the
/// spacing limits can be met.
pub fn create_random_individual<R: Rng + ?Sized>(num_cuts: usize, bounds: &VariableBounds, rng: &mut R) -> Individual {
    let min_width = bounds.min_cut_width;
    let max_width = bounds.max_cut_width;
    let mut lambdas: Vec<f64> = Vec::with_capacity(num_cuts);

    if num_cuts == 1 {
        let mut lambda = rng.gen_range(bounds.lambda_min..=bounds.lambda_max);
        if max_width > 0.0 {
            lambda = lambda.min(max_width);
        }
        lambdas.push(lambda);
    } else {
        let mut upper = bounds.lambda_max;
        for i in 0..num_cuts {
            // leave room for the cuts still to come
            let reserved = (num_cuts - i - 1) as f64 * min_width;
            let mut lo = bounds.lambda_min + reserved;
            if max_width > 0.0 {
                if let Some(&outer) = lambdas.last() {
                    lo = lo.max(outer - max_width);
                }
            }
            let hi = (upper - reserved).max(lo);

            let lambda = lo + rng.gen::<f64>() * (hi - lo);
            lambdas.push(lambda);
            upper = lambda - min_width;
        }
    }
    lambdas.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let mut genes = Vec::with_capacity(bounds.num_genes(num_cuts));
    for lambda in lambdas {
        genes.push(lambda);
        genes.push(bounds.h_min + rng.gen::<f64>() * (bounds.h_max - bounds.h_min));
    }
    if bounds.has_length_adjust() {
        genes.push(rng.gen_range(-bounds.max_length_extend..=bounds.max_length_trim));
    }

    Individual::new(genes)
}

/// The bar as supplied: every cut has zero extent and full height.
pub fn create_uncut_bar_individual(num_cuts: usize, bounds: &VariableBounds, h0: f64) -> Individual {
    let mut genes: Vec<f64> = (0..num_cuts).flat_map(|_| [0.0, h0]).collect();
    if bounds.has_length_adjust() {
        genes.push(0.0);
    }
    Individual::new(genes)
}

/// Pad or drop the length-adjust gene so `genes` fits the run's layout.
pub fn fit_gene_layout(genes: &[f64], bounds: &VariableBounds, num_cuts: usize) -> Vec<f64> {
    let mut fitted = genes.to_vec();
    fitted.resize(bounds.num_genes(num_cuts), 0.0);
    fitted
}

/// Initial population, optionally seeded.
///
/// A seed contributes itself plus up to `min(0.2 * size, 10)` variants with
/// every gene scaled by a factor in `[0.95, 1.05)`. Random individuals fill the rest.
pub fn initialize_population<R: Rng + ?Sized>(
    population_size: usize,
    num_cuts: usize,
    bounds: &VariableBounds,
    seed_genes: Option<&[f64]>,
    rng: &mut R,
) -> Vec<Individual> {
    let mut population = Vec::with_capacity(population_size);

    if let Some(seed) = seed_genes.filter(|s| !s.is_empty()) {
        let seed = fit_gene_layout(seed, bounds, num_cuts);
        population.push(Individual::new(clamp_to_bounds(&seed, bounds, num_cuts)));

        let num_variants = (population_size as f64 * 0.2).min(10.0) as usize;
        for _ in 0..num_variants {
            if population.len() >= population_size {
                break;
            }
            let variant: Vec<f64> = seed.iter().map(|&g| g * (0.95 + rng.gen::<f64>() * 0.1)).collect();
            population.push(Individual::new(clamp_to_bounds(&variant, bounds, num_cuts)));
        }
        log::debug!("seeded population with {} individuals", population.len());
    }

    while population.len() < population_size {
        population.push(create_random_individual(num_cuts, bounds, rng));
    }
    population
}

pub fn get_best_individual(population: &[Individual]) -> Option<&Individual> {
    population.iter().min_by(|a, b| by_fitness(a, b))
}

/// Population sorted best first.
pub fn sorted_by_fitness(population: &[Individual]) -> Vec<Individual> {
    let mut sorted = population.to_vec();
    sorted.sort_by(by_fitness);
    sorted
}

/// Statistics over the finite fitness values; all infinite when none are finite.
pub fn calculate_population_stats(population: &[Individual]) -> PopulationStats {
    let mut fitnesses: Vec<f64> = population
        .iter()
        .map(|ind| ind.fitness)
        .filter(|f| f.is_finite())
        .collect();

    if fitnesses.is_empty() {
        return PopulationStats {
            best_fitness: f64::INFINITY,
            worst_fitness: f64::INFINITY,
            average_fitness: f64::INFINITY,
            median_fitness: f64::INFINITY,
            standard_deviation: 0.0,
        };
    }
    fitnesses.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let n = fitnesses.len();
    let average = fitnesses.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        0.5 * (fitnesses[n / 2 - 1] + fitnesses[n / 2])
    } else {
        fitnesses[n / 2]
    };
    let variance = fitnesses.iter().map(|f| (f - average).powi(2)).sum::<f64>() / n as f64;

    PopulationStats {
        best_fitness: fitnesses[0],
        worst_fitness: fitnesses[n - 1],
        average_fitness: average,
        median_fitness: median,
        standard_deviation: variance.sqrt(),
    }
}

/// Clamp every gene into its range, then re-impose cut spacing outside-in.
///
/// Only lambda values move in the spacing pass; each stays at its own gene
/// index. Idempotent.
pub fn clamp_to_bounds(genes: &[f64], bounds: &VariableBounds, num_cuts: usize) -> Vec<f64> {
    let mut clamped: Vec<f64> = genes
        .iter()
        .enumerate()
        .map(|(i, &g)| {
            let (lo, hi) = bounds.gene_range(i, num_cuts);
            if i < num_cuts * 2 || bounds.has_length_adjust() {
                g.clamp(lo, hi)
            } else {
                g
            }
        })
        .collect();

    let min_width = bounds.min_cut_width;
    let max_width = bounds.max_cut_width;
    if min_width <= 0.0 && max_width <= 0.0 {
        return clamped;
    }

    let mut lambdas: Vec<(usize, f64)> = (0..num_cuts)
        .map(|c| 2 * c)
        .filter(|&idx| idx < clamped.len())
        .map(|idx| (idx, clamped[idx]))
        .collect();
    lambdas.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    for i in 1..lambdas.len() {
        let outer = lambdas[i - 1].1;
        let mut inner = lambdas[i].1;

        if min_width > 0.0 && inner > outer - min_width {
            inner = bounds.lambda_min.max(outer - min_width);
        }
        if max_width > 0.0 && inner < outer - max_width {
            inner = bounds.lambda_min.max(outer - max_width);
        }
        lambdas[i].1 = inner;
    }

    for (idx, lambda) in lambdas {
        clamped[idx] = lambda;
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::types::{BarParameters, BoundsConstraints};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bounds_with(constraints: BoundsConstraints) -> VariableBounds {
        VariableBounds::from_bar(&BarParameters::new(0.5, 0.03, 0.024, 0.01), &constraints)
    }

    fn test_bounds() -> VariableBounds {
        bounds_with(BoundsConstraints::default())
    }

    #[test]
    fn random_individuals_respect_bounds() {
        let bounds = test_bounds();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..100 {
            let ind = create_random_individual(3, &bounds, &mut rng);
            assert_eq!(ind.genes.len(), 6);
            for (i, &g) in ind.genes.iter().enumerate() {
                let (lo, hi) = bounds.gene_range(i, 3);
                assert!(g >= lo && g <= hi, "gene {i} = {g} outside [{lo}, {hi}]");
            }
            assert!(ind.genes[0] >= ind.genes[2] && ind.genes[2] >= ind.genes[4]);
        }
    }

    #[test]
    fn random_individuals_keep_min_spacing() {
        let bounds = bounds_with(BoundsConstraints {
            min_cut_width: 0.02,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..50 {
            let ind = create_random_individual(3, &bounds, &mut rng);
            assert!(ind.genes[0] - ind.genes[2] >= 0.02 - 1e-12);
            assert!(ind.genes[2] - ind.genes[4] >= 0.02 - 1e-12);
        }
    }

    #[test]
    fn uncut_bar_has_full_height() {
        let bounds = bounds_with(BoundsConstraints {
            max_length_extend: 0.01,
            ..Default::default()
        });
        let ind = create_uncut_bar_individual(2, &bounds, 0.024);
        assert_eq!(ind.genes, vec![0.0, 0.024, 0.0, 0.024, 0.0]);
    }

    #[test]
    fn seeded_population_starts_with_clamped_seed() {
        let bounds = test_bounds();
        let mut rng = StdRng::seed_from_u64(3);
        let seed = [0.3, 0.02];

        let pop = initialize_population(20, 1, &bounds, Some(&seed), &mut rng);
        assert_eq!(pop.len(), 20);
        assert_eq!(pop[0].genes, vec![0.25, 0.02]);
        for variant in &pop[1..5] {
            assert!((variant.genes[1] - 0.02).abs() <= 0.001 + 1e-12);
        }
    }

    #[test]
    fn seed_gains_length_gene_when_enabled() {
        let bounds = bounds_with(BoundsConstraints {
            max_length_trim: 0.01,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(4);
        let pop = initialize_population(5, 1, &bounds, Some(&[0.1, 0.02]), &mut rng);
        assert!(pop.iter().all(|ind| ind.genes.len() == 3));
    }

    #[test]
    fn clamping_pulls_genes_into_range() {
        let bounds = test_bounds();
        let clamped = clamp_to_bounds(&[0.5, 0.03, -0.1, 0.005], &bounds, 2);
        assert_eq!(clamped, vec![bounds.lambda_max, bounds.h_max, bounds.lambda_min, bounds.h_min]);
    }

    #[test]
    fn clamping_enforces_spacing_and_is_idempotent() {
        let bounds = bounds_with(BoundsConstraints {
            min_cut_width: 0.02,
            max_cut_width: 0.05,
            ..Default::default()
        });
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..200 {
            let genes: Vec<f64> = (0..8).map(|_| rng.gen_range(-0.1..0.4)).collect();
            let once = clamp_to_bounds(&genes, &bounds, 4);
            let twice = clamp_to_bounds(&once, &bounds, 4);
            assert_eq!(once, twice);

            let mut lambdas: Vec<f64> = once.iter().step_by(2).copied().collect();
            lambdas.sort_by(|a, b| b.partial_cmp(a).unwrap());
            for pair in lambdas.windows(2) {
                let gap = pair[0] - pair[1];
                assert!(gap <= 0.05 + 1e-12);
                assert!(gap >= 0.02 - 1e-12 || pair[1] == bounds.lambda_min);
            }
        }
    }

    #[test]
    fn stats_ignore_failed_individuals() {
        let pop = vec![
            Individual::with_fitness(vec![0.1, 0.02], 1.0),
            Individual::with_fitness(vec![0.15, 0.018], 2.0),
            Individual::with_fitness(vec![0.2, 0.015], 3.0),
            Individual::with_fitness(vec![0.2, 0.015], f64::INFINITY),
        ];
        let stats = calculate_population_stats(&pop);

        assert_eq!(stats.best_fitness, 1.0);
        assert_eq!(stats.worst_fitness, 3.0);
        assert_eq!(stats.average_fitness, 2.0);
        assert_eq!(stats.median_fitness, 2.0);
        assert_eq!(get_best_individual(&pop).map(|i| i.fitness), Some(1.0));
        assert!(get_best_individual(&[]).is_none());
    }
}
