//! Parent selection and elitism.

use rand::Rng;

use super::population::sorted_by_fitness;
use super::types::{Individual, SelectionMethod};

const TOURNAMENT_SIZE: usize = 3;
const RANK_PRESSURE: f64 = 1.5;
const MATE_RETRIES: usize = 10;

/// Index drawn with probability proportional to `weights`.
fn spin_wheel<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    let r = rng.gen::<f64>() * total;

    let mut cumulative = 0.0;
    for (i, w) in weights.iter().enumerate() {
        cumulative += w;
        if r <= cumulative {
            return i;
        }
    }
    weights.len().saturating_sub(1)
}

fn random_pick<R: Rng + ?Sized>(population: &[Individual], count: usize, rng: &mut R) -> Vec<Individual> {
    if population.is_empty() {
        return Vec::new();
    }
    (0..count)
        .map(|_| population[rng.gen_range(0..population.len())].clone())
        .collect()
}

/// Roulette wheel on `1 / fitness`.
///
/// Only individuals with a finite, positive fitness take part; if there are
/// none the picks are uniform over the whole population.
pub fn roulette_selection<R: Rng + ?Sized>(population: &[Individual], num_selections: usize, rng: &mut R) -> Vec<Individual> {
    let valid: Vec<&Individual> = population
        .iter()
        .filter(|ind| ind.fitness.is_finite() && ind.fitness > 0.0)
        .collect();

    if valid.is_empty() {
        return random_pick(population, num_selections, rng);
    }

    let weights: Vec<f64> = valid.iter().map(|ind| 1.0 / ind.fitness).collect();
    (0..num_selections)
        .map(|_| valid[spin_wheel(&weights, rng)].clone())
        .collect()
}

/// Best of `tournament_size` uniform picks, repeated `num_selections` times.
pub fn tournament_selection<R: Rng + ?Sized>(
    population: &[Individual],
    num_selections: usize,
    tournament_size: usize,
    rng: &mut R,
) -> Vec<Individual> {
    if population.is_empty() {
        return Vec::new();
    }

    (0..num_selections)
        .map(|_| {
            let mut winner = &population[rng.gen_range(0..population.len())];
            for _ in 1..tournament_size {
                let challenger = &population[rng.gen_range(0..population.len())];
                if challenger.fitness < winner.fitness {
                    winner = challenger;
                }
            }
            winner.clone()
        })
        .collect()
}

/// Linear ranking. `selection_pressure` in [1, 2] is the expected number of
/// copies of the best individual.
pub fn rank_selection<R: Rng + ?Sized>(
    population: &[Individual],
    num_selections: usize,
    selection_pressure: f64,
    rng: &mut R,
) -> Vec<Individual> {
    let sorted = sorted_by_fitness(population);
    let n = sorted.len() as f64;
    if sorted.len() < 2 {
        return random_pick(&sorted, num_selections, rng);
    }

    let weights: Vec<f64> = (0..sorted.len())
        .map(|rank| {
            (2.0 - selection_pressure) / n
                + 2.0 * (selection_pressure - 1.0) * (n - 1.0 - rank as f64) / (n * (n - 1.0))
        })
        .collect();

    (0..num_selections)
        .map(|_| sorted[spin_wheel(&weights, rng)].clone())
        .collect()
}

pub fn select_parents<R: Rng + ?Sized>(
    population: &[Individual],
    num_selections: usize,
    method: SelectionMethod,
    rng: &mut R,
) -> Vec<Individual> {
    match method {
        SelectionMethod::Roulette => roulette_selection(population, num_selections, rng),
        SelectionMethod::Tournament => tournament_selection(population, num_selections, TOURNAMENT_SIZE, rng),
        SelectionMethod::Rank => rank_selection(population, num_selections, RANK_PRESSURE, rng),
    }
}

/// Parent pairs for crossover. The second parent is redrawn a few times if
/// it has the same genes as the first; otherwise the first parent is reused.
pub fn select_mating_pairs<R: Rng + ?Sized>(
    population: &[Individual],
    num_pairs: usize,
    method: SelectionMethod,
    rng: &mut R,
) -> Vec<(Individual, Individual)> {
    let mut pairs = Vec::with_capacity(num_pairs);
    if population.is_empty() {
        return pairs;
    }

    for _ in 0..num_pairs {
        let Some(first) = select_parents(population, 1, method, rng).pop() else {
            break;
        };

        let mut second = None;
        for _ in 0..=MATE_RETRIES {
            match select_parents(population, 1, method, rng).pop() {
                Some(candidate) if candidate.genes != first.genes => {
                    second = Some(candidate);
                    break;
                }
                _ => {}
            }
        }
        let second = second.unwrap_or_else(|| first.clone());

        pairs.push((first, second));
    }
    pairs
}

/// The `num_elite` fittest individuals, best first.
pub fn select_elite(population: &[Individual], num_elite: usize) -> Vec<Individual> {
    let mut sorted = sorted_by_fitness(population);
    sorted.truncate(num_elite);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_population() -> Vec<Individual> {
        vec![
            Individual::with_fitness(vec![0.1, 0.02], 1.0),
            Individual::with_fitness(vec![0.15, 0.018], 2.0),
            Individual::with_fitness(vec![0.2, 0.015], 3.0),
            Individual::with_fitness(vec![0.12, 0.019], 1.5),
            Individual::with_fitness(vec![0.18, 0.016], f64::INFINITY),
        ]
    }

    #[test]
    fn roulette_never_picks_failed_individuals() {
        let pop = test_population();
        let mut rng = StdRng::seed_from_u64(7);
        let selected = roulette_selection(&pop, 200, &mut rng);

        assert_eq!(selected.len(), 200);
        assert!(selected.iter().all(|ind| ind.fitness.is_finite()));

        // 1/f weighting favours the best individual over the worst
        let best = selected.iter().filter(|ind| ind.fitness == 1.0).count();
        let worst = selected.iter().filter(|ind| ind.fitness == 3.0).count();
        assert!(best > worst);
    }

    #[test]
    fn roulette_falls_back_to_uniform() {
        let pop = vec![
            Individual::new(vec![0.1, 0.02]),
            Individual::new(vec![0.2, 0.02]),
        ];
        let mut rng = StdRng::seed_from_u64(8);
        assert_eq!(roulette_selection(&pop, 4, &mut rng).len(), 4);
    }

    #[test]
    fn tournament_of_whole_population_is_mostly_best() {
        let pop = test_population();
        let mut rng = StdRng::seed_from_u64(9);
        let selected = tournament_selection(&pop, 50, 20, &mut rng);
        let best = selected.iter().filter(|ind| ind.fitness == 1.0).count();
        assert!(best > 40);
    }

    #[test]
    fn rank_selection_returns_requested_count() {
        let pop = test_population();
        let mut rng = StdRng::seed_from_u64(10);
        assert_eq!(rank_selection(&pop, 3, RANK_PRESSURE, &mut rng).len(), 3);
        assert_eq!(select_parents(&pop, 5, SelectionMethod::Tournament, &mut rng).len(), 5);
    }

    #[test]
    fn elite_are_the_fittest() {
        let elite = select_elite(&test_population(), 2);
        assert_eq!(elite.len(), 2);
        assert_eq!(elite[0].fitness, 1.0);
        assert_eq!(elite[1].fitness, 1.5);
    }

    #[test]
    fn mating_pairs_prefer_distinct_parents() {
        let pop = test_population();
        let mut rng = StdRng::seed_from_u64(11);
        let pairs = select_mating_pairs(&pop, 20, SelectionMethod::Roulette, &mut rng);

        assert_eq!(pairs.len(), 20);
        let distinct = pairs.iter().filter(|(a, b)| a.genes != b.genes).count();
        assert!(distinct >= 15);
    }

    #[test]
    fn converged_population_pairs_each_parent_with_itself() {
        let pop = vec![
            Individual::with_fitness(vec![0.1, 0.02], 1.0),
            Individual::with_fitness(vec![0.1, 0.02], 1.0),
            Individual::with_fitness(vec![0.1, 0.02], 1.0),
        ];
        let mut rng = StdRng::seed_from_u64(12);
        let pairs = select_mating_pairs(&pop, 6, SelectionMethod::Tournament, &mut rng);

        assert_eq!(pairs.len(), 6);
        assert!(pairs.iter().all(|(a, b)| a.genes == b.genes));
    }
}
