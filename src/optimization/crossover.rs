//! Recombination operators. Every child is clamped back into the search box
//! and starts unevaluated.

use rand::Rng;

use super::population::clamp_to_bounds;
use super::types::{CrossoverMethod, Individual, VariableBounds};

const UNIFORM_MIXING_RATIO: f64 = 0.5;
const BLEND_ALPHA: f64 = 0.5;

fn child_pair(genes1: &[f64], genes2: &[f64], bounds: &VariableBounds, num_cuts: usize) -> (Individual, Individual) {
    (
        Individual::new(clamp_to_bounds(genes1, bounds, num_cuts)),
        Individual::new(clamp_to_bounds(genes2, bounds, num_cuts)),
    )
}

/// Arithmetic blend with one random weight shared by all genes:
///
/// c1 = p1 + r (p2 - p1)
/// c2 = p2 + r (p1 - p2)
///
/// Step sizes are blended the same way when both parents carry them.
pub fn heuristic_crossover<R: Rng + ?Sized>(
    parent1: &Individual,
    parent2: &Individual,
    bounds: &VariableBounds,
    num_cuts: usize,
    rng: &mut R,
) -> (Individual, Individual) {
    let r: f64 = rng.gen();
    let blend = |a: &[f64], b: &[f64]| -> Vec<f64> { a.iter().zip(b).map(|(x, y)| x + r * (y - x)).collect() };

    let (mut c1, mut c2) = child_pair(
        &blend(&parent1.genes, &parent2.genes),
        &blend(&parent2.genes, &parent1.genes),
        bounds,
        num_cuts,
    );

    if let (Some(s1), Some(s2)) = (&parent1.sigmas, &parent2.sigmas) {
        c1.sigmas = Some(blend(s1, s2));
        c2.sigmas = Some(blend(s2, s1));
    }
    (c1, c2)
}

pub fn single_point_crossover<R: Rng + ?Sized>(
    parent1: &Individual,
    parent2: &Individual,
    bounds: &VariableBounds,
    num_cuts: usize,
    rng: &mut R,
) -> (Individual, Individual) {
    let n = parent1.genes.len().min(parent2.genes.len());
    if n < 2 {
        return child_pair(&parent1.genes, &parent2.genes, bounds, num_cuts);
    }
    let point = rng.gen_range(1..n);

    let mut g1 = parent1.genes[..n].to_vec();
    let mut g2 = parent2.genes[..n].to_vec();
    g1[point..].copy_from_slice(&parent2.genes[point..n]);
    g2[point..].copy_from_slice(&parent1.genes[point..n]);

    child_pair(&g1, &g2, bounds, num_cuts)
}

/// Swaps the segment between two random points.
pub fn two_point_crossover<R: Rng + ?Sized>(
    parent1: &Individual,
    parent2: &Individual,
    bounds: &VariableBounds,
    num_cuts: usize,
    rng: &mut R,
) -> (Individual, Individual) {
    let n = parent1.genes.len().min(parent2.genes.len());
    if n == 0 {
        return child_pair(&parent1.genes, &parent2.genes, bounds, num_cuts);
    }

    let mut a = rng.gen_range(0..n);
    let mut b = rng.gen_range(0..n);
    if a > b {
        std::mem::swap(&mut a, &mut b);
    }

    let mut g1 = parent1.genes[..n].to_vec();
    let mut g2 = parent2.genes[..n].to_vec();
    g1[a..b].copy_from_slice(&parent2.genes[a..b]);
    g2[a..b].copy_from_slice(&parent1.genes[a..b]);

    child_pair(&g1, &g2, bounds, num_cuts)
}

/// Gene-wise coin flip; `mixing_ratio` is the chance child 1 keeps parent 1's gene.
pub fn uniform_crossover<R: Rng + ?Sized>(
    parent1: &Individual,
    parent2: &Individual,
    bounds: &VariableBounds,
    num_cuts: usize,
    mixing_ratio: f64,
    rng: &mut R,
) -> (Individual, Individual) {
    let (g1, g2): (Vec<f64>, Vec<f64>) = parent1
        .genes
        .iter()
        .zip(&parent2.genes)
        .map(|(&x, &y)| if rng.gen::<f64>() < mixing_ratio { (x, y) } else { (y, x) })
        .unzip();

    child_pair(&g1, &g2, bounds, num_cuts)
}

/// BLX-alpha: each child gene is uniform on the parents' interval widened by
/// `alpha` times its length on both sides.
pub fn blend_crossover<R: Rng + ?Sized>(
    parent1: &Individual,
    parent2: &Individual,
    bounds: &VariableBounds,
    num_cuts: usize,
    alpha: f64,
    rng: &mut R,
) -> (Individual, Individual) {
    let mut g1 = Vec::with_capacity(parent1.genes.len());
    let mut g2 = Vec::with_capacity(parent1.genes.len());

    for (&x, &y) in parent1.genes.iter().zip(&parent2.genes) {
        let lo = x.min(y);
        let hi = x.max(y);
        let spread = hi - lo;
        let (lo, hi) = (lo - alpha * spread, hi + alpha * spread);

        g1.push(lo + rng.gen::<f64>() * (hi - lo));
        g2.push(lo + rng.gen::<f64>() * (hi - lo));
    }

    child_pair(&g1, &g2, bounds, num_cuts)
}

pub fn perform_crossover<R: Rng + ?Sized>(
    parent1: &Individual,
    parent2: &Individual,
    bounds: &VariableBounds,
    num_cuts: usize,
    method: CrossoverMethod,
    rng: &mut R,
) -> (Individual, Individual) {
    match method {
        CrossoverMethod::Heuristic => heuristic_crossover(parent1, parent2, bounds, num_cuts, rng),
        CrossoverMethod::SinglePoint => single_point_crossover(parent1, parent2, bounds, num_cuts, rng),
        CrossoverMethod::TwoPoint => two_point_crossover(parent1, parent2, bounds, num_cuts, rng),
        CrossoverMethod::Uniform => uniform_crossover(parent1, parent2, bounds, num_cuts, UNIFORM_MIXING_RATIO, rng),
        CrossoverMethod::Blend => blend_crossover(parent1, parent2, bounds, num_cuts, BLEND_ALPHA, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn test_bounds() -> VariableBounds {
        VariableBounds {
            lambda_min: 0.0,
            lambda_max: 0.25,
            h_min: 0.01,
            h_max: 0.024,
            min_cut_width: 0.0,
            max_cut_width: 0.0,
            max_length_trim: 0.0,
            max_length_extend: 0.0,
            length_adjust: false,
        }
    }

    fn test_parents() -> (Individual, Individual) {
        (
            Individual::with_fitness(vec![0.1, 0.02, 0.05, 0.015], 1.0),
            Individual::with_fitness(vec![0.2, 0.018, 0.15, 0.012], 2.0),
        )
    }

    fn assert_within(ind: &Individual, bounds: &VariableBounds) {
        for (i, g) in ind.genes.iter().enumerate() {
            let (lo, hi) = bounds.gene_range(i, 2);
            assert!(*g >= lo && *g <= hi, "gene {i} = {g} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn heuristic_children_lie_between_parents() {
        let bounds = test_bounds();
        let (p1, p2) = test_parents();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..50 {
            let (c1, c2) = heuristic_crossover(&p1, &p2, &bounds, 2, &mut rng);
            assert_eq!(c1.fitness, f64::INFINITY);
            assert_eq!(c2.fitness, f64::INFINITY);
            for i in 0..4 {
                let lo = p1.genes[i].min(p2.genes[i]) - 1e-12;
                let hi = p1.genes[i].max(p2.genes[i]) + 1e-12;
                assert!(c1.genes[i] >= lo && c1.genes[i] <= hi);
                assert!(c2.genes[i] >= lo && c2.genes[i] <= hi);
            }
        }
    }

    #[test]
    fn heuristic_blends_step_sizes() {
        let bounds = test_bounds();
        let p1 = Individual::with_sigmas(vec![0.1, 0.02, 0.05, 0.015], vec![0.1; 4]);
        let p2 = Individual::with_sigmas(vec![0.2, 0.018, 0.15, 0.012], vec![0.3; 4]);
        let mut rng = StdRng::seed_from_u64(2);

        let (c1, c2) = heuristic_crossover(&p1, &p2, &bounds, 2, &mut rng);
        let s1 = c1.sigmas.unwrap();
        let s2 = c2.sigmas.unwrap();
        for (a, b) in s1.iter().zip(&s2) {
            assert!(*a >= 0.1 - 1e-12 && *a <= 0.3 + 1e-12);
            assert!((a + b - 0.4).abs() < 1e-12);
        }
    }

    #[test]
    fn every_method_respects_bounds() {
        let bounds = test_bounds();
        let (p1, p2) = test_parents();
        let mut rng = StdRng::seed_from_u64(3);

        for method in [
            CrossoverMethod::Heuristic,
            CrossoverMethod::SinglePoint,
            CrossoverMethod::TwoPoint,
            CrossoverMethod::Uniform,
            CrossoverMethod::Blend,
        ] {
            for _ in 0..50 {
                let (c1, c2) = perform_crossover(&p1, &p2, &bounds, 2, method, &mut rng);
                assert_eq!(c1.genes.len(), 4);
                assert_eq!(c2.genes.len(), 4);
                assert_within(&c1, &bounds);
                assert_within(&c2, &bounds);
            }
        }
    }

    #[test]
    fn uniform_children_take_each_gene_from_a_parent() {
        let bounds = test_bounds();
        let p1 = Individual::new(vec![0.2, 0.02, 0.05, 0.015]);
        let p2 = Individual::new(vec![0.22, 0.011, 0.07, 0.023]);
        let mut rng = StdRng::seed_from_u64(4);

        let (c1, c2) = uniform_crossover(&p1, &p2, &bounds, 2, 0.5, &mut rng);
        for i in 0..4 {
            let pair = [p1.genes[i], p2.genes[i]];
            assert!(pair.contains(&c1.genes[i]));
            assert!(pair.contains(&c2.genes[i]));
            assert!((c1.genes[i] + c2.genes[i] - pair[0] - pair[1]).abs() < 1e-15);
        }
    }

    #[test]
    fn blend_can_leave_the_parent_interval() {
        let bounds = test_bounds();
        let (p1, p2) = test_parents();
        let mut rng = StdRng::seed_from_u64(5);

        let outside = (0..200).any(|_| {
            let (c1, _) = blend_crossover(&p1, &p2, &bounds, 2, 0.5, &mut rng);
            let h = c1.genes[1];
            h < p1.genes[1].min(p2.genes[1]) || h > p1.genes[1].max(p2.genes[1])
        });
        assert!(outside);
    }
}
