//! Mutation operators. Steps are scaled by each gene's range, and every
//! mutant is clamped and starts unevaluated.

use rand::seq::index;
use rand::Rng;
use rand_distr::StandardNormal;

use super::population::clamp_to_bounds;
use super::types::{Individual, MutationMethod, VariableBounds};

/// Starting step size of the self-adaptive operator.
pub const INITIAL_SIGMA: f64 = 0.2;
const SIGMA_MIN: f64 = 0.001;
const SIGMA_MAX: f64 = 1.0;

const POLYNOMIAL_PROBABILITY: f64 = 0.1;
const POLYNOMIAL_ETA: f64 = 20.0;

/// Below this |f1 error| (Hz) the length gene mutates without a bias.
const F1_ERROR_DEADBAND: f64 = 0.001;

fn gene_span(bounds: &VariableBounds, idx: usize, num_cuts: usize) -> f64 {
    let (lo, hi) = bounds.gene_range(idx, num_cuts);
    hi - lo
}

fn mutant(genes: &[f64], bounds: &VariableBounds, num_cuts: usize, sigmas: Option<Vec<f64>>) -> Individual {
    Individual {
        genes: clamp_to_bounds(genes, bounds, num_cuts),
        fitness: f64::INFINITY,
        sigmas,
    }
}

/// Random subset of gene indices, of random size in `1..=n`.
fn pick_genes<R: Rng + ?Sized>(num_genes: usize, rng: &mut R) -> Vec<usize> {
    if num_genes == 0 {
        return Vec::new();
    }
    let amount = rng.gen_range(1..=num_genes);
    index::sample(rng, num_genes, amount).into_vec()
}

/// Moves a random subset of genes by `sigma * range * r`, r uniform in [-1, 1].
pub fn uniform_mutation<R: Rng + ?Sized>(
    individual: &Individual,
    sigma: f64,
    bounds: &VariableBounds,
    num_cuts: usize,
    rng: &mut R,
) -> Individual {
    let mut genes = individual.genes.clone();

    for idx in pick_genes(genes.len(), rng) {
        let r = rng.gen::<f64>() * 2.0 - 1.0;
        genes[idx] += sigma * gene_span(bounds, idx, num_cuts) * r;
    }

    mutant(&genes, bounds, num_cuts, individual.sigmas.clone())
}

/// Fundamental error of the parent, used to steer the length gene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyError {
    /// Computed minus target f1 in Hz. Positive means the bar rings sharp.
    pub f1_error: f64,
}

/// Uniform mutation whose length gene leans toward fixing the fundamental.
///
/// Trimming raises f1, so a flat bar is pushed toward a positive adjust and a
/// sharp one toward a negative adjust with probability `adaptive_bias`.
/// Cut genes mutate exactly as in [`uniform_mutation`].
pub fn adaptive_length_mutation<R: Rng + ?Sized>(
    individual: &Individual,
    sigma: f64,
    bounds: &VariableBounds,
    num_cuts: usize,
    freq_error: Option<FrequencyError>,
    adaptive_bias: f64,
    rng: &mut R,
) -> Individual {
    let mut genes = individual.genes.clone();
    let length_idx = num_cuts * 2;

    for idx in pick_genes(genes.len(), rng) {
        let steer = freq_error
            .filter(|err| bounds.has_length_adjust() && idx == length_idx && err.f1_error.abs() > F1_ERROR_DEADBAND);

        let r = match steer {
            Some(err) if rng.gen::<f64>() < adaptive_bias => {
                let direction = if err.f1_error < 0.0 { 1.0 } else { -1.0 };
                direction * rng.gen::<f64>()
            }
            _ => rng.gen::<f64>() * 2.0 - 1.0,
        };
        genes[idx] += sigma * gene_span(bounds, idx, num_cuts) * r;
    }

    mutant(&genes, bounds, num_cuts, individual.sigmas.clone())
}

/// Self-adaptive Gaussian mutation.
///
/// Each step size is updated log-normally before it moves its gene:
///
/// sigma_k <- sigma_k * exp(tau1 * z1 + tau2 * z2_k)
/// g_k <- g_k + sigma_k * range_k * z3_k
///
/// with tau1 = 1 / sqrt(2 sqrt(2n)), tau2 = 1 / sqrt(4n), z1 shared by all
/// genes, z1 and z2 normal with deviation `phi`, z3 standard normal. Step
/// sizes are kept in [0.001, 1].
pub fn gaussian_self_adaptive_mutation<R: Rng + ?Sized>(
    individual: &Individual,
    phi: f64,
    bounds: &VariableBounds,
    num_cuts: usize,
    rng: &mut R,
) -> Individual {
    let mut genes = individual.genes.clone();
    let n = genes.len().max(1) as f64;

    let mut sigmas = individual.sigmas.clone().unwrap_or_default();
    sigmas.resize(genes.len(), INITIAL_SIGMA);

    let tau1 = 1.0 / (2.0 * (2.0 * n).sqrt()).sqrt();
    let tau2 = 1.0 / (4.0 * n).sqrt();
    let z1 = rng.sample::<f64, _>(StandardNormal) * phi;

    for (k, (gene, sigma)) in genes.iter_mut().zip(sigmas.iter_mut()).enumerate() {
        let z2 = rng.sample::<f64, _>(StandardNormal) * phi;
        let z3: f64 = rng.sample(StandardNormal);

        *sigma = (*sigma * (tau1 * z1 + tau2 * z2).exp()).clamp(SIGMA_MIN, SIGMA_MAX);
        *gene += *sigma * gene_span(bounds, k, num_cuts) * z3;
    }

    mutant(&genes, bounds, num_cuts, Some(sigmas))
}

/// Bounded polynomial mutation with distribution index `eta`. Each gene
/// mutates with probability `mutation_prob`.
pub fn polynomial_mutation<R: Rng + ?Sized>(
    individual: &Individual,
    mutation_prob: f64,
    eta: f64,
    bounds: &VariableBounds,
    num_cuts: usize,
    rng: &mut R,
) -> Individual {
    let mut genes = individual.genes.clone();
    let power = 1.0 / (eta + 1.0);

    for (i, gene) in genes.iter_mut().enumerate() {
        if rng.gen::<f64>() > mutation_prob {
            continue;
        }

        let (lo, hi) = bounds.gene_range(i, num_cuts);
        let range = hi - lo;
        if range.abs() < 1e-10 {
            continue;
        }

        let delta1 = (*gene - lo) / range;
        let delta2 = (hi - *gene) / range;
        let r: f64 = rng.gen();

        let delta = if r < 0.5 {
            let val = 2.0 * r + (1.0 - 2.0 * r) * (1.0 - delta1).powf(eta + 1.0);
            val.powf(power) - 1.0
        } else {
            let val = 2.0 * (1.0 - r) + 2.0 * (r - 0.5) * (1.0 - delta2).powf(eta + 1.0);
            1.0 - val.powf(power)
        };

        *gene += delta * range;
    }

    mutant(&genes, bounds, num_cuts, individual.sigmas.clone())
}

/// Mutation by `method`; `sigma` is the strength of the uniform and
/// Gaussian operators.
pub fn perform_mutation<R: Rng + ?Sized>(
    individual: &Individual,
    bounds: &VariableBounds,
    num_cuts: usize,
    method: MutationMethod,
    sigma: f64,
    rng: &mut R,
) -> Individual {
    match method {
        MutationMethod::Uniform => uniform_mutation(individual, sigma, bounds, num_cuts, rng),
        MutationMethod::GaussianAdaptive => gaussian_self_adaptive_mutation(individual, sigma, bounds, num_cuts, rng),
        MutationMethod::Polynomial => {
            polynomial_mutation(individual, POLYNOMIAL_PROBABILITY, POLYNOMIAL_ETA, bounds, num_cuts, rng)
        }
    }
}
