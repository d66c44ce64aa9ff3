//! Population scoring.
//!
//! The loop hands whole batches of gene vectors to a [`BatchEvaluator`] so an
//! implementation can spread them over threads or an accelerator. Failed
//! evaluations come back as infinity.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::Result;

use super::objective::{evaluate_fitness, EvaluationContext};
use super::types::Individual;

/// Scores gene vectors. The output has one fitness per input, in order.
pub trait BatchEvaluator: Sync {
    fn evaluate_batch(&self, genes: &[Vec<f64>]) -> Vec<f64>;
}

/// Finite-element evaluation on the CPU, parallel when the `parallel`
/// feature is on.
pub struct CpuEvaluator {
    ctx: EvaluationContext,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl CpuEvaluator {
    /// `max_cores` of 0 uses rayon's global pool; anything else gets a
    /// dedicated pool of that many threads.
    pub fn new(ctx: EvaluationContext, max_cores: usize) -> Result<Self> {
        #[cfg(feature = "parallel")]
        {
            let pool = if max_cores > 0 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(max_cores)
                    .build()
                    .map_err(|err| crate::error::FemError::Config(format!("thread pool: {err}")))?;
                Some(pool)
            } else {
                None
            };
            log::debug!(
                "evaluator using {} threads",
                pool.as_ref().map_or_else(rayon::current_num_threads, rayon::ThreadPool::current_num_threads)
            );
            Ok(Self { ctx, pool })
        }

        #[cfg(not(feature = "parallel"))]
        {
            let _ = max_cores;
            Ok(Self { ctx })
        }
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.ctx
    }
}

impl BatchEvaluator for CpuEvaluator {
    #[cfg(feature = "parallel")]
    fn evaluate_batch(&self, genes: &[Vec<f64>]) -> Vec<f64> {
        let score = || genes.par_iter().map(|g| evaluate_fitness(g, &self.ctx)).collect();
        match &self.pool {
            Some(pool) => pool.install(score),
            None => score(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_batch(&self, genes: &[Vec<f64>]) -> Vec<f64> {
        genes.iter().map(|g| evaluate_fitness(g, &self.ctx)).collect()
    }
}

/// Scores `population` in one batch and writes the fitness back.
///
/// A short answer from the evaluator leaves the remaining individuals at
/// infinity.
pub fn evaluate_population<E: BatchEvaluator + ?Sized>(evaluator: &E, population: Vec<Individual>) -> Vec<Individual> {
    if population.is_empty() {
        return population;
    }
    let genes: Vec<Vec<f64>> = population.iter().map(|ind| ind.genes.clone()).collect();
    let mut scores = evaluator.evaluate_batch(&genes).into_iter();

    population
        .into_iter()
        .map(|mut ind| {
            ind.fitness = match scores.next() {
                Some(f) if !f.is_nan() => f,
                _ => f64::INFINITY,
            };
            ind
        })
        .collect()
}
