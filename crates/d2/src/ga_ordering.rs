//! Genetic search over part sequences.
//!
//! A chromosome is a permutation of the prepared parts. Decoding runs one
//! placement pass of the nester in exactly that order, so placement stays
//! the only judge of geometry. Fitness is utilization, with the number of
//! placed parts as a tie-breaker. The heuristic orderings seed the
//! population, which keeps the result at least as good as the best of them.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use kerfnest_core::{GaConfig, GaProblem, GaRunner, Individual, PermutationChromosome};
use rand::Rng;

use crate::geometry::Polygon;
use crate::nester::Nester;
use crate::nfp::NfpCache;
use crate::ordering::{OrderingPolicy, PartOrdering};
use crate::solution::NestingSolution;

/// Fitness added per placed part, below any meaningful utilization step.
const PLACED_WEIGHT: f64 = 1e-3;

/// Heuristic orderings injected into the initial population.
const SEED_ORDERINGS: usize = 6;

fn fitness(solution: &NestingSolution) -> f64 {
    solution.utilization() + solution.placed().len() as f64 * PLACED_WEIGHT
}

/// Order search driven by a genetic algorithm.
pub struct GeneticOrdering {
    nester: Nester,
    config: GaConfig,
    shared_cache: Option<Arc<NfpCache>>,
}

impl GeneticOrdering {
    pub fn new(nester: Nester) -> Self {
        Self {
            nester,
            config: GaConfig::default(),
            shared_cache: None,
        }
    }

    pub fn with_config(mut self, config: GaConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares one NFP cache across all evaluations and with the caller.
    pub fn with_shared_cache(mut self, cache: Arc<NfpCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    /// Searches for the best sequence within the nester's time budget.
    ///
    /// The run also ends when the configured `target_utilization` is
    /// reached, unless the GA configuration sets its own target.
    pub fn run(&self, parts: &[Polygon]) -> NestingSolution {
        let start = Instant::now();
        let deadline = self.nester.deadline();
        let (usable, rejected) = self.nester.prepare(parts);
        let sheet = self.nester.config().sheet.clone();

        let mut solution = if usable.is_empty() {
            NestingSolution::new(sheet)
        } else {
            let cache = self
                .shared_cache
                .clone()
                .unwrap_or_else(|| Arc::new(NfpCache::new()));
            let problem = SequenceProblem {
                decoder: self
                    .nester
                    .clone()
                    .with_ordering(PartOrdering::AsGiven)
                    .with_nfp_cache(cache),
                seeds: PartOrdering::multi_start_set(SEED_ORDERINGS)
                    .iter()
                    .map(|o| o.order(&usable))
                    .collect(),
                parts: usable,
                deadline,
                best: Mutex::new(None),
            };

            let runner = GaRunner::new(self.run_config(deadline), problem)
                .with_cancel_flag(self.nester.cancel_flag());
            if let Some(result) = runner.run() {
                log::debug!(
                    "genetic ordering: {} generations, best fitness {:.3}, target reached: {}",
                    result.generations,
                    result.best.fitness(),
                    result.target_reached
                );
            }
            runner
                .problem()
                .take_best()
                .unwrap_or_else(|| NestingSolution::new(self.nester.config().sheet.clone()))
        };

        solution.strategy = "genetic".into();
        for failure in rejected {
            solution.push_rejected(failure);
        }
        solution.elapsed_ms = start.elapsed().as_millis() as u64;
        solution
    }

    fn run_config(&self, deadline: Instant) -> GaConfig {
        let mut config = self.config.clone();
        let remaining = deadline.saturating_duration_since(Instant::now());
        config.time_limit = Some(config.time_limit.map_or(remaining, |limit| limit.min(remaining)));
        if config.target_fitness.is_none() {
            let target = self.nester.config().optimization.target_utilization;
            if target > 0.0 {
                config.target_fitness = Some(target);
            }
        }
        config
    }
}

/// Evaluates sequences by placing them; remembers the best layout seen.
struct SequenceProblem {
    decoder: Nester,
    parts: Vec<Arc<Polygon>>,
    seeds: Vec<Vec<usize>>,
    deadline: Instant,
    best: Mutex<Option<(f64, Vec<usize>, NestingSolution)>>,
}

impl SequenceProblem {
    fn decode(&self, genes: &[usize]) -> NestingSolution {
        let sequence: Vec<Arc<Polygon>> = genes.iter().map(|&i| Arc::clone(&self.parts[i])).collect();
        self.decoder.nest_prepared(&sequence, self.deadline)
    }

    fn take_best(&self) -> Option<NestingSolution> {
        let mut best = self.best.lock().ok()?;
        best.take().map(|(_, _, solution)| solution)
    }
}

impl GaProblem for SequenceProblem {
    type Individual = PermutationChromosome;

    fn evaluate(&self, individual: &mut PermutationChromosome) {
        let solution = self.decode(&individual.genes);
        let score = fitness(&solution);
        individual.set_fitness(score);

        let Ok(mut best) = self.best.lock() else {
            return;
        };
        // equal fitness goes to the smaller sequence so parallel evaluation stays deterministic
        let better = match best.as_ref() {
            None => true,
            Some((current, genes, _)) => {
                score > *current || (score == *current && individual.genes < *genes)
            }
        };
        if better {
            *best = Some((score, individual.genes.clone(), solution));
        }
    }

    fn initialize_population<R: Rng>(&self, size: usize, rng: &mut R) -> Vec<PermutationChromosome> {
        let mut population: Vec<PermutationChromosome> = Vec::with_capacity(size);
        for seed in &self.seeds {
            if population.len() < size && !population.iter().any(|c| &c.genes == seed) {
                population.push(PermutationChromosome::new(seed.clone()));
            }
        }
        while population.len() < size {
            population.push(PermutationChromosome::random(self.parts.len(), rng));
        }
        population
    }
}
