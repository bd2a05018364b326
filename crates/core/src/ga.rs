//! Genetic algorithm framework.
//!
//! Problems describe how individuals are created and evaluated
//! ([`GaProblem`]); individuals carry their own crossover and mutation
//! ([`Individual`]). [`GaRunner`] drives the generational loop with
//! elitism, tournament selection and parallel evaluation. Higher fitness
//! is better.

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the genetic algorithm.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaConfig {
    pub population_size: usize,
    pub max_generations: u32,
    /// Probability that a child comes from crossover rather than cloning.
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    /// Best individuals carried over unchanged each generation.
    pub elite_count: usize,
    pub tournament_size: usize,
    /// Wall-clock limit for the whole run.
    pub time_limit: Option<Duration>,
    /// Stop as soon as the best fitness reaches this value.
    pub target_fitness: Option<f64>,
    /// Generations without improvement before stopping.
    pub stagnation_limit: Option<u32>,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    /// Sized for sequence search, where one evaluation is a full placement pass.
    fn default() -> Self {
        Self {
            population_size: 24,
            max_generations: 40,
            crossover_rate: 0.85,
            mutation_rate: 0.2,
            elite_count: 2,
            tournament_size: 3,
            time_limit: None,
            target_fitness: None,
            stagnation_limit: Some(12),
            seed: None,
        }
    }
}

impl GaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size.max(2);
        self
    }

    pub fn with_max_generations(mut self, generations: u32) -> Self {
        self.max_generations = generations;
        self
    }

    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_elite_count(mut self, count: usize) -> Self {
        self.elite_count = count;
        self
    }

    pub fn with_time_limit(mut self, duration: Duration) -> Self {
        self.time_limit = Some(duration);
        self
    }

    pub fn with_target_fitness(mut self, fitness: f64) -> Self {
        self.target_fitness = Some(fitness);
        self
    }

    pub fn with_stagnation_limit(mut self, generations: Option<u32>) -> Self {
        self.stagnation_limit = generations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A member of the population.
pub trait Individual: Clone + Send + Sync {
    fn fitness(&self) -> f64;

    fn crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> Self;

    fn mutate<R: Rng>(&mut self, rng: &mut R);
}

/// Problem-specific GA operations.
pub trait GaProblem: Send + Sync {
    type Individual: Individual;

    /// Computes and stores the fitness of `individual`.
    fn evaluate(&self, individual: &mut Self::Individual);

    /// Evaluates a batch in parallel.
    fn evaluate_parallel(&self, individuals: &mut [Self::Individual]) {
        individuals.par_iter_mut().for_each(|ind| {
            self.evaluate(ind);
        });
    }

    fn initialize_population<R: Rng>(&self, size: usize, rng: &mut R) -> Vec<Self::Individual>;

    /// Called after each generation.
    fn on_generation(&self, _generation: u32, _best: &Self::Individual) {}
}

/// Result of a GA run.
#[derive(Debug, Clone)]
pub struct GaResult<I: Individual> {
    pub best: I,
    /// Generations completed.
    pub generations: u32,
    pub elapsed: Duration,
    pub target_reached: bool,
    /// Best fitness before each generation, plus the final one.
    pub history: Vec<f64>,
}

fn by_fitness_desc<I: Individual>(a: &I, b: &I) -> CmpOrdering {
    b.fitness()
        .partial_cmp(&a.fitness())
        .unwrap_or(CmpOrdering::Equal)
}

/// Genetic algorithm runner.
pub struct GaRunner<P: GaProblem> {
    config: GaConfig,
    problem: P,
    cancelled: Arc<AtomicBool>,
}

impl<P: GaProblem> GaRunner<P> {
    pub fn new(config: GaConfig, problem: P) -> Self {
        Self {
            config,
            problem,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stops the run at the next generation boundary once the flag is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    /// Runs with the configured seed, or from entropy when none is set.
    ///
    /// Returns `None` when the problem yields an empty initial population.
    pub fn run(&self) -> Option<GaResult<P::Individual>> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.run_with_rng(&mut rng)
    }

    pub fn run_with_rng<R: Rng>(&self, rng: &mut R) -> Option<GaResult<P::Individual>> {
        let start = Instant::now();
        let size = self.config.population_size.max(2);
        let mut history = Vec::new();

        let mut population = self.problem.initialize_population(size, rng);
        self.problem.evaluate_parallel(&mut population);
        population.sort_by(by_fitness_desc);

        let mut best = population.first()?.clone();
        let mut best_fitness = best.fitness();
        let mut stagnation = 0u32;
        let mut generation = 0u32;
        let mut target_reached = false;

        while generation < self.config.max_generations {
            if self.cancelled.load(Ordering::Relaxed) {
                break;
            }
            if self.config.time_limit.is_some_and(|limit| start.elapsed() > limit) {
                break;
            }
            if self.config.target_fitness.is_some_and(|target| best_fitness >= target) {
                target_reached = true;
                break;
            }
            history.push(best_fitness);

            let elite = self.config.elite_count.min(population.len());
            let mut next: Vec<P::Individual> = population[..elite].to_vec();

            let mut children = Vec::with_capacity(size.saturating_sub(elite));
            while children.len() + elite < size {
                let a = self.tournament_select(&population, rng);
                let b = self.tournament_select(&population, rng);
                let mut child = if rng.gen::<f64>() < self.config.crossover_rate {
                    a.crossover(b, rng)
                } else {
                    a.clone()
                };
                if rng.gen::<f64>() < self.config.mutation_rate {
                    child.mutate(rng);
                }
                children.push(child);
            }
            self.problem.evaluate_parallel(&mut children);
            next.extend(children);
            next.sort_by(by_fitness_desc);

            let leader = next[0].fitness();
            if leader > best_fitness {
                best = next[0].clone();
                best_fitness = leader;
                stagnation = 0;
            } else {
                stagnation += 1;
            }

            self.problem.on_generation(generation, &best);
            population = next;
            generation += 1;

            if self.config.stagnation_limit.is_some_and(|limit| stagnation >= limit) {
                break;
            }
        }
        if !target_reached {
            target_reached = self.config.target_fitness.is_some_and(|t| best_fitness >= t);
        }
        history.push(best_fitness);

        Some(GaResult {
            best,
            generations: generation,
            elapsed: start.elapsed(),
            target_reached,
            history,
        })
    }

    fn tournament_select<'a, R: Rng>(
        &self,
        population: &'a [P::Individual],
        rng: &mut R,
    ) -> &'a P::Individual {
        let mut best = rng.gen_range(0..population.len());
        for _ in 1..self.config.tournament_size {
            let i = rng.gen_range(0..population.len());
            if population[i].fitness() > population[best].fitness() {
                best = i;
            }
        }
        &population[best]
    }
}

/// A permutation of `0..n`, e.g. a part sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct PermutationChromosome {
    pub genes: Vec<usize>,
    fitness: f64,
}

impl PermutationChromosome {
    /// Unevaluated chromosome. `genes` must be a permutation of `0..genes.len()`.
    pub fn new(genes: Vec<usize>) -> Self {
        Self {
            genes,
            fitness: f64::NEG_INFINITY,
        }
    }

    pub fn random<R: Rng>(size: usize, rng: &mut R) -> Self {
        let mut genes: Vec<usize> = (0..size).collect();
        genes.shuffle(rng);
        Self::new(genes)
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Order crossover (OX): a slice of `self`, the rest in `other`'s order.
    pub fn order_crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> Self {
        let n = self.genes.len();
        if n < 2 || other.genes.len() != n {
            return Self::new(self.genes.clone());
        }
        let (mut p1, mut p2) = (rng.gen_range(0..n), rng.gen_range(0..n));
        if p1 > p2 {
            std::mem::swap(&mut p1, &mut p2);
        }

        let mut child = vec![usize::MAX; n];
        let mut used = vec![false; n];
        for i in p1..=p2 {
            child[i] = self.genes[i];
            used[self.genes[i]] = true;
        }

        let mut j = (p2 + 1) % n;
        for i in 0..n {
            let idx = (p2 + 1 + i) % n;
            if child[idx] == usize::MAX {
                while used[other.genes[j]] {
                    j = (j + 1) % n;
                }
                child[idx] = other.genes[j];
                used[other.genes[j]] = true;
                j = (j + 1) % n;
            }
        }
        Self::new(child)
    }

    pub fn swap_mutate<R: Rng>(&mut self, rng: &mut R) {
        let n = self.genes.len();
        if n < 2 {
            return;
        }
        let (i, j) = (rng.gen_range(0..n), rng.gen_range(0..n));
        self.genes.swap(i, j);
        self.fitness = f64::NEG_INFINITY;
    }

    /// Reverses a random segment.
    pub fn inversion_mutate<R: Rng>(&mut self, rng: &mut R) {
        let n = self.genes.len();
        if n < 2 {
            return;
        }
        let (mut p1, mut p2) = (rng.gen_range(0..n), rng.gen_range(0..n));
        if p1 > p2 {
            std::mem::swap(&mut p1, &mut p2);
        }
        self.genes[p1..=p2].reverse();
        self.fitness = f64::NEG_INFINITY;
    }
}

impl Individual for PermutationChromosome {
    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> Self {
        self.order_crossover(other, rng)
    }

    /// 70% swap, 30% inversion.
    fn mutate<R: Rng>(&mut self, rng: &mut R) {
        if rng.gen::<f64>() < 0.7 {
            self.swap_mutate(rng);
        } else {
            self.inversion_mutate(rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_permutation(genes: &[usize], n: usize) -> bool {
        let mut sorted = genes.to_vec();
        sorted.sort_unstable();
        sorted == (0..n).collect::<Vec<_>>()
    }

    /// Fitness counts genes already at their own index.
    struct SortProblem {
        size: usize,
    }

    impl GaProblem for SortProblem {
        type Individual = PermutationChromosome;

        fn evaluate(&self, individual: &mut PermutationChromosome) {
            let fixed = individual
                .genes
                .iter()
                .enumerate()
                .filter(|(i, g)| i == *g)
                .count();
            individual.set_fitness(fixed as f64);
        }

        fn initialize_population<R: Rng>(&self, size: usize, rng: &mut R) -> Vec<PermutationChromosome> {
            (0..size).map(|_| PermutationChromosome::random(self.size, rng)).collect()
        }
    }

    struct EmptyProblem;

    impl GaProblem for EmptyProblem {
        type Individual = PermutationChromosome;

        fn evaluate(&self, _individual: &mut PermutationChromosome) {}

        fn initialize_population<R: Rng>(&self, _size: usize, _rng: &mut R) -> Vec<PermutationChromosome> {
            Vec::new()
        }
    }

    #[test]
    fn test_ga_improves_and_keeps_best() {
        let config = GaConfig::default()
            .with_population_size(30)
            .with_max_generations(60)
            .with_seed(7);
        let result = GaRunner::new(config, SortProblem { size: 8 }).run().unwrap();

        assert!(is_permutation(&result.best.genes, 8));
        // elitism: the best never gets worse
        assert!(result.history.windows(2).all(|w| w[1] >= w[0]));
        assert!(result.best.fitness() >= result.history[0]);
        assert_eq!(result.best.fitness(), *result.history.last().unwrap());
    }

    #[test]
    fn test_ga_stops_at_target() {
        let config = GaConfig::default().with_target_fitness(0.0).with_seed(1);
        let result = GaRunner::new(config, SortProblem { size: 6 }).run().unwrap();
        assert!(result.target_reached);
        assert_eq!(result.generations, 0);
    }

    #[test]
    fn test_ga_seed_is_reproducible() {
        let config = GaConfig::default().with_max_generations(10).with_seed(99);
        let a = GaRunner::new(config.clone(), SortProblem { size: 10 }).run().unwrap();
        let b = GaRunner::new(config, SortProblem { size: 10 }).run().unwrap();
        assert_eq!(a.best.genes, b.best.genes);
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn test_ga_cancel_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        let runner = GaRunner::new(GaConfig::default().with_seed(3), SortProblem { size: 6 })
            .with_cancel_flag(Arc::clone(&flag));
        let result = runner.run().unwrap();
        assert_eq!(result.generations, 0);
        assert!(runner.cancel_handle().load(Ordering::Relaxed));
    }

    #[test]
    fn test_ga_empty_population() {
        assert!(GaRunner::new(GaConfig::default(), EmptyProblem).run().is_none());
    }

    #[test]
    fn test_permutation_crossover() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let a = PermutationChromosome::random(10, &mut rng);
            let b = PermutationChromosome::random(10, &mut rng);
            let child = a.order_crossover(&b, &mut rng);
            assert!(is_permutation(&child.genes, 10));
            assert_eq!(child.fitness(), f64::NEG_INFINITY);
        }
    }

    #[test]
    fn test_permutation_mutation() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut chromosome = PermutationChromosome::random(10, &mut rng);
        chromosome.set_fitness(3.0);
        for _ in 0..20 {
            chromosome.mutate(&mut rng);
            assert!(is_permutation(&chromosome.genes, 10));
        }
        assert_eq!(chromosome.fitness(), f64::NEG_INFINITY);

        let mut single = PermutationChromosome::new(vec![0]);
        single.swap_mutate(&mut rng);
        single.inversion_mutate(&mut rng);
        assert_eq!(single.genes, vec![0]);
    }
}
