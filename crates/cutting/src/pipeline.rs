//! End-to-end nesting run: placement, refinement, metrics and score.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use kerfnest_core::{GaConfig, NestingConfig, Result};
use kerfnest_d2::{
    GeneticOrdering, LocalRefiner, MultiStart, NestingSolution, Nester, NfpCache, NfpCandidates,
    Polygon, RefineConfig,
};

use crate::config::CuttingConfig;
use crate::scorer::{MultiObjectiveScorer, ScoringWeights};

/// Validated configuration, placement (multi-start, or a genetic search
/// over sequences), optional refinement, then manufacturing metrics and the
/// weighted score. Every placement pass ends with gap filling.
///
/// The returned solution carries its metrics and score breakdown.
#[derive(Debug, Clone)]
pub struct NestingPipeline {
    config: NestingConfig,
    cutting: CuttingConfig,
    weights: ScoringWeights,
    refine: Option<RefineConfig>,
    nfp_candidates: bool,
    genetic: Option<GaConfig>,
    cache: Arc<NfpCache>,
}

impl NestingPipeline {
    /// Refinement follows the optimization settings: annealing when enabled,
    /// otherwise hill climbing when local search is enabled.
    pub fn new(config: NestingConfig) -> Result<Self> {
        config.validate()?;
        let opt = &config.optimization;
        let refine = if opt.enable_simulated_annealing {
            Some(RefineConfig::default())
        } else if opt.enable_local_search {
            Some(RefineConfig::hill_climbing())
        } else {
            None
        };
        Ok(Self {
            config,
            cutting: CuttingConfig::default(),
            weights: ScoringWeights::maximize_profit(),
            refine,
            nfp_candidates: false,
            genetic: None,
            cache: Arc::new(NfpCache::new()),
        })
    }

    pub fn with_cutting_config(mut self, cutting: CuttingConfig) -> Self {
        self.cutting = cutting;
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_refinement(mut self, refine: RefineConfig) -> Self {
        self.refine = Some(refine);
        self
    }

    pub fn without_refinement(mut self) -> Self {
        self.refine = None;
        self
    }

    /// Places parts at NFP vertices instead of grid points.
    pub fn with_nfp_candidates(mut self) -> Self {
        self.nfp_candidates = true;
        self
    }

    /// Searches part sequences with a genetic algorithm instead of multi-start.
    pub fn with_genetic_search(mut self, config: GaConfig) -> Self {
        self.genetic = Some(config);
        self
    }

    /// Reuses an NFP cache across runs.
    pub fn with_nfp_cache(mut self, cache: Arc<NfpCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &NestingConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<NfpCache> {
        &self.cache
    }

    pub fn scorer(&self) -> MultiObjectiveScorer {
        MultiObjectiveScorer::new(self.weights).with_cutting_config(self.cutting.clone())
    }

    /// Checks every configuration section.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        self.cutting.validate()?;
        self.weights.validate()
    }

    /// Nests `parts` within the configured time budget.
    ///
    /// Fails only on configuration errors, before any geometry work.
    /// Unplaceable or malformed parts end up in the solution's failure lists.
    pub fn run(&self, parts: &[Polygon]) -> Result<NestingSolution> {
        self.validate()?;
        let start = Instant::now();
        let scorer = self.scorer();

        let mut nester = Nester::new(self.config.clone())?.with_gap_fill(true);
        if self.nfp_candidates {
            nester = nester.with_candidate_policy(NfpCandidates::default());
        }
        let deadline = nester.deadline();

        let mut solution = match &self.genetic {
            Some(ga) => GeneticOrdering::new(nester.clone())
                .with_config(ga.clone())
                .with_shared_cache(Arc::clone(&self.cache))
                .run(parts),
            None => MultiStart::new(nester.clone())
                .with_ranker(scorer.clone())
                .with_shared_cache(Arc::clone(&self.cache))
                .run(parts),
        };

        if let Some(refine) = &self.refine {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                let budget = (remaining.as_millis() as u64).max(1);
                let limit = if refine.time_limit_ms == 0 {
                    budget
                } else {
                    refine.time_limit_ms.min(budget)
                };
                let refiner = LocalRefiner::new(nester, refine.clone().with_time_limit_ms(limit));
                let result = refiner.refine(&solution);
                if scorer.compare(&result.solution, &solution) != Ordering::Less {
                    solution = result.solution;
                }
            }
        }

        let score = scorer.score_and_cache(&mut solution);
        solution.elapsed_ms = start.elapsed().as_millis() as u64;

        let stats = self.cache.stats();
        log::info!(
            "nested {}/{} parts with {}: utilization {:.2}%, score {:.1}, {} ms, NFP cache {} hits / {} misses",
            solution.placed().len(),
            parts.len(),
            solution.strategy,
            solution.utilization(),
            score,
            solution.elapsed_ms,
            stats.hits,
            stats.misses
        );
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kerfnest_core::{OptimizationSettings, SheetConstraints};

    fn config() -> NestingConfig {
        NestingConfig::for_sheet(SheetConstraints::new(400.0, 300.0))
            .unwrap()
            .with_optimization(
                OptimizationSettings::default()
                    .with_num_multi_starts(3)
                    .with_max_runtime_seconds(20.0),
            )
    }

    #[test]
    fn test_refinement_follows_settings() {
        let pipeline = NestingPipeline::new(config()).unwrap();
        assert!(pipeline.refine.is_some());

        let cfg = config().with_optimization(
            OptimizationSettings::default()
                .with_local_search(false)
                .with_simulated_annealing(false),
        );
        assert!(NestingPipeline::new(cfg).unwrap().refine.is_none());
    }

    #[test]
    fn test_run_attaches_metrics_and_breakdown() {
        let pipeline = NestingPipeline::new(config()).unwrap();
        let parts: Vec<Polygon> = (0..4)
            .map(|i| Polygon::rectangle(format!("p{}", i), 60.0, 40.0))
            .collect();
        let solution = pipeline.run(&parts).unwrap();
        assert_eq!(solution.placed().len(), 4);
        assert!(solution.metrics().is_some());
        let breakdown = solution.breakdown().unwrap();
        assert!((0.0..=100.0).contains(&breakdown.total));
    }

    #[test]
    fn test_genetic_search_replaces_multi_start() {
        let ga = GaConfig::default()
            .with_population_size(6)
            .with_max_generations(3)
            .with_seed(4);
        let pipeline = NestingPipeline::new(config())
            .unwrap()
            .without_refinement()
            .with_genetic_search(ga);
        let parts: Vec<Polygon> = (0..5)
            .map(|i| Polygon::rectangle(format!("p{}", i), 70.0, 40.0 + i as f64 * 5.0))
            .collect();
        let solution = pipeline.run(&parts).unwrap();
        assert_eq!(solution.strategy, "genetic");
        assert_eq!(solution.placed().len(), 5);
        assert!(solution.breakdown().is_some());
    }

    #[test]
    fn test_invalid_cutting_config_fails_fast() {
        let mut cutting = CuttingConfig::default();
        cutting.material.rapid_speed = 0.0;
        let pipeline = NestingPipeline::new(config()).unwrap().with_cutting_config(cutting);
        assert!(pipeline.run(&[Polygon::rectangle("a", 10.0, 10.0)]).is_err());
    }
}
