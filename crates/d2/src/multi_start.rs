//! Multi-start placement.
//!
//! Runs the same nester under several orderings as fully independent tasks
//! and keeps the best layout. Each task owns its collision detector; the
//! only thing that may cross task boundaries is the NFP cache, which is
//! insert-once per key.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::geometry::Polygon;
use crate::nester::Nester;
use crate::nfp::NfpCache;
use crate::ordering::PartOrdering;
use crate::solution::NestingSolution;

/// Decides which of two solutions is better.
pub trait SolutionRanker: Send + Sync {
    /// `Ordering::Greater` when `a` is better than `b`.
    fn compare(&self, a: &NestingSolution, b: &NestingSolution) -> Ordering;
}

/// Higher utilization wins, then more placed parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtilizationRanker;

impl SolutionRanker for UtilizationRanker {
    fn compare(&self, a: &NestingSolution, b: &NestingSolution) -> Ordering {
        a.utilization()
            .partial_cmp(&b.utilization())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.placed().len().cmp(&b.placed().len()))
    }
}

/// Best-of-N placement over a set of orderings.
pub struct MultiStart {
    nester: Nester,
    orderings: Vec<PartOrdering>,
    ranker: Arc<dyn SolutionRanker>,
    shared_cache: Option<Arc<NfpCache>>,
    parallel: bool,
}

impl MultiStart {
    /// Uses `num_multi_starts` orderings from [`PartOrdering::multi_start_set`].
    pub fn new(nester: Nester) -> Self {
        let count = nester.config().optimization.num_multi_starts;
        Self {
            nester,
            orderings: PartOrdering::multi_start_set(count),
            ranker: Arc::new(UtilizationRanker),
            shared_cache: None,
            parallel: true,
        }
    }

    /// Replaces the ordering set. An empty set is ignored.
    pub fn with_orderings(mut self, orderings: Vec<PartOrdering>) -> Self {
        if !orderings.is_empty() {
            self.orderings = orderings;
        }
        self
    }

    pub fn with_ranker(mut self, ranker: impl SolutionRanker + 'static) -> Self {
        self.ranker = Arc::new(ranker);
        self
    }

    /// Shares one NFP cache across all starts instead of one per start.
    pub fn with_shared_cache(mut self, cache: Arc<NfpCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Runs the starts one after another on the calling thread.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn orderings(&self) -> &[PartOrdering] {
        &self.orderings
    }

    pub fn nester(&self) -> &Nester {
        &self.nester
    }

    /// Runs every start within the nester's time budget and returns the best
    /// solution. Ties go to the earlier ordering.
    ///
    /// Once a start reaches the configured `target_utilization`, starts that
    /// have not begun yet are skipped. A target of 0 disables this.
    pub fn run(&self, parts: &[Polygon]) -> NestingSolution {
        let start = Instant::now();
        let deadline = self.nester.deadline();
        let (usable, rejected) = self.nester.prepare(parts);
        let target = self.nester.config().optimization.target_utilization;
        let reached = AtomicBool::new(false);

        let attempt = |ordering: &PartOrdering| {
            if reached.load(AtomicOrdering::Relaxed) {
                return None;
            }
            let cache = self
                .shared_cache
                .clone()
                .unwrap_or_else(|| Arc::new(NfpCache::new()));
            let nester = self
                .nester
                .clone()
                .with_ordering(*ordering)
                .with_nfp_cache(cache);
            let solution = nester.nest_prepared(&usable, deadline);
            log::debug!(
                "multi-start {}: {:.2}% with {} failed",
                solution.strategy,
                solution.utilization(),
                solution.failed_parts().len()
            );
            if target > 0.0 && solution.utilization() >= target {
                log::debug!(
                    "multi-start {} reached the {:.1}% target, skipping remaining starts",
                    solution.strategy,
                    target
                );
                reached.store(true, AtomicOrdering::Relaxed);
            }
            Some(solution)
        };

        let results: Vec<Option<NestingSolution>> = if self.parallel {
            self.orderings.par_iter().map(attempt).collect()
        } else {
            self.orderings.iter().map(attempt).collect()
        };

        let mut best: Option<NestingSolution> = None;
        for solution in results.into_iter().flatten() {
            let better = match &best {
                Some(current) => self.ranker.compare(&solution, current) == Ordering::Greater,
                None => true,
            };
            if better {
                best = Some(solution);
            }
        }

        let mut solution = best.unwrap_or_else(|| NestingSolution::new(self.nester.config().sheet.clone()));
        for failure in rejected {
            solution.push_rejected(failure);
        }
        solution.elapsed_ms = start.elapsed().as_millis() as u64;
        log::debug!(
            "multi-start picked {} out of {} starts ({:.2}%)",
            solution.strategy,
            self.orderings.len(),
            solution.utilization()
        );
        solution
    }
}
