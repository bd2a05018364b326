//! Placement search.
//!
//! One contract, three pluggable policies: an [`OrderingPolicy`] decides the
//! sequence, a [`CandidatePolicy`] enumerates positions for each allowed
//! rotation, and a [`PositionScorer`] ranks them. Each part is committed at
//! the best-scoring position that passes the [`CollisionDetector`]; a part
//! with no valid position is recorded as failed and placement continues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kerfnest_core::{ManufacturingConstraints, NestingConfig, Result};

use crate::candidates::{CandidateContext, CandidatePolicy, GridCandidates, StationaryPart};
use crate::collision::{CollisionDetector, PlacedPart, Rejection};
use crate::geometry::Polygon;
use crate::nfp::{NfpCache, NfpEngine};
use crate::ordering::{OrderingPolicy, PartOrdering};
use crate::scoring::{BottomLeftCompactness, PositionScorer};
use crate::solution::{FailureReason, NestingSolution, PlacementFailure};

/// Area from which a part belongs to the large tier.
pub const LARGE_TIER_AREA: f64 = 5000.0;
/// Area from which a part belongs to the medium tier.
pub const MEDIUM_TIER_AREA: f64 = 1000.0;
/// Grid steps for the large, medium and small tiers.
pub const TIER_STEPS: [f64; 3] = [10.0, 7.0, 5.0];

/// Default cap on exact collision checks per part and rotation.
pub const DEFAULT_MAX_CHECKS: usize = 2000;

/// Grid step of the gap-filling pass.
pub const GAP_FILL_STEP: f64 = 1.5;
/// Position and collision-check cap per rotation during gap filling.
pub const GAP_FILL_MAX_POSITIONS: usize = 40_000;

/// Extra clearance added to grown shapes fed to the NFP policy so that
/// touching NFP positions clear the detector's spacing test.
const NFP_CLEARANCE: f64 = 0.01;

/// Size tier for multi-pass placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeTier {
    Large,
    Medium,
    Small,
}

impl SizeTier {
    pub fn of(polygon: &Polygon) -> Self {
        let area = polygon.area();
        if area >= LARGE_TIER_AREA {
            SizeTier::Large
        } else if area >= MEDIUM_TIER_AREA {
            SizeTier::Medium
        } else {
            SizeTier::Small
        }
    }

    pub fn grid_step(self) -> f64 {
        match self {
            SizeTier::Large => TIER_STEPS[0],
            SizeTier::Medium => TIER_STEPS[1],
            SizeTier::Small => TIER_STEPS[2],
        }
    }
}

/// Mutable state of one placement pass: the detector plus, when the
/// candidate policy needs them, the grown shapes of placed parts.
#[derive(Debug, Clone)]
pub struct PlacementState {
    detector: CollisionDetector,
    stationary: Vec<StationaryPart>,
    track_nfp: bool,
}

impl PlacementState {
    pub fn new(detector: CollisionDetector, track_nfp: bool) -> Self {
        Self {
            detector,
            stationary: Vec::new(),
            track_nfp,
        }
    }

    pub fn detector(&self) -> &CollisionDetector {
        &self.detector
    }

    pub fn into_placed(self) -> Vec<PlacedPart> {
        self.detector.into_placed()
    }

    fn commit(&mut self, part: PlacedPart) -> std::result::Result<(), Rejection> {
        let stationary = self
            .track_nfp
            .then(|| stationary_part(&part, self.detector.spacing()));
        self.detector.place(part)?;
        self.stationary.extend(stationary);
        Ok(())
    }
}

/// Rotated local shape of a placed part, grown by the spacing for NFP use.
fn stationary_part(part: &PlacedPart, spacing: f64) -> StationaryPart {
    let rotated = part.rotated();
    let shape = if spacing > 0.0 {
        rotated.buffer(spacing + NFP_CLEARANCE).unwrap_or(rotated)
    } else {
        rotated
    };
    StationaryPart {
        shape: Arc::new(shape),
        x: part.x,
        y: part.y,
    }
}

/// Placement search over one sheet.
#[derive(Clone)]
pub struct Nester {
    config: NestingConfig,
    ordering: Arc<dyn OrderingPolicy>,
    candidates: Arc<dyn CandidatePolicy>,
    scorer: Arc<dyn PositionScorer>,
    engine: NfpEngine,
    cancelled: Arc<AtomicBool>,
    max_checks: usize,
    gap_fill: bool,
}

impl std::fmt::Debug for Nester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nester")
            .field("ordering", &self.ordering.name())
            .field("candidates", &self.candidates.name())
            .field("max_checks", &self.max_checks)
            .field("gap_fill", &self.gap_fill)
            .finish()
    }
}

impl Nester {
    /// Creates a nester with difficulty-first ordering, adaptive grid
    /// candidates and bottom-left/compactness scoring.
    ///
    /// The configuration is validated before anything else happens.
    pub fn new(config: NestingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ordering: Arc::new(PartOrdering::DifficultyFirst),
            candidates: Arc::new(GridCandidates::default()),
            scorer: Arc::new(BottomLeftCompactness::default()),
            // Spacing is enforced by the detector, so NFPs stay purely geometric.
            engine: NfpEngine::new(ManufacturingConstraints::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
            max_checks: DEFAULT_MAX_CHECKS,
            gap_fill: false,
        })
    }

    pub fn with_ordering(mut self, ordering: impl OrderingPolicy + 'static) -> Self {
        self.ordering = Arc::new(ordering);
        self
    }

    pub fn with_candidate_policy(mut self, policy: impl CandidatePolicy + 'static) -> Self {
        self.candidates = Arc::new(policy);
        self
    }

    pub fn with_scorer(mut self, scorer: impl PositionScorer + 'static) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    /// Shares an NFP cache with other nesters.
    pub fn with_nfp_cache(mut self, cache: Arc<NfpCache>) -> Self {
        self.engine = NfpEngine::with_cache(cache, ManufacturingConstraints::default());
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn with_max_checks(mut self, max_checks: usize) -> Self {
        self.max_checks = max_checks.max(1);
        self
    }

    /// Ends every single pass with [`Nester::fill_gaps`]. Multi-pass
    /// placement always fills gaps.
    pub fn with_gap_fill(mut self, enabled: bool) -> Self {
        self.gap_fill = enabled;
        self
    }

    pub fn config(&self) -> &NestingConfig {
        &self.config
    }

    pub fn ordering_name(&self) -> String {
        self.ordering.name()
    }

    pub fn engine(&self) -> &NfpEngine {
        &self.engine
    }

    /// Requests cooperative cancellation. The flag stays set until [`Nester::reset`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Deadline for a run starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + Duration::from_secs_f64(self.config.optimization.max_runtime_seconds)
    }

    /// Empty placement state for this configuration.
    pub fn new_state(&self) -> PlacementState {
        PlacementState::new(
            CollisionDetector::new(&self.config.sheet, self.config.spacing.total_spacing()),
            self.candidates.uses_nfp(),
        )
    }

    /// Placement state holding an already validated layout.
    pub fn state_from_layout(&self, parts: impl IntoIterator<Item = PlacedPart>) -> PlacementState {
        let mut state = self.new_state();
        let detector = CollisionDetector::from_layout(
            &self.config.sheet,
            self.config.spacing.total_spacing(),
            parts,
        );
        if state.track_nfp {
            let spacing = detector.spacing();
            state.stationary = detector
                .placed()
                .map(|p| stationary_part(p, spacing))
                .collect();
        }
        state.detector = detector;
        state
    }

    /// Repairs inputs where possible and splits off the unusable ones.
    pub fn prepare(&self, parts: &[Polygon]) -> (Vec<Arc<Polygon>>, Vec<PlacementFailure>) {
        let mut usable = Vec::with_capacity(parts.len());
        let mut rejected = Vec::new();
        for part in parts {
            match part.repaired() {
                Ok(p) => usable.push(Arc::new(p)),
                Err(e) => {
                    log::warn!("excluding part '{}' from the run: {}", part.id(), e);
                    rejected.push(PlacementFailure::new(
                        Arc::new(part.clone()),
                        FailureReason::InvalidGeometry(e.to_string()),
                    ));
                }
            }
        }
        (usable, rejected)
    }

    /// Single pass over all parts within the configured time budget.
    pub fn nest(&self, parts: &[Polygon]) -> NestingSolution {
        self.nest_until(parts, self.deadline())
    }

    /// Single pass that stops committing parts at `deadline`.
    pub fn nest_until(&self, parts: &[Polygon], deadline: Instant) -> NestingSolution {
        let (usable, rejected) = self.prepare(parts);
        let mut solution = self.nest_prepared(&usable, deadline);
        for failure in rejected {
            solution.push_rejected(failure);
        }
        solution
    }

    /// Single pass over parts that were already prepared.
    pub fn nest_prepared(&self, parts: &[Arc<Polygon>], deadline: Instant) -> NestingSolution {
        let start = Instant::now();
        let order = self.ordering.order(parts);
        let mut state = self.new_state();
        let mut failures = Vec::new();
        let mut exhausted = false;

        self.place_sequence(
            &mut state,
            order.iter().map(|&i| &parts[i]),
            None,
            deadline,
            &mut exhausted,
            &mut failures,
        );
        if self.gap_fill && !exhausted {
            failures = self.fill_gaps(&mut state, failures, deadline);
        }

        let mut solution = NestingSolution::new(self.config.sheet.clone())
            .with_strategy(self.ordering.name())
            .with_placed(state.into_placed());
        solution.set_failed(failures);
        solution.elapsed_ms = start.elapsed().as_millis() as u64;
        log::debug!(
            "{}: placed {}/{} parts, utilization {:.2}% in {} ms",
            solution.strategy,
            solution.placed().len(),
            parts.len(),
            solution.utilization(),
            solution.elapsed_ms
        );
        solution
    }

    /// Places parts tier by tier (large, medium, small), each tier with its
    /// own grid step and ordered by the ordering policy, then fills gaps.
    pub fn nest_multi_pass(&self, parts: &[Polygon]) -> NestingSolution {
        let start = Instant::now();
        let deadline = self.deadline();
        let (usable, rejected) = self.prepare(parts);

        let mut state = self.new_state();
        let mut failures = Vec::new();
        let mut exhausted = false;

        for tier in [SizeTier::Large, SizeTier::Medium, SizeTier::Small] {
            let members: Vec<Arc<Polygon>> = usable
                .iter()
                .filter(|p| SizeTier::of(p) == tier)
                .cloned()
                .collect();
            if members.is_empty() {
                continue;
            }
            log::debug!("multi-pass tier {:?}: {} parts", tier, members.len());
            let order = self.ordering.order(&members);
            self.place_sequence(
                &mut state,
                order.iter().map(|&i| &members[i]),
                Some(tier.grid_step()),
                deadline,
                &mut exhausted,
                &mut failures,
            );
        }
        if !exhausted {
            failures = self.fill_gaps(&mut state, failures, deadline);
        }

        let mut solution = NestingSolution::new(self.config.sheet.clone())
            .with_strategy(format!("multi_pass_{}", self.ordering.name()))
            .with_placed(state.into_placed());
        solution.set_failed(failures);
        for failure in rejected {
            solution.push_rejected(failure);
        }
        solution.elapsed_ms = start.elapsed().as_millis() as u64;
        solution
    }

    fn place_sequence<'a>(
        &self,
        state: &mut PlacementState,
        parts: impl Iterator<Item = &'a Arc<Polygon>>,
        step_hint: Option<f64>,
        deadline: Instant,
        exhausted: &mut bool,
        failures: &mut Vec<PlacementFailure>,
    ) {
        for part in parts {
            if !*exhausted && (self.is_cancelled() || Instant::now() >= deadline) {
                log::info!(
                    "placement budget exhausted after {} parts; returning the layout so far",
                    state.detector.len()
                );
                *exhausted = true;
            }
            if *exhausted {
                failures.push(PlacementFailure::new(
                    Arc::clone(part),
                    FailureReason::BudgetExhausted,
                ));
                continue;
            }

            if let Err(failure) = self.place_part(state, part, step_hint) {
                log::debug!("{}", failure);
                failures.push(failure);
            }
        }
    }

    /// Retries parts that found no valid position on a fine grid against
    /// the committed layout, largest first.
    ///
    /// Other failures are returned untouched, and so is every part once the
    /// deadline passes or the run is cancelled.
    pub fn fill_gaps(
        &self,
        state: &mut PlacementState,
        failures: Vec<PlacementFailure>,
        deadline: Instant,
    ) -> Vec<PlacementFailure> {
        let (mut retry, mut remaining): (Vec<_>, Vec<_>) = failures
            .into_iter()
            .partition(|f| f.reason == FailureReason::NoValidPosition);
        if retry.is_empty() {
            return remaining;
        }
        retry.sort_by(|a, b| {
            b.polygon
                .area()
                .partial_cmp(&a.polygon.area())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let fine = GridCandidates {
            step: Some(GAP_FILL_STEP),
            max_positions: GAP_FILL_MAX_POSITIONS,
            contact_lines: true,
        };
        let mut filled = 0;
        for failure in retry {
            if self.is_cancelled() || Instant::now() >= deadline {
                remaining.push(failure);
                continue;
            }
            match self.place_with(state, &failure.polygon, None, &fine, GAP_FILL_MAX_POSITIONS) {
                Ok(_) => filled += 1,
                Err(failure) => remaining.push(failure),
            }
        }
        log::debug!(
            "gap fill placed {} parts, {} still unplaced",
            filled,
            remaining.len()
        );
        remaining
    }

    /// Finds the best valid position for `part` over all its allowed
    /// rotations and commits it.
    ///
    /// Candidates that cannot beat the best valid score so far are skipped
    /// before any collision test, and the search stops as soon as a valid
    /// candidate reaches the scorer's good-enough threshold.
    pub fn place_part(
        &self,
        state: &mut PlacementState,
        part: &Arc<Polygon>,
        step_hint: Option<f64>,
    ) -> std::result::Result<PlacedPart, PlacementFailure> {
        self.place_with(state, part, step_hint, self.candidates.as_ref(), self.max_checks)
    }

    fn place_with(
        &self,
        state: &mut PlacementState,
        part: &Arc<Polygon>,
        step_hint: Option<f64>,
        candidates: &dyn CandidatePolicy,
        max_checks: usize,
    ) -> std::result::Result<PlacedPart, PlacementFailure> {
        let bounds = *state.detector.bounds();
        let angles = self.config.rotation.allowed_for(part.id());
        let angles: &[f64] = if angles.is_empty() { &[0.0] } else { &angles };
        let good_enough = self.scorer.good_enough();

        let mut fits = false;
        let mut best: Option<(f64, PlacedPart)> = None;

        'rotations: for &angle in angles {
            let rotated = part.rotate(angle);
            let Some(ifp) = NfpEngine::inner_fit_rect(&bounds, &rotated) else {
                continue;
            };
            fits = true;

            let ctx = CandidateContext {
                part,
                rotated: &rotated,
                rotation: angle,
                ifp,
                step_hint,
                placed: &state.stationary,
                engine: &self.engine,
                detector: &state.detector,
            };
            let local_box = rotated.bounding_box();
            let mut checks = 0;

            for t in candidates.candidates(&ctx) {
                let bbox = local_box.translate(t.x, t.y);
                let score = self.scorer.score(&state.detector, &bbox, angle);
                if best.as_ref().is_some_and(|(b, _)| score <= *b) {
                    continue;
                }
                if checks >= max_checks {
                    break;
                }
                checks += 1;
                if state.detector.check_rotated(&rotated, t.x, t.y).is_ok() {
                    best = Some((score, PlacedPart::new(Arc::clone(part), t.x, t.y, angle)));
                    if score >= good_enough {
                        break 'rotations;
                    }
                }
            }
        }

        let Some((_, placed)) = best else {
            let reason = if fits {
                FailureReason::NoValidPosition
            } else {
                FailureReason::DoesNotFit
            };
            return Err(PlacementFailure::new(Arc::clone(part), reason));
        };

        state.commit(placed.clone()).map_err(|rejection| {
            log::warn!("validated placement was refused on commit: {}", rejection);
            PlacementFailure::new(Arc::clone(part), FailureReason::NoValidPosition)
        })?;
        Ok(placed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::NfpCandidates;
    use approx::assert_relative_eq;
    use kerfnest_core::{RotationConstraints, SheetConstraints, SpacingConstraints};

    fn config(width: f64, height: f64) -> NestingConfig {
        NestingConfig::for_sheet(SheetConstraints::new(width, height))
            .unwrap()
            .with_spacing(SpacingConstraints::none())
            .with_rotation(RotationConstraints::no_rotation())
    }

    fn assert_no_overlap(solution: &NestingSolution) {
        let geoms = solution.placed_geometries();
        for i in 0..geoms.len() {
            for j in (i + 1)..geoms.len() {
                assert!(
                    geoms[i].intersection_area(&geoms[j]) < 1e-6,
                    "{} overlaps {}",
                    geoms[i].id(),
                    geoms[j].id()
                );
            }
        }
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut cfg = config(600.0, 400.0);
        cfg.sheet.width = -1.0;
        assert!(Nester::new(cfg).is_err());
    }

    #[test]
    fn test_single_part_goes_to_corner() {
        let nester = Nester::new(config(600.0, 400.0)).unwrap();
        let solution = nester.nest(&[Polygon::rectangle("r", 100.0, 50.0)]);
        assert_eq!(solution.placed().len(), 1);
        let p = &solution.placed()[0];
        assert_relative_eq!(p.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_oversized_part_fails_without_blocking_others() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        let parts = vec![
            Polygon::rectangle("huge", 500.0, 500.0),
            Polygon::rectangle("a", 40.0, 40.0),
            Polygon::rectangle("b", 40.0, 40.0),
        ];
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 2);
        assert_eq!(solution.failed_parts().len(), 1);
        assert_eq!(solution.failed_parts()[0].part_id, "huge");
        assert_eq!(solution.failed_parts()[0].reason, FailureReason::DoesNotFit);
        assert_no_overlap(&solution);
    }

    #[test]
    fn test_full_sheet_reports_no_valid_position() {
        let nester = Nester::new(config(110.0, 110.0)).unwrap();
        let parts = vec![
            Polygon::rectangle("a", 100.0, 100.0),
            Polygon::rectangle("b", 60.0, 60.0),
        ];
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 1);
        assert_eq!(solution.failed_parts()[0].reason, FailureReason::NoValidPosition);
    }

    #[test]
    fn test_rotation_used_when_required() {
        let cfg = config(100.0, 400.0).with_rotation(RotationConstraints::cardinal());
        let nester = Nester::new(cfg).unwrap();
        let solution = nester.nest(&[Polygon::rectangle("bar", 300.0, 20.0)]);
        assert_eq!(solution.placed().len(), 1);
        let p = &solution.placed()[0];
        assert!(p.rotation == 90.0 || p.rotation == 270.0);
        let bbox = p.bounding_box();
        assert!(bbox.min_x >= 5.0 - 1e-6 && bbox.max_x <= 95.0 + 1e-6);
    }

    #[test]
    fn test_spacing_respected() {
        let cfg = config(300.0, 100.0).with_spacing(SpacingConstraints::new(1.0, 3.0));
        let nester = Nester::new(cfg).unwrap();
        let parts: Vec<Polygon> = (0..4)
            .map(|i| Polygon::rectangle(format!("p{}", i), 50.0, 50.0))
            .collect();
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 4);
        let boxes: Vec<_> = solution.placed().iter().map(|p| p.bounding_box()).collect();
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                assert!(boxes[i].distance_to(&boxes[j]) >= 4.0 - 1e-6);
            }
        }
    }

    #[test]
    fn test_invalid_part_rejected_not_fatal() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        let parts = vec![
            Polygon::from_coords("line", &[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]),
            Polygon::rectangle("ok", 20.0, 20.0),
        ];
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 1);
        assert_eq!(solution.rejected_parts().len(), 1);
        assert_eq!(solution.rejected_parts()[0].part_id, "line");
    }

    #[test]
    fn test_expired_deadline_returns_partial_solution() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        let parts: Vec<Polygon> = (0..3)
            .map(|i| Polygon::rectangle(format!("p{}", i), 20.0, 20.0))
            .collect();
        let solution = nester.nest_until(&parts, Instant::now());
        assert!(solution.placed().is_empty());
        assert_eq!(solution.failed_parts().len(), 3);
        assert!(solution
            .failed_parts()
            .iter()
            .all(|f| f.reason == FailureReason::BudgetExhausted));
    }

    #[test]
    fn test_cancel_flag() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        nester.cancel();
        assert!(nester.is_cancelled());
        let solution = nester.nest(&[Polygon::rectangle("a", 20.0, 20.0)]);
        assert!(solution.placed().is_empty());

        nester.reset();
        let solution = nester.nest(&[Polygon::rectangle("a", 20.0, 20.0)]);
        assert_eq!(solution.placed().len(), 1);
    }

    #[test]
    fn test_multi_pass_places_all_tiers() {
        let nester = Nester::new(config(400.0, 300.0)).unwrap();
        let mut parts = vec![
            Polygon::rectangle("large", 100.0, 80.0),
            Polygon::rectangle("medium", 40.0, 30.0),
        ];
        parts.extend((0..5).map(|i| Polygon::rectangle(format!("small{}", i), 20.0, 15.0)));
        let solution = nester.nest_multi_pass(&parts);
        assert_eq!(solution.placed().len(), 7);
        assert_eq!(solution.placed()[0].id(), "large");
        assert_eq!(solution.placed()[1].id(), "medium");
        assert!(solution.strategy.starts_with("multi_pass_"));
        assert_no_overlap(&solution);
    }

    #[test]
    fn test_size_tiers() {
        assert_eq!(SizeTier::of(&Polygon::rectangle("a", 100.0, 50.0)), SizeTier::Large);
        assert_eq!(SizeTier::of(&Polygon::rectangle("b", 50.0, 20.0)), SizeTier::Medium);
        assert_eq!(SizeTier::of(&Polygon::rectangle("c", 10.0, 10.0)), SizeTier::Small);
        assert_relative_eq!(SizeTier::Small.grid_step(), 5.0);
    }

    #[test]
    fn test_nfp_policy_packs_l_shapes() {
        let cfg = config(300.0, 300.0).with_spacing(SpacingConstraints::new(0.0, 1.0));
        let nester = Nester::new(cfg)
            .unwrap()
            .with_candidate_policy(NfpCandidates::default());
        let parts: Vec<Polygon> = (0..4)
            .map(|i| Polygon::l_shape(format!("l{}", i), 80.0, 80.0, 30.0, 30.0))
            .collect();
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 4);
        assert_no_overlap(&solution);
        assert!(nester.engine().cache().stats().hits > 0);
    }

    #[test]
    fn test_place_part_into_existing_layout() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        let a = Arc::new(Polygon::rectangle("a", 50.0, 50.0));
        let mut state = nester.state_from_layout(vec![PlacedPart::new(Arc::clone(&a), 5.0, 5.0, 0.0)]);
        let placed = nester.place_part(&mut state, &a, None).unwrap();
        assert!(placed.x >= 55.0 - 1e-9 || placed.y >= 55.0 - 1e-9);
        assert_eq!(state.detector().len(), 2);
    }

    #[test]
    fn test_grain_sensitive_blocks_cross_grain_rotation() {
        let rotation = RotationConstraints::cardinal().with_grain_sensitive(true);
        let nester = Nester::new(config(100.0, 400.0).with_rotation(rotation)).unwrap();
        let solution = nester.nest(&[Polygon::rectangle("bar", 300.0, 20.0)]);
        assert!(solution.placed().is_empty());
        assert_eq!(solution.failed_parts()[0].reason, FailureReason::DoesNotFit);
    }

    /// Fills the usable region of a 200x200 sheet except for a 12.4 wide
    /// pocket at x = 66.3..78.7 (absolute), open from y = 105 to the top.
    fn pocketed_block() -> Polygon {
        Polygon::from_coords(
            "block",
            &[
                (0.0, 0.0),
                (189.9, 0.0),
                (189.9, 189.9),
                (73.7, 189.9),
                (73.7, 100.0),
                (61.3, 100.0),
                (61.3, 189.9),
                (0.0, 189.9),
            ],
        )
    }

    #[test]
    fn test_gap_fill_reaches_pocket_missed_by_coarse_grid() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        let parts = vec![pocketed_block(), Polygon::rectangle("plug", 12.0, 12.0)];

        // the 5mm grid of the small tier has no column inside the pocket
        let coarse = nester.nest(&parts);
        assert_eq!(coarse.placed().len(), 1);
        assert_eq!(coarse.failed_parts()[0].reason, FailureReason::NoValidPosition);

        let solution = nester.nest_multi_pass(&parts);
        assert_eq!(solution.placed().len(), 2);
        assert!(solution.failed_parts().is_empty());
        let plug = &solution.placed()[1];
        assert_eq!(plug.id(), "plug");
        assert!(plug.x >= 66.3 - 1e-9 && plug.x <= 66.7 + 1e-9, "x = {}", plug.x);
        assert!(plug.y >= 105.0 - 1e-9);
        assert_no_overlap(&solution);
    }

    #[test]
    fn test_single_pass_gap_fill_is_opt_in() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap().with_gap_fill(true);
        let parts = vec![pocketed_block(), Polygon::rectangle("plug", 12.0, 12.0)];
        let solution = nester.nest(&parts);
        assert_eq!(solution.placed().len(), 2);
        assert_no_overlap(&solution);
    }

    #[test]
    fn test_fill_gaps_passes_other_failures_through() {
        let nester = Nester::new(config(200.0, 200.0)).unwrap();
        let mut state = nester.state_from_layout(vec![PlacedPart::new(
            Arc::new(pocketed_block()),
            5.0,
            5.0,
            0.0,
        )]);
        let failures = vec![
            PlacementFailure::new(
                Arc::new(Polygon::rectangle("huge", 500.0, 500.0)),
                FailureReason::DoesNotFit,
            ),
            PlacementFailure::new(
                Arc::new(Polygon::rectangle("late", 12.0, 12.0)),
                FailureReason::BudgetExhausted,
            ),
            PlacementFailure::new(
                Arc::new(Polygon::rectangle("plug", 12.0, 12.0)),
                FailureReason::NoValidPosition,
            ),
        ];
        let deadline = nester.deadline();
        let remaining = nester.fill_gaps(&mut state, failures, deadline);
        let ids: Vec<&str> = remaining.iter().map(|f| f.part_id.as_str()).collect();
        assert_eq!(ids, vec!["huge", "late"]);
        assert_eq!(state.detector().len(), 2);

        // nothing is retried once the deadline has passed
        let mut state = nester.new_state();
        let late = vec![PlacementFailure::new(
            Arc::new(Polygon::rectangle("plug", 12.0, 12.0)),
            FailureReason::NoValidPosition,
        )];
        let remaining = nester.fill_gaps(&mut state, late, Instant::now());
        assert_eq!(remaining.len(), 1);
        assert_eq!(state.detector().len(), 0);
    }
}
