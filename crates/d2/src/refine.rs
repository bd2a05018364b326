//! Local refinement of a finished layout.
//!
//! Simulated annealing over four moves: swap two parts' positions, rotate
//! one part to another allowed angle, shift one part by a small random
//! offset, and reinsert a part that failed during placement. Every move is
//! validated against a detector rebuilt from the current layout minus the
//! moved parts before it is considered for acceptance. Hill climbing is the
//! same loop with strict-improvement acceptance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::collision::{CollisionDetector, PlacedPart};
use crate::nester::Nester;
use crate::solution::{NestingSolution, PlacementFailure};

/// Relative weight of layout extent when utilization is unchanged.
const EXTENT_WEIGHT: f64 = 1.0;

/// How a non-improving move is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptanceRule {
    /// Accept worse moves with probability `exp(delta / temperature)`.
    #[default]
    Metropolis,
    /// Accept only strict improvements.
    StrictImprovement,
}

/// Configuration for local refinement.
#[derive(Debug, Clone)]
pub struct RefineConfig {
    pub initial_temperature: f64,
    /// Annealing stops once the temperature reaches this floor.
    pub final_temperature: f64,
    /// Geometric decay factor applied every iteration.
    pub cooling_rate: f64,
    pub max_iterations: usize,
    /// Wall-clock budget in milliseconds (0 = no limit).
    pub time_limit_ms: u64,
    /// Maximum shift along each axis.
    pub shift_range: f64,
    pub swap_probability: f64,
    pub rotate_probability: f64,
    pub shift_probability: f64,
    /// Chance of trying a failed part first while any remain.
    pub reinsert_probability: f64,
    /// Random seed for reproducibility (None = random)
    pub seed: Option<u64>,
    pub acceptance: AcceptanceRule,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 100.0,
            final_temperature: 1.0,
            cooling_rate: 0.95,
            max_iterations: 200,
            time_limit_ms: 5000,
            shift_range: 10.0,
            swap_probability: 0.6,
            rotate_probability: 0.2,
            shift_probability: 0.2,
            reinsert_probability: 0.25,
            seed: None,
            acceptance: AcceptanceRule::Metropolis,
        }
    }
}

impl RefineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local search: strict improvements only, no temperature floor.
    pub fn hill_climbing() -> Self {
        Self {
            acceptance: AcceptanceRule::StrictImprovement,
            ..Self::default()
        }
    }

    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = ms;
        self
    }

    /// Set temperature parameters.
    pub fn with_temperature(mut self, initial: f64, cooling_rate: f64, final_temp: f64) -> Self {
        self.initial_temperature = initial.max(0.01);
        self.cooling_rate = cooling_rate.clamp(0.5, 0.9999);
        self.final_temperature = final_temp.max(0.001);
        self
    }

    pub fn with_shift_range(mut self, range: f64) -> Self {
        self.shift_range = range.abs();
        self
    }

    /// Relative weights of the swap, rotate and shift moves.
    pub fn with_move_probabilities(mut self, swap: f64, rotate: f64, shift: f64) -> Self {
        self.swap_probability = swap.max(0.0);
        self.rotate_probability = rotate.max(0.0);
        self.shift_probability = shift.max(0.0);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_acceptance(mut self, rule: AcceptanceRule) -> Self {
        self.acceptance = rule;
        self
    }
}

/// Outcome of a refinement run.
#[derive(Debug, Clone)]
pub struct RefineResult {
    /// Best layout seen, never worse than the input.
    pub solution: NestingSolution,
    pub iterations: usize,
    /// Valid moves that were accepted.
    pub accepted: usize,
    /// Times the best layout improved.
    pub improvements: usize,
    pub final_temperature: f64,
    pub elapsed_ms: u64,
}

/// Utilization first, layout extent as the tie-breaker.
#[derive(Debug, Clone, Copy)]
struct Fitness {
    utilization: f64,
    /// Layout bounding-box area over usable area.
    extent: f64,
}

impl Fitness {
    fn gain_to(&self, other: &Fitness) -> f64 {
        let delta = other.utilization - self.utilization;
        if delta.abs() > 1e-9 {
            delta
        } else {
            (self.extent - other.extent) * EXTENT_WEIGHT
        }
    }
}

#[derive(Debug, Clone)]
struct Layout {
    placed: Vec<PlacedPart>,
    failed: Vec<PlacementFailure>,
}

enum Move {
    Swap(usize, usize),
    Rotate(usize),
    Shift(usize),
    Reinsert(usize),
}

/// Improves a finished layout by local moves.
#[derive(Debug, Clone)]
pub struct LocalRefiner {
    nester: Nester,
    config: RefineConfig,
}

impl LocalRefiner {
    /// Moves are validated against the nester's sheet, spacing and rotation
    /// rules; failed parts are reinserted through its placement search.
    pub fn new(nester: Nester, config: RefineConfig) -> Self {
        Self { nester, config }
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Refines `solution` and returns the best layout seen.
    pub fn refine(&self, solution: &NestingSolution) -> RefineResult {
        let start = Instant::now();
        let time_limit = Duration::from_millis(self.config.time_limit_ms);
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut current = Layout {
            placed: solution.placed().to_vec(),
            failed: solution.failed_parts().to_vec(),
        };
        let mut current_fitness = self.fitness(&current.placed);
        let mut best = current.clone();
        let mut best_fitness = current_fitness;

        let mut temperature = self.config.initial_temperature;
        let mut iterations = 0;
        let mut accepted = 0;
        let mut improvements = 0;

        while iterations < self.config.max_iterations {
            if self.nester.is_cancelled()
                || (self.config.time_limit_ms > 0 && start.elapsed() >= time_limit)
            {
                break;
            }
            if self.config.acceptance == AcceptanceRule::Metropolis
                && temperature <= self.config.final_temperature
            {
                break;
            }
            if current.placed.is_empty() && current.failed.is_empty() {
                break;
            }
            iterations += 1;

            let candidate = self
                .propose(&current, &mut rng)
                .and_then(|mv| self.apply(&current, mv, &mut rng));
            if let Some(candidate) = candidate {
                let fitness = self.fitness(&candidate.placed);
                let gain = current_fitness.gain_to(&fitness);
                if self.accept(gain, temperature, &mut rng) {
                    accepted += 1;
                    current = candidate;
                    current_fitness = fitness;
                    if best_fitness.gain_to(&current_fitness) > 0.0 {
                        best = current.clone();
                        best_fitness = current_fitness;
                        improvements += 1;
                    }
                }
            }

            temperature = (temperature * self.config.cooling_rate).max(self.config.final_temperature);
        }

        let mut refined = solution.clone();
        refined.set_placed(best.placed);
        refined.set_failed(best.failed);
        refined.strategy = match self.config.acceptance {
            AcceptanceRule::Metropolis => format!("{}+annealing", solution.strategy),
            AcceptanceRule::StrictImprovement => format!("{}+hill_climbing", solution.strategy),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;
        refined.elapsed_ms = solution.elapsed_ms + elapsed_ms;

        log::debug!(
            "refinement: {} iterations, {} accepted, {} improvements, utilization {:.2}% -> {:.2}%",
            iterations,
            accepted,
            improvements,
            solution.utilization(),
            refined.utilization()
        );

        RefineResult {
            solution: refined,
            iterations,
            accepted,
            improvements,
            final_temperature: temperature,
            elapsed_ms,
        }
    }

    fn fitness(&self, placed: &[PlacedPart]) -> Fitness {
        let sheet = &self.nester.config().sheet;
        let used: f64 = placed.iter().map(PlacedPart::area).sum();
        let sheet_area = sheet.area();
        let utilization = if sheet_area > 0.0 {
            used / sheet_area * 100.0
        } else {
            0.0
        };
        let usable = sheet.usable_area();
        let extent = placed
            .iter()
            .map(PlacedPart::bounding_box)
            .reduce(|a, b| a.union(&b))
            .map_or(0.0, |b| if usable > 0.0 { b.area() / usable } else { 0.0 });
        Fitness {
            utilization,
            extent,
        }
    }

    fn accept(&self, gain: f64, temperature: f64, rng: &mut StdRng) -> bool {
        if gain > 0.0 {
            return true;
        }
        match self.config.acceptance {
            AcceptanceRule::StrictImprovement => false,
            AcceptanceRule::Metropolis => {
                temperature > 0.0 && rng.gen::<f64>() < (gain / temperature).exp()
            }
        }
    }

    fn propose(&self, layout: &Layout, rng: &mut StdRng) -> Option<Move> {
        if !layout.failed.is_empty()
            && (layout.placed.is_empty() || rng.gen::<f64>() < self.config.reinsert_probability)
        {
            return Some(Move::Reinsert(rng.gen_range(0..layout.failed.len())));
        }
        let n = layout.placed.len();
        if n == 0 {
            return None;
        }

        let cfg = &self.config;
        let total = cfg.swap_probability + cfg.rotate_probability + cfg.shift_probability;
        if total <= 0.0 {
            return None;
        }
        let roll = rng.gen::<f64>() * total;
        let i = rng.gen_range(0..n);
        if roll < cfg.swap_probability {
            if n < 2 {
                return None;
            }
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }
            Some(Move::Swap(i, j))
        } else if roll < cfg.swap_probability + cfg.rotate_probability {
            Some(Move::Rotate(i))
        } else {
            Some(Move::Shift(i))
        }
    }

    /// Applies a move if the result passes the collision detector.
    fn apply(&self, layout: &Layout, mv: Move, rng: &mut StdRng) -> Option<Layout> {
        match mv {
            Move::Swap(i, j) => {
                let a = &layout.placed[i];
                let b = &layout.placed[j];
                let (box_a, box_b) = (a.bounding_box(), b.bounding_box());
                let moved_a = anchored_at(a, a.rotation, box_b.min_x, box_b.min_y);
                let moved_b = anchored_at(b, b.rotation, box_a.min_x, box_a.min_y);
                let mut detector = self.detector_without(layout, &[i, j]);
                detector.place(moved_a.clone()).ok()?;
                detector.place(moved_b.clone()).ok()?;
                Some(replaced(layout, &[(i, moved_a), (j, moved_b)]))
            }
            Move::Rotate(i) => {
                let part = &layout.placed[i];
                let angles: Vec<f64> = self
                    .nester
                    .config()
                    .rotation
                    .allowed_for(part.id())
                    .into_iter()
                    .filter(|a| (a - part.rotation).abs() > 1e-9)
                    .collect();
                if angles.is_empty() {
                    return None;
                }
                let angle = angles[rng.gen_range(0..angles.len())];
                let bbox = part.bounding_box();
                let moved = anchored_at(part, angle, bbox.min_x, bbox.min_y);
                self.detector_without(layout, &[i]).place(moved.clone()).ok()?;
                Some(replaced(layout, &[(i, moved)]))
            }
            Move::Shift(i) => {
                let range = self.config.shift_range;
                if range <= 0.0 {
                    return None;
                }
                let part = &layout.placed[i];
                let dx = rng.gen_range(-range..=range);
                let dy = rng.gen_range(-range..=range);
                let moved = part.moved(part.x + dx, part.y + dy, part.rotation);
                self.detector_without(layout, &[i]).place(moved.clone()).ok()?;
                Some(replaced(layout, &[(i, moved)]))
            }
            Move::Reinsert(k) => {
                let polygon = Arc::clone(&layout.failed[k].polygon);
                let mut state = self.nester.state_from_layout(layout.placed.iter().cloned());
                self.nester.place_part(&mut state, &polygon, None).ok()?;
                let mut failed = layout.failed.clone();
                failed.remove(k);
                Some(Layout {
                    placed: state.into_placed(),
                    failed,
                })
            }
        }
    }

    fn detector_without(&self, layout: &Layout, skip: &[usize]) -> CollisionDetector {
        let config = self.nester.config();
        CollisionDetector::from_layout(
            &config.sheet,
            config.spacing.total_spacing(),
            layout
                .placed
                .iter()
                .enumerate()
                .filter(|(i, _)| !skip.contains(i))
                .map(|(_, p)| p.clone()),
        )
    }
}

/// `part` rotated to `rotation` with its bounding-box minimum at `(x, y)`.
fn anchored_at(part: &PlacedPart, rotation: f64, x: f64, y: f64) -> PlacedPart {
    let local = part.polygon.rotate(rotation).bounding_box();
    part.moved(x - local.min_x, y - local.min_y, rotation)
}

fn replaced(layout: &Layout, changes: &[(usize, PlacedPart)]) -> Layout {
    let mut placed = layout.placed.clone();
    for (index, part) in changes {
        placed[*index] = part.clone();
    }
    Layout {
        placed,
        failed: layout.failed.clone(),
    }
}
