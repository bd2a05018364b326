//! No-Fit Polygon (NFP) and Inner-Fit region computation.
//!
//! The NFP of a stationary polygon A and an orbiting polygon B is the set of
//! translations `t` for which `B + t` overlaps A. It is computed as the
//! Minkowski sum `A ⊕ (-B)` with B's reference point at its local origin:
//!
//! - **Convex case**: edge-vector merge, O(n + m)
//! - **Non-convex case**: ear-clipping decomposition, pairwise convex sums and
//!   a union through `i_overlay`; the largest resulting component is kept
//! - **Fallback**: A grown by half of B's bounding-box diagonal and shifted by
//!   B's bounding-box centre. Never smaller than the exact NFP.
//!
//! All inputs are snapped to a 1e-3 lattice before clipping so repeated
//! computations are reproducible. Results are cached in an [`NfpCache`]
//! keyed by `(fingerprint(A), fingerprint(B), rotation bucket)`.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use kerfnest_core::robust::{
    orient2d, point_in_triangle_inclusive_robust, signed_area_robust, ScalingConfig,
};
use kerfnest_core::{normalize_angle, BoundingBox, Error, ManufacturingConstraints, Point, Result};

use crate::geometry::{from_overlay_path, orient_ring, to_overlay_path, Polygon};

/// NFPs whose area falls below this after the manufacturing offset are
/// reported as "no valid relative placement".
pub const COLLAPSE_AREA: f64 = 1.0;

/// How an NFP was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfpMethod {
    /// Minkowski sum (convex merge or decomposition + union).
    Exact,
    /// Conservative buffered stand-in after a backend failure.
    Fallback,
    /// Served from the cache.
    Cached,
}

/// An NFP in the stationary polygon's local frame.
#[derive(Debug, Clone)]
pub struct NfpResult {
    pub polygon: Arc<Polygon>,
    /// Tag for this call: `Cached` on a hit.
    pub method: NfpMethod,
    /// How the geometry was originally produced (`Exact` or `Fallback`).
    pub computed_by: NfpMethod,
}

impl NfpResult {
    /// Returns true if the geometry is the conservative fallback.
    pub fn is_fallback(&self) -> bool {
        self.computed_by == NfpMethod::Fallback
    }
}

/// Cached geometry for one key. `polygon` is `None` when the pair has no
/// valid relative placement.
#[derive(Debug)]
pub struct CachedNfp {
    pub polygon: Option<Arc<Polygon>>,
    pub computed_by: NfpMethod,
}

/// Cache key: `(stationary fingerprint, orbiting fingerprint, rotation bucket)`.
pub type NfpKey = (u64, u64, i64);

/// Rotation bucket with 0.1 degree resolution.
pub fn rotation_bucket(degrees: f64) -> i64 {
    ((normalize_angle(degrees) * 10.0).round() as i64).rem_euclid(3600)
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe NFP cache with insert-once-per-key semantics.
///
/// Shared across multi-start tasks via `Arc<NfpCache>`. Entries are never
/// replaced: the first value stored for a key is the one every later reader
/// sees. [`NfpCache::clear`] is the only invalidation.
#[derive(Debug, Default)]
pub struct NfpCache {
    entries: RwLock<HashMap<NfpKey, Arc<CachedNfp>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NfpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key, counting the hit or miss.
    pub fn get(&self, key: &NfpKey) -> Result<Option<Arc<CachedNfp>>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Internal(format!("Failed to acquire cache read lock: {}", e)))?;
        let found = entries.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    /// Stores `value` unless the key is already present; returns the stored entry.
    pub fn insert(&self, key: NfpKey, value: CachedNfp) -> Result<Arc<CachedNfp>> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Error::Internal(format!("Failed to acquire cache write lock: {}", e)))?;
        Ok(Arc::clone(
            entries.entry(key).or_insert_with(|| Arc::new(value)),
        ))
    }

    /// Returns `(entry, was_hit)`, computing outside of any lock on a miss.
    pub fn get_or_compute<F>(&self, key: NfpKey, compute: F) -> Result<(Arc<CachedNfp>, bool)>
    where
        F: FnOnce() -> CachedNfp,
    {
        if let Some(entry) = self.get(&key)? {
            return Ok((entry, true));
        }
        let value = compute();
        Ok((self.insert(key, value)?, false))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// NFP/IFP computation with caching and manufacturing offsets.
#[derive(Debug, Clone)]
pub struct NfpEngine {
    cache: Arc<NfpCache>,
    constraints: ManufacturingConstraints,
    scaling: ScalingConfig,
}

impl Default for NfpEngine {
    fn default() -> Self {
        Self::new(ManufacturingConstraints::default())
    }
}

impl NfpEngine {
    /// Creates an engine with its own cache.
    pub fn new(constraints: ManufacturingConstraints) -> Self {
        Self::with_cache(Arc::new(NfpCache::new()), constraints)
    }

    /// Creates an engine that shares `cache` with other engines.
    ///
    /// Every engine sharing a cache must use the same constraints.
    pub fn with_cache(cache: Arc<NfpCache>, constraints: ManufacturingConstraints) -> Self {
        Self {
            cache,
            constraints,
            scaling: ScalingConfig::default(),
        }
    }

    pub fn cache(&self) -> &Arc<NfpCache> {
        &self.cache
    }

    pub fn constraints(&self) -> &ManufacturingConstraints {
        &self.constraints
    }

    /// Replaces the manufacturing constraints. The whole cache is cleared
    /// when they change.
    pub fn set_constraints(&mut self, constraints: ManufacturingConstraints) -> Result<()> {
        constraints.validate()?;
        if constraints != self.constraints {
            self.cache.clear();
            self.constraints = constraints;
        }
        Ok(())
    }

    /// NFP of `stationary` (in its local frame) and `orbiting` rotated by
    /// `rotation` degrees about its origin.
    ///
    /// `Ok(None)` means the manufacturing offset collapsed the NFP: the pair
    /// has no valid relative placement. Backend failures never surface here;
    /// they produce a [`NfpMethod::Fallback`] result instead.
    pub fn compute_nfp(
        &self,
        stationary: &Polygon,
        orbiting: &Polygon,
        rotation: f64,
    ) -> Result<Option<NfpResult>> {
        let key = (
            stationary.fingerprint(),
            orbiting.fingerprint(),
            rotation_bucket(rotation),
        );
        let (entry, hit) = self.cache.get_or_compute(key, || {
            let rotated = orbiting.rotate(normalize_angle(rotation));
            self.compute_uncached(stationary, &rotated)
        })?;

        Ok(entry.polygon.as_ref().map(|polygon| NfpResult {
            polygon: Arc::clone(polygon),
            method: if hit { NfpMethod::Cached } else { entry.computed_by },
            computed_by: entry.computed_by,
        }))
    }

    fn compute_uncached(&self, stationary: &Polygon, rotated: &Polygon) -> CachedNfp {
        let (raw, computed_by) = match minkowski_nfp(stationary, rotated, &self.scaling) {
            Ok(nfp) => (Some(nfp), NfpMethod::Exact),
            Err(e) => {
                log::warn!(
                    "NFP '{}' vs '{}' fell back to buffered approximation: {}",
                    stationary.id(),
                    rotated.id(),
                    e
                );
                (fallback_nfp(stationary, rotated), NfpMethod::Fallback)
            }
        };

        let offset = self.constraints.nfp_offset();
        let polygon = raw.and_then(|nfp| {
            if offset <= 0.0 {
                return Some(nfp);
            }
            match nfp.buffer(-offset) {
                Some(shrunk) if shrunk.area() >= COLLAPSE_AREA => Some(shrunk),
                _ => {
                    log::debug!(
                        "NFP '{}' vs '{}' collapsed under manufacturing offset {:.3}",
                        stationary.id(),
                        rotated.id(),
                        offset
                    );
                    None
                }
            }
        });

        CachedNfp {
            polygon: polygon.map(Arc::new),
            computed_by,
        }
    }

    /// Valid translations for `part` (already rotated) inside a rectangular
    /// container. `None` when the part does not fit.
    pub fn inner_fit_rect(container: &BoundingBox, part: &Polygon) -> Option<BoundingBox> {
        let pb = part.bounding_box();
        let ifp = BoundingBox::new(
            container.min_x - pb.min_x,
            container.min_y - pb.min_y,
            container.max_x - pb.max_x,
            container.max_y - pb.max_y,
        );
        // Tolerate rounding when the part exactly matches the container.
        const FIT_TOLERANCE: f64 = 1e-9;
        if ifp.width() < -FIT_TOLERANCE || ifp.height() < -FIT_TOLERANCE {
            return None;
        }
        Some(BoundingBox::new(
            ifp.min_x,
            ifp.min_y,
            ifp.max_x.max(ifp.min_x),
            ifp.max_y.max(ifp.min_y),
        ))
    }

    /// Conservative valid-translation region for `part` (already rotated)
    /// inside an arbitrary container: the container eroded by the part's
    /// bounding-circle radius and shifted by the part's bounding-box centre.
    pub fn inner_fit_polygon(container: &Polygon, part: &Polygon) -> Option<Polygon> {
        if container.is_convex() {
            let rect = BoundingBox::from_points(container.exterior())?;
            let is_rect = container.vertex_count() == 4
                && (container.area() - rect.area()).abs() <= 1e-9 * rect.area().max(1.0);
            if is_rect {
                let ifp = Self::inner_fit_rect(&rect, part)?;
                return Some(rect_polygon(container.id(), &ifp));
            }
        }
        let pb = part.bounding_box();
        let center = pb.center();
        container
            .buffer(-pb.diagonal() / 2.0)
            .filter(|p| p.area() > 0.0)
            .map(|p| p.translate(-center.x, -center.y))
    }
}

/// Polygon for an axis-aligned box (degenerate boxes give a degenerate ring).
pub fn rect_polygon(id: &str, bbox: &BoundingBox) -> Polygon {
    Polygon::from_coords(
        id,
        &[
            (bbox.min_x, bbox.min_y),
            (bbox.max_x, bbox.min_y),
            (bbox.max_x, bbox.max_y),
            (bbox.min_x, bbox.max_y),
        ],
    )
}

/// Returns true if `point` lies strictly inside none of the NFPs.
pub fn point_outside_all(point: Point, nfps: &[&Polygon]) -> bool {
    nfps.iter().all(|nfp| !nfp.contains_point(point))
}

// ============================================================================
// Minkowski sums
// ============================================================================

/// Exact NFP `A ⊕ (-B)`. Errors describe why the backend could not produce one.
pub fn minkowski_nfp(
    stationary: &Polygon,
    rotated_orbiting: &Polygon,
    scaling: &ScalingConfig,
) -> Result<Polygon> {
    let a = remove_collinear(&scaling.snap_ring(stationary.exterior()));
    let reflected: Vec<Point> = rotated_orbiting.exterior().iter().map(|p| -*p).collect();
    let b = remove_collinear(&scaling.snap_ring(&reflected));

    if a.len() < 3 || b.len() < 3 {
        return Err(Error::NfpError(format!(
            "degenerate input ({} and {} vertices after snapping)",
            a.len(),
            b.len()
        )));
    }

    let id = format!("nfp:{}:{}", stationary.id(), rotated_orbiting.id());
    let a_convex = kerfnest_core::robust::is_convex_robust(&a);
    let b_convex = kerfnest_core::robust::is_convex_robust(&b);

    if a_convex && b_convex {
        let sum = minkowski_sum_convex(&a, &b);
        let nfp = Polygon::new(id, sum);
        if nfp.area() <= 0.0 {
            return Err(Error::NfpError("convex Minkowski sum is empty".into()));
        }
        return Ok(nfp);
    }

    let pieces_a = if a_convex { vec![a.clone()] } else { triangulate(&a)? };
    let pieces_b = if b_convex { vec![b.clone()] } else { triangulate(&b)? };

    let mut partial: Vec<Vec<Point>> = Vec::with_capacity(pieces_a.len() * pieces_b.len());
    for pa in &pieces_a {
        for pb in &pieces_b {
            let sum = minkowski_sum_convex(pa, pb);
            if sum.len() >= 3 && signed_area_robust(&sum).abs() > 0.0 {
                partial.push(sum);
            }
        }
    }

    let ring = union_rings(&partial)
        .ok_or_else(|| Error::NfpError("union of partial Minkowski sums is empty".into()))?;
    Ok(Polygon::new(id, scaling.snap_ring(&ring)))
}

/// Sides of the polygon circumscribing the fallback disk.
const FALLBACK_SIDES: usize = 16;

/// Conservative stand-in: A grown by half of B's bounding-box diagonal and
/// shifted by `-centre(B)`.
///
/// The growth is done on A's convex hull with a polygon circumscribing the
/// disk, so the result contains the exact NFP for any B.
pub fn fallback_nfp(stationary: &Polygon, rotated_orbiting: &Polygon) -> Option<Polygon> {
    let pb = rotated_orbiting.bounding_box();
    let radius = pb.diagonal() / 2.0;
    let center = pb.center();
    let id = format!("nfp-fallback:{}:{}", stationary.id(), rotated_orbiting.id());

    let hull = stationary.convex_hull();
    let base: Vec<Point> = if hull.len() >= 3 {
        hull.to_vec()
    } else {
        rect_polygon(&id, &stationary.bounding_box()).exterior().to_vec()
    };

    let step = 2.0 * PI / FALLBACK_SIDES as f64;
    let vertex_radius = radius / (step / 2.0).cos();
    let disk: Vec<Point> = (0..FALLBACK_SIDES)
        .map(|i| {
            let angle = i as f64 * step;
            Point::new(vertex_radius * angle.cos(), vertex_radius * angle.sin())
        })
        .collect();

    let grown = if base.len() >= 3 && signed_area_robust(&base).abs() > 0.0 {
        minkowski_sum_convex(&base, &disk)
    } else {
        // Point or segment: the disk around the bounding box corners
        let bbox = stationary.bounding_box();
        rect_polygon(&id, &bbox.expanded(vertex_radius))
            .exterior()
            .to_vec()
    };
    let polygon = Polygon::new(id, grown);
    if polygon.area() <= 0.0 {
        return None;
    }
    Some(polygon.translate(-center.x, -center.y))
}

/// Minkowski sum of two convex rings by merging edge vectors sorted by angle.
pub fn minkowski_sum_convex(poly_a: &[Point], poly_b: &[Point]) -> Vec<Point> {
    let a = orient_ring(poly_a.to_vec(), true);
    let b = orient_ring(poly_b.to_vec(), true);
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let edges_a = edge_vectors(&a);
    let edges_b = edge_vectors(&b);
    let start_a = bottom_left_index(&a);
    let start_b = bottom_left_index(&b);

    let (n_a, n_b) = (edges_a.len(), edges_b.len());
    let mut result = Vec::with_capacity(n_a + n_b);
    let mut current = a[start_a] + b[start_b];
    result.push(current);

    let (mut i_a, mut i_b) = (0, 0);
    while i_a < n_a || i_b < n_b {
        let ea = edges_a[(start_a + i_a) % n_a];
        let eb = edges_b[(start_b + i_b) % n_b];
        let take_a = i_b >= n_b || (i_a < n_a && edge_angle(ea) <= edge_angle(eb) + 1e-10);
        let take_b = i_a >= n_a || (i_b < n_b && edge_angle(eb) <= edge_angle(ea) + 1e-10);

        let mut step = Point::ORIGIN;
        if take_a {
            step = step + ea;
            i_a += 1;
        }
        if take_b {
            step = step + eb;
            i_b += 1;
        }
        current = current + step;
        result.push(current);
    }

    if result.len() > 1 && result[0].approx_eq(&result[result.len() - 1], 1e-9) {
        result.pop();
    }
    remove_collinear(&result)
}

fn edge_vectors(ring: &[Point]) -> Vec<Point> {
    let n = ring.len();
    (0..n).map(|i| ring[(i + 1) % n] - ring[i]).collect()
}

fn bottom_left_index(ring: &[Point]) -> usize {
    let mut min_idx = 0;
    for (i, p) in ring.iter().enumerate() {
        let m = ring[min_idx];
        if p.y < m.y || (p.y == m.y && p.x < m.x) {
            min_idx = i;
        }
    }
    min_idx
}

/// Angle of an edge vector in `[0, 2*pi)`.
fn edge_angle(v: Point) -> f64 {
    let angle = v.y.atan2(v.x);
    if angle < 0.0 {
        angle + 2.0 * PI
    } else {
        angle
    }
}

/// Drops vertices lying on the segment between their neighbours.
fn remove_collinear(ring: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = ring.to_vec();
    let mut changed = true;
    while changed && out.len() > 3 {
        changed = false;
        let n = out.len();
        for i in 0..n {
            let prev = out[(i + n - 1) % n];
            let next = out[(i + 1) % n];
            if out[i] == prev || orient2d(prev, out[i], next).is_collinear() {
                out.remove(i);
                changed = true;
                break;
            }
        }
    }
    out
}

/// Ear-clipping triangulation of a simple ring.
pub fn triangulate(ring: &[Point]) -> Result<Vec<Vec<Point>>> {
    let mut vertices = orient_ring(remove_collinear(ring), true);
    if vertices.len() < 3 {
        return Err(Error::NfpError("cannot triangulate fewer than 3 vertices".into()));
    }

    let mut triangles = Vec::with_capacity(vertices.len() - 2);
    while vertices.len() > 3 {
        let n = vertices.len();
        let ear = (0..n).find(|&i| is_ear(&vertices, (i + n - 1) % n, i, (i + 1) % n));
        match ear {
            Some(i) => {
                triangles.push(vec![
                    vertices[(i + n - 1) % n],
                    vertices[i],
                    vertices[(i + 1) % n],
                ]);
                vertices.remove(i);
            }
            None => {
                return Err(Error::NfpError(format!(
                    "no ear found with {} vertices left",
                    n
                )))
            }
        }
    }
    triangles.push(vertices);
    Ok(triangles)
}

fn is_ear(vertices: &[Point], prev: usize, curr: usize, next: usize) -> bool {
    let (a, b, c) = (vertices[prev], vertices[curr], vertices[next]);
    if !orient2d(a, b, c).is_ccw() {
        return false;
    }
    vertices.iter().enumerate().all(|(i, &p)| {
        i == prev
            || i == curr
            || i == next
            || p == a
            || p == b
            || p == c
            || !point_in_triangle_inclusive_robust(p, a, b, c)
    })
}

/// Union of rings; returns the outer ring of the largest component.
fn union_rings(rings: &[Vec<Point>]) -> Option<Vec<Point>> {
    match rings.len() {
        0 => return None,
        1 => return Some(rings[0].clone()),
        _ => {}
    }

    let subject: Vec<Vec<[f64; 2]>> = rings.iter().map(|r| to_overlay_path(r)).collect();
    let clip: Vec<Vec<[f64; 2]>> = Vec::new();
    let shapes = subject.overlay(&clip, OverlayRule::Union, FillRule::NonZero);

    shapes
        .into_iter()
        .filter_map(|shape| shape.into_iter().next())
        .map(from_overlay_path)
        .filter(|ring| ring.len() >= 3)
        .max_by(|a, b| {
            signed_area_robust(a)
                .abs()
                .total_cmp(&signed_area_robust(b).abs())
        })
}
