//! 2D polygon type.
//!
//! [`Polygon`] is immutable by convention: every transform returns a new
//! value and derived properties are computed lazily and cached per value.
//! Boolean operations delegate to `geo` (backed by `i_overlay`) and always
//! reject on bounding-box disjointness before any exact test.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use geo::{
    Area, BooleanOps, Buffer, Centroid, Contains, ConvexHull, Coord, Intersects, LineString,
    MultiPolygon, Polygon as GeoPolygon,
};
use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use kerfnest_core::robust::{is_ccw_robust, orient2d, signed_area_robust, Orientation};
use kerfnest_core::{BoundingBox, Error, PartId, Point, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Area below which a polygon is treated as degenerate.
pub const AREA_EPSILON: f64 = 1e-9;

/// Distance within which a point counts as lying on a ring.
pub const BOUNDARY_EPSILON: f64 = 1e-9;

/// Lazily computed derived properties.
#[derive(Debug, Clone, Default)]
struct DerivedCache {
    area: OnceLock<f64>,
    perimeter: OnceLock<f64>,
    centroid: OnceLock<Point>,
    bbox: OnceLock<BoundingBox>,
    hull: OnceLock<Vec<Point>>,
    fingerprint: OnceLock<u64>,
}

/// A part outline with optional holes.
///
/// The exterior is stored counter-clockwise and holes clockwise, without a
/// closing duplicate vertex.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polygon {
    id: PartId,
    exterior: Vec<Point>,
    holes: Vec<Vec<Point>>,
    metadata: BTreeMap<String, String>,

    #[cfg_attr(feature = "serde", serde(skip))]
    cache: DerivedCache,
}

impl Polygon {
    /// Creates a polygon from its outer ring.
    pub fn new(id: impl Into<PartId>, exterior: Vec<Point>) -> Self {
        Self {
            id: id.into(),
            exterior: orient_ring(exterior, true),
            holes: Vec::new(),
            metadata: BTreeMap::new(),
            cache: DerivedCache::default(),
        }
    }

    /// Creates a polygon from `(x, y)` tuples.
    pub fn from_coords(id: impl Into<PartId>, coords: &[(f64, f64)]) -> Self {
        Self::new(id, coords.iter().map(|&c| c.into()).collect())
    }

    /// Adds an interior hole.
    pub fn with_hole(mut self, hole: Vec<Point>) -> Self {
        self.holes.push(orient_ring(hole, false));
        self.cache = DerivedCache::default();
        self
    }

    /// Attaches a metadata entry (source file, layer, customer reference...).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns a copy carrying a different id.
    pub fn with_id(&self, id: impl Into<PartId>) -> Self {
        let mut copy = self.clone();
        copy.id = id.into();
        copy
    }

    /// Axis-aligned rectangle with its lower-left corner at the origin.
    pub fn rectangle(id: impl Into<PartId>, width: f64, height: f64) -> Self {
        Self::from_coords(
            id,
            &[(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)],
        )
    }

    /// Circle approximation with `n` vertices (at least 8), bounding box at the origin.
    pub fn circle(id: impl Into<PartId>, radius: f64, n: usize) -> Self {
        let n = n.max(8);
        let step = std::f64::consts::TAU / n as f64;
        let vertices = (0..n)
            .map(|i| {
                let angle = i as f64 * step;
                Point::new(radius * angle.cos() + radius, radius * angle.sin() + radius)
            })
            .collect();
        Self::new(id, vertices)
    }

    /// L-shape: a `width x height` rectangle with the upper-right
    /// `(width - notch_width) x (height - notch_height)` corner removed.
    pub fn l_shape(
        id: impl Into<PartId>,
        width: f64,
        height: f64,
        notch_width: f64,
        notch_height: f64,
    ) -> Self {
        Self::from_coords(
            id,
            &[
                (0.0, 0.0),
                (width, 0.0),
                (width, notch_height),
                (notch_width, notch_height),
                (notch_width, height),
                (0.0, height),
            ],
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn exterior(&self) -> &[Point] {
        &self.exterior
    }

    pub fn holes(&self) -> &[Vec<Point>] {
        &self.holes
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn vertex_count(&self) -> usize {
        self.exterior.len()
    }

    pub fn hole_count(&self) -> usize {
        self.holes.len()
    }

    // ------------------------------------------------------------------
    // Derived properties
    // ------------------------------------------------------------------

    /// Net area (exterior minus holes).
    pub fn area(&self) -> f64 {
        *self.cache.area.get_or_init(|| {
            let outer = signed_area_robust(&self.exterior).abs();
            let holes: f64 = self.holes.iter().map(|h| signed_area_robust(h).abs()).sum();
            (outer - holes).max(0.0)
        })
    }

    /// Total length of the exterior and every hole ring.
    pub fn perimeter(&self) -> f64 {
        *self.cache.perimeter.get_or_init(|| {
            ring_length(&self.exterior) + self.holes.iter().map(|h| ring_length(h)).sum::<f64>()
        })
    }

    /// Area centroid. Falls back to the vertex average for degenerate rings.
    pub fn centroid(&self) -> Point {
        *self.cache.centroid.get_or_init(|| {
            self.to_geo_polygon()
                .centroid()
                .map(|c| Point::new(c.x(), c.y()))
                .unwrap_or_else(|| vertex_average(&self.exterior))
        })
    }

    pub fn bounding_box(&self) -> BoundingBox {
        *self.cache.bbox.get_or_init(|| {
            BoundingBox::from_points(&self.exterior)
                .unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
        })
    }

    /// Convex hull of the exterior, counter-clockwise.
    pub fn convex_hull(&self) -> &[Point] {
        self.cache.hull.get_or_init(|| {
            let hull = self.to_geo_polygon().convex_hull();
            let mut pts: Vec<Point> = hull
                .exterior()
                .coords()
                .map(|c| Point::new(c.x, c.y))
                .collect();
            if pts.len() > 1 && pts.first() == pts.last() {
                pts.pop();
            }
            orient_ring(pts, true)
        })
    }

    pub fn hull_area(&self) -> f64 {
        signed_area_robust(self.convex_hull()).abs()
    }

    /// `area / hull_area`; 1.0 for convex shapes, 0.0 for degenerate ones.
    pub fn convexity(&self) -> f64 {
        let hull_area = self.hull_area();
        if hull_area <= AREA_EPSILON || self.area() <= AREA_EPSILON {
            return 0.0;
        }
        (self.area() / hull_area).min(1.0)
    }

    /// Isoperimetric quotient `4*pi*area / perimeter^2`; 1.0 for a circle, 0.0 when degenerate.
    pub fn compactness(&self) -> f64 {
        let perimeter = self.perimeter();
        if perimeter <= 0.0 || self.area() <= AREA_EPSILON {
            return 0.0;
        }
        (4.0 * std::f64::consts::PI * self.area() / (perimeter * perimeter)).min(1.0)
    }

    /// Bounding-box width over height. 0.0 for a degenerate box.
    pub fn aspect_ratio(&self) -> f64 {
        let bbox = self.bounding_box();
        if bbox.height() <= 0.0 || bbox.width() <= 0.0 {
            return 0.0;
        }
        bbox.width() / bbox.height()
    }

    /// `(hull_area - area) / hull_area`, the share of the hull not covered by material.
    pub fn concavity_depth(&self) -> f64 {
        let hull_area = self.hull_area();
        ((hull_area - self.area()) / hull_area.max(1e-6)).clamp(0.0, 1.0)
    }

    /// Returns true if the exterior is convex and there are no holes.
    pub fn is_convex(&self) -> bool {
        self.holes.is_empty() && kerfnest_core::robust::is_convex_robust(&self.exterior)
    }

    /// Shape hash over vertices rounded to 3 decimals. Independent of id and metadata.
    pub fn fingerprint(&self) -> u64 {
        *self.cache.fingerprint.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            hash_ring(&self.exterior, &mut hasher);
            self.holes.len().hash(&mut hasher);
            for hole in &self.holes {
                hash_ring(hole, &mut hasher);
            }
            hasher.finish()
        })
    }

    // ------------------------------------------------------------------
    // Transforms (pure)
    // ------------------------------------------------------------------

    fn map_points(&self, f: impl Fn(&Point) -> Point) -> Self {
        Self {
            id: self.id.clone(),
            exterior: self.exterior.iter().map(&f).collect(),
            holes: self
                .holes
                .iter()
                .map(|h| h.iter().map(&f).collect())
                .collect(),
            metadata: self.metadata.clone(),
            cache: DerivedCache::default(),
        }
    }

    /// Counter-clockwise rotation about the origin, in degrees.
    pub fn rotate(&self, degrees: f64) -> Self {
        if degrees == 0.0 {
            return self.clone();
        }
        let (sin, cos) = degrees.to_radians().sin_cos();
        self.map_points(|p| Point::new(p.x * cos - p.y * sin, p.x * sin + p.y * cos))
    }

    /// Counter-clockwise rotation about `center`, in degrees.
    pub fn rotate_about(&self, degrees: f64, center: Point) -> Self {
        self.map_points(|p| p.rotate_about(degrees, &center))
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        if dx == 0.0 && dy == 0.0 {
            return self.clone();
        }
        self.map_points(|p| p.translate(dx, dy))
    }

    /// Uniform scale about the centroid.
    pub fn scale(&self, factor: f64) -> Self {
        let c = self.centroid();
        let mut scaled = self.map_points(|p| {
            Point::new(c.x + (p.x - c.x) * factor, c.y + (p.y - c.y) * factor)
        });
        if factor < 0.0 {
            scaled.exterior = orient_ring(scaled.exterior, true);
            scaled.holes = scaled
                .holes
                .into_iter()
                .map(|h| orient_ring(h, false))
                .collect();
        }
        scaled
    }

    /// Point reflection through the origin (every vertex negated).
    pub fn reflect(&self) -> Self {
        self.map_points(|p| -*p)
    }

    /// Translated so that the bounding-box minimum is at the origin.
    pub fn normalized(&self) -> Self {
        let bbox = self.bounding_box();
        self.translate(-bbox.min_x, -bbox.min_y)
    }

    /// Outward offset by `distance`; negative values erode.
    ///
    /// Returns `None` when erosion makes the shape vanish. If erosion splits
    /// the shape, the largest component is kept.
    pub fn buffer(&self, distance: f64) -> Option<Self> {
        if distance == 0.0 {
            return Some(self.clone());
        }
        if self.area() <= AREA_EPSILON {
            return None;
        }
        let result = self.to_geo_polygon().buffer(distance);
        self.largest_component(&result)
    }

    // ------------------------------------------------------------------
    // Predicates and boolean operations
    // ------------------------------------------------------------------

    /// Returns true if the two shapes share any point (touching counts).
    pub fn intersects(&self, other: &Polygon) -> bool {
        if !self.bounding_box().intersects(&other.bounding_box()) {
            return false;
        }
        self.to_geo_polygon().intersects(&other.to_geo_polygon())
    }

    /// Returns true if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Polygon) -> bool {
        if !self.bounding_box().contains_box(&other.bounding_box(), 0.0) {
            return false;
        }
        self.to_geo_polygon().contains(&other.to_geo_polygon())
    }

    /// Area of the common region; 0.0 when the boxes are disjoint.
    pub fn intersection_area(&self, other: &Polygon) -> f64 {
        if !self.bounding_box().overlaps(&other.bounding_box()) {
            return 0.0;
        }
        self.to_geo_polygon()
            .intersection(&other.to_geo_polygon())
            .unsigned_area()
    }

    /// Returns true if the interiors overlap by more than `tolerance` area.
    pub fn overlaps(&self, other: &Polygon, tolerance: f64) -> bool {
        self.intersection_area(other) > tolerance
    }

    /// Largest component of the intersection.
    pub fn intersection(&self, other: &Polygon) -> Option<Polygon> {
        if !self.bounding_box().overlaps(&other.bounding_box()) {
            return None;
        }
        let result = self
            .to_geo_polygon()
            .intersection(&other.to_geo_polygon());
        self.largest_component(&result)
    }

    /// Largest component of the union. Disjoint inputs keep the larger operand.
    pub fn union(&self, other: &Polygon) -> Option<Polygon> {
        if !self.bounding_box().intersects(&other.bounding_box()) {
            let larger = if self.area() >= other.area() { self } else { other };
            return Some(larger.clone());
        }
        let result = self.to_geo_polygon().union(&other.to_geo_polygon());
        self.largest_component(&result)
    }

    /// Point-in-polygon (even-odd over every ring). Boundary points count as outside.
    pub fn contains_point(&self, p: Point) -> bool {
        if !self.bounding_box().contains_point(&p) {
            return false;
        }
        let mut rings = std::iter::once(&self.exterior).chain(self.holes.iter());
        if rings.any(|ring| on_ring_boundary(p, ring, BOUNDARY_EPSILON)) {
            return false;
        }
        point_in_ring(p, &self.exterior) && !self.holes.iter().any(|h| point_in_ring(p, h))
    }

    // ------------------------------------------------------------------
    // Validity
    // ------------------------------------------------------------------

    /// Simple, finite, positive-area rings with at least three vertices.
    pub fn is_valid(&self) -> bool {
        let ring_ok = |ring: &[Point]| {
            ring.len() >= 3
                && ring.iter().all(Point::is_finite)
                && signed_area_robust(ring).abs() > AREA_EPSILON
                && is_simple_ring(ring)
        };
        ring_ok(&self.exterior) && self.holes.iter().all(|h| ring_ok(h))
    }

    /// Heals self-intersections with a zero-width self-union and keeps the
    /// largest resulting component.
    pub fn repaired(&self) -> Result<Polygon> {
        if self.is_valid() {
            return Ok(self.clone());
        }
        if self.exterior.len() < 3 || !self.exterior.iter().all(Point::is_finite) {
            return Err(Error::InvalidGeometry(format!(
                "part '{}' has {} usable vertices",
                self.id,
                self.exterior.len()
            )));
        }

        let mut subject: Vec<Vec<[f64; 2]>> = vec![to_overlay_path(&self.exterior)];
        subject.extend(self.holes.iter().map(|h| to_overlay_path(h)));
        let empty: Vec<Vec<[f64; 2]>> = Vec::new();
        let shapes = subject.overlay(&empty, OverlayRule::Union, FillRule::EvenOdd);

        let mut best: Option<Polygon> = None;
        for shape in shapes {
            let mut contours = shape.into_iter();
            let Some(outer) = contours.next() else { continue };
            let mut candidate = Polygon {
                id: self.id.clone(),
                exterior: orient_ring(from_overlay_path(outer), true),
                holes: Vec::new(),
                metadata: self.metadata.clone(),
                cache: DerivedCache::default(),
            };
            for hole in contours {
                candidate = candidate.with_hole(from_overlay_path(hole));
            }
            if best.as_ref().map_or(true, |b| candidate.area() > b.area()) {
                best = Some(candidate);
            }
        }

        match best {
            Some(p) if p.is_valid() => {
                log::warn!(
                    "repaired self-intersecting part '{}' (area {:.3} -> {:.3})",
                    self.id,
                    signed_area_robust(&self.exterior).abs(),
                    p.area()
                );
                Ok(p)
            }
            _ => Err(Error::InvalidGeometry(format!(
                "part '{}' is self-intersecting and could not be repaired",
                self.id
            ))),
        }
    }

    // ------------------------------------------------------------------
    // geo interop
    // ------------------------------------------------------------------

    /// Converts to a geo crate Polygon.
    pub fn to_geo_polygon(&self) -> GeoPolygon<f64> {
        let ring = |pts: &[Point]| {
            LineString::from(
                pts.iter()
                    .map(|p| Coord { x: p.x, y: p.y })
                    .collect::<Vec<_>>(),
            )
        };
        GeoPolygon::new(
            ring(&self.exterior),
            self.holes.iter().map(|h| ring(h)).collect(),
        )
    }

    /// Builds a polygon from a geo polygon, carrying over this polygon's id and metadata.
    fn from_geo_like(&self, geo: &GeoPolygon<f64>) -> Option<Polygon> {
        let strip = |ls: &LineString<f64>| -> Vec<Point> {
            let mut pts: Vec<Point> = ls.coords().map(|c| Point::new(c.x, c.y)).collect();
            if pts.len() > 1 && pts.first() == pts.last() {
                pts.pop();
            }
            pts
        };
        let exterior = strip(geo.exterior());
        if exterior.len() < 3 {
            return None;
        }
        let mut polygon = Polygon {
            id: self.id.clone(),
            exterior: orient_ring(exterior, true),
            holes: Vec::new(),
            metadata: self.metadata.clone(),
            cache: DerivedCache::default(),
        };
        for hole in geo.interiors() {
            let hole = strip(hole);
            if hole.len() >= 3 {
                polygon.holes.push(orient_ring(hole, false));
            }
        }
        Some(polygon)
    }

    fn largest_component(&self, result: &MultiPolygon<f64>) -> Option<Polygon> {
        result
            .0
            .iter()
            .filter(|p| p.unsigned_area() > AREA_EPSILON)
            .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .and_then(|p| self.from_geo_like(p))
    }
}

impl PartialEq for Polygon {
    /// Geometric equality: same id and identical rings.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.exterior == other.exterior && self.holes == other.holes
    }
}

// ----------------------------------------------------------------------
// Ring helpers
// ----------------------------------------------------------------------

/// Drops a closing duplicate and orients the ring (CCW when `ccw`).
pub(crate) fn orient_ring(mut ring: Vec<Point>, ccw: bool) -> Vec<Point> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() >= 3 && is_ccw_robust(&ring) != ccw {
        ring.reverse();
    }
    ring
}

fn ring_length(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| ring[i].distance(&ring[(i + 1) % n])).sum()
}

fn vertex_average(ring: &[Point]) -> Point {
    if ring.is_empty() {
        return Point::ORIGIN;
    }
    let n = ring.len() as f64;
    let (sx, sy) = ring
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

fn hash_ring(ring: &[Point], hasher: &mut DefaultHasher) {
    ring.len().hash(hasher);
    for p in ring {
        // +0.0 folds -0.0 into 0.0
        ((p.x * 1000.0).round() as i64).hash(hasher);
        ((p.y * 1000.0).round() as i64).hash(hasher);
    }
}

/// Returns true if `p` lies within `eps` of an edge of `ring`.
pub fn on_ring_boundary(p: Point, ring: &[Point], eps: f64) -> bool {
    let n = ring.len();
    (0..n).any(|i| {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        let ab = b - a;
        let len_sq = ab.x * ab.x + ab.y * ab.y;
        let closest = if len_sq <= 0.0 {
            a
        } else {
            let t = (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len_sq).clamp(0.0, 1.0);
            Point::new(a.x + ab.x * t, a.y + ab.y * t)
        };
        closest.distance_sq(&p) <= eps * eps
    })
}

/// Ray-casting point-in-ring test.
pub fn point_in_ring(p: Point, ring: &[Point]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn segments_cross(a: Point, b: Point, c: Point, d: Point) -> bool {
    let o1 = orient2d(a, b, c);
    let o2 = orient2d(a, b, d);
    let o3 = orient2d(c, d, a);
    let o4 = orient2d(c, d, b);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    let on_segment = |p: Point, q: Point, r: Point| {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
    };
    (o1 == Orientation::Collinear && on_segment(a, b, c))
        || (o2 == Orientation::Collinear && on_segment(a, b, d))
        || (o3 == Orientation::Collinear && on_segment(c, d, a))
        || (o4 == Orientation::Collinear && on_segment(c, d, b))
}

/// Returns true if no two non-adjacent edges of the ring touch.
pub fn is_simple_ring(ring: &[Point]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        if a == b {
            return false;
        }
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            let (c, d) = (ring[j], ring[(j + 1) % n]);
            if segments_cross(a, b, c, d) {
                return false;
            }
        }
    }
    true
}

pub(crate) fn to_overlay_path(ring: &[Point]) -> Vec<[f64; 2]> {
    ring.iter().map(|p| [p.x, p.y]).collect()
}

pub(crate) fn from_overlay_path(path: Vec<[f64; 2]>) -> Vec<Point> {
    path.into_iter().map(|[x, y]| Point::new(x, y)).collect()
}
