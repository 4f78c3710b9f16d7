//! Geometry primitives for per-frame annotations.
//!
//! This module provides the spatial types stored on track features:
//! - Points, lines, and polygons with holes
//! - Axis-aligned bounds (`[x1, y1, x2, y2]`)
//! - Bounding-box union math used by recipe reconciliation

use serde::{Deserialize, Serialize};

// ============================================================================
// Core Geometry Types
// ============================================================================

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An axis-aligned rectangle stored as `[x1, y1, x2, y2]` with `x1 <= x2`
/// and `y1 <= y2`. This is the canonical spatial envelope of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Bounds {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create bounds from two corner points in any order.
    pub fn from_corners(p1: Point, p2: Point) -> Self {
        Self {
            x1: p1.x.min(p2.x),
            y1: p1.y.min(p2.y),
            x2: p1.x.max(p2.x),
            y2: p1.y.max(p2.y),
        }
    }

    /// Zero-area bounds at a single point.
    pub fn from_point(p: Point) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Smallest bounds containing both `self` and `other`.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Bounds) -> bool {
        self.x1 <= other.x1 && self.y1 <= other.y1 && self.x2 >= other.x2 && self.y2 >= other.y2
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
    }

    /// Bounds expanded by `pad` on every side.
    pub fn padded(&self, pad: f64) -> Bounds {
        Bounds::new(self.x1 - pad, self.y1 - pad, self.x2 + pad, self.y2 + pad)
    }
}

/// An open polyline (two or more vertices).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub points: Vec<Point>,
}

impl Line {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn bounding_box(&self) -> Option<Bounds> {
        bounds_of_points(&self.points)
    }
}

/// A closed polygon with optional interior holes.
///
/// The exterior ring is implicitly closed (the last vertex connects back to
/// the first). Holes are additional rings carved out of the exterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// The exterior ring vertices in order.
    pub exterior: Vec<Point>,
    /// Interior hole rings.
    #[serde(default)]
    pub holes: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    /// A polygon needs at least 3 exterior vertices.
    pub fn is_valid(&self) -> bool {
        self.exterior.len() >= 3
    }

    /// Append a hole ring. Holes do not affect the bounding box.
    pub fn add_hole(&mut self, ring: Vec<Point>) {
        self.holes.push(ring);
    }

    /// Bounding box of the exterior ring.
    pub fn bounding_box(&self) -> Option<Bounds> {
        bounds_of_points(&self.exterior)
    }

    /// Axis-aligned rectangle as a polygon (corner order: tl, tr, br, bl).
    pub fn from_bounds(b: Bounds) -> Self {
        Self::new(vec![
            Point::new(b.x1, b.y1),
            Point::new(b.x2, b.y1),
            Point::new(b.x2, b.y2),
            Point::new(b.x1, b.y2),
        ])
    }

    /// Check if a point is inside the exterior ring (ray casting).
    pub fn contains(&self, point: &Point) -> bool {
        if self.exterior.len() < 3 {
            return false;
        }
        let mut inside = false;
        let n = self.exterior.len();
        let mut j = n - 1;
        for i in 0..n {
            let vi = &self.exterior[i];
            let vj = &self.exterior[j];
            if ((vi.y > point.y) != (vj.y > point.y))
                && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

fn bounds_of_points(points: &[Point]) -> Option<Bounds> {
    let first = points.first()?;
    let mut b = Bounds::from_point(*first);
    for p in &points[1..] {
        b.x1 = b.x1.min(p.x);
        b.y1 = b.y1.min(p.y);
        b.x2 = b.x2.max(p.x);
        b.y2 = b.y2.max(p.y);
    }
    Some(b)
}

// ============================================================================
// Geometry Variants
// ============================================================================

/// One named sub-geometry stored on a feature under a string key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    Line(Line),
    Polygon(Polygon),
}

/// Discriminant for [`Geometry`], used to address entries for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::Line(_) => GeometryKind::Line,
            Geometry::Polygon(_) => GeometryKind::Polygon,
        }
    }

    pub fn bounding_box(&self) -> Option<Bounds> {
        match self {
            Geometry::Point(p) => Some(Bounds::from_point(*p)),
            Geometry::Line(l) => l.bounding_box(),
            Geometry::Polygon(poly) => poly.bounding_box(),
        }
    }
}

// ============================================================================
// Bounds Union (recipe reconciliation)
// ============================================================================

/// Merge recipe bounds hints into a single envelope.
///
/// `union_without_bounds` polygons replace the baseline: when any are present
/// the existing bounds are ignored and the baseline becomes their combined
/// bbox. `union` polygons always expand whatever baseline results. Returns
/// `None` when there is no baseline and no union polygon (a pure
/// geometry-only update, e.g. point prompts before any polygon exists).
pub fn update_bounds(
    existing: Option<Bounds>,
    union: &[Polygon],
    union_without_bounds: &[Polygon],
) -> Option<Bounds> {
    let mut baseline = if union_without_bounds.is_empty() {
        existing
    } else {
        combined_bbox(union_without_bounds)
    };
    for poly in union {
        if let Some(bbox) = poly.bounding_box() {
            baseline = Some(match baseline {
                Some(b) => b.union(&bbox),
                None => bbox,
            });
        }
    }
    baseline
}

fn combined_bbox(polygons: &[Polygon]) -> Option<Bounds> {
    let mut out: Option<Bounds> = None;
    for poly in polygons {
        if let Some(bbox) = poly.bounding_box() {
            out = Some(match out {
                Some(b) => b.union(&bbox),
                None => bbox,
            });
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
