// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar geometry primitives used by topology construction.
//!
//! Bounding boxes, ring orientation by signed area, point-in-ring
//! classification and the approach angle of a line at its end nodes. All
//! containment tests work in the XY plane; Z only widens bounding boxes.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Angle recorded for a line that never leaves its node (all vertices
/// coincide with the node). Traversals skip entries carrying it.
pub const DEGENERATE_ANGLE: f32 = -9.0;

/// Axis-aligned bounding box: west, east, south, north, bottom, top.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundBox {
    pub w: f64,
    pub e: f64,
    pub s: f64,
    pub n: f64,
    pub b: f64,
    pub t: f64,
}

impl BoundBox {
    /// The empty box: contains nothing, and is the identity for `union`.
    pub const EMPTY: BoundBox = BoundBox {
        w: f64::INFINITY,
        e: f64::NEG_INFINITY,
        s: f64::INFINITY,
        n: f64::NEG_INFINITY,
        b: f64::INFINITY,
        t: f64::NEG_INFINITY,
    };

    pub fn new(w: f64, e: f64, s: f64, n: f64, b: f64, t: f64) -> Self {
        Self { w, e, s, n, b, t }
    }

    /// A 2D box with an unbounded vertical extent.
    pub fn planar(w: f64, e: f64, s: f64, n: f64) -> Self {
        Self::new(w, e, s, n, f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Self {
        let mut bbox = Self::EMPTY;
        for p in points {
            bbox.expand(p);
        }
        bbox
    }

    /// Whether the box can come out of [`BoundBox::from_points`] over
    /// finite points: the empty box, or finite and ordered on every axis.
    pub fn is_well_formed(&self) -> bool {
        if *self == Self::EMPTY {
            return true;
        }
        let values = [self.w, self.e, self.s, self.n, self.b, self.t];
        values.iter().all(|v| v.is_finite()) && !self.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.w > self.e || self.s > self.n || self.b > self.t
    }

    pub fn expand(&mut self, p: &Point3<f64>) {
        self.w = self.w.min(p.x);
        self.e = self.e.max(p.x);
        self.s = self.s.min(p.y);
        self.n = self.n.max(p.y);
        self.b = self.b.min(p.z);
        self.t = self.t.max(p.z);
    }

    pub fn union(&self, other: &BoundBox) -> BoundBox {
        BoundBox {
            w: self.w.min(other.w),
            e: self.e.max(other.e),
            s: self.s.min(other.s),
            n: self.n.max(other.n),
            b: self.b.min(other.b),
            t: self.t.max(other.t),
        }
    }

    /// Whether the boxes share at least one point (edges touching counts).
    pub fn overlaps(&self, other: &BoundBox) -> bool {
        self.w <= other.e
            && other.w <= self.e
            && self.s <= other.n
            && other.s <= self.n
            && self.b <= other.t
            && other.b <= self.t
    }

    /// Whether `(x, y)` lies inside or on the box in plan view.
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.w && x <= self.e && y >= self.s && y <= self.n
    }

    /// Whether `other` lies entirely inside this box in plan view.
    pub fn contains_box_xy(&self, other: &BoundBox) -> bool {
        other.w >= self.w && other.e <= self.e && other.s >= self.s && other.n <= self.n
    }
}

impl Default for BoundBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Signed area of a closed ring (shoelace formula).
///
/// Positive for counter-clockwise rings, negative for clockwise. The ring
/// may or may not repeat its first vertex at the end.
pub fn signed_area(ring: &[Point2<f64>]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, p) in ring.iter().enumerate() {
        let q = &ring[(i + 1) % ring.len()];
        sum += p.x * q.y - q.x * p.y;
    }
    sum / 2.0
}

/// Area-weighted centre of a closed ring. `None` when the ring has no area.
///
/// The centre of a non-convex ring can fall outside it.
pub fn ring_centroid(ring: &[Point2<f64>]) -> Option<Point2<f64>> {
    let area = signed_area(ring);
    if area == 0.0 || !area.is_finite() {
        return None;
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for (i, p) in ring.iter().enumerate() {
        let q = &ring[(i + 1) % ring.len()];
        let cross = p.x * q.y - q.x * p.y;
        cx += (p.x + q.x) * cross;
        cy += (p.y + q.y) * cross;
    }
    Some(Point2::new(cx / (6.0 * area), cy / (6.0 * area)))
}

/// Where a point lies relative to a closed ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingPosition {
    Inside,
    Outside,
    /// On one of the ring's segments or vertices.
    Boundary,
}

/// Classifies `p` against a closed ring with the crossing-number rule.
pub fn point_in_ring(p: &Point2<f64>, ring: &[Point2<f64>]) -> RingPosition {
    let n = ring.len();
    if n < 3 {
        return RingPosition::Outside;
    }
    let mut inside = false;
    for i in 0..n {
        let a = &ring[i];
        let b = &ring[(i + 1) % n];
        if on_segment(p, a, b) {
            return RingPosition::Boundary;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if x > p.x {
                inside = !inside;
            }
        }
    }
    if inside {
        RingPosition::Inside
    } else {
        RingPosition::Outside
    }
}

fn on_segment(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    let scale = (b - a).norm().max(1.0);
    if cross.abs() > 1e-12 * scale * scale {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Whether ring `inner` lies inside ring `outer`.
///
/// Decided by the first vertex of `inner` that is not on `outer`'s boundary.
/// Rings that touch everywhere (or are identical) are not inside.
pub fn ring_inside(inner: &[Point2<f64>], outer: &[Point2<f64>]) -> bool {
    for p in inner {
        match point_in_ring(p, outer) {
            RingPosition::Inside => return true,
            RingPosition::Outside => return false,
            RingPosition::Boundary => continue,
        }
    }
    false
}

/// Direction in which a line leaves the node at one of its ends.
///
/// Measured counter-clockwise from +X, towards the first vertex that differs
/// from the node position. Returns [`DEGENERATE_ANGLE`] when every vertex
/// coincides with the node.
pub fn node_angle(points: &[Point3<f64>], at_start: bool) -> f32 {
    if at_start {
        departure_angle(points.first(), points.iter().skip(1))
    } else {
        departure_angle(points.last(), points.iter().rev().skip(1))
    }
}

fn departure_angle<'a>(
    node: Option<&Point3<f64>>,
    rest: impl Iterator<Item = &'a Point3<f64>>,
) -> f32 {
    let Some(node) = node else {
        return DEGENERATE_ANGLE;
    };
    rest.map(|p| (p.x - node.x, p.y - node.y))
        .find(|&(dx, dy)| dx != 0.0 || dy != 0.0)
        .map_or(DEGENERATE_ANGLE, |(dx, dy)| dy.atan2(dx) as f32)
}
