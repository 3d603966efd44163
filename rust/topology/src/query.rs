// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point and area queries over built topology.
//!
//! Outlines are read back from the geometry source on every call. Nothing
//! here caches ring coordinates, so the queries stay valid across edits as
//! long as the topology level they need is still present.

use nalgebra::Point2;

use crate::arena::Topology;
use crate::error::{Error, Result};
use crate::geometry::{point_in_ring, ring_centroid, signed_area, RingPosition};
use crate::keys::{AreaId, IsleId};
use crate::source::GeometrySource;

impl Topology {
    /// Outer ring of an area, counter-clockwise.
    pub fn area_points(&self, source: &dyn GeometrySource, id: AreaId) -> Result<Vec<Point2<f64>>> {
        let area = self.area(id).ok_or(Error::AreaNotFound(id))?;
        self.ring_points(source, &area.lines)
    }

    /// Ring of an isle, clockwise.
    pub fn isle_points(&self, source: &dyn GeometrySource, id: IsleId) -> Result<Vec<Point2<f64>>> {
        let isle = self.isle(id).ok_or(Error::IsleNotFound(id))?;
        self.ring_points(source, &isle.lines)
    }

    /// Classifies `p` against the outer ring of an area, ignoring its isles.
    pub fn point_in_area_outer_ring(
        &self,
        source: &dyn GeometrySource,
        id: AreaId,
        p: &Point2<f64>,
    ) -> Result<RingPosition> {
        let area = self.area(id).ok_or(Error::AreaNotFound(id))?;
        if !area.bbox.contains_xy(p.x, p.y) {
            return Ok(RingPosition::Outside);
        }
        let ring = self.ring_points(source, &area.lines)?;
        Ok(point_in_ring(p, &ring))
    }

    /// Classifies `p` against the ring of an isle.
    pub fn point_in_isle(
        &self,
        source: &dyn GeometrySource,
        id: IsleId,
        p: &Point2<f64>,
    ) -> Result<RingPosition> {
        let isle = self.isle(id).ok_or(Error::IsleNotFound(id))?;
        if !isle.bbox.contains_xy(p.x, p.y) {
            return Ok(RingPosition::Outside);
        }
        let ring = self.ring_points(source, &isle.lines)?;
        Ok(point_in_ring(p, &ring))
    }

    /// Whether `p` is strictly inside an area: inside its outer ring and
    /// outside every isle attached to it. Points on any boundary are not.
    pub fn point_in_area(
        &self,
        source: &dyn GeometrySource,
        id: AreaId,
        p: &Point2<f64>,
    ) -> Result<bool> {
        if self.point_in_area_outer_ring(source, id, p)? != RingPosition::Inside {
            return Ok(false);
        }
        let area = self.area(id).ok_or(Error::AreaNotFound(id))?;
        for &isle in &area.isles {
            if self.point_in_isle(source, isle, p)? != RingPosition::Outside {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The area containing `p`, scanning every area's bounding box.
    pub fn find_area(&self, source: &dyn GeometrySource, p: &Point2<f64>) -> Result<Option<AreaId>> {
        let candidates = self
            .areas()
            .filter(|(_, a)| a.bbox.contains_xy(p.x, p.y))
            .map(|(id, _)| id);
        self.smallest_area_containing(source, p, candidates)
    }

    /// Among `candidates`, the area with the least absolute ring area that
    /// contains `p`. Ties keep the earliest candidate.
    pub(crate) fn smallest_area_containing(
        &self,
        source: &dyn GeometrySource,
        p: &Point2<f64>,
        candidates: impl IntoIterator<Item = AreaId>,
    ) -> Result<Option<AreaId>> {
        let mut best: Option<(AreaId, f64)> = None;
        for id in candidates {
            if !self.point_in_area(source, id, p)? {
                continue;
            }
            let size = signed_area(&self.area_points(source, id)?).abs();
            if best.map_or(true, |(_, s)| size < s) {
                best = Some((id, size));
            }
        }
        Ok(best.map(|(id, _)| id))
    }

    /// A point strictly inside an area and outside its isles.
    ///
    /// The ring centroid is used when it qualifies. Otherwise horizontal
    /// scanlines are tried between distinct vertex heights, nearest the
    /// middle of the area first, and the midpoint of the widest inside span
    /// is taken.
    pub fn interior_point(&self, source: &dyn GeometrySource, id: AreaId) -> Result<Point2<f64>> {
        let area = self.area(id).ok_or(Error::AreaNotFound(id))?;
        let outer = self.ring_points(source, &area.lines)?;
        let mut holes = Vec::with_capacity(area.isles.len());
        for &isle in &area.isles {
            holes.push(self.isle_points(source, isle)?);
        }

        let inside = |p: &Point2<f64>| {
            point_in_ring(p, &outer) == RingPosition::Inside
                && holes.iter().all(|h| point_in_ring(p, h) == RingPosition::Outside)
        };

        if let Some(c) = ring_centroid(&outer) {
            if inside(&c) {
                return Ok(c);
            }
        }

        let mut heights: Vec<f64> = outer
            .iter()
            .chain(holes.iter().flatten())
            .map(|p| p.y)
            .collect();
        heights.sort_by(f64::total_cmp);
        heights.dedup();

        let mid = (area.bbox.s + area.bbox.n) / 2.0;
        let mut scanlines: Vec<f64> = heights.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
        scanlines.sort_by(|a, b| (a - mid).abs().total_cmp(&(b - mid).abs()));

        for y in scanlines {
            let mut xs = Vec::new();
            for ring in std::iter::once(&outer).chain(holes.iter()) {
                crossings(ring, y, &mut xs);
            }
            xs.sort_by(f64::total_cmp);

            let widest = xs
                .chunks_exact(2)
                .map(|pair| (pair[0], pair[1]))
                .fold(None::<(f64, f64)>, |best, (a, b)| match best {
                    Some((ba, bb)) if bb - ba >= b - a => best,
                    _ => Some((a, b)),
                });
            if let Some((a, b)) = widest {
                let p = Point2::new((a + b) / 2.0, y);
                if inside(&p) {
                    return Ok(p);
                }
            }
        }
        Err(Error::InvalidGeometry(format!("area {id} has no interior")))
    }
}

/// X coordinates where a closed ring crosses the horizontal line at `y`.
fn crossings(ring: &[Point2<f64>], y: f64, out: &mut Vec<f64>) {
    let n = ring.len();
    for i in 0..n {
        let a = &ring[i];
        let b = &ring[(i + 1) % n];
        if (a.y > y) != (b.y > y) {
            out.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
        }
    }
}
