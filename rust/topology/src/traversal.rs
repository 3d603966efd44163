// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring tracing over the angular order at nodes.
//!
//! A ring is traced with the region of interest on the left of travel. On
//! reaching a node, the next boundary is the first one clockwise from the
//! line we arrived on, i.e. the sharpest left turn. Following that rule
//! from any element of a closed ring walks the same ring, so a ring can be
//! identified by any of its directed lines.

use nalgebra::Point2;
use rustc_hash::FxHashSet;

use crate::arena::Topology;
use crate::error::{Error, Result};
use crate::geometry::{BoundBox, DEGENERATE_ANGLE};
use crate::keys::{DirectedLine, LineId, NodeId};
use crate::source::GeometrySource;

impl Topology {
    /// The first live boundary clockwise from `from` at `node`.
    ///
    /// `from` must be an incidence of `node`. Lines of other types and
    /// degenerate incidences are skipped. Returns `from` itself when it is
    /// the only candidate, and `None` when `from` is not at the node or no
    /// candidate exists.
    pub fn next_boundary_clockwise(&self, node: NodeId, from: DirectedLine) -> Option<DirectedLine> {
        let data = self.node(node)?;
        let idx = data.lines.iter().position(|&e| e == from)?;
        let n = data.lines.len();
        (1..=n)
            .map(|step| (idx + n - step) % n)
            .find(|&j| data.angles[j] != DEGENERATE_ANGLE && self.is_live_boundary(data.lines[j].line))
            .map(|j| data.lines[j])
    }

    /// Traces the ring that has `start` on it, region on the left.
    ///
    /// Returns the ring's directed lines beginning with `start`, or `None`
    /// if the walk hits a dangle, uses a line twice, or leaves a node along
    /// a boundary whose angle another boundary shares (the order there is
    /// undefined).
    pub fn trace_ring(&self, start: DirectedLine) -> Option<Vec<DirectedLine>> {
        let mut ring = vec![start];
        let mut used: FxHashSet<LineId> = FxHashSet::default();
        used.insert(start.line);

        let mut cur = start;
        loop {
            let node = self.end_node(cur)?;
            let at = cur.reversed();
            let next = self.next_boundary_clockwise(node, at)?;
            if next == at || self.has_twin_angle(node, next) {
                return None;
            }
            if next == start {
                return Some(ring);
            }
            if !used.insert(next.line) {
                return None;
            }
            ring.push(next);
            cur = next;
        }
    }

    fn has_twin_angle(&self, node: NodeId, dl: DirectedLine) -> bool {
        let Some(data) = self.node(node) else {
            return false;
        };
        let Some(idx) = data.lines.iter().position(|&e| e == dl) else {
            return false;
        };
        let angle = data.angles[idx];
        data.incidences()
            .enumerate()
            .any(|(j, (other, a))| j != idx && a == angle && self.is_live_boundary(other.line))
    }

    /// Vertices of a ring in travel order, in the XY plane.
    ///
    /// Shared endpoints between consecutive lines appear once.
    pub fn ring_points(
        &self,
        source: &dyn GeometrySource,
        ring: &[DirectedLine],
    ) -> Result<Vec<Point2<f64>>> {
        let mut points = Vec::new();
        for (i, dl) in ring.iter().enumerate() {
            let line = self.line(dl.line).ok_or(Error::LineNotFound(dl.line))?;
            let record = source.read(line.offset)?;
            let xy = record.points.iter().map(|p| Point2::new(p.x, p.y));
            let skip = usize::from(i > 0);
            if dl.forward {
                points.extend(xy.skip(skip));
            } else {
                points.extend(xy.rev().skip(skip));
            }
        }
        Ok(points)
    }

    /// Union of the bounding boxes of a ring's lines.
    pub fn ring_bbox(&self, ring: &[DirectedLine]) -> BoundBox {
        ring.iter()
            .filter_map(|dl| self.line(dl.line))
            .fold(BoundBox::EMPTY, |acc, l| acc.union(&l.bbox))
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::{AccessMode, Topology};
    use crate::keys::*;
    use crate::source::GeometryRecord;

    fn topo(lines: &[(LineType, &[(f64, f64)])]) -> Topology {
        let mut topo = Topology::for_build(false, AccessMode::Write, 0.0);
        for (i, (kind, coords)) in lines.iter().enumerate() {
            topo.push_line(i as u64, &GeometryRecord::from_xy(*kind, coords)).unwrap();
        }
        topo.level = BuildLevel::Base;
        topo
    }

    fn dl(raw: i32) -> DirectedLine {
        DirectedLine::from_raw(raw).unwrap()
    }

    fn raws(ring: &[DirectedLine]) -> Vec<i32> {
        ring.iter().map(|d| d.raw()).collect()
    }

    const B: LineType = LineType::Boundary;

    #[test]
    fn traces_square_both_ways() {
        let t = topo(&[
            (B, &[(0.0, 0.0), (1.0, 0.0)]),
            (B, &[(1.0, 0.0), (1.0, 1.0)]),
            (B, &[(1.0, 1.0), (0.0, 1.0)]),
            (B, &[(0.0, 1.0), (0.0, 0.0)]),
        ]);
        assert_eq!(raws(&t.trace_ring(dl(1)).unwrap()), vec![1, 2, 3, 4]);
        assert_eq!(raws(&t.trace_ring(dl(-1)).unwrap()), vec![-1, -4, -3, -2]);
    }

    #[test]
    fn left_turn_at_junction() {
        // Square split by a vertical line: the left cell must not include
        // the right cell's lines.
        let t = topo(&[
            (B, &[(0.0, 0.0), (1.0, 0.0)]),
            (B, &[(1.0, 0.0), (2.0, 0.0)]),
            (B, &[(2.0, 0.0), (2.0, 1.0)]),
            (B, &[(2.0, 1.0), (1.0, 1.0)]),
            (B, &[(1.0, 1.0), (0.0, 1.0)]),
            (B, &[(0.0, 1.0), (0.0, 0.0)]),
            (B, &[(1.0, 0.0), (1.0, 1.0)]),
        ]);
        assert_eq!(raws(&t.trace_ring(dl(1)).unwrap()), vec![1, 7, 5, 6]);
        assert_eq!(raws(&t.trace_ring(dl(2)).unwrap()), vec![2, 3, 4, -7]);
    }

    #[test]
    fn dangle_does_not_close() {
        let t = topo(&[(B, &[(0.0, 0.0), (1.0, 0.0)])]);
        assert!(t.trace_ring(dl(1)).is_none());
        assert!(t.trace_ring(dl(-1)).is_none());
    }

    #[test]
    fn plain_lines_are_not_followed() {
        let t = topo(&[
            (B, &[(0.0, 0.0), (1.0, 0.0)]),
            (LineType::Line, &[(1.0, 0.0), (1.0, 1.0)]),
            (B, &[(1.0, 1.0), (0.0, 1.0)]),
            (B, &[(0.0, 1.0), (0.0, 0.0)]),
        ]);
        assert!(t.trace_ring(dl(1)).is_none());
    }

    #[test]
    fn single_closed_line() {
        let t = topo(&[(B, &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)])]);
        assert_eq!(raws(&t.trace_ring(dl(1)).unwrap()), vec![1]);
        assert_eq!(raws(&t.trace_ring(dl(-1)).unwrap()), vec![-1]);
    }

    #[test]
    fn overlapping_boundaries_fail() {
        // Two boundaries leave the corner in the same direction.
        let t = topo(&[
            (B, &[(0.0, 0.0), (1.0, 0.0)]),
            (B, &[(1.0, 0.0), (1.0, 1.0)]),
            (B, &[(1.0, 1.0), (0.0, 0.0)]),
            (B, &[(0.0, 0.0), (2.0, 0.0), (3.0, 3.0)]),
        ]);
        assert!(t.trace_ring(dl(1)).is_none());
    }

    #[test]
    fn ring_points_follow_direction() {
        let mut store = crate::store::GeometryStore::new(false);
        let mut t = Topology::for_build(false, AccessMode::Write, 0.0);
        for coords in [
            [(0.0, 0.0), (1.0, 0.0)],
            [(1.0, 0.0), (0.0, 1.0)],
            [(0.0, 1.0), (0.0, 0.0)],
        ] {
            let rec = GeometryRecord::from_xy(B, &coords);
            let off = crate::source::GeometrySource::write(&mut store, &rec).unwrap();
            t.push_line(off, &rec).unwrap();
        }
        t.level = BuildLevel::Base;

        let ring = t.trace_ring(dl(-1)).unwrap();
        let pts = t.ring_points(&store, &ring).unwrap();
        let xy: Vec<(f64, f64)> = pts.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(xy, vec![(1.0, 0.0), (0.0, 0.0), (0.0, 1.0), (1.0, 0.0)]);
        assert!(crate::geometry::signed_area(&pts) < 0.0);
    }
}
