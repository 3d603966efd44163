// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Spatial lookups: node snapping and bounding-box queries.
//!
//! [`NodeGrid`] is a grid-based spatial hash used while linking lines, so
//! that an endpoint finds an existing node within tolerance in O(1) average
//! time. [`SpatialIndex`] is an R-tree over the bounding boxes of lines,
//! areas and isles for window queries. It carries nothing that cannot be
//! recomputed from the topology, so the `sidx` file is a pure cache.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::Point3;
use rstar::{RTree, RTreeObject, AABB};
use rustc_hash::FxHashMap;

use crate::arena::{NodeData, Topology};
use crate::error::{Error, Result};
use crate::geometry::BoundBox;
use crate::keys::{AreaId, IsleId, LineId, NodeId};
use crate::port::{capacity_hint, ByteOrder, FileFormat, PortReader, PortWriter};

/// Grid hash over node positions for tolerance-based endpoint matching.
///
/// Cells are squares of side `cell_size` in the XY plane. A lookup checks
/// the 3x3 neighbourhood of the query cell, which finds every node within
/// `cell_size` of the query point.
#[derive(Debug, Clone)]
pub struct NodeGrid {
    cell_size: f64,
    grid: FxHashMap<(i64, i64), Vec<NodeId>>,
}

impl NodeGrid {
    /// Creates a grid whose cells are at least as large as `tolerance`.
    pub fn new(tolerance: f64) -> Self {
        Self {
            cell_size: tolerance.max(1e-6),
            grid: FxHashMap::default(),
        }
    }

    /// Rebuilds a grid over all live nodes.
    pub fn from_nodes(nodes: &[Option<NodeData>], tolerance: f64) -> Self {
        let mut grid = Self::new(tolerance);
        for (i, node) in nodes.iter().enumerate() {
            if let Some(node) = node {
                grid.insert(NodeId::from_index(i), &node.point);
            }
        }
        grid
    }

    pub fn insert(&mut self, id: NodeId, p: &Point3<f64>) {
        let cell = self.cell_coords(p.x, p.y);
        self.grid.entry(cell).or_default().push(id);
    }

    /// Finds the lowest-numbered live node within `tolerance` of `p`.
    ///
    /// Z takes part in the distance only when `with_z` is set.
    pub fn find_near(
        &self,
        nodes: &[Option<NodeData>],
        p: &Point3<f64>,
        tolerance: f64,
        with_z: bool,
    ) -> Option<NodeId> {
        let (cx, cy) = self.cell_coords(p.x, p.y);
        let tol_sq = tolerance * tolerance;
        let mut best: Option<NodeId> = None;

        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(ids) = self.grid.get(&(cx.saturating_add(dx), cy.saturating_add(dy))) else {
                    continue;
                };
                for &id in ids {
                    let Some(Some(node)) = nodes.get(id.index()) else {
                        continue;
                    };
                    let mut dist_sq = (node.point.x - p.x).powi(2) + (node.point.y - p.y).powi(2);
                    if with_z {
                        dist_sq += (node.point.z - p.z).powi(2);
                    }
                    if dist_sq <= tol_sq && best.map_or(true, |b| id < b) {
                        best = Some(id);
                    }
                }
            }
        }

        best
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    fn cell_coords(&self, x: f64, y: f64) -> (i64, i64) {
        (self.cell_index(x), self.cell_index(y))
    }

    /// Cell index along one axis. Indexes are clamped to `±CELL_LIMIT`, so
    /// far-away coordinates share edge cells instead of overflowing; the
    /// exact distance test in [`NodeGrid::find_near`] keeps lookups correct.
    fn cell_index(&self, v: f64) -> i64 {
        (v / self.cell_size).floor().clamp(-CELL_LIMIT, CELL_LIMIT) as i64
    }
}

/// Largest cell index magnitude, 2^53.
const CELL_LIMIT: f64 = 9_007_199_254_740_992.0;

pub(crate) const SIDX: FileFormat = FileFormat {
    label: "sidx",
    magic: *b"VTSI",
    major: 1,
    minor: 0,
};

/// A handle with its bounding box, as stored in the R-tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoxEntry {
    pub id: u32,
    pub bbox: BoundBox,
}

impl RTreeObject for BoxEntry {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        to_aabb(&self.bbox)
    }
}

/// Infinite extents (2D queries, the empty box) are clamped to the finite
/// range so envelope arithmetic inside the tree stays well defined.
pub(crate) fn to_aabb(b: &BoundBox) -> AABB<[f64; 3]> {
    let c = |v: f64| v.clamp(f64::MIN, f64::MAX);
    AABB::from_corners([c(b.w), c(b.s), c(b.b)], [c(b.e), c(b.n), c(b.t)])
}

pub(crate) fn select(tree: &RTree<BoxEntry>, bbox: &BoundBox) -> Vec<u32> {
    if bbox.is_empty() {
        return Vec::new();
    }
    let envelope = to_aabb(bbox);
    let mut ids: Vec<u32> = tree
        .locate_in_envelope_intersecting(&envelope)
        .filter(|entry| entry.bbox.overlaps(bbox))
        .map(|entry| entry.id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Bounding-box index over the live lines, areas and isles of a topology.
#[derive(Debug)]
pub struct SpatialIndex {
    lines: RTree<BoxEntry>,
    areas: RTree<BoxEntry>,
    isles: RTree<BoxEntry>,
}

impl SpatialIndex {
    /// Builds the index from the topology alone.
    pub fn from_topology(topo: &Topology) -> Self {
        let lines = topo
            .lines()
            .filter(|(_, l)| l.alive)
            .map(|(id, l)| BoxEntry {
                id: id.get(),
                bbox: l.bbox,
            })
            .collect();
        let areas = topo
            .areas()
            .map(|(id, a)| BoxEntry {
                id: id.get(),
                bbox: a.bbox,
            })
            .collect();
        let isles = topo
            .isles()
            .map(|(id, i)| BoxEntry {
                id: id.get(),
                bbox: i.bbox,
            })
            .collect();
        Self::from_entries(lines, areas, isles)
    }

    fn from_entries(lines: Vec<BoxEntry>, areas: Vec<BoxEntry>, isles: Vec<BoxEntry>) -> Self {
        Self {
            lines: RTree::bulk_load(lines),
            areas: RTree::bulk_load(areas),
            isles: RTree::bulk_load(isles),
        }
    }

    /// Lines whose bounding box overlaps `bbox`, in ascending handle order.
    pub fn select_lines(&self, bbox: &BoundBox) -> Vec<LineId> {
        select(&self.lines, bbox).into_iter().filter_map(LineId::new).collect()
    }

    /// Areas whose bounding box overlaps `bbox`, in ascending handle order.
    pub fn select_areas(&self, bbox: &BoundBox) -> Vec<AreaId> {
        select(&self.areas, bbox).into_iter().filter_map(AreaId::new).collect()
    }

    /// Isles whose bounding box overlaps `bbox`, in ascending handle order.
    pub fn select_isles(&self, bbox: &BoundBox) -> Vec<IsleId> {
        select(&self.isles, bbox).into_iter().filter_map(IsleId::new).collect()
    }

    /// Whether the index covers exactly the records of `topo`.
    ///
    /// Used to discard a stale `sidx` file after the topology changed.
    pub fn matches(&self, topo: &Topology) -> bool {
        let mut expected: Vec<(u32, [u64; 6])> = topo
            .lines()
            .filter(|(_, l)| l.alive)
            .map(|(id, l)| (id.get(), box_bits(&l.bbox)))
            .collect();
        expected.sort_unstable();
        self.areas.size() == topo.n_areas()
            && self.isles.size() == topo.n_isles()
            && sorted_entries(&self.lines)
                .iter()
                .map(|e| (e.id, box_bits(&e.bbox)))
                .eq(expected)
    }

    pub fn to_writer<W: Write>(&self, w: W) -> Result<()> {
        let mut w = PortWriter::with_header(w, &SIDX, ByteOrder::native())?;
        for tree in [&self.lines, &self.areas, &self.isles] {
            let entries = sorted_entries(tree);
            w.put_len(entries.len())?;
            for e in entries {
                w.put_u32(e.id)?;
                for v in [e.bbox.w, e.bbox.e, e.bbox.s, e.bbox.n, e.bbox.b, e.bbox.t] {
                    w.put_f64(v)?;
                }
            }
        }
        w.into_inner().flush()?;
        Ok(())
    }

    pub fn from_reader<R: Read>(r: R) -> Result<Self> {
        let mut r = PortReader::with_header(r, &SIDX)?;
        let mut sections: [Vec<BoxEntry>; 3] = Default::default();
        for section in &mut sections {
            let n = r.get_len()?;
            section.reserve(capacity_hint(n));
            for _ in 0..n {
                let id = r.get_u32()?;
                let mut v = [0.0; 6];
                for slot in &mut v {
                    *slot = r.get_f64()?;
                }
                let [w, e, s, n, b, t] = v;
                let bbox = BoundBox::new(w, e, s, n, b, t);
                if !bbox.is_well_formed() {
                    return Err(Error::corrupt(SIDX.label, format!("entry {id} has box {v:?}")));
                }
                section.push(BoxEntry { id, bbox });
            }
        }
        let [lines, areas, isles] = sections;
        Ok(Self::from_entries(lines, areas, isles))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_writer(BufWriter::new(File::create(path)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

fn sorted_entries(tree: &RTree<BoxEntry>) -> Vec<&BoxEntry> {
    let mut entries: Vec<&BoxEntry> = tree.iter().collect();
    entries.sort_unstable_by_key(|e| e.id);
    entries
}

fn box_bits(b: &BoundBox) -> [u64; 6] {
    [b.w, b.e, b.s, b.n, b.b, b.t].map(f64::to_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(x: f64, y: f64) -> Option<NodeData> {
        Some(NodeData {
            point: Point3::new(x, y, 0.0),
            lines: Vec::new(),
            angles: Vec::new(),
        })
    }

    #[test]
    fn grid_finds_within_tolerance() {
        let nodes = vec![node_at(0.0, 0.0), node_at(10.0, 10.0)];
        let grid = NodeGrid::from_nodes(&nodes, 0.01);

        let near = Point3::new(0.005, 0.0, 0.0);
        assert_eq!(grid.find_near(&nodes, &near, 0.01, false), NodeId::new(1));

        let far = Point3::new(1.0, 0.0, 0.0);
        assert_eq!(grid.find_near(&nodes, &far, 0.01, false), None);
    }

    #[test]
    fn grid_handles_far_away_coordinates() {
        let nodes = vec![node_at(1.0e13, 0.0), node_at(-1.0e13, -4.0e15), node_at(1.0e13 + 5.0, 5.0)];
        let grid = NodeGrid::from_nodes(&nodes, 0.0);
        assert_eq!(grid.find_near(&nodes, &Point3::new(1.0e13, 0.0, 0.0), 0.0, false), NodeId::new(1));
        assert_eq!(grid.find_near(&nodes, &Point3::new(-1.0e13, -4.0e15, 0.0), 0.0, false), NodeId::new(2));
        assert_eq!(grid.find_near(&nodes, &Point3::new(1.0e13 + 5.0, 5.0, 0.0), 0.0, false), NodeId::new(3));
        assert_eq!(grid.find_near(&nodes, &Point3::new(1.0e13 + 1.0, 0.0, 0.0), 0.0, false), None);
        assert_eq!(grid.find_near(&nodes, &Point3::new(f64::MAX, f64::MIN, 0.0), 0.0, false), None);
    }

    #[test]
    fn grid_zero_tolerance_is_exact() {
        let nodes = vec![node_at(1.5, 2.5)];
        let grid = NodeGrid::from_nodes(&nodes, 0.0);
        assert_eq!(grid.find_near(&nodes, &Point3::new(1.5, 2.5, 0.0), 0.0, false), NodeId::new(1));
        assert_eq!(grid.find_near(&nodes, &Point3::new(1.5, 2.5000001, 0.0), 0.0, false), None);
    }

    #[test]
    fn grid_skips_dead_nodes() {
        let mut nodes = vec![node_at(0.0, 0.0)];
        let grid = NodeGrid::from_nodes(&nodes, 0.1);
        nodes[0] = None;
        assert_eq!(grid.find_near(&nodes, &Point3::new(0.0, 0.0, 0.0), 0.1, false), None);
    }

    #[test]
    fn grid_z_only_counts_in_3d() {
        let nodes = vec![Some(NodeData {
            point: Point3::new(0.0, 0.0, 5.0),
            lines: Vec::new(),
            angles: Vec::new(),
        })];
        let grid = NodeGrid::from_nodes(&nodes, 0.1);
        let p = Point3::new(0.0, 0.0, 0.0);
        assert!(grid.find_near(&nodes, &p, 0.1, false).is_some());
        assert!(grid.find_near(&nodes, &p, 0.1, true).is_none());
    }

    #[test]
    fn select_filters_and_sorts() {
        let tree = RTree::bulk_load(vec![
            BoxEntry {
                id: 3,
                bbox: BoundBox::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0),
            },
            BoxEntry {
                id: 1,
                bbox: BoundBox::new(0.5, 2.0, 0.5, 2.0, 0.0, 0.0),
            },
            BoxEntry {
                id: 2,
                bbox: BoundBox::new(5.0, 6.0, 5.0, 6.0, 0.0, 0.0),
            },
        ]);
        assert_eq!(select(&tree, &BoundBox::planar(0.0, 1.0, 0.0, 1.0)), vec![1, 3]);
        assert_eq!(select(&tree, &BoundBox::planar(10.0, 11.0, 10.0, 11.0)), Vec::<u32>::new());
        assert_eq!(select(&tree, &BoundBox::EMPTY), Vec::<u32>::new());
    }

    #[test]
    fn non_finite_box_in_file_is_corrupt() {
        let mut w = PortWriter::with_header(Vec::new(), &SIDX, ByteOrder::Little).unwrap();
        w.put_len(1).unwrap();
        w.put_u32(1).unwrap();
        for v in [0.0, f64::NAN, 0.0, 1.0, 0.0, 0.0] {
            w.put_f64(v).unwrap();
        }
        w.put_len(0).unwrap();
        w.put_len(0).unwrap();
        let bytes = w.into_inner();

        let err = SpatialIndex::from_reader(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corrupt { file: "sidx", .. }));
    }
}
