// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary persistence of the topology structure (`topo` file).
//!
//! Layout after the common header (magic `VTPO`, version, byte-order tag):
//!
//! ```text
//! with_z u8, level u8, box 6×f64, snap tolerance f64,
//! node slots u32, lines u32, areas u32, isles u32, live lines per type 6×u32
//! node  : alive u8 [n u32, n × line i32, n × angle f32, x f64, y f64 (z f64)]
//! line  : alive u8, type u8, offset u64, box 6×f64, then
//!         line: n1 u32, n2 u32 | boundary: n1, n2, left i32, right i32 |
//!         centroid: area i32 | others: nothing
//! area  : box, n u32, n × line i32, n u32, n × isle u32, centroid u32
//! isle  : box, n u32, n × line i32, area u32
//! ```
//!
//! Handles are stored as-is, so a loaded structure numbers everything the
//! same way as the one that was saved. Every reference is checked on load.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::arena::{AccessMode, AreaData, IsleData, LineData, LineTopo, NodeData, Topology};
use crate::error::{Error, Result};
use crate::geometry::BoundBox;
use crate::keys::*;
use crate::port::{capacity_hint, ByteOrder, FileFormat, PortReader, PortWriter};
use crate::spatial::NodeGrid;

pub(crate) const TOPO: FileFormat = FileFormat {
    label: "topo",
    magic: *b"VTPO",
    major: 1,
    minor: 0,
};

fn corrupt(reason: impl Into<String>) -> Error {
    Error::corrupt(TOPO.label, reason)
}

impl Topology {
    /// Writes the structure in host byte order.
    pub fn to_writer<W: Write>(&self, w: W) -> Result<()> {
        self.to_writer_with_order(w, ByteOrder::native())
    }

    pub fn to_writer_with_order<W: Write>(&self, w: W, order: ByteOrder) -> Result<()> {
        let mut w = PortWriter::with_header(w, &TOPO, order)?;
        w.put_bool(self.with_z)?;
        w.put_u8(self.level.code())?;
        put_box(&mut w, &self.bbox)?;
        w.put_f64(self.tolerance)?;
        for len in [self.nodes.len(), self.lines.len(), self.areas.len(), self.isles.len()] {
            w.put_len(len)?;
        }
        for n in self.type_counts() {
            w.put_len(n)?;
        }

        for slot in &self.nodes {
            w.put_bool(slot.is_some())?;
            let Some(node) = slot else {
                continue;
            };
            w.put_len(node.lines.len())?;
            for dl in &node.lines {
                w.put_i32(dl.raw())?;
            }
            for &a in &node.angles {
                w.put_f32(a)?;
            }
            w.put_f64(node.point.x)?;
            w.put_f64(node.point.y)?;
            if self.with_z {
                w.put_f64(node.point.z)?;
            }
        }

        for line in &self.lines {
            w.put_bool(line.alive)?;
            w.put_u8(line.kind.code())?;
            w.put_u64(line.offset)?;
            put_box(&mut w, &line.bbox)?;
            match line.topo {
                LineTopo::None => {}
                LineTopo::Line { n1, n2 } => {
                    w.put_u32(n1.get())?;
                    w.put_u32(n2.get())?;
                }
                LineTopo::Boundary { n1, n2, left, right } => {
                    w.put_u32(n1.get())?;
                    w.put_u32(n2.get())?;
                    w.put_i32(left.raw())?;
                    w.put_i32(right.raw())?;
                }
                LineTopo::Centroid { area } => w.put_i32(area.raw())?,
            }
        }

        for area in &self.areas {
            put_box(&mut w, &area.bbox)?;
            put_ring(&mut w, &area.lines)?;
            w.put_len(area.isles.len())?;
            for isle in &area.isles {
                w.put_u32(isle.get())?;
            }
            w.put_u32(area.centroid.map_or(0, LineId::get))?;
        }

        for isle in &self.isles {
            put_box(&mut w, &isle.bbox)?;
            put_ring(&mut w, &isle.lines)?;
            w.put_u32(isle.area.map_or(0, AreaId::get))?;
        }

        w.into_inner().flush()?;
        Ok(())
    }

    /// Reads a structure written by [`Topology::to_writer`] in either byte
    /// order.
    pub fn from_reader<R: Read>(r: R, mode: AccessMode) -> Result<Self> {
        let mut r = PortReader::with_header(r, &TOPO)?;
        let with_z = r.get_bool()?;
        let code = r.get_u8()?;
        let level = BuildLevel::from_code(code).ok_or_else(|| corrupt(format!("unknown build level {code}")))?;
        let bbox = get_box(&mut r)?;
        let tolerance = r.get_f64()?;
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(corrupt(format!("bad snap tolerance {tolerance}")));
        }
        let n_nodes = r.get_len()?;
        let n_lines = r.get_len()?;
        let n_areas = r.get_len()?;
        let n_isles = r.get_len()?;
        let mut stored_types = [0usize; 6];
        for slot in &mut stored_types {
            *slot = r.get_len()?;
        }

        let mut nodes = Vec::with_capacity(capacity_hint(n_nodes));
        for _ in 0..n_nodes {
            if !r.get_bool()? {
                nodes.push(None);
                continue;
            }
            let n = r.get_len()?;
            let mut lines = Vec::with_capacity(capacity_hint(n));
            for _ in 0..n {
                lines.push(get_directed(&mut r)?);
            }
            let mut angles = Vec::with_capacity(capacity_hint(n));
            for _ in 0..n {
                angles.push(r.get_f32()?);
            }
            let x = r.get_f64()?;
            let y = r.get_f64()?;
            let z = if with_z { r.get_f64()? } else { 0.0 };
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                return Err(corrupt(format!("node {} has a non-finite coordinate", nodes.len() + 1)));
            }
            nodes.push(Some(NodeData {
                point: Point3::new(x, y, z),
                lines,
                angles,
            }));
        }

        let mut lines = Vec::with_capacity(capacity_hint(n_lines));
        for _ in 0..n_lines {
            let alive = r.get_bool()?;
            let code = r.get_u8()?;
            let kind = LineType::from_code(code).ok_or_else(|| corrupt(format!("unknown line type {code}")))?;
            let offset = r.get_u64()?;
            let bbox = get_box(&mut r)?;
            let topo = match kind {
                LineType::Line => LineTopo::Line {
                    n1: get_node(&mut r)?,
                    n2: get_node(&mut r)?,
                },
                LineType::Boundary => LineTopo::Boundary {
                    n1: get_node(&mut r)?,
                    n2: get_node(&mut r)?,
                    left: Side::from_raw(r.get_i32()?),
                    right: Side::from_raw(r.get_i32()?),
                },
                LineType::Centroid => LineTopo::Centroid {
                    area: CentroidLink::from_raw(r.get_i32()?),
                },
                LineType::Point | LineType::Face | LineType::Kernel => LineTopo::None,
            };
            lines.push(LineData {
                kind,
                offset,
                alive,
                bbox,
                topo,
            });
        }

        let mut areas = Vec::with_capacity(capacity_hint(n_areas));
        for _ in 0..n_areas {
            let bbox = get_box(&mut r)?;
            let ring = get_ring(&mut r)?;
            let n = r.get_len()?;
            let mut isles = Vec::with_capacity(capacity_hint(n));
            for _ in 0..n {
                isles.push(IsleId::new(r.get_u32()?).ok_or_else(|| corrupt("zero isle handle in area"))?);
            }
            let centroid = LineId::new(r.get_u32()?);
            areas.push(AreaData {
                lines: ring,
                isles,
                centroid,
                bbox,
            });
        }

        let mut isles = Vec::with_capacity(capacity_hint(n_isles));
        for _ in 0..n_isles {
            let bbox = get_box(&mut r)?;
            let ring = get_ring(&mut r)?;
            let area = AreaId::new(r.get_u32()?);
            isles.push(IsleData {
                lines: ring,
                area,
                bbox,
            });
        }

        let topo = Topology {
            with_z,
            level,
            mode,
            bbox,
            grid: NodeGrid::from_nodes(&nodes, tolerance),
            nodes,
            lines,
            areas,
            isles,
            tolerance,
        };
        topo.check_references()?;
        if topo.type_counts() != stored_types {
            return Err(corrupt("per-type line counts disagree with line records"));
        }
        tracing::debug!(
            level = %topo.level,
            nodes = topo.n_nodes(),
            lines = topo.n_lines(),
            areas = topo.n_areas(),
            isles = topo.n_isles(),
            "Loaded topology"
        );
        Ok(topo)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_writer(BufWriter::new(File::create(path)?))
    }

    pub fn load(path: &Path, mode: AccessMode) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?), mode)
    }

    /// Checks that every handle in the structure points at an existing
    /// record and that derived data matches the build level.
    fn check_references(&self) -> Result<()> {
        let line_ok = |dl: &DirectedLine| dl.line.index() < self.lines.len();
        let node_ok = |n: NodeId, alive: bool| match self.nodes.get(n.index()) {
            Some(slot) => !alive || slot.is_some(),
            None => false,
        };
        let side_ok = |s: Side| match s {
            Side::None => true,
            Side::Area(a) => a.index() < self.areas.len(),
            Side::Isle(i) => i.index() < self.isles.len(),
        };

        for (id, node) in self.nodes() {
            if !node.lines.iter().all(line_ok) {
                return Err(corrupt(format!("node {id} references a missing line")));
            }
        }

        for (id, line) in self.lines() {
            let ok = match line.topo {
                LineTopo::None => true,
                LineTopo::Line { n1, n2 } => node_ok(n1, line.alive) && node_ok(n2, line.alive),
                LineTopo::Boundary { n1, n2, left, right } => {
                    node_ok(n1, line.alive) && node_ok(n2, line.alive) && side_ok(left) && side_ok(right)
                }
                LineTopo::Centroid { area } => match area {
                    CentroidLink::Outside => true,
                    CentroidLink::Area(a) | CentroidLink::Duplicate(a) => a.index() < self.areas.len(),
                },
            };
            if !ok {
                return Err(corrupt(format!("line {id} references a missing record")));
            }
        }

        for (id, area) in self.areas() {
            let ok = area.lines.iter().all(line_ok)
                && area.isles.iter().all(|i| i.index() < self.isles.len())
                && area.centroid.map_or(true, |c| c.index() < self.lines.len());
            if !ok {
                return Err(corrupt(format!("area {id} references a missing record")));
            }
        }

        for (id, isle) in self.isles() {
            let ok = isle.lines.iter().all(line_ok) && isle.area.map_or(true, |a| a.index() < self.areas.len());
            if !ok {
                return Err(corrupt(format!("isle {id} references a missing record")));
            }
        }

        if self.level < BuildLevel::Areas && !(self.areas.is_empty() && self.isles.is_empty()) {
            return Err(corrupt(format!("areas present at level {}", self.level)));
        }
        Ok(())
    }
}

fn put_box<W: Write>(w: &mut PortWriter<W>, b: &BoundBox) -> Result<()> {
    for v in [b.w, b.e, b.s, b.n, b.b, b.t] {
        w.put_f64(v)?;
    }
    Ok(())
}

fn get_box<R: Read>(r: &mut PortReader<R>) -> Result<BoundBox> {
    let mut v = [0.0; 6];
    for slot in &mut v {
        *slot = r.get_f64()?;
    }
    let [w, e, s, n, b, t] = v;
    let bbox = BoundBox::new(w, e, s, n, b, t);
    if !bbox.is_well_formed() {
        return Err(corrupt(format!("malformed bounding box {v:?}")));
    }
    Ok(bbox)
}

fn put_ring<W: Write>(w: &mut PortWriter<W>, ring: &[DirectedLine]) -> Result<()> {
    w.put_len(ring.len())?;
    for dl in ring {
        w.put_i32(dl.raw())?;
    }
    Ok(())
}

fn get_ring<R: Read>(r: &mut PortReader<R>) -> Result<Vec<DirectedLine>> {
    let n = r.get_len()?;
    let mut ring = Vec::with_capacity(capacity_hint(n));
    for _ in 0..n {
        ring.push(get_directed(r)?);
    }
    Ok(ring)
}

fn get_directed<R: Read>(r: &mut PortReader<R>) -> Result<DirectedLine> {
    DirectedLine::from_raw(r.get_i32()?).ok_or_else(|| corrupt("zero line handle"))
}

fn get_node<R: Read>(r: &mut PortReader<R>) -> Result<NodeId> {
    NodeId::new(r.get_u32()?).ok_or_else(|| corrupt("zero node handle"))
}
