// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Linking lines into nodes.
//!
//! Every line and boundary gets a node at each end: an existing node when
//! one lies within the snapping tolerance, a new one otherwise. The line is
//! registered at both nodes with its departure angle, and each node keeps
//! its incidences sorted by angle so that "next line clockwise" is an index
//! step. Points, centroids, faces and kernels are stored without nodes.

use nalgebra::Point3;

use crate::arena::{AccessMode, LineData, LineTopo, NodeData, Topology};
use crate::error::{Error, Result};
use crate::geometry::node_angle;
use crate::keys::*;
use crate::source::GeometryRecord;
use crate::spatial::NodeGrid;

impl Topology {
    /// Creates an empty structure that snaps endpoints within `tolerance`.
    pub(crate) fn for_build(with_z: bool, mode: AccessMode, tolerance: f64) -> Self {
        let mut topo = Topology::new(with_z, mode);
        topo.tolerance = tolerance;
        topo.grid = NodeGrid::new(tolerance);
        topo
    }

    /// Appends a line for the record at `offset` and links it into nodes.
    pub(crate) fn push_line(&mut self, offset: u64, record: &GeometryRecord) -> Result<LineId> {
        let id = LineId::from_index(self.lines.len());
        let bbox = record.bbox();
        let topo = self.link_record(id, record)?;

        self.bbox = self.bbox.union(&bbox);
        self.lines.push(LineData {
            kind: record.kind,
            offset,
            alive: true,
            bbox,
            topo,
        });
        Ok(id)
    }

    /// Registers line `id` at the nodes of its end vertices.
    fn link_record(&mut self, id: LineId, record: &GeometryRecord) -> Result<LineTopo> {
        Ok(match record.kind {
            LineType::Line | LineType::Boundary => {
                let (Some(first), Some(last)) = (record.points.first(), record.points.last()) else {
                    return Err(Error::InvalidGeometry(format!("{} without vertices", record.kind)));
                };
                let n1 = self.find_or_add_node(first);
                let n2 = self.find_or_add_node(last);
                self.insert_incidence(n1, DirectedLine::forward(id), node_angle(&record.points, true));
                self.insert_incidence(n2, DirectedLine::backward(id), node_angle(&record.points, false));
                if record.kind == LineType::Boundary {
                    LineTopo::Boundary {
                        n1,
                        n2,
                        left: Side::None,
                        right: Side::None,
                    }
                } else {
                    LineTopo::Line { n1, n2 }
                }
            }
            LineType::Centroid => LineTopo::Centroid {
                area: CentroidLink::Outside,
            },
            LineType::Point | LineType::Face | LineType::Kernel => LineTopo::None,
        })
    }

    /// Links a newly written line into the structure.
    ///
    /// Areas, isles and centroid links no longer describe the map after a
    /// write, so the structure drops to `Base`.
    pub fn add_line(&mut self, offset: u64, record: &GeometryRecord) -> Result<LineId> {
        self.require_writable()?;
        self.require_level(BuildLevel::Base)?;
        record.validate()?;
        self.downgrade(BuildLevel::Base);
        self.push_line(offset, record)
    }

    /// Marks a line dead and unlinks it from its nodes.
    ///
    /// The slot is kept so no other handle changes. Nodes left without
    /// lines die too. Like [`Topology::add_line`], drops the structure to
    /// `Base`.
    pub fn delete_line(&mut self, id: LineId) -> Result<()> {
        self.require_writable()?;
        self.require_level(BuildLevel::Base)?;
        let nodes = match self.line(id) {
            Some(line) if line.alive => line.nodes(),
            _ => return Err(Error::LineNotFound(id)),
        };
        self.downgrade(BuildLevel::Base);

        if let Some((n1, n2)) = nodes {
            self.remove_incidences(n1, id);
            if n2 != n1 {
                self.remove_incidences(n2, id);
            }
        }
        if let Some(line) = self.line_mut(id) {
            line.alive = false;
        }
        Ok(())
    }

    /// Links a deleted line back in under its old handle.
    ///
    /// `record` is the line's geometry, read from the source at the line's
    /// offset. Only lines deleted since the last `Base` build still have a
    /// slot to come back to. Drops the structure to `Base`.
    pub fn restore_line(&mut self, id: LineId, record: &GeometryRecord) -> Result<()> {
        self.require_writable()?;
        self.require_level(BuildLevel::Base)?;
        match self.line(id) {
            None => return Err(Error::LineNotFound(id)),
            Some(line) if line.alive => return Err(Error::LineAlive(id)),
            Some(line) if line.kind != record.kind => {
                return Err(Error::InvalidGeometry(format!(
                    "cannot restore {} {id} from a {} record",
                    line.kind, record.kind
                )));
            }
            Some(_) => {}
        }
        record.validate()?;
        self.downgrade(BuildLevel::Base);

        let bbox = record.bbox();
        let topo = self.link_record(id, record)?;
        self.bbox = self.bbox.union(&bbox);
        if let Some(line) = self.line_mut(id) {
            line.alive = true;
            line.bbox = bbox;
            line.topo = topo;
        }
        Ok(())
    }

    /// Replaces a line by a new record stored at `offset`.
    ///
    /// The old line is deleted and keeps its dead slot; the new geometry is
    /// linked in under a new handle, which is returned.
    pub fn rewrite_line(&mut self, id: LineId, offset: u64, record: &GeometryRecord) -> Result<LineId> {
        self.require_writable()?;
        self.require_level(BuildLevel::Base)?;
        record.validate()?;
        self.delete_line(id)?;
        self.push_line(offset, record)
    }

    fn find_or_add_node(&mut self, p: &Point3<f64>) -> NodeId {
        if let Some(existing) = self.grid.find_near(&self.nodes, p, self.tolerance, self.with_z) {
            return existing;
        }
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Some(NodeData {
            point: *p,
            lines: Vec::new(),
            angles: Vec::new(),
        }));
        self.grid.insert(id, p);
        id
    }

    /// Inserts an incidence after any existing ones with the same angle, so
    /// ties keep insertion order.
    fn insert_incidence(&mut self, node: NodeId, dl: DirectedLine, angle: f32) {
        if let Some(Some(data)) = self.nodes.get_mut(node.index()) {
            let pos = data.angles.partition_point(|&a| a <= angle);
            data.angles.insert(pos, angle);
            data.lines.insert(pos, dl);
        }
    }

    fn remove_incidences(&mut self, node: NodeId, line: LineId) {
        let Some(slot) = self.nodes.get_mut(node.index()) else {
            return;
        };
        let Some(data) = slot else {
            return;
        };
        let mut i = 0;
        while i < data.lines.len() {
            if data.lines[i].line == line {
                data.lines.remove(i);
                data.angles.remove(i);
            } else {
                i += 1;
            }
        }
        if data.lines.is_empty() {
            *slot = None;
        }
    }
}
