// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The topology structure: nodes, lines, areas and isles.
//!
//! [`Topology`] owns four record arrays that reference each other by 1-based
//! handle. Lines point at the geometry source by handle and never copy
//! coordinates. Dead lines and nodes keep their slot so that no handle is
//! ever renumbered by a deletion.
//!
//! ## Derived data and build levels
//!
//! What the structure holds depends on its [`BuildLevel`]:
//!
//! - `Base`: nodes, and lines linked into them with angularly sorted
//!   incidence lists.
//! - `Areas`: areas and isles traced from boundaries, boundary sides.
//! - `AttachIsles`: each isle's enclosing area.
//! - `Centroids`: each area's centroid and each centroid's area.
//!
//! [`Topology::downgrade`] drops everything above a level; the builder then
//! recomputes it.

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::geometry::BoundBox;
use crate::keys::*;
use crate::spatial::NodeGrid;

/// Whether the structure accepts incremental writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    Write,
}

/// A point where lines meet, or a dangling endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub point: Point3<f64>,
    /// Incident lines: forward if the line starts here, reversed if it ends
    /// here. Sorted by `angles`, counter-clockwise.
    pub lines: Vec<DirectedLine>,
    /// Direction of each incident line away from the node, in radians.
    pub angles: Vec<f32>,
}

impl NodeData {
    pub fn degree(&self) -> usize {
        self.lines.len()
    }

    /// Incident lines with their angles, counter-clockwise.
    pub fn incidences(&self) -> impl Iterator<Item = (DirectedLine, f32)> + '_ {
        self.lines.iter().copied().zip(self.angles.iter().copied())
    }
}

/// Topological links of a line, by line type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineTopo {
    /// Points, faces and kernels carry no links.
    None,
    Line {
        n1: NodeId,
        n2: NodeId,
    },
    Boundary {
        n1: NodeId,
        n2: NodeId,
        left: Side,
        right: Side,
    },
    Centroid {
        area: CentroidLink,
    },
}

/// A geometry record as seen by the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct LineData {
    pub kind: LineType,
    /// Handle of the geometry record in the source.
    pub offset: u64,
    pub alive: bool,
    pub bbox: BoundBox,
    pub topo: LineTopo,
}

impl LineData {
    /// Start and end node, for lines and boundaries.
    pub fn nodes(&self) -> Option<(NodeId, NodeId)> {
        match self.topo {
            LineTopo::Line { n1, n2 } | LineTopo::Boundary { n1, n2, .. } => Some((n1, n2)),
            _ => None,
        }
    }

    /// Left and right side, for boundaries.
    pub fn sides(&self) -> Option<(Side, Side)> {
        match self.topo {
            LineTopo::Boundary { left, right, .. } => Some((left, right)),
            _ => None,
        }
    }

    /// Owning area link, for centroids.
    pub fn centroid_link(&self) -> Option<CentroidLink> {
        match self.topo {
            LineTopo::Centroid { area } => Some(area),
            _ => None,
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self.topo, LineTopo::Boundary { .. })
    }
}

/// A region bounded by an outer ring of boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaData {
    /// Outer ring, counter-clockwise with the area on the left.
    pub lines: Vec<DirectedLine>,
    pub isles: Vec<IsleId>,
    pub centroid: Option<LineId>,
    pub bbox: BoundBox,
}

/// A hole ring inside an area.
#[derive(Debug, Clone, PartialEq)]
pub struct IsleData {
    /// Hole ring, clockwise with the isle on the left.
    pub lines: Vec<DirectedLine>,
    pub area: Option<AreaId>,
    pub bbox: BoundBox,
}

/// The in-memory topology of one vector map.
#[derive(Debug, Clone)]
pub struct Topology {
    pub(crate) with_z: bool,
    pub(crate) level: BuildLevel,
    pub(crate) mode: AccessMode,
    pub(crate) bbox: BoundBox,

    pub(crate) nodes: Vec<Option<NodeData>>,
    pub(crate) lines: Vec<LineData>,
    pub(crate) areas: Vec<AreaData>,
    pub(crate) isles: Vec<IsleData>,

    // Endpoint lookup for linking lines into nodes
    pub(crate) grid: NodeGrid,
    pub(crate) tolerance: f64,
}

impl Topology {
    /// Creates an empty structure at level `None`.
    pub fn new(with_z: bool, mode: AccessMode) -> Self {
        Self {
            with_z,
            level: BuildLevel::None,
            mode,
            bbox: BoundBox::EMPTY,
            nodes: Vec::new(),
            lines: Vec::new(),
            areas: Vec::new(),
            isles: Vec::new(),
            grid: NodeGrid::new(0.0),
            tolerance: 0.0,
        }
    }

    pub fn with_z(&self) -> bool {
        self.with_z
    }

    pub fn level(&self) -> BuildLevel {
        self.level
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AccessMode) {
        self.mode = mode;
    }

    /// Bounding box of every line linked so far. Deletions do not shrink it.
    pub fn bbox(&self) -> BoundBox {
        self.bbox
    }

    // --- Lookup ---

    /// Returns a live node.
    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.index())?.as_ref()
    }

    /// Returns a line, alive or dead.
    pub fn line(&self, id: LineId) -> Option<&LineData> {
        self.lines.get(id.index())
    }

    pub fn area(&self, id: AreaId) -> Option<&AreaData> {
        self.areas.get(id.index())
    }

    pub fn isle(&self, id: IsleId) -> Option<&IsleData> {
        self.isles.get(id.index())
    }

    /// Live nodes in handle order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId::from_index(i), n)))
    }

    /// All lines, alive and dead, in handle order.
    pub fn lines(&self) -> impl Iterator<Item = (LineId, &LineData)> {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, l)| (LineId::from_index(i), l))
    }

    pub fn areas(&self) -> impl Iterator<Item = (AreaId, &AreaData)> {
        self.areas
            .iter()
            .enumerate()
            .map(|(i, a)| (AreaId::from_index(i), a))
    }

    pub fn isles(&self) -> impl Iterator<Item = (IsleId, &IsleData)> {
        self.isles
            .iter()
            .enumerate()
            .map(|(i, a)| (IsleId::from_index(i), a))
    }

    /// Number of node slots, including dead ones.
    pub fn node_slots(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live nodes.
    pub fn n_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Number of line slots, including dead lines.
    pub fn n_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn n_areas(&self) -> usize {
        self.areas.len()
    }

    pub fn n_isles(&self) -> usize {
        self.isles.len()
    }

    /// Live lines per type, indexed by [`LineType::slot`].
    pub fn type_counts(&self) -> [usize; 6] {
        let mut counts = [0; 6];
        for line in self.lines.iter().filter(|l| l.alive) {
            counts[line.kind.slot()] += 1;
        }
        counts
    }

    pub(crate) fn line_mut(&mut self, id: LineId) -> Option<&mut LineData> {
        self.lines.get_mut(id.index())
    }

    pub(crate) fn is_live_boundary(&self, id: LineId) -> bool {
        self.line(id).is_some_and(|l| l.alive && l.is_boundary())
    }

    /// Node at which travel along `dl` ends.
    pub(crate) fn end_node(&self, dl: DirectedLine) -> Option<NodeId> {
        let (n1, n2) = self.line(dl.line)?.nodes()?;
        Some(if dl.forward { n2 } else { n1 })
    }

    // --- Level management ---

    pub(crate) fn require_writable(&self) -> Result<()> {
        match self.mode {
            AccessMode::Write => Ok(()),
            AccessMode::ReadOnly => Err(Error::ReadOnly),
        }
    }

    pub(crate) fn require_level(&self, required: BuildLevel) -> Result<()> {
        if self.level < required {
            return Err(Error::LevelRequired {
                required,
                current: self.level,
            });
        }
        Ok(())
    }

    /// Drops derived data above `level` and lowers the build level.
    ///
    /// Raw nodes and lines survive any downgrade except to `None`. Asking
    /// for a level at or above the current one does nothing.
    pub fn downgrade(&mut self, level: BuildLevel) {
        if level < self.level {
            self.discard_above(level);
        }
    }

    /// Drops derived data above `level` whatever the current level is. Used
    /// to roll back a stage that failed half way.
    pub(crate) fn discard_above(&mut self, level: BuildLevel) {
        if level < BuildLevel::Centroids {
            for line in &mut self.lines {
                if let LineTopo::Centroid { area } = &mut line.topo {
                    *area = CentroidLink::Outside;
                }
            }
            for area in &mut self.areas {
                area.centroid = None;
            }
        }
        if level < BuildLevel::AttachIsles {
            for isle in &mut self.isles {
                isle.area = None;
            }
            for area in &mut self.areas {
                area.isles.clear();
            }
        }
        if level < BuildLevel::Areas {
            self.areas.clear();
            self.isles.clear();
            for line in &mut self.lines {
                if let LineTopo::Boundary { left, right, .. } = &mut line.topo {
                    *left = Side::None;
                    *right = Side::None;
                }
            }
        }
        if level < BuildLevel::Base {
            self.nodes.clear();
            self.lines.clear();
            self.grid.clear();
            self.bbox = BoundBox::EMPTY;
        }
        self.level = self.level.min(level);
    }
}
