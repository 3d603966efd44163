// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Staged topology construction.
//!
//! [`build`] brings a [`Topology`] to a target [`BuildLevel`] by running
//! only the missing stages, in order:
//!
//! 1. `Base`: read every live geometry record once and link lines into
//!    nodes. Built into a fresh structure that replaces the old one only
//!    on success.
//! 2. `Areas`: trace a ring on each side of every boundary. Counter-clockwise
//!    rings become areas; clockwise rings lying inside another area become
//!    isles; the remaining clockwise rings face the unbounded exterior.
//! 3. `AttachIsles`: give each isle its smallest enclosing area.
//! 4. `Centroids`: give each area the lowest-numbered centroid inside it;
//!    later ones are marked duplicates.
//!
//! A target below the current level downgrades first, so rebuilding a
//! stage is a downgrade followed by a build. A stage that fails is rolled
//! back, leaving the structure at the last completed level.

use nalgebra::Point2;
use rstar::RTree;
use rustc_hash::FxHashSet;

use crate::arena::{AreaData, IsleData, LineTopo, Topology};
use crate::config::BuildOptions;
use crate::error::{Error, Result};
use crate::geometry::{point_in_ring, ring_inside, signed_area, BoundBox, RingPosition};
use crate::keys::*;
use crate::report::{BuildReport, Counts};
use crate::source::GeometrySource;
use crate::spatial::{select, BoxEntry};

// --- Progress reporting ---

/// Receives progress from a running build.
pub trait BuildProgress {
    fn stage_started(&mut self, stage: BuildLevel);

    /// Called every `progress_interval` records with the number done so far.
    fn advance(&mut self, stage: BuildLevel, done: usize);

    fn stage_finished(&mut self, stage: BuildLevel, counts: &Counts);
}

/// Forwards progress to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl BuildProgress for TracingProgress {
    fn stage_started(&mut self, stage: BuildLevel) {
        tracing::info!(stage = %stage, "Build stage started");
    }

    fn advance(&mut self, stage: BuildLevel, done: usize) {
        tracing::debug!(stage = %stage, done, "Build progress");
    }

    fn stage_finished(&mut self, stage: BuildLevel, counts: &Counts) {
        tracing::info!(
            stage = %stage,
            nodes = counts.nodes,
            lines = counts.lines,
            areas = counts.areas,
            isles = counts.isles,
            "Build stage finished"
        );
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl BuildProgress for NullProgress {
    fn stage_started(&mut self, _stage: BuildLevel) {}
    fn advance(&mut self, _stage: BuildLevel, _done: usize) {}
    fn stage_finished(&mut self, _stage: BuildLevel, _counts: &Counts) {}
}

/// Everything one build needs besides the structure itself.
pub struct BuildContext<'a> {
    pub source: &'a dyn GeometrySource,
    pub options: &'a BuildOptions,
    pub progress: &'a mut dyn BuildProgress,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        source: &'a dyn GeometrySource,
        options: &'a BuildOptions,
        progress: &'a mut dyn BuildProgress,
    ) -> Self {
        Self {
            source,
            options,
            progress,
        }
    }

    fn tick(&mut self, stage: BuildLevel, done: usize) {
        if done % self.options.progress_interval.max(1) == 0 {
            self.progress.advance(stage, done);
        }
    }
}

/// Brings `topo` to `target`, downgrading first if it is above it.
///
/// Returns the report for the resulting structure. Anomalies never fail a
/// build; only errors reading the geometry source do.
pub fn build(topo: &mut Topology, ctx: &mut BuildContext<'_>, target: BuildLevel) -> Result<BuildReport> {
    ctx.options.validate()?;

    if target < topo.level() {
        tracing::info!(from = %topo.level(), to = %target, "Downgrading topology");
        topo.downgrade(target);
    }

    while topo.level() < target {
        let done = topo.level();
        let Some(stage) = done.next() else {
            break;
        };
        ctx.progress.stage_started(stage);
        let result = match stage {
            BuildLevel::None => Ok(()),
            BuildLevel::Base => build_base(topo, ctx),
            BuildLevel::Areas => build_areas(topo, ctx),
            BuildLevel::AttachIsles => attach_isles(topo, ctx),
            BuildLevel::Centroids => attach_centroids(topo, ctx),
        };
        if let Err(e) = result {
            topo.discard_above(done);
            tracing::warn!(stage = %stage, error = %e, level = %done, "Build stage failed, rolled back");
            return Err(e);
        }
        topo.level = stage;
        ctx.progress.stage_finished(stage, &topo.counts());
    }

    let report = topo.report();
    if let Some(a) = report.anomalies.filter(|a| a.total() > 0) {
        tracing::warn!(
            missing_one_side = a.boundaries_missing_one_side,
            missing_both_sides = a.boundaries_missing_both_sides,
            unattached_isles = a.unattached_isles,
            centroids_outside = a.centroids_outside,
            duplicate_centroids = a.duplicate_centroids,
            areas_without_centroid = a.areas_without_centroid,
            "Topology has anomalies"
        );
    }
    Ok(report)
}

// --- Stages ---

fn build_base(topo: &mut Topology, ctx: &mut BuildContext<'_>) -> Result<()> {
    let source = ctx.source;
    let mut fresh = Topology::for_build(source.with_z(), topo.mode(), ctx.options.snap_tolerance);
    for (i, item) in source.scan().enumerate() {
        let (offset, record) = item?;
        fresh.push_line(offset, &record)?;
        ctx.tick(BuildLevel::Base, i + 1);
    }
    *topo = fresh;
    Ok(())
}

struct Ring {
    lines: Vec<DirectedLine>,
    points: Vec<Point2<f64>>,
    bbox: BoundBox,
}

fn build_areas(topo: &mut Topology, ctx: &mut BuildContext<'_>) -> Result<()> {
    let source = ctx.source;
    let boundaries: Vec<LineId> = topo
        .lines()
        .filter(|(id, l)| l.alive && l.is_boundary() && !topo.is_degenerate(*id))
        .map(|(id, _)| id)
        .collect();

    let mut visited: FxHashSet<i32> = FxHashSet::default();
    let mut clockwise: Vec<Ring> = Vec::new();
    for (i, &id) in boundaries.iter().enumerate() {
        for start in [DirectedLine::forward(id), DirectedLine::backward(id)] {
            if !visited.insert(start.raw()) {
                continue;
            }
            let Some(lines) = topo.trace_ring(start) else {
                continue;
            };
            visited.extend(lines.iter().map(|d| d.raw()));
            let points = topo.ring_points(source, &lines)?;
            let bbox = topo.ring_bbox(&lines);
            if signed_area(&points) > 0.0 {
                topo.push_area(lines, bbox);
            } else {
                clockwise.push(Ring {
                    lines,
                    points,
                    bbox,
                });
            }
        }
        ctx.tick(BuildLevel::Areas, i + 1);
    }

    let areas = AreaRings::new(topo, source)?;
    for ring in clockwise {
        if areas.smallest_enclosing(topo, &ring).is_some() {
            topo.push_isle(ring.lines, ring.bbox);
        }
    }
    Ok(())
}

fn attach_isles(topo: &mut Topology, ctx: &mut BuildContext<'_>) -> Result<()> {
    let source = ctx.source;
    let areas = AreaRings::new(topo, source)?;
    for i in 0..topo.n_isles() {
        let id = IsleId::from_index(i);
        let isle = &topo.isles[i];
        let ring = Ring {
            points: topo.ring_points(source, &isle.lines)?,
            lines: isle.lines.clone(),
            bbox: isle.bbox,
        };
        match areas.smallest_enclosing(topo, &ring) {
            Some(area) => {
                topo.isles[i].area = Some(area);
                topo.areas[area.index()].isles.push(id);
            }
            None => tracing::debug!(isle = %id, "Isle has no enclosing area"),
        }
        ctx.tick(BuildLevel::AttachIsles, i + 1);
    }
    Ok(())
}

fn attach_centroids(topo: &mut Topology, ctx: &mut BuildContext<'_>) -> Result<()> {
    let source = ctx.source;
    let areas = AreaRings::new(topo, source)?;
    let isle_rings = topo
        .isles
        .iter()
        .map(|isle| topo.ring_points(source, &isle.lines))
        .collect::<Result<Vec<_>>>()?;

    let centroids: Vec<LineId> = topo
        .lines()
        .filter(|(_, l)| l.alive && l.kind == LineType::Centroid)
        .map(|(id, _)| id)
        .collect();

    for (i, id) in centroids.into_iter().enumerate() {
        let offset = topo.lines[id.index()].offset;
        let record = source.read(offset)?;
        let p = record
            .points
            .first()
            .map(|p| Point2::new(p.x, p.y))
            .ok_or_else(|| Error::InvalidGeometry(format!("centroid {id} without vertices")))?;

        let link = match areas.containing_point(topo, &p, &isle_rings) {
            None => CentroidLink::Outside,
            Some(area) => {
                let data = &mut topo.areas[area.index()];
                if data.centroid.is_none() {
                    data.centroid = Some(id);
                    CentroidLink::Area(area)
                } else {
                    CentroidLink::Duplicate(area)
                }
            }
        };
        if let LineTopo::Centroid { area } = &mut topo.lines[id.index()].topo {
            *area = link;
        }
        ctx.tick(BuildLevel::Centroids, i + 1);
    }
    Ok(())
}

// --- Area lookup ---

/// Outer rings of all areas with an R-tree over their boxes.
struct AreaRings {
    tree: RTree<BoxEntry>,
    rings: Vec<Vec<Point2<f64>>>,
    sizes: Vec<f64>,
}

impl AreaRings {
    fn new(topo: &Topology, source: &dyn GeometrySource) -> Result<Self> {
        let mut entries = Vec::with_capacity(topo.n_areas());
        let mut rings = Vec::with_capacity(topo.n_areas());
        let mut sizes = Vec::with_capacity(topo.n_areas());
        for (id, area) in topo.areas() {
            let ring = topo.ring_points(source, &area.lines)?;
            sizes.push(signed_area(&ring).abs());
            rings.push(ring);
            entries.push(BoxEntry {
                id: id.get(),
                bbox: area.bbox,
            });
        }
        Ok(Self {
            tree: RTree::bulk_load(entries),
            rings,
            sizes,
        })
    }

    /// Smallest area whose outer ring contains `ring`. Areas built from any
    /// of the ring's own lines are not candidates.
    fn smallest_enclosing(&self, topo: &Topology, ring: &Ring) -> Option<AreaId> {
        let own: FxHashSet<LineId> = ring.lines.iter().map(|d| d.line).collect();
        self.smallest(select(&self.tree, &ring.bbox), |id, outer| {
            let Some(area) = topo.area(id) else {
                return false;
            };
            area.bbox.contains_box_xy(&ring.bbox)
                && !area.lines.iter().any(|d| own.contains(&d.line))
                && ring_inside(&ring.points, outer)
        })
    }

    /// Smallest area with `p` strictly inside its outer ring and outside
    /// all of its isles.
    fn containing_point(
        &self,
        topo: &Topology,
        p: &Point2<f64>,
        isle_rings: &[Vec<Point2<f64>>],
    ) -> Option<AreaId> {
        let query = BoundBox::planar(p.x, p.x, p.y, p.y);
        self.smallest(select(&self.tree, &query), |id, outer| {
            let Some(area) = topo.area(id) else {
                return false;
            };
            point_in_ring(p, outer) == RingPosition::Inside
                && area.isles.iter().all(|isle| {
                    isle_rings
                        .get(isle.index())
                        .map_or(true, |r| point_in_ring(p, r) == RingPosition::Outside)
                })
        })
    }

    /// Among `candidates` (ascending), the accepted area with the least
    /// absolute ring area; ties keep the lowest handle.
    fn smallest(
        &self,
        candidates: Vec<u32>,
        mut accept: impl FnMut(AreaId, &[Point2<f64>]) -> bool,
    ) -> Option<AreaId> {
        let mut best: Option<(AreaId, f64)> = None;
        for id in candidates.into_iter().filter_map(AreaId::new) {
            let i = id.index();
            let (Some(ring), Some(&size)) = (self.rings.get(i), self.sizes.get(i)) else {
                continue;
            };
            if best.map_or(false, |(_, s)| size >= s) {
                continue;
            }
            if accept(id, ring) {
                best = Some((id, size));
            }
        }
        best.map(|(id, _)| id)
    }
}

// --- Structure updates used by the stages ---

impl Topology {
    /// Whether a line never leaves its start node.
    pub(crate) fn is_degenerate(&self, id: LineId) -> bool {
        let Some((n1, _)) = self.line(id).and_then(|l| l.nodes()) else {
            return false;
        };
        let dl = DirectedLine::forward(id);
        self.node(n1)
            .and_then(|n| n.incidences().find(|(d, _)| *d == dl))
            .is_some_and(|(_, a)| a == crate::geometry::DEGENERATE_ANGLE)
    }

    fn push_area(&mut self, lines: Vec<DirectedLine>, bbox: BoundBox) -> AreaId {
        let id = AreaId::from_index(self.areas.len());
        self.assign_sides(&lines, Side::Area(id));
        self.areas.push(AreaData {
            lines,
            isles: Vec::new(),
            centroid: None,
            bbox,
        });
        id
    }

    fn push_isle(&mut self, lines: Vec<DirectedLine>, bbox: BoundBox) -> IsleId {
        let id = IsleId::from_index(self.isles.len());
        self.assign_sides(&lines, Side::Isle(id));
        self.isles.push(IsleData {
            lines,
            area: None,
            bbox,
        });
        id
    }

    /// Records `side` on the left of every directed line of a ring.
    fn assign_sides(&mut self, ring: &[DirectedLine], side: Side) {
        for dl in ring {
            if let Some(line) = self.line_mut(dl.line) {
                if let LineTopo::Boundary { left, right, .. } = &mut line.topo {
                    if dl.forward {
                        *left = side;
                    } else {
                        *right = side;
                    }
                }
            }
        }
    }
}
