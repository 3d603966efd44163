// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Open vector maps.
//!
//! A [`VectorMap`] ties a geometry source to its topology and the two
//! derived indexes. A native map lives in a directory holding four files:
//!
//! | file   | content                                  |
//! |--------|------------------------------------------|
//! | `coor` | geometry records ([`GeometryStore`])     |
//! | `topo` | the topology structure                   |
//! | `sidx` | bounding-box index (cache)               |
//! | `cidx` | category index                           |
//!
//! Both indexes are built lazily on first use and dropped by any write.
//! Lazy initialization goes through `OnceLock`, so a map shared between
//! reader threads stays consistent; writers need `&mut` and are therefore
//! serialized by the caller.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use nalgebra::Point2;

use crate::arena::{AccessMode, AreaData, IsleData, LineData, NodeData, Topology};
use crate::builder::{build, BuildContext, BuildProgress, TracingProgress};
use crate::category::CategoryIndex;
use crate::config::BuildOptions;
use crate::error::{Error, Result};
use crate::geometry::{BoundBox, RingPosition};
use crate::keys::*;
use crate::report::BuildReport;
use crate::source::{GeometryRecord, GeometrySource};
use crate::spatial::SpatialIndex;
use crate::store::GeometryStore;

pub const COOR_FILE: &str = "coor";
pub const TOPO_FILE: &str = "topo";
pub const SIDX_FILE: &str = "sidx";
pub const CIDX_FILE: &str = "cidx";

/// How much of a map to make available when opening it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenLevel {
    /// Geometry records only. Topology queries fail until [`VectorMap::build`].
    GeometryOnly,
    /// Full topology, loaded from disk or built.
    Topology,
}

/// An open vector map.
pub struct VectorMap {
    dir: Option<PathBuf>,
    source: Box<dyn GeometrySource>,
    topo: Topology,
    options: BuildOptions,
    spatial: OnceLock<SpatialIndex>,
    categories: OnceLock<CategoryIndex>,
    dirty: bool,
}

impl VectorMap {
    /// Creates an empty writable map in `dir`.
    ///
    /// Nothing is written until [`VectorMap::save`] or [`VectorMap::close`].
    pub fn create(dir: impl Into<PathBuf>, with_z: bool, options: BuildOptions) -> Result<Self> {
        options.validate()?;
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let mut topo = Topology::for_build(with_z, AccessMode::Write, options.snap_tolerance);
        topo.level = BuildLevel::Base;
        tracing::info!(dir = %dir.display(), with_z, "Created vector map");
        Ok(Self {
            dir: Some(dir),
            source: Box::new(GeometryStore::new(with_z)),
            topo,
            options,
            spatial: OnceLock::new(),
            categories: OnceLock::new(),
            dirty: true,
        })
    }

    /// Opens the map stored in `dir`.
    ///
    /// At [`OpenLevel::Topology`] a saved `topo` file is loaded and brought
    /// up to the full level; without one, the topology is built from the
    /// geometry. Index files that fail to load or no longer match the
    /// topology are ignored with a warning and rebuilt when needed. A
    /// damaged `topo` file is an error.
    pub fn open(dir: impl Into<PathBuf>, level: OpenLevel, options: BuildOptions) -> Result<Self> {
        options.validate()?;
        let dir = dir.into();
        let store = GeometryStore::load(&dir.join(COOR_FILE))?;
        let topo = Topology::for_build(store.with_z(), AccessMode::Write, options.snap_tolerance);
        let mut map = Self {
            dir: Some(dir),
            source: Box::new(store),
            topo,
            options,
            spatial: OnceLock::new(),
            categories: OnceLock::new(),
            dirty: false,
        };
        if level == OpenLevel::Topology {
            map.load_topology()?;
        }
        tracing::info!(
            dir = %map.path_display(),
            level = %map.topo.level(),
            lines = map.topo.n_lines(),
            "Opened vector map"
        );
        Ok(map)
    }

    /// Wraps a source owned elsewhere, typically an external driver, and
    /// builds its full topology. The map is read-only and has no directory.
    pub fn from_source(source: impl GeometrySource + 'static, options: BuildOptions) -> Result<Self> {
        options.validate()?;
        let topo = Topology::for_build(source.with_z(), AccessMode::ReadOnly, options.snap_tolerance);
        let mut map = Self {
            dir: None,
            source: Box::new(source),
            topo,
            options,
            spatial: OnceLock::new(),
            categories: OnceLock::new(),
            dirty: false,
        };
        map.build(BuildLevel::ALL)?;
        Ok(map)
    }

    fn load_topology(&mut self) -> Result<()> {
        let Some(dir) = self.dir.clone() else {
            return self.build(BuildLevel::ALL).map(|_| ());
        };

        let topo_path = dir.join(TOPO_FILE);
        if topo_path.exists() {
            self.topo = Topology::load(&topo_path, AccessMode::Write)?;
        }
        if self.topo.level() < BuildLevel::ALL {
            self.build(BuildLevel::ALL)?;
        }

        if let Some(index) = load_cache(&dir.join(SIDX_FILE), SpatialIndex::load, |i| i.matches(&self.topo)) {
            let _ = self.spatial.set(index);
        }
        if let Some(index) = load_cache(&dir.join(CIDX_FILE), CategoryIndex::load, |i| i.matches(&self.topo)) {
            let _ = self.categories.set(index);
        }
        Ok(())
    }

    fn path_display(&self) -> String {
        self.dir
            .as_deref()
            .map_or_else(|| "<external>".to_string(), |d| d.display().to_string())
    }

    // --- Building ---

    /// Brings the topology to `level`, logging progress through `tracing`.
    pub fn build(&mut self, level: BuildLevel) -> Result<BuildReport> {
        self.build_with_progress(level, &mut TracingProgress)
    }

    pub fn build_with_progress(
        &mut self,
        level: BuildLevel,
        progress: &mut dyn BuildProgress,
    ) -> Result<BuildReport> {
        let before = self.topo.level();
        let mut ctx = BuildContext::new(self.source.as_ref(), &self.options, progress);
        let result = build(&mut self.topo, &mut ctx, level);

        if self.topo.level() != before {
            self.spatial.take();
            // Line handles are reassigned whenever `Base` is rebuilt.
            if before < BuildLevel::Base || self.topo.level() < BuildLevel::Base {
                self.categories.take();
            }
            self.dirty = true;
        }
        let report = result?;

        if report.level == BuildLevel::ALL && self.options.build_category_index && self.categories.get().is_none() {
            let index = CategoryIndex::build(&self.topo, self.source.as_ref())?;
            let _ = self.categories.set(index);
        }
        Ok(report)
    }

    pub fn report(&self) -> BuildReport {
        self.topo.report()
    }

    // --- Accessors ---

    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn with_z(&self) -> bool {
        self.topo.with_z()
    }

    pub fn level(&self) -> BuildLevel {
        self.topo.level()
    }

    pub fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.topo.require_level(BuildLevel::Base)?;
        self.topo.node(id).ok_or(Error::NodeNotFound(id))
    }

    /// A line record, dead or alive.
    pub fn line(&self, id: LineId) -> Result<&LineData> {
        self.topo.require_level(BuildLevel::Base)?;
        self.topo.line(id).ok_or(Error::LineNotFound(id))
    }

    pub fn area(&self, id: AreaId) -> Result<&AreaData> {
        self.topo.require_level(BuildLevel::Areas)?;
        self.topo.area(id).ok_or(Error::AreaNotFound(id))
    }

    pub fn isle(&self, id: IsleId) -> Result<&IsleData> {
        self.topo.require_level(BuildLevel::Areas)?;
        self.topo.isle(id).ok_or(Error::IsleNotFound(id))
    }

    /// Reads a line's geometry from the source.
    pub fn line_geometry(&self, id: LineId) -> Result<GeometryRecord> {
        let line = self.line(id)?;
        self.source.read(line.offset)
    }

    // --- Queries ---

    fn categories(&self) -> Result<&CategoryIndex> {
        self.topo.require_level(BuildLevel::Base)?;
        if let Some(index) = self.categories.get() {
            return Ok(index);
        }
        let index = CategoryIndex::build(&self.topo, self.source.as_ref())?;
        Ok(self.categories.get_or_init(|| index))
    }

    fn spatial(&self) -> Result<&SpatialIndex> {
        self.topo.require_level(BuildLevel::Base)?;
        Ok(self.spatial.get_or_init(|| {
            tracing::debug!(lines = self.topo.n_lines(), "Building spatial index");
            SpatialIndex::from_topology(&self.topo)
        }))
    }

    /// Live lines of a type in `mask` carrying category `cat` in `field`.
    pub fn select_by_category(&self, field: i32, cat: i32, mask: TypeMask) -> Result<Vec<LineId>> {
        Ok(self.categories()?.find(field, cat, mask))
    }

    /// Live lines of a type in `mask` with a category in `field` accepted
    /// by `pred`.
    pub fn select_by_category_where(
        &self,
        field: i32,
        pred: impl Fn(i32) -> bool,
        mask: TypeMask,
    ) -> Result<Vec<LineId>> {
        Ok(self.categories()?.select_where(field, pred, mask))
    }

    /// Areas whose centroid carries category `cat` in `field`.
    pub fn select_areas_by_category(&self, field: i32, cat: i32) -> Result<Vec<AreaId>> {
        self.topo.require_level(BuildLevel::Centroids)?;
        Ok(self.categories()?.areas_for(field, cat, &self.topo))
    }

    /// Live lines of a type in `mask` whose box overlaps `bbox`.
    pub fn select_lines_by_box(&self, bbox: &BoundBox, mask: TypeMask) -> Result<Vec<LineId>> {
        let ids = self.spatial()?.select_lines(bbox);
        Ok(ids
            .into_iter()
            .filter(|&id| self.topo.line(id).is_some_and(|l| l.alive && mask.contains(l.kind)))
            .collect())
    }

    pub fn select_areas_by_box(&self, bbox: &BoundBox) -> Result<Vec<AreaId>> {
        self.topo.require_level(BuildLevel::Areas)?;
        Ok(self.spatial()?.select_areas(bbox))
    }

    pub fn select_isles_by_box(&self, bbox: &BoundBox) -> Result<Vec<IsleId>> {
        self.topo.require_level(BuildLevel::Areas)?;
        Ok(self.spatial()?.select_isles(bbox))
    }

    /// The area containing `(x, y)`, or `None` when the point is outside
    /// every area or on a boundary. Nested areas resolve to the innermost.
    pub fn find_area(&self, x: f64, y: f64) -> Result<Option<AreaId>> {
        self.topo.require_level(BuildLevel::AttachIsles)?;
        let candidates = self.spatial()?.select_areas(&BoundBox::planar(x, x, y, y));
        self.topo
            .smallest_area_containing(self.source.as_ref(), &Point2::new(x, y), candidates)
    }

    /// Outer ring of an area, counter-clockwise and closed.
    pub fn area_outline(&self, id: AreaId) -> Result<Vec<Point2<f64>>> {
        self.topo.require_level(BuildLevel::Areas)?;
        self.topo.area_points(self.source.as_ref(), id)
    }

    /// Ring of an isle, clockwise and closed.
    pub fn isle_outline(&self, id: IsleId) -> Result<Vec<Point2<f64>>> {
        self.topo.require_level(BuildLevel::Areas)?;
        self.topo.isle_points(self.source.as_ref(), id)
    }

    pub fn point_in_area_outer_ring(&self, id: AreaId, x: f64, y: f64) -> Result<RingPosition> {
        self.topo.require_level(BuildLevel::Areas)?;
        self.topo
            .point_in_area_outer_ring(self.source.as_ref(), id, &Point2::new(x, y))
    }

    pub fn point_in_isle(&self, id: IsleId, x: f64, y: f64) -> Result<RingPosition> {
        self.topo.require_level(BuildLevel::Areas)?;
        self.topo.point_in_isle(self.source.as_ref(), id, &Point2::new(x, y))
    }

    /// Whether `(x, y)` is inside an area and outside all of its isles.
    pub fn point_in_area(&self, id: AreaId, x: f64, y: f64) -> Result<bool> {
        self.topo.require_level(BuildLevel::AttachIsles)?;
        self.topo.point_in_area(self.source.as_ref(), id, &Point2::new(x, y))
    }

    /// A point strictly inside an area, suitable for placing a centroid.
    pub fn interior_point(&self, id: AreaId) -> Result<Point2<f64>> {
        self.topo.require_level(BuildLevel::AttachIsles)?;
        self.topo.interior_point(self.source.as_ref(), id)
    }

    // --- Writes ---

    /// Appends a record to the geometry store and links it in.
    ///
    /// The topology drops to `Base`; build again before querying areas.
    pub fn write_line(&mut self, record: &GeometryRecord) -> Result<LineId> {
        self.topo.require_writable()?;
        self.topo.require_level(BuildLevel::Base)?;
        record.validate()?;
        let offset = self.source.write(record)?;
        let id = self.topo.add_line(offset, record)?;
        self.invalidate();
        tracing::debug!(line = %id, kind = %record.kind, offset, "Wrote line");
        Ok(id)
    }

    /// Soft-deletes a line in both the topology and the geometry store.
    pub fn delete_line(&mut self, id: LineId) -> Result<()> {
        self.topo.require_writable()?;
        let offset = self.line(id)?.offset;
        self.topo.delete_line(id)?;
        self.source.delete(offset)?;
        self.invalidate();
        tracing::debug!(line = %id, "Deleted line");
        Ok(())
    }

    /// Replaces a live line's geometry.
    ///
    /// The old record is deleted and the new one appended, so the line
    /// comes back under a new handle, which is returned.
    pub fn rewrite_line(&mut self, id: LineId, record: &GeometryRecord) -> Result<LineId> {
        self.topo.require_writable()?;
        self.topo.require_level(BuildLevel::Base)?;
        record.validate()?;
        let old = match self.topo.line(id) {
            Some(line) if line.alive => line.offset,
            _ => return Err(Error::LineNotFound(id)),
        };
        self.source.delete(old)?;
        let offset = self.source.write(record)?;
        let new = self.topo.rewrite_line(id, offset, record)?;
        self.invalidate();
        tracing::debug!(line = %id, new = %new, offset, "Rewrote line");
        Ok(new)
    }

    /// Brings a deleted line back under its old handle.
    ///
    /// Only lines deleted since the last `Base` build can be restored; a
    /// rebuild from scratch renumbers lines and drops dead ones.
    pub fn restore_line(&mut self, id: LineId) -> Result<()> {
        self.topo.require_writable()?;
        let offset = match self.line(id)? {
            line if line.alive => return Err(Error::LineAlive(id)),
            line => line.offset,
        };
        let record = self.source.read(offset)?;
        self.topo.restore_line(id, &record)?;
        self.source.restore(offset)?;
        self.invalidate();
        tracing::debug!(line = %id, offset, "Restored line");
        Ok(())
    }

    fn invalidate(&mut self) {
        self.spatial.take();
        self.categories.take();
        self.dirty = true;
    }

    // --- Persistence ---

    /// Writes geometry, topology and both indexes to the map directory.
    pub fn save(&mut self) -> Result<()> {
        let Some(dir) = self.dir.clone() else {
            return Err(Error::ReadOnly);
        };
        self.topo.require_writable()?;

        self.source.persist(&dir.join(COOR_FILE))?;
        if self.topo.level() >= BuildLevel::Base {
            self.topo.save(&dir.join(TOPO_FILE))?;
            self.spatial()?.save(&dir.join(SIDX_FILE))?;
            self.categories()?.save(&dir.join(CIDX_FILE))?;
        }
        self.dirty = false;
        tracing::info!(dir = %dir.display(), level = %self.topo.level(), "Saved vector map");
        Ok(())
    }

    /// Closes the map, saving it first if it has unsaved changes.
    pub fn close(mut self) -> Result<()> {
        if self.dirty && self.dir.is_some() && self.topo.mode() == AccessMode::Write {
            self.save()?;
        }
        Ok(())
    }

    /// Writes the topology listing, and the category index if it is loaded.
    pub fn dump(&self, out: &mut dyn Write) -> Result<()> {
        self.topo.dump(out)?;
        if let Some(index) = self.categories.get() {
            index.dump(out)?;
        }
        Ok(())
    }
}

/// Loads an index file if it exists, is readable and passes `fresh`.
fn load_cache<T>(path: &Path, load: fn(&Path) -> Result<T>, fresh: impl Fn(&T) -> bool) -> Option<T> {
    if !path.exists() {
        return None;
    }
    match load(path) {
        Ok(index) if fresh(&index) => Some(index),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Index file is stale, will rebuild");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable index file");
            None
        }
    }
}
