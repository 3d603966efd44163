// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The geometry-source contract consumed by the topology builder.
//!
//! A source hands out geometry records by an opaque `u64` handle and can
//! iterate all of its live records in handle order. The native
//! [`GeometryStore`](crate::store::GeometryStore) uses byte offsets as
//! handles; an [`ExternalSource`](crate::external::ExternalSource) uses the
//! driver's feature ids. The builder never mutates a source.

use std::path::Path;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::BoundBox;
use crate::keys::LineType;

/// A category number attached to a feature within a numbered field (layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Category {
    pub field: i32,
    pub cat: i32,
}

/// One geometry record: type, vertices, and categories.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub kind: LineType,
    pub points: Vec<Point3<f64>>,
    pub cats: Vec<Category>,
}

impl GeometryRecord {
    pub fn new(kind: LineType, points: Vec<Point3<f64>>) -> Self {
        Self {
            kind,
            points,
            cats: Vec::new(),
        }
    }

    /// Builds a 2D record from `(x, y)` pairs.
    pub fn from_xy(kind: LineType, coords: &[(f64, f64)]) -> Self {
        let points = coords.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect();
        Self::new(kind, points)
    }

    /// Adds a category and returns the record.
    pub fn with_cat(mut self, field: i32, cat: i32) -> Self {
        self.cats.push(Category { field, cat });
        self
    }

    pub fn bbox(&self) -> BoundBox {
        BoundBox::from_points(&self.points)
    }

    /// Checks that the record can be stored and linked.
    pub fn validate(&self) -> Result<()> {
        let min = match self.kind {
            LineType::Line | LineType::Boundary => 2,
            _ => 1,
        };
        if self.points.len() < min {
            return Err(Error::InvalidGeometry(format!(
                "{} needs at least {min} vertices, got {}",
                self.kind,
                self.points.len()
            )));
        }
        if self.points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite())) {
            return Err(Error::InvalidGeometry(format!("{} has a non-finite coordinate", self.kind)));
        }
        Ok(())
    }
}

/// Where a source's geometry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The engine's own append-only store.
    Native,
    /// Features delivered by an external driver.
    External,
}

/// Iterator over `(handle, record)` pairs of live records.
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<(u64, GeometryRecord)>> + 'a>;

/// A readable collection of geometry records.
pub trait GeometrySource: Send + Sync {
    /// Whether records carry a meaningful Z coordinate.
    fn with_z(&self) -> bool;

    fn kind(&self) -> SourceKind;

    /// Reads the record at `handle`.
    fn read(&self, handle: u64) -> Result<GeometryRecord>;

    /// Iterates all live records in ascending handle order.
    fn scan(&self) -> RecordIter<'_>;

    /// Appends a record and returns its handle.
    fn write(&mut self, _record: &GeometryRecord) -> Result<u64> {
        Err(Error::ReadOnly)
    }

    /// Marks the record at `handle` dead. Its handle is never reused.
    fn delete(&mut self, _handle: u64) -> Result<()> {
        Err(Error::ReadOnly)
    }

    /// Brings a deleted record back to life at the same handle.
    fn restore(&mut self, _handle: u64) -> Result<()> {
        Err(Error::ReadOnly)
    }

    /// Writes the source to `path`.
    fn persist(&self, _path: &Path) -> Result<()> {
        Err(Error::ReadOnly)
    }
}
