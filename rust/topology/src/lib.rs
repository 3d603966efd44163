// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # vtopo topology
//!
//! Planar vector topology built from raw geometry records.
//!
//! Lines of six types (points, lines, boundaries, centroids, faces,
//! kernels) are read from a [`GeometrySource`] and linked into a
//! [`Topology`]: nodes where lines meet, areas traced from rings of
//! boundaries, isles nested inside areas, and the centroid that carries
//! each area's attributes. Records reference each other by typed 1-based
//! handles rather than pointers, so the whole structure persists to disk
//! unchanged.
//!
//! Construction runs through ordered [`BuildLevel`]s, see [`builder`].
//! [`VectorMap`] is the open-map surface tying geometry, topology and the
//! category and spatial indexes together.
//!
//! ```no_run
//! use vtopo_topology::{BuildLevel, BuildOptions, GeometryRecord, LineType, VectorMap};
//!
//! # fn main() -> vtopo_topology::Result<()> {
//! let mut map = VectorMap::create("parcels", false, BuildOptions::default())?;
//! map.write_line(&GeometryRecord::from_xy(
//!     LineType::Boundary,
//!     &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)],
//! ))?;
//! map.write_line(&GeometryRecord::from_xy(LineType::Centroid, &[(0.5, 0.5)]).with_cat(1, 7))?;
//! let report = map.build(BuildLevel::ALL)?;
//! assert_eq!(report.counts.areas, 1);
//! map.close()?;
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod builder;
pub mod category;
pub mod config;
pub mod construction;
pub mod dump;
pub mod error;
pub mod external;
pub mod geometry;
pub mod keys;
pub mod map;
pub mod port;
pub mod query;
pub mod report;
pub mod serialization;
pub mod source;
pub mod spatial;
pub mod store;
pub mod traversal;

pub use arena::{AccessMode, AreaData, IsleData, LineData, LineTopo, NodeData, Topology};
pub use builder::{build, BuildContext, BuildProgress, NullProgress, TracingProgress};
pub use category::{CatEntry, CategoryIndex, FieldIndex};
pub use config::BuildOptions;
pub use error::{Error, Result};
pub use external::ExternalSource;
pub use geometry::{BoundBox, RingPosition};
pub use keys::{
    AreaId, BuildLevel, CentroidLink, DirectedLine, IsleId, LineId, LineType, NodeId, Side, TypeMask,
};
pub use map::{OpenLevel, VectorMap};
pub use port::ByteOrder;
pub use report::{Anomalies, BuildReport, Counts, TypeCounts};
pub use source::{Category, GeometryRecord, GeometrySource, RecordIter, SourceKind};
pub use spatial::SpatialIndex;
pub use store::GeometryStore;
