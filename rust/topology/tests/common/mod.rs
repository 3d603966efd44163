// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use vtopo_topology::{
    build, AccessMode, BuildContext, BuildLevel, BuildOptions, BuildReport, GeometryRecord, GeometrySource,
    GeometryStore, LineType, NullProgress, Topology,
};

/// Closed boundary around the square with corner `(x, y)`, counter-clockwise.
pub fn square_ring(x: f64, y: f64, size: f64) -> GeometryRecord {
    let (x1, y1) = (x + size, y + size);
    GeometryRecord::from_xy(
        LineType::Boundary,
        &[(x, y), (x1, y), (x1, y1), (x, y1), (x, y)],
    )
}

/// The same square as four separate boundary lines.
pub fn square_sides(x: f64, y: f64, size: f64) -> Vec<GeometryRecord> {
    let (x1, y1) = (x + size, y + size);
    let corners = [(x, y), (x1, y), (x1, y1), (x, y1), (x, y)];
    corners
        .windows(2)
        .map(|w| GeometryRecord::from_xy(LineType::Boundary, &[w[0], w[1]]))
        .collect()
}

pub fn centroid(x: f64, y: f64) -> GeometryRecord {
    GeometryRecord::from_xy(LineType::Centroid, &[(x, y)])
}

pub fn store_of(records: &[GeometryRecord]) -> GeometryStore {
    let mut store = GeometryStore::new(false);
    for r in records {
        store.write(r).expect("valid record");
    }
    store
}

pub fn build_to(topo: &mut Topology, source: &dyn GeometrySource, level: BuildLevel) -> BuildReport {
    let options = BuildOptions::default();
    let mut progress = NullProgress;
    let mut ctx = BuildContext::new(source, &options, &mut progress);
    build(topo, &mut ctx, level).expect("build succeeds")
}

pub fn fresh() -> Topology {
    Topology::new(false, AccessMode::Write)
}

pub fn dump(topo: &Topology) -> String {
    let mut out = Vec::new();
    topo.dump(&mut out).expect("dump to memory");
    String::from_utf8(out).expect("utf-8 dump")
}
