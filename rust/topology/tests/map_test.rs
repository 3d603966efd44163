// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use std::fs;
use std::path::Path;

use common::*;
use vtopo_topology::geometry::signed_area;
use vtopo_topology::map::{CIDX_FILE, SIDX_FILE, TOPO_FILE};
use vtopo_topology::{
    AreaId, BoundBox, BuildLevel, BuildOptions, Error, ExternalSource, GeometryRecord, LineId,
    LineType, OpenLevel, RingPosition, TypeMask, VectorMap,
};

fn line(raw: u32) -> LineId {
    LineId::new(raw).unwrap()
}

/// Two parcels side by side with categories on their centroids, a road
/// crossing the map and a well.
fn parcels(dir: &Path) -> VectorMap {
    let mut map = VectorMap::create(dir, false, BuildOptions::default()).unwrap();
    for r in square_sides(0.0, 0.0, 10.0) {
        map.write_line(&r).unwrap();
    }
    for r in [
        GeometryRecord::from_xy(LineType::Boundary, &[(10.0, 0.0), (20.0, 0.0), (20.0, 10.0), (10.0, 10.0)]),
        centroid(5.0, 5.0).with_cat(1, 100),
        centroid(15.0, 5.0).with_cat(1, 200),
        GeometryRecord::from_xy(LineType::Line, &[(-5.0, 20.0), (25.0, 20.0)]).with_cat(2, 7),
        GeometryRecord::from_xy(LineType::Point, &[(30.0, 30.0)])
            .with_cat(1, 300)
            .with_cat(2, 7),
    ] {
        map.write_line(&r).unwrap();
    }
    map
}

fn everything() -> BoundBox {
    BoundBox::planar(-100.0, 100.0, -100.0, 100.0)
}

#[test]
fn build_and_query_a_new_map() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    let report = map.build(BuildLevel::ALL).unwrap();

    assert_eq!(report.counts.areas, 2);
    assert_eq!(report.counts.by_type.boundaries, 5);
    assert_eq!(report.anomalies.unwrap().total(), 0);

    assert_eq!(map.select_by_category(1, 200, TypeMask::ALL).unwrap(), vec![line(7)]);
    assert_eq!(map.select_by_category(2, 7, TypeMask::ALL).unwrap(), vec![line(8), line(9)]);
    assert_eq!(map.select_by_category(2, 7, TypeMask::LINES).unwrap(), vec![line(8)]);
    assert!(map.select_by_category(1, 999, TypeMask::ALL).unwrap().is_empty());
    assert_eq!(
        map.select_by_category_where(1, |c| c >= 200, TypeMask::ALL).unwrap(),
        vec![line(7), line(9)]
    );

    let right = map.select_areas_by_category(1, 200).unwrap();
    assert_eq!(right.len(), 1);
    assert_eq!(map.area(right[0]).unwrap().centroid, Some(line(7)));

    let window = BoundBox::planar(12.0, 18.0, 2.0, 8.0);
    assert_eq!(map.select_areas_by_box(&window).unwrap(), right);
    assert_eq!(map.select_lines_by_box(&window, TypeMask::POINTS).unwrap(), vec![line(7)]);
    assert!(map.select_isles_by_box(&everything()).unwrap().is_empty());

    let geometry = map.line_geometry(line(8)).unwrap();
    assert_eq!(geometry.kind, LineType::Line);
    assert_eq!(geometry.points.len(), 2);
}

#[test]
fn saved_map_reopens_identically() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    let report = map.build(BuildLevel::ALL).unwrap();
    let mut before = Vec::new();
    map.dump(&mut before).unwrap();
    map.close().unwrap();

    for file in [TOPO_FILE, SIDX_FILE, CIDX_FILE] {
        assert!(dir.path().join(file).exists(), "{file} written");
    }

    let map = VectorMap::open(dir.path(), OpenLevel::Topology, BuildOptions::default()).unwrap();
    assert_eq!(map.report(), report);
    let mut after = Vec::new();
    map.dump(&mut after).unwrap();
    assert_eq!(String::from_utf8(before).unwrap(), String::from_utf8(after).unwrap());
    assert_eq!(map.select_areas_by_category(1, 100).unwrap().len(), 1);
}

#[test]
fn regenerated_spatial_index_answers_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    map.build(BuildLevel::ALL).unwrap();
    map.save().unwrap();

    let windows = [
        everything(),
        BoundBox::planar(9.0, 11.0, -1.0, 1.0),
        BoundBox::planar(0.0, 30.0, 19.0, 21.0),
    ];
    let answers = |map: &VectorMap| -> Vec<(Vec<LineId>, Vec<AreaId>)> {
        windows
            .iter()
            .map(|w| {
                (
                    map.select_lines_by_box(w, TypeMask::ALL).unwrap(),
                    map.select_areas_by_box(w).unwrap(),
                )
            })
            .collect()
    };
    let expected = answers(&map);

    let loaded = VectorMap::open(dir.path(), OpenLevel::Topology, BuildOptions::default()).unwrap();
    assert_eq!(answers(&loaded), expected);

    fs::remove_file(dir.path().join(SIDX_FILE)).unwrap();
    let rebuilt = VectorMap::open(dir.path(), OpenLevel::Topology, BuildOptions::default()).unwrap();
    assert_eq!(answers(&rebuilt), expected);

    fs::write(dir.path().join(SIDX_FILE), b"garbage").unwrap();
    fs::write(dir.path().join(CIDX_FILE), b"VTCI\x01\x00\x00").unwrap();
    let damaged = VectorMap::open(dir.path(), OpenLevel::Topology, BuildOptions::default()).unwrap();
    assert_eq!(answers(&damaged), expected);
    assert_eq!(damaged.select_by_category(1, 100, TypeMask::ALL).unwrap(), vec![line(6)]);
}

#[test]
fn damaged_topology_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    map.build(BuildLevel::ALL).unwrap();
    map.save().unwrap();

    fs::write(dir.path().join(TOPO_FILE), b"VTPO\x09\x00\x00").unwrap();
    let err = VectorMap::open(dir.path(), OpenLevel::Topology, BuildOptions::default()).err().unwrap();
    assert!(matches!(err, Error::UnsupportedVersion { file: "topo", major: 9, .. }));
}

#[test]
fn writes_invalidate_areas_until_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    map.build(BuildLevel::ALL).unwrap();

    let well = map.write_line(&centroid(2.0, 2.0).with_cat(1, 400)).unwrap();
    assert_eq!(map.level(), BuildLevel::Base);
    assert!(matches!(map.select_areas_by_category(1, 400), Err(Error::LevelRequired { .. })));
    assert_eq!(map.select_by_category(1, 400, TypeMask::ALL).unwrap(), vec![well]);

    let report = map.build(BuildLevel::ALL).unwrap();
    assert_eq!(report.anomalies.unwrap().duplicate_centroids, 1);
    assert!(map.select_areas_by_category(1, 400).unwrap().is_empty());
}

#[test]
fn deleted_line_disappears_from_queries() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    map.build(BuildLevel::ALL).unwrap();

    let road = line(8);
    assert_eq!(map.select_lines_by_box(&BoundBox::planar(0.0, 1.0, 19.0, 21.0), TypeMask::ALL).unwrap(), vec![road]);
    map.delete_line(road).unwrap();

    assert!(map.select_lines_by_box(&BoundBox::planar(0.0, 1.0, 19.0, 21.0), TypeMask::ALL).unwrap().is_empty());
    assert_eq!(map.select_by_category(2, 7, TypeMask::ALL).unwrap(), vec![line(9)]);
    assert!(!map.line(road).unwrap().alive);
    assert!(matches!(map.delete_line(road), Err(Error::LineNotFound(_))));

    map.build(BuildLevel::ALL).unwrap();
    map.close().unwrap();
    let reopened = VectorMap::open(dir.path(), OpenLevel::Topology, BuildOptions::default()).unwrap();
    assert_eq!(reopened.report().counts.dead_lines, 1);
    assert!(reopened.line_geometry(road).is_ok());
}

#[test]
fn geometry_only_open_builds_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    map.build(BuildLevel::ALL).unwrap();
    map.close().unwrap();

    let mut map = VectorMap::open(dir.path(), OpenLevel::GeometryOnly, BuildOptions::default()).unwrap();
    assert_eq!(map.level(), BuildLevel::None);
    let report = map.build(BuildLevel::ALL).unwrap();
    assert_eq!(report.counts.areas, 2);
    assert_eq!(map.select_by_category(1, 100, TypeMask::ALL).unwrap(), vec![line(6)]);
}

#[test]
fn external_source_is_read_only() {
    let features = vec![
        Ok::<_, String>(square_ring(0.0, 0.0, 4.0)),
        Ok(centroid(2.0, 2.0).with_cat(1, 1)),
    ];
    let source = ExternalSource::from_driver("memory", false, features).unwrap();
    let mut map = VectorMap::from_source(source, BuildOptions::default()).unwrap();

    assert_eq!(map.level(), BuildLevel::ALL);
    assert_eq!(map.report().counts.areas, 1);
    assert_eq!(map.select_areas_by_category(1, 1).unwrap(), vec![AreaId::new(1).unwrap()]);
    assert!(matches!(map.write_line(&centroid(1.0, 1.0)), Err(Error::ReadOnly)));
    assert!(matches!(map.delete_line(line(1)), Err(Error::ReadOnly)));
}

#[test]
fn driver_failure_surfaces_as_source_error() {
    let features = vec![Ok(square_ring(0.0, 0.0, 4.0)), Err("connection reset")];
    let err = ExternalSource::from_driver("remote", false, features).unwrap_err();
    assert!(matches!(err, Error::Source(msg) if msg.contains("connection reset")));
}

#[test]
fn points_resolve_to_parcels() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    map.build(BuildLevel::ALL).unwrap();

    let left = map.select_areas_by_category(1, 100).unwrap()[0];
    let right = map.select_areas_by_category(1, 200).unwrap()[0];
    assert_eq!(map.find_area(5.0, 5.0).unwrap(), Some(left));
    assert_eq!(map.find_area(15.0, 2.0).unwrap(), Some(right));
    assert_eq!(map.find_area(10.0, 5.0).unwrap(), None);
    assert_eq!(map.find_area(50.0, 50.0).unwrap(), None);

    assert_eq!(map.point_in_area_outer_ring(left, 0.0, 5.0).unwrap(), RingPosition::Boundary);
    assert_eq!(map.point_in_area_outer_ring(left, 15.0, 5.0).unwrap(), RingPosition::Outside);
    assert!(map.point_in_area(right, 19.0, 9.0).unwrap());

    let outline = map.area_outline(left).unwrap();
    assert_eq!(outline.len(), 5);
    assert_eq!(outline.first(), outline.last());
    assert!(signed_area(&outline) > 0.0);

    let p = map.interior_point(left).unwrap();
    assert_eq!(map.find_area(p.x, p.y).unwrap(), Some(left));

    map.write_line(&centroid(1.0, 1.0)).unwrap();
    assert!(matches!(map.find_area(5.0, 5.0), Err(Error::LevelRequired { .. })));
    assert!(matches!(map.area_outline(left), Err(Error::LevelRequired { .. })));
}

#[test]
fn rewritten_line_moves_to_a_new_handle() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    map.build(BuildLevel::ALL).unwrap();

    let road = line(8);
    let moved = GeometryRecord::from_xy(LineType::Line, &[(-5.0, 30.0), (25.0, 30.0)]).with_cat(2, 7);
    let new = map.rewrite_line(road, &moved).unwrap();
    assert_eq!(new, line(10));
    assert_eq!(map.level(), BuildLevel::Base);
    assert!(!map.line(road).unwrap().alive);

    assert!(map.select_lines_by_box(&BoundBox::planar(0.0, 1.0, 19.0, 21.0), TypeMask::ALL).unwrap().is_empty());
    assert_eq!(map.select_lines_by_box(&BoundBox::planar(0.0, 1.0, 29.0, 31.0), TypeMask::ALL).unwrap(), vec![new]);
    assert_eq!(map.select_by_category(2, 7, TypeMask::LINES).unwrap(), vec![new]);
    assert_eq!(map.line_geometry(new).unwrap(), moved);

    assert!(matches!(map.rewrite_line(road, &moved), Err(Error::LineNotFound(_))));
    let broken = GeometryRecord::from_xy(LineType::Line, &[(0.0, 0.0)]);
    assert!(map.rewrite_line(new, &broken).is_err());
    assert!(map.line(new).unwrap().alive);
}

#[test]
fn restored_boundary_splits_parcels_again() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = parcels(dir.path());
    map.build(BuildLevel::ALL).unwrap();

    let shared = line(2);
    map.delete_line(shared).unwrap();
    let report = map.build(BuildLevel::ALL).unwrap();
    assert_eq!(report.counts.areas, 1);
    assert_eq!(report.anomalies.unwrap().duplicate_centroids, 1);

    map.restore_line(shared).unwrap();
    assert_eq!(map.level(), BuildLevel::Base);
    assert!(map.line(shared).unwrap().alive);
    assert!(matches!(map.restore_line(shared), Err(Error::LineAlive(_))));
    assert_eq!(
        map.select_lines_by_box(&BoundBox::planar(9.0, 11.0, 4.0, 6.0), TypeMask::BOUNDARY).unwrap(),
        vec![shared]
    );

    let report = map.build(BuildLevel::ALL).unwrap();
    assert_eq!(report.counts.areas, 2);
    assert_eq!(report.anomalies.unwrap().total(), 0);

    map.close().unwrap();
    let reopened = VectorMap::open(dir.path(), OpenLevel::Topology, BuildOptions::default()).unwrap();
    assert_eq!(reopened.report().counts.areas, 2);
    assert_eq!(reopened.report().counts.dead_lines, 0);
}
