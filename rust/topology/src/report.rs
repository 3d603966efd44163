// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build summaries: record counts and structural anomalies.
//!
//! Anomalies are computed from the structure alone, never accumulated
//! while building, so the same structure always reports the same numbers
//! whether it was just built, rebuilt, or loaded from disk. They are only
//! defined once areas have been built.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::arena::{LineTopo, Topology};
use crate::keys::{BuildLevel, CentroidLink, DirectedLine, LineType};

/// Live lines per type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    pub points: usize,
    pub lines: usize,
    pub boundaries: usize,
    pub centroids: usize,
    pub faces: usize,
    pub kernels: usize,
}

impl TypeCounts {
    pub fn from_slots(counts: [usize; 6]) -> Self {
        let [points, lines, boundaries, centroids, faces, kernels] = counts;
        Self {
            points,
            lines,
            boundaries,
            centroids,
            faces,
            kernels,
        }
    }

    pub fn get(&self, kind: LineType) -> usize {
        match kind {
            LineType::Point => self.points,
            LineType::Line => self.lines,
            LineType::Boundary => self.boundaries,
            LineType::Centroid => self.centroids,
            LineType::Face => self.faces,
            LineType::Kernel => self.kernels,
        }
    }
}

/// Record counts of a topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub nodes: usize,
    /// Live lines of all types.
    pub lines: usize,
    pub dead_lines: usize,
    pub areas: usize,
    pub isles: usize,
    pub by_type: TypeCounts,
}

/// Structural problems that do not stop a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomalies {
    pub boundaries_missing_one_side: usize,
    pub boundaries_missing_both_sides: usize,
    /// Isles with no enclosing area. Counted from `AttachIsles` up.
    pub unattached_isles: usize,
    /// Centroids inside no area. Counted at `Centroids`.
    pub centroids_outside: usize,
    /// Centroids in an area that already has one. Counted at `Centroids`.
    pub duplicate_centroids: usize,
    /// Areas with no centroid. Counted at `Centroids`.
    pub areas_without_centroid: usize,
}

impl Anomalies {
    pub fn total(&self) -> usize {
        self.boundaries_missing_one_side
            + self.boundaries_missing_both_sides
            + self.unattached_isles
            + self.centroids_outside
            + self.duplicate_centroids
            + self.areas_without_centroid
    }
}

/// Summary of a topology at its current build level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub level: BuildLevel,
    pub counts: Counts,
    /// Present only at `Areas` and above.
    pub anomalies: Option<Anomalies>,
}

impl BuildReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Topology {
    pub fn counts(&self) -> Counts {
        let by_type = self.type_counts();
        let lines = by_type.iter().sum();
        Counts {
            nodes: self.n_nodes(),
            lines,
            dead_lines: self.n_lines() - lines,
            areas: self.n_areas(),
            isles: self.n_isles(),
            by_type: TypeCounts::from_slots(by_type),
        }
    }

    /// Counts and anomalies at the current level.
    pub fn report(&self) -> BuildReport {
        BuildReport {
            level: self.level,
            counts: self.counts(),
            anomalies: (self.level >= BuildLevel::Areas).then(|| self.anomalies()),
        }
    }

    fn anomalies(&self) -> Anomalies {
        let mut found = Anomalies::default();

        // A side left empty is fine when it faces the unbounded exterior,
        // i.e. the ring on that side closes. Directed lines of rings already
        // known to close are memoised so each ring is traced once.
        let mut closed: FxHashSet<i32> = FxHashSet::default();
        for (id, line) in self.lines() {
            let LineTopo::Boundary { left, right, .. } = line.topo else {
                continue;
            };
            if !line.alive {
                continue;
            }
            let mut missing = 0;
            for (side, dl) in [(left, DirectedLine::forward(id)), (right, DirectedLine::backward(id))] {
                if !side.is_none() || closed.contains(&dl.raw()) {
                    continue;
                }
                match self.trace_ring(dl) {
                    Some(ring) => closed.extend(ring.iter().map(|d| d.raw())),
                    None => missing += 1,
                }
            }
            match missing {
                1 => found.boundaries_missing_one_side += 1,
                2 => found.boundaries_missing_both_sides += 1,
                _ => {}
            }
        }

        if self.level >= BuildLevel::AttachIsles {
            found.unattached_isles = self.isles.iter().filter(|i| i.area.is_none()).count();
        }

        if self.level >= BuildLevel::Centroids {
            for line in self.lines.iter().filter(|l| l.alive) {
                match line.centroid_link() {
                    Some(CentroidLink::Outside) => found.centroids_outside += 1,
                    Some(CentroidLink::Duplicate(_)) => found.duplicate_centroids += 1,
                    _ => {}
                }
            }
            found.areas_without_centroid = self.areas.iter().filter(|a| a.centroid.is_none()).count();
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::AccessMode;
    use crate::builder::{build, BuildContext, NullProgress};
    use crate::config::BuildOptions;
    use crate::source::{GeometryRecord, GeometrySource};
    use crate::store::GeometryStore;

    fn square(x0: f64, y0: f64, size: f64) -> GeometryRecord {
        let (x1, y1) = (x0 + size, y0 + size);
        GeometryRecord::from_xy(
            LineType::Boundary,
            &[(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)],
        )
    }

    fn nested(level: BuildLevel) -> Topology {
        let mut store = GeometryStore::new(false);
        store.write(&square(0.0, 0.0, 10.0)).unwrap();
        store.write(&square(4.0, 4.0, 2.0)).unwrap();
        let options = BuildOptions::default();
        let mut progress = NullProgress;
        let mut ctx = BuildContext::new(&store, &options, &mut progress);
        let mut topo = Topology::new(false, AccessMode::Write);
        build(&mut topo, &mut ctx, level).unwrap();
        topo
    }

    #[test]
    fn no_anomalies_below_areas() {
        let topo = nested(BuildLevel::Base);
        assert_eq!(topo.report().anomalies, None);
    }

    #[test]
    fn isle_without_area_is_counted() {
        let mut topo = nested(BuildLevel::AttachIsles);
        assert_eq!(topo.report().anomalies.unwrap().unattached_isles, 0);

        // A structure from disk may carry isles whose enclosing area is gone.
        topo.isles[0].area = None;
        for area in &mut topo.areas {
            area.isles.clear();
        }
        let anomalies = topo.report().anomalies.unwrap();
        assert_eq!(anomalies.unattached_isles, 1);
        assert_eq!(anomalies.boundaries_missing_one_side, 0);
    }

    #[test]
    fn unattached_isles_not_counted_before_attach_stage() {
        let mut topo = nested(BuildLevel::Areas);
        assert_eq!(topo.n_isles(), 1);
        assert!(topo.isles[0].area.is_none());
        assert_eq!(topo.report().anomalies.unwrap().unattached_isles, 0);
        topo.level = BuildLevel::AttachIsles;
        assert_eq!(topo.report().anomalies.unwrap().unattached_isles, 1);
    }

    #[test]
    fn report_serializes_to_json() {
        let json = nested(BuildLevel::ALL).report().to_json().unwrap();
        assert!(json.contains("\"level\": \"centroids\""));
        assert!(json.contains("\"areas_without_centroid\": 2"));
    }
}
