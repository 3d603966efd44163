// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Human-readable listings for diagnostics.

use std::io::Write;

use crate::arena::{LineTopo, Topology};
use crate::category::CategoryIndex;
use crate::error::Result;
use crate::geometry::BoundBox;
use crate::keys::{DirectedLine, LineType};

fn fmt_box(b: &BoundBox) -> String {
    if b.is_empty() {
        return "empty".to_string();
    }
    format!("W {} E {} S {} N {} B {} T {}", b.w, b.e, b.s, b.n, b.b, b.t)
}

fn fmt_ring(ring: &[DirectedLine]) -> String {
    ring.iter().map(|dl| dl.raw().to_string()).collect::<Vec<_>>().join(" ")
}

impl Topology {
    /// Writes every node, line, area and isle, dead slots included.
    pub fn dump(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "---------- TOPOLOGY DUMP ----------")?;
        writeln!(out, "level: {}  3d: {}  mode: {:?}", self.level, self.with_z, self.mode)?;
        writeln!(out, "box: {}", fmt_box(&self.bbox))?;
        let counts = self.counts();
        writeln!(
            out,
            "nodes: {}  lines: {} ({} dead)  areas: {}  isles: {}",
            counts.nodes, counts.lines, counts.dead_lines, counts.areas, counts.isles
        )?;
        for kind in LineType::ALL {
            writeln!(out, "  {:<9} {}", kind.as_str(), counts.by_type.get(kind))?;
        }

        writeln!(out, "---------- NODES ----------")?;
        for (i, slot) in self.nodes.iter().enumerate() {
            let id = i + 1;
            match slot {
                None => writeln!(out, "node {id}: dead")?,
                Some(node) => {
                    writeln!(
                        out,
                        "node {id}: ({}, {}, {})  degree {}",
                        node.point.x,
                        node.point.y,
                        node.point.z,
                        node.degree()
                    )?;
                    for (dl, angle) in node.incidences() {
                        writeln!(out, "  line {:>6}  angle {angle:.6}", dl.raw())?;
                    }
                }
            }
        }

        writeln!(out, "---------- LINES ----------")?;
        for (id, line) in self.lines() {
            let state = if line.alive { "alive" } else { "dead" };
            let links = match line.topo {
                LineTopo::None => String::new(),
                LineTopo::Line { n1, n2 } => format!("n1 {} n2 {}", n1.get(), n2.get()),
                LineTopo::Boundary { n1, n2, left, right } => format!(
                    "n1 {} n2 {} left {} right {}",
                    n1.get(),
                    n2.get(),
                    left.raw(),
                    right.raw()
                ),
                LineTopo::Centroid { area } => format!("area {}", area.raw()),
            };
            writeln!(
                out,
                "line {}: {} {} offset {} {}  box {}",
                id.get(),
                state,
                line.kind,
                line.offset,
                links,
                fmt_box(&line.bbox)
            )?;
        }

        writeln!(out, "---------- AREAS ----------")?;
        for (id, area) in self.areas() {
            let isles: Vec<String> = area.isles.iter().map(|i| i.get().to_string()).collect();
            writeln!(
                out,
                "area {}: lines [{}] isles [{}] centroid {}  box {}",
                id.get(),
                fmt_ring(&area.lines),
                isles.join(" "),
                area.centroid.map_or(0, |c| c.get()),
                fmt_box(&area.bbox)
            )?;
        }

        writeln!(out, "---------- ISLES ----------")?;
        for (id, isle) in self.isles() {
            writeln!(
                out,
                "isle {}: lines [{}] area {}  box {}",
                id.get(),
                fmt_ring(&isle.lines),
                isle.area.map_or(0, |a| a.get()),
                fmt_box(&isle.bbox)
            )?;
        }
        Ok(())
    }
}

impl CategoryIndex {
    /// Writes every field with its entries in index order.
    pub fn dump(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "---------- CATEGORY INDEX ----------")?;
        for field in self.fields().filter_map(|f| self.field(f)) {
            writeln!(
                out,
                "field {}: {} entries, {} unique categories",
                field.field(),
                field.entries().len(),
                field.unique_cats()
            )?;
            for e in field.entries() {
                writeln!(out, "  cat {:>8}  {:<9} line {}", e.cat, e.kind.as_str(), e.line.get())?;
            }
        }
        Ok(())
    }
}
