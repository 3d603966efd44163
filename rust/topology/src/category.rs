// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Category index: which lines carry a given category number.
//!
//! Entries are collected per field into a red-black tree ordered by
//! `(cat, kind, line)`, which drops repeated categories on one line, and
//! then flattened into a sorted vector. Exact lookups go through a second
//! tree of per-category spans into that vector.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use rustc_hash::FxHashMap;
use vtopo_rbtree::RbTree;

use crate::arena::Topology;
use crate::error::{Error, Result};
use crate::keys::{AreaId, CentroidLink, LineId, LineType, TypeMask};
use crate::port::{capacity_hint, ByteOrder, FileFormat, PortReader, PortWriter};
use crate::report::TypeCounts;
use crate::source::GeometrySource;

pub(crate) const CIDX: FileFormat = FileFormat {
    label: "cidx",
    magic: *b"VTCI",
    major: 1,
    minor: 0,
};

/// One category on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatEntry {
    pub cat: i32,
    pub kind: LineType,
    pub line: LineId,
}

/// Range of entries sharing one category.
#[derive(Debug, Clone, Copy)]
struct CatSpan {
    cat: i32,
    start: usize,
    len: usize,
}

fn span_order(a: &CatSpan, b: &CatSpan) -> Ordering {
    a.cat.cmp(&b.cat)
}

/// Categories of one field.
#[derive(Debug)]
pub struct FieldIndex {
    field: i32,
    entries: Vec<CatEntry>,
    spans: RbTree<CatSpan>,
    by_type: TypeCounts,
}

impl FieldIndex {
    fn from_sorted(field: i32, entries: Vec<CatEntry>) -> Self {
        let mut spans = RbTree::with_comparator(span_order as fn(&CatSpan, &CatSpan) -> Ordering);
        let mut slots = [0usize; 6];
        let mut start = 0;
        for (i, e) in entries.iter().enumerate() {
            slots[e.kind.slot()] += 1;
            let last = entries.get(i + 1).map_or(true, |next| next.cat != e.cat);
            if last {
                spans.insert(CatSpan {
                    cat: e.cat,
                    start,
                    len: i + 1 - start,
                });
                start = i + 1;
            }
        }
        Self {
            field,
            entries,
            spans,
            by_type: TypeCounts::from_slots(slots),
        }
    }

    pub fn field(&self) -> i32 {
        self.field
    }

    /// All entries, sorted by category, type, line.
    pub fn entries(&self) -> &[CatEntry] {
        &self.entries
    }

    /// Number of distinct categories.
    pub fn unique_cats(&self) -> usize {
        self.spans.len()
    }

    /// Entries per line type.
    pub fn type_counts(&self) -> TypeCounts {
        self.by_type
    }

    /// Entries with category `cat`; empty when the category is unused.
    pub fn find(&self, cat: i32) -> &[CatEntry] {
        let key = CatSpan { cat, start: 0, len: 0 };
        match self.spans.find(&key) {
            Some(span) => &self.entries[span.start..span.start + span.len],
            None => &[],
        }
    }
}

/// Per-field category index over the live lines of a map.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    /// Sorted by field number.
    fields: Vec<FieldIndex>,
}

impl CategoryIndex {
    /// Reads the categories of every live line from `source`.
    pub fn build(topo: &Topology, source: &dyn GeometrySource) -> Result<Self> {
        let mut trees: FxHashMap<i32, RbTree<CatEntry>> = FxHashMap::default();
        for (id, line) in topo.lines().filter(|(_, l)| l.alive) {
            let record = source.read(line.offset)?;
            for c in &record.cats {
                trees.entry(c.field).or_default().insert(CatEntry {
                    cat: c.cat,
                    kind: line.kind,
                    line: id,
                });
            }
        }

        let mut fields: Vec<FieldIndex> = trees
            .into_iter()
            .map(|(field, tree)| FieldIndex::from_sorted(field, tree.iter().copied().collect()))
            .collect();
        fields.sort_unstable_by_key(|f| f.field);

        tracing::debug!(
            fields = fields.len(),
            entries = fields.iter().map(|f| f.entries.len()).sum::<usize>(),
            "Built category index"
        );
        Ok(Self { fields })
    }

    /// Field numbers present, ascending.
    pub fn fields(&self) -> impl Iterator<Item = i32> + '_ {
        self.fields.iter().map(|f| f.field)
    }

    pub fn field(&self, field: i32) -> Option<&FieldIndex> {
        self.fields
            .binary_search_by_key(&field, |f| f.field)
            .ok()
            .map(|i| &self.fields[i])
    }

    /// Lines of a type in `mask` carrying `(field, cat)`, ascending.
    pub fn find(&self, field: i32, cat: i32, mask: TypeMask) -> Vec<LineId> {
        let Some(f) = self.field(field) else {
            return Vec::new();
        };
        collect_lines(f.find(cat).iter(), mask)
    }

    /// Lines of a type in `mask` with a category in `field` accepted by
    /// `pred`, ascending and without repeats.
    pub fn select_where(&self, field: i32, pred: impl Fn(i32) -> bool, mask: TypeMask) -> Vec<LineId> {
        let Some(f) = self.field(field) else {
            return Vec::new();
        };
        collect_lines(f.entries.iter().filter(|e| pred(e.cat)), mask)
    }

    /// Areas owned by a centroid carrying `(field, cat)`.
    ///
    /// Duplicate and outside centroids own nothing.
    pub fn areas_for(&self, field: i32, cat: i32, topo: &Topology) -> Vec<AreaId> {
        let mut areas: Vec<AreaId> = self
            .find(field, cat, TypeMask::CENTROID)
            .into_iter()
            .filter_map(|id| match topo.line(id)?.centroid_link()? {
                CentroidLink::Area(a) => Some(a),
                _ => None,
            })
            .collect();
        areas.sort_unstable();
        areas.dedup();
        areas
    }

    /// Whether every entry still refers to a live line of the recorded type.
    pub fn matches(&self, topo: &Topology) -> bool {
        self.fields.iter().flat_map(|f| f.entries.iter()).all(|e| {
            topo.line(e.line)
                .is_some_and(|l| l.alive && l.kind == e.kind)
        })
    }

    pub fn to_writer<W: Write>(&self, w: W) -> Result<()> {
        let mut w = PortWriter::with_header(w, &CIDX, ByteOrder::native())?;
        w.put_len(self.fields.len())?;
        for f in &self.fields {
            w.put_i32(f.field)?;
            for kind in LineType::ALL {
                w.put_len(f.by_type.get(kind))?;
            }
            w.put_len(f.unique_cats())?;
            w.put_len(f.entries.len())?;
            for e in &f.entries {
                w.put_i32(e.cat)?;
                w.put_u8(e.kind.code())?;
                w.put_u32(e.line.get())?;
            }
        }
        w.into_inner().flush()?;
        Ok(())
    }

    pub fn from_reader<R: Read>(r: R) -> Result<Self> {
        let mut r = PortReader::with_header(r, &CIDX)?;
        let n_fields = r.get_len()?;
        let mut fields: Vec<FieldIndex> = Vec::with_capacity(capacity_hint(n_fields));
        for _ in 0..n_fields {
            let field = r.get_i32()?;
            if fields.last().is_some_and(|prev| prev.field >= field) {
                return Err(Error::corrupt(CIDX.label, format!("field {field} out of order")));
            }
            let mut stored_types = [0usize; 6];
            for slot in &mut stored_types {
                *slot = r.get_len()?;
            }
            let unique = r.get_len()?;
            let n = r.get_len()?;

            let mut entries: Vec<CatEntry> = Vec::with_capacity(capacity_hint(n));
            for _ in 0..n {
                let cat = r.get_i32()?;
                let code = r.get_u8()?;
                let kind = LineType::from_code(code)
                    .ok_or_else(|| Error::corrupt(CIDX.label, format!("unknown line type {code}")))?;
                let raw = r.get_u32()?;
                let line =
                    LineId::new(raw).ok_or_else(|| Error::corrupt(CIDX.label, "zero line handle"))?;
                let entry = CatEntry { cat, kind, line };
                if entries.last().is_some_and(|prev| *prev >= entry) {
                    return Err(Error::corrupt(
                        CIDX.label,
                        format!("field {field} entries out of order at cat {cat}"),
                    ));
                }
                entries.push(entry);
            }

            let index = FieldIndex::from_sorted(field, entries);
            if index.unique_cats() != unique || index.by_type != TypeCounts::from_slots(stored_types) {
                return Err(Error::corrupt(
                    CIDX.label,
                    format!("field {field} counts disagree with its entries"),
                ));
            }
            fields.push(index);
        }
        Ok(Self { fields })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_writer(BufWriter::new(File::create(path)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

fn collect_lines<'a>(entries: impl Iterator<Item = &'a CatEntry>, mask: TypeMask) -> Vec<LineId> {
    let mut lines: Vec<LineId> = entries.filter(|e| mask.contains(e.kind)).map(|e| e.line).collect();
    lines.sort_unstable();
    lines.dedup();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::AccessMode;
    use crate::keys::BuildLevel;
    use crate::source::GeometryRecord;
    use crate::store::GeometryStore;

    fn l(raw: u32) -> LineId {
        LineId::new(raw).unwrap()
    }

    /// Lines 1..=4: a point (1:7), a line (1:7, 2:3), a boundary with no
    /// categories and a centroid (1:9, 1:7, 1:9 again).
    fn fixture() -> (Topology, GeometryStore) {
        let records = [
            GeometryRecord::from_xy(LineType::Point, &[(0.0, 0.0)]).with_cat(1, 7),
            GeometryRecord::from_xy(LineType::Line, &[(0.0, 0.0), (1.0, 1.0)])
                .with_cat(1, 7)
                .with_cat(2, 3),
            GeometryRecord::from_xy(LineType::Boundary, &[(5.0, 5.0), (6.0, 6.0)]),
            GeometryRecord::from_xy(LineType::Centroid, &[(2.0, 2.0)])
                .with_cat(1, 9)
                .with_cat(1, 7)
                .with_cat(1, 9),
        ];
        let mut store = GeometryStore::new(false);
        let mut topo = Topology::for_build(false, AccessMode::Write, 0.0);
        for r in &records {
            let offset = store.write(r).unwrap();
            topo.push_line(offset, r).unwrap();
        }
        topo.level = BuildLevel::Base;
        (topo, store)
    }

    #[test]
    fn exact_lookup_with_type_filter() {
        let (topo, store) = fixture();
        let index = CategoryIndex::build(&topo, &store).unwrap();

        assert_eq!(index.find(1, 7, TypeMask::ALL), vec![l(1), l(2), l(4)]);
        assert_eq!(index.find(1, 7, TypeMask::POINTS), vec![l(1), l(4)]);
        assert_eq!(index.find(2, 3, TypeMask::ALL), vec![l(2)]);
        assert!(index.find(1, 8, TypeMask::ALL).is_empty());
        assert!(index.find(5, 7, TypeMask::ALL).is_empty());
    }

    #[test]
    fn repeated_category_on_one_line_counts_once() {
        let (topo, store) = fixture();
        let index = CategoryIndex::build(&topo, &store).unwrap();
        let field = index.field(1).unwrap();
        assert_eq!(field.entries().len(), 4);
        assert_eq!(field.unique_cats(), 2);
        assert_eq!(field.type_counts().centroids, 2);
        assert_eq!(field.type_counts().points, 1);
        assert_eq!(index.fields().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn predicate_selection() {
        let (topo, store) = fixture();
        let index = CategoryIndex::build(&topo, &store).unwrap();
        assert_eq!(index.select_where(1, |c| c > 7, TypeMask::ALL), vec![l(4)]);
        assert_eq!(index.select_where(1, |c| c >= 7, TypeMask::LINES), vec![l(2)]);
        assert_eq!(index.select_where(1, |_| true, TypeMask::ALL), vec![l(1), l(2), l(4)]);
    }

    #[test]
    fn dead_lines_are_not_indexed() {
        let (mut topo, store) = fixture();
        topo.delete_line(l(1)).unwrap();
        let index = CategoryIndex::build(&topo, &store).unwrap();
        assert_eq!(index.find(1, 7, TypeMask::ALL), vec![l(2), l(4)]);
    }

    #[test]
    fn file_round_trip() {
        let (topo, store) = fixture();
        let index = CategoryIndex::build(&topo, &store).unwrap();
        let mut buf = Vec::new();
        index.to_writer(&mut buf).unwrap();
        let back = CategoryIndex::from_reader(buf.as_slice()).unwrap();

        assert_eq!(back.fields().collect::<Vec<_>>(), vec![1, 2]);
        for field in [1, 2] {
            assert_eq!(back.field(field).unwrap().entries(), index.field(field).unwrap().entries());
        }
        assert_eq!(back.find(1, 9, TypeMask::ALL), vec![l(4)]);
        assert!(back.matches(&topo));
    }

    #[test]
    fn unsorted_file_is_corrupt() {
        let mut w = PortWriter::with_header(Vec::new(), &CIDX, ByteOrder::Little).unwrap();
        w.put_len(1).unwrap();
        w.put_i32(1).unwrap();
        for n in [0, 2, 0, 0, 0, 0] {
            w.put_len(n).unwrap();
        }
        w.put_len(2).unwrap();
        w.put_len(2).unwrap();
        for (cat, line) in [(9, 1), (3, 2)] {
            w.put_i32(cat).unwrap();
            w.put_u8(LineType::Line.code()).unwrap();
            w.put_u32(line).unwrap();
        }
        let err = CategoryIndex::from_reader(w.into_inner().as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corrupt { file: "cidx", .. }));
    }

    #[test]
    fn stale_after_deletion() {
        let (mut topo, store) = fixture();
        let index = CategoryIndex::build(&topo, &store).unwrap();
        topo.delete_line(l(2)).unwrap();
        assert!(!index.matches(&topo));
    }
}
