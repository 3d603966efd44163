// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Native append-only geometry store.
//!
//! Records are packed back to back in one byte buffer and addressed by
//! their byte offset, which never changes: deleting a record only clears its
//! alive flag. Record layout (little endian in memory):
//!
//! ```text
//! [alive u8][type u8][n_cats u32][(field i32, cat i32) ...]
//! [n_points u32][x f64, y f64, (z f64) ...]
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::keys::LineType;
use crate::port::{capacity_hint, ByteOrder, FileFormat, PortReader, PortWriter};
use crate::source::{Category, GeometryRecord, GeometrySource, RecordIter, SourceKind};

pub(crate) const COOR: FileFormat = FileFormat {
    label: "coor",
    magic: *b"VTCR",
    major: 1,
    minor: 0,
};

/// Append-only storage of geometry records addressed by byte offset.
#[derive(Debug, Clone, Default)]
pub struct GeometryStore {
    with_z: bool,
    buf: Vec<u8>,
}

impl GeometryStore {
    pub fn new(with_z: bool) -> Self {
        Self {
            with_z,
            buf: Vec::new(),
        }
    }

    /// Size of the packed records in bytes.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the record at `offset` is alive.
    pub fn is_alive(&self, offset: u64) -> Result<bool> {
        Ok(self.decode_at(offset)?.alive)
    }

    fn decode_at(&self, offset: u64) -> Result<Decoded> {
        let start = usize::try_from(offset).map_err(|_| Error::GeometryNotFound(offset))?;
        let bytes = self.buf.get(start..).filter(|b| !b.is_empty());
        let bytes = bytes.ok_or(Error::GeometryNotFound(offset))?;
        let mut reader = PortReader::new(bytes, ByteOrder::Little);
        let (alive, record) = decode_record(&mut reader, self.with_z)?;
        let used = bytes.len() - reader.into_inner().len();
        Ok(Decoded {
            alive,
            record,
            next: offset + used as u64,
        })
    }

    /// Writes the store to `w` with a header tagged little endian.
    pub fn to_writer<W: Write>(&self, w: W) -> Result<()> {
        let mut w = PortWriter::with_header(w, &COOR, ByteOrder::Little)?;
        w.put_bool(self.with_z)?;
        w.put_u64(self.buf.len() as u64)?;
        let mut inner = w.into_inner();
        inner.write_all(&self.buf)?;
        inner.flush()?;
        Ok(())
    }

    /// Reads a store written by [`GeometryStore::to_writer`] in either byte
    /// order. Big-endian payloads are re-packed little endian; record sizes
    /// do not change, so offsets stay valid.
    pub fn from_reader<R: Read>(r: R) -> Result<Self> {
        let mut r = PortReader::with_header(r, &COOR)?;
        let with_z = r.get_bool()?;
        let len = usize::try_from(r.get_u64()?)
            .map_err(|_| Error::corrupt(COOR.label, "payload length overflows"))?;
        let order = r.order();
        let mut payload = Vec::with_capacity(capacity_hint(len));
        r.into_inner().take(len as u64).read_to_end(&mut payload)?;
        if payload.len() != len {
            return Err(Error::corrupt(COOR.label, "truncated payload"));
        }

        let mut store = Self::new(with_z);
        let mut rest = payload.as_slice();
        while !rest.is_empty() {
            let mut reader = PortReader::new(rest, order);
            let (alive, record) = decode_record(&mut reader, with_z)?;
            rest = reader.into_inner();
            store.append(alive, &record)?;
        }
        if store.buf.len() != len {
            return Err(Error::corrupt(COOR.label, "record sizes changed on re-pack"));
        }
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_writer(BufWriter::new(File::create(path)?))
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    fn append(&mut self, alive: bool, record: &GeometryRecord) -> Result<u64> {
        let offset = self.buf.len() as u64;
        let mut w = PortWriter::new(&mut self.buf, ByteOrder::Little);
        w.put_bool(alive)?;
        w.put_u8(record.kind.code())?;
        w.put_len(record.cats.len())?;
        for c in &record.cats {
            w.put_i32(c.field)?;
            w.put_i32(c.cat)?;
        }
        w.put_len(record.points.len())?;
        for p in &record.points {
            w.put_f64(p.x)?;
            w.put_f64(p.y)?;
            if self.with_z {
                w.put_f64(p.z)?;
            }
        }
        Ok(offset)
    }
}

struct Decoded {
    alive: bool,
    record: GeometryRecord,
    next: u64,
}

fn decode_record(r: &mut PortReader<&[u8]>, with_z: bool) -> Result<(bool, GeometryRecord)> {
    let alive = r.get_bool()?;
    let code = r.get_u8()?;
    let kind = LineType::from_code(code)
        .ok_or_else(|| Error::corrupt(COOR.label, format!("unknown geometry type {code}")))?;

    let n_cats = r.get_len()?;
    let mut cats = Vec::with_capacity(capacity_hint(n_cats));
    for _ in 0..n_cats {
        let field = r.get_i32()?;
        let cat = r.get_i32()?;
        cats.push(Category { field, cat });
    }

    let n_points = r.get_len()?;
    let mut points = Vec::with_capacity(capacity_hint(n_points));
    for _ in 0..n_points {
        let x = r.get_f64()?;
        let y = r.get_f64()?;
        let z = if with_z { r.get_f64()? } else { 0.0 };
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(Error::corrupt(COOR.label, format!("{kind} has a non-finite coordinate")));
        }
        points.push(Point3::new(x, y, z));
    }
    Ok((alive, GeometryRecord { kind, points, cats }))
}

impl GeometrySource for GeometryStore {
    fn with_z(&self) -> bool {
        self.with_z
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Native
    }

    fn read(&self, handle: u64) -> Result<GeometryRecord> {
        Ok(self.decode_at(handle)?.record)
    }

    fn scan(&self) -> RecordIter<'_> {
        Box::new(Scan {
            store: self,
            pos: 0,
            failed: false,
        })
    }

    fn write(&mut self, record: &GeometryRecord) -> Result<u64> {
        record.validate()?;
        self.append(true, record)
    }

    fn delete(&mut self, handle: u64) -> Result<()> {
        // Decoding first rejects handles that are not record starts we can read.
        self.decode_at(handle)?;
        self.buf[handle as usize] = 0;
        Ok(())
    }

    fn restore(&mut self, handle: u64) -> Result<()> {
        self.decode_at(handle)?;
        self.buf[handle as usize] = 1;
        Ok(())
    }

    fn persist(&self, path: &Path) -> Result<()> {
        self.save(path)
    }
}

struct Scan<'a> {
    store: &'a GeometryStore,
    pos: u64,
    failed: bool,
}

impl Iterator for Scan<'_> {
    type Item = Result<(u64, GeometryRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.failed && self.pos < self.store.buf.len() as u64 {
            let offset = self.pos;
            match self.store.decode_at(offset) {
                Ok(d) => {
                    self.pos = d.next;
                    if d.alive {
                        return Some(Ok((offset, d.record)));
                    }
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GeometryStore {
        let mut store = GeometryStore::new(false);
        store
            .write(&GeometryRecord::from_xy(LineType::Boundary, &[(0.0, 0.0), (1.0, 0.0)]).with_cat(1, 10))
            .unwrap();
        store
            .write(&GeometryRecord::from_xy(LineType::Centroid, &[(0.5, 0.5)]).with_cat(1, 20))
            .unwrap();
        store
    }

    #[test]
    fn offsets_address_records() {
        let mut store = GeometryStore::new(true);
        let rec = GeometryRecord::new(
            LineType::Line,
            vec![Point3::new(0.0, 0.0, 1.0), Point3::new(2.0, 1.0, 3.0)],
        );
        let a = store.write(&rec).unwrap();
        let b = store.write(&GeometryRecord::from_xy(LineType::Point, &[(5.0, 5.0)])).unwrap();
        assert_eq!(a, 0);
        assert!(b > a);
        assert_eq!(store.read(a).unwrap(), rec);
        assert_eq!(store.read(b).unwrap().kind, LineType::Point);
    }

    #[test]
    fn delete_hides_record_from_scan() {
        let mut store = sample();
        let offsets: Vec<u64> = store.scan().map(|r| r.unwrap().0).collect();
        assert_eq!(offsets.len(), 2);

        store.delete(offsets[0]).unwrap();
        assert!(!store.is_alive(offsets[0]).unwrap());
        let remaining: Vec<u64> = store.scan().map(|r| r.unwrap().0).collect();
        assert_eq!(remaining, vec![offsets[1]]);
        // Dead records stay readable by handle.
        assert_eq!(store.read(offsets[0]).unwrap().kind, LineType::Boundary);
    }

    #[test]
    fn out_of_range_handle() {
        let store = sample();
        assert!(matches!(store.read(10_000), Err(Error::GeometryNotFound(10_000))));
    }

    #[test]
    fn rejects_short_lines() {
        let mut store = GeometryStore::new(false);
        let err = store.write(&GeometryRecord::from_xy(LineType::Boundary, &[(0.0, 0.0)]));
        assert!(matches!(err, Err(Error::InvalidGeometry(_))));
        assert_eq!(store.byte_len(), 0);
    }

    #[test]
    fn file_round_trip() {
        let store = sample();
        let mut bytes = Vec::new();
        store.to_writer(&mut bytes).unwrap();
        let back = GeometryStore::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(back.buf, store.buf);
        assert!(!back.with_z());
    }

    #[test]
    fn reads_big_endian_file() {
        let store = sample();
        let records: Vec<(u64, GeometryRecord)> = store.scan().map(|r| r.unwrap()).collect();

        // Hand-encode the same records big endian.
        let mut w = PortWriter::with_header(Vec::new(), &COOR, ByteOrder::Big).unwrap();
        w.put_bool(false).unwrap();
        w.put_u64(store.byte_len() as u64).unwrap();
        for (_, rec) in &records {
            w.put_bool(true).unwrap();
            w.put_u8(rec.kind.code()).unwrap();
            w.put_len(rec.cats.len()).unwrap();
            for c in &rec.cats {
                w.put_i32(c.field).unwrap();
                w.put_i32(c.cat).unwrap();
            }
            w.put_len(rec.points.len()).unwrap();
            for p in &rec.points {
                w.put_f64(p.x).unwrap();
                w.put_f64(p.y).unwrap();
            }
        }
        let bytes = w.into_inner();

        let back = GeometryStore::from_reader(bytes.as_slice()).unwrap();
        for (offset, rec) in records {
            assert_eq!(back.read(offset).unwrap(), rec);
        }
    }

    #[test]
    fn non_finite_coordinate_in_file_is_corrupt() {
        let mut payload = GeometryStore::new(false);
        payload
            .append(true, &GeometryRecord::from_xy(LineType::Line, &[(0.0, 0.0), (f64::NAN, 1.0)]))
            .unwrap();
        let mut bytes = Vec::new();
        payload.to_writer(&mut bytes).unwrap();

        let err = GeometryStore::from_reader(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corrupt { file: "coor", .. }));
    }
}
