// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portable binary encoding for map files.
//!
//! Every file starts with a 4-byte magic, a major/minor version and a
//! byte-order tag. Numbers after the header are written in the tagged
//! order, so a file written on a big-endian machine reads back correctly on
//! a little-endian one and vice versa.

use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Byte order of the numbers following a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the running machine.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ByteOrder::Little),
            1 => Ok(ByteOrder::Big),
            other => Err(Error::UnsupportedByteOrder(other)),
        }
    }
}

/// Identifies one file format: magic, current version, and a label for
/// error messages.
#[derive(Debug, Clone, Copy)]
pub struct FileFormat {
    pub label: &'static str,
    pub magic: [u8; 4],
    pub major: u8,
    pub minor: u8,
}

macro_rules! put {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self, v: $ty) -> Result<()> {
            let bytes = match self.order {
                ByteOrder::Little => v.to_le_bytes(),
                ByteOrder::Big => v.to_be_bytes(),
            };
            self.inner.write_all(&bytes)?;
            Ok(())
        }
    };
}

macro_rules! get {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let mut bytes = [0u8; std::mem::size_of::<$ty>()];
            self.inner.read_exact(&mut bytes)?;
            Ok(match self.order {
                ByteOrder::Little => <$ty>::from_le_bytes(bytes),
                ByteOrder::Big => <$ty>::from_be_bytes(bytes),
            })
        }
    };
}

/// Writes numbers in a fixed byte order.
pub struct PortWriter<W> {
    inner: W,
    order: ByteOrder,
}

impl<W: Write> PortWriter<W> {
    pub fn new(inner: W, order: ByteOrder) -> Self {
        Self { inner, order }
    }

    /// Writes the file header and returns a writer positioned after it.
    pub fn with_header(mut inner: W, format: &FileFormat, order: ByteOrder) -> Result<Self> {
        inner.write_all(&format.magic)?;
        inner.write_all(&[format.major, format.minor, order.tag()])?;
        Ok(Self::new(inner, order))
    }

    put!(put_u32, u32);
    put!(put_i32, i32);
    put!(put_u64, u64);
    put!(put_f32, f32);
    put!(put_f64, f64);

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        self.inner.write_all(&[v])?;
        Ok(())
    }

    pub fn put_bool(&mut self, v: bool) -> Result<()> {
        self.put_u8(u8::from(v))
    }

    /// Writes a collection length as `u32`.
    pub fn put_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "collection too large for a u32 length",
            ))
        })?;
        self.put_u32(len)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads numbers in the byte order announced by a file header.
pub struct PortReader<R> {
    inner: R,
    order: ByteOrder,
}

impl<R: Read> PortReader<R> {
    pub fn new(inner: R, order: ByteOrder) -> Self {
        Self { inner, order }
    }

    /// Checks the file header against `format` and returns a reader for the
    /// rest of the file.
    ///
    /// Files with the same major version and any minor version are accepted.
    pub fn with_header(mut inner: R, format: &FileFormat) -> Result<Self> {
        let mut magic = [0u8; 4];
        inner.read_exact(&mut magic)?;
        if magic != format.magic {
            return Err(Error::BadMagic {
                file: format.label,
                found: magic,
            });
        }
        let mut rest = [0u8; 3];
        inner.read_exact(&mut rest)?;
        let [major, minor, tag] = rest;
        if major != format.major {
            return Err(Error::UnsupportedVersion {
                file: format.label,
                major,
                minor,
            });
        }
        Ok(Self::new(inner, ByteOrder::from_tag(tag)?))
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    get!(get_u32, u32);
    get!(get_i32, i32);
    get!(get_u64, u64);
    get!(get_f32, f32);
    get!(get_f64, f64);

    pub fn get_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.inner.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_len(&mut self) -> Result<usize> {
        Ok(self.get_u32()? as usize)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Capacity hint for a length read from a file, capped so a corrupt length
/// cannot trigger a huge allocation before the read fails.
pub(crate) fn capacity_hint(len: usize) -> usize {
    len.min(1 << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST: FileFormat = FileFormat {
        label: "test",
        magic: *b"TEST",
        major: 2,
        minor: 1,
    };

    #[test]
    fn both_orders_read_back() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut w = PortWriter::with_header(Vec::new(), &TEST, order).unwrap();
            w.put_i32(-42).unwrap();
            w.put_f64(3.25).unwrap();
            w.put_f32(-9.0).unwrap();
            w.put_u64(1 << 40).unwrap();
            let bytes = w.into_inner();

            let mut r = PortReader::with_header(bytes.as_slice(), &TEST).unwrap();
            assert_eq!(r.order(), order);
            assert_eq!(r.get_i32().unwrap(), -42);
            assert_eq!(r.get_f64().unwrap(), 3.25);
            assert_eq!(r.get_f32().unwrap(), -9.0);
            assert_eq!(r.get_u64().unwrap(), 1 << 40);
        }
    }

    #[test]
    fn big_endian_layout() {
        let mut w = PortWriter::new(Vec::new(), ByteOrder::Big);
        w.put_u32(1).unwrap();
        assert_eq!(w.into_inner(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = b"NOPE\x02\x01\x00".to_vec();
        let err = PortReader::with_header(bytes.as_slice(), &TEST).err().unwrap();
        assert!(matches!(err, Error::BadMagic { .. }));
    }

    #[test]
    fn rejects_unknown_byte_order() {
        let bytes = b"TEST\x02\x00\x07".to_vec();
        let err = PortReader::with_header(bytes.as_slice(), &TEST).err().unwrap();
        assert!(matches!(err, Error::UnsupportedByteOrder(7)));
    }

    #[test]
    fn rejects_newer_major_version() {
        let bytes = b"TEST\x03\x00\x00".to_vec();
        let err = PortReader::with_header(bytes.as_slice(), &TEST).err().unwrap();
        assert!(matches!(err, Error::UnsupportedVersion { major: 3, .. }));
    }

    #[test]
    fn truncated_input_is_io_error() {
        let mut r = PortReader::new([0u8, 1].as_slice(), ByteOrder::Little);
        assert!(matches!(r.get_u32(), Err(Error::Io(_))));
    }
}
