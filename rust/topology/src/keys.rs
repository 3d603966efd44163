// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handle and tag types for the topology structure.
//!
//! Nodes, lines, areas and isles reference each other by 1-based integer
//! handles, never by address. A handle stays valid for the lifetime of the
//! record it names: dead lines and nodes keep their slot, so handles survive
//! deletions and round-trip through the topology file unchanged.
//!
//! Signed handles are modelled as enums ([`DirectedLine`], [`Side`],
//! [`CentroidLink`]) whose `raw()` form is the signed integer used on disk.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Wraps a 1-based handle. Returns `None` for 0.
            pub fn new(raw: u32) -> Option<Self> {
                (raw != 0).then_some(Self(raw))
            }

            /// Handle of the record stored at 0-based `index`.
            pub fn from_index(index: usize) -> Self {
                Self(index as u32 + 1)
            }

            /// The 1-based handle value.
            pub fn get(self) -> u32 {
                self.0
            }

            /// The 0-based slot index.
            pub fn index(self) -> usize {
                self.0 as usize - 1
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

handle!(
    /// Handle of a node.
    NodeId,
    "N"
);
handle!(
    /// Handle of a line of any type.
    LineId,
    "L"
);
handle!(
    /// Handle of an area.
    AreaId,
    "A"
);
handle!(
    /// Handle of an isle.
    IsleId,
    "I"
);

/// A line traversed in a given direction.
///
/// At a node, `forward` means the line leaves the node from its first
/// vertex; a reversed entry means the node is the line's last vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectedLine {
    pub line: LineId,
    pub forward: bool,
}

impl DirectedLine {
    pub fn forward(line: LineId) -> Self {
        Self { line, forward: true }
    }

    pub fn backward(line: LineId) -> Self {
        Self {
            line,
            forward: false,
        }
    }

    pub fn reversed(self) -> Self {
        Self {
            line: self.line,
            forward: !self.forward,
        }
    }

    /// Signed handle: `+id` forward, `-id` reversed.
    pub fn raw(self) -> i32 {
        let id = self.line.get() as i32;
        if self.forward {
            id
        } else {
            -id
        }
    }

    /// Parses a signed handle. Returns `None` for 0.
    pub fn from_raw(raw: i32) -> Option<Self> {
        let line = LineId::new(raw.unsigned_abs())?;
        Some(Self {
            line,
            forward: raw > 0,
        })
    }
}

impl fmt::Display for DirectedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

/// What lies on one side of a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    /// No area or isle recorded (unbounded exterior or unbuilt).
    #[default]
    None,
    Area(AreaId),
    Isle(IsleId),
}

impl Side {
    /// Signed handle: 0, `+area` or `-isle`.
    pub fn raw(self) -> i32 {
        match self {
            Side::None => 0,
            Side::Area(a) => a.get() as i32,
            Side::Isle(i) => -(i.get() as i32),
        }
    }

    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Side::None,
            r if r > 0 => Side::Area(AreaId(r as u32)),
            r => Side::Isle(IsleId(r.unsigned_abs())),
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, Side::None)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::None => f.write_str("0"),
            Side::Area(a) => write!(f, "{a}"),
            Side::Isle(i) => write!(f, "{i}"),
        }
    }
}

/// Which area a centroid belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CentroidLink {
    /// Inside no area, or not yet assigned.
    #[default]
    Outside,
    /// The area this centroid validly owns.
    Area(AreaId),
    /// Inside an area already owned by a lower-numbered centroid.
    Duplicate(AreaId),
}

impl CentroidLink {
    /// Signed handle: 0, `+area` or `-area` for a duplicate.
    pub fn raw(self) -> i32 {
        match self {
            CentroidLink::Outside => 0,
            CentroidLink::Area(a) => a.get() as i32,
            CentroidLink::Duplicate(a) => -(a.get() as i32),
        }
    }

    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => CentroidLink::Outside,
            r if r > 0 => CentroidLink::Area(AreaId(r as u32)),
            r => CentroidLink::Duplicate(AreaId(r.unsigned_abs())),
        }
    }
}

/// Geometry type of a line record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LineType {
    Point = 1,
    Line = 2,
    Boundary = 3,
    Centroid = 4,
    Face = 5,
    Kernel = 6,
}

impl LineType {
    pub const ALL: [LineType; 6] = [
        LineType::Point,
        LineType::Line,
        LineType::Boundary,
        LineType::Centroid,
        LineType::Face,
        LineType::Kernel,
    ];

    /// Code used in the geometry store and index files.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code).checked_sub(1)?).copied()
    }

    /// Position in per-type count arrays.
    pub fn slot(self) -> usize {
        self as usize - 1
    }

    /// Whether lines of this type are linked into nodes.
    pub fn has_nodes(self) -> bool {
        matches!(self, LineType::Line | LineType::Boundary)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineType::Point => "point",
            LineType::Line => "line",
            LineType::Boundary => "boundary",
            LineType::Centroid => "centroid",
            LineType::Face => "face",
            LineType::Kernel => "kernel",
        }
    }
}

impl fmt::Display for LineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of line types used to filter queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeMask(u8);

impl TypeMask {
    pub const NONE: TypeMask = TypeMask(0);
    pub const POINT: TypeMask = TypeMask(1 << 0);
    pub const LINE: TypeMask = TypeMask(1 << 1);
    pub const BOUNDARY: TypeMask = TypeMask(1 << 2);
    pub const CENTROID: TypeMask = TypeMask(1 << 3);
    pub const FACE: TypeMask = TypeMask(1 << 4);
    pub const KERNEL: TypeMask = TypeMask(1 << 5);
    pub const POINTS: TypeMask = TypeMask(Self::POINT.0 | Self::CENTROID.0);
    pub const LINES: TypeMask = TypeMask(Self::LINE.0 | Self::BOUNDARY.0);
    pub const ALL: TypeMask = TypeMask(0b11_1111);

    pub fn contains(self, kind: LineType) -> bool {
        self.0 & TypeMask::from(kind).0 != 0
    }
}

impl From<LineType> for TypeMask {
    fn from(kind: LineType) -> Self {
        TypeMask(1 << kind.slot())
    }
}

impl BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TypeMask {
    fn bitor_assign(&mut self, rhs: TypeMask) {
        self.0 |= rhs.0;
    }
}

/// How much derived topology has been computed, in build order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BuildLevel {
    #[default]
    None = 0,
    /// Nodes, and lines linked to them.
    Base = 1,
    /// Areas and isles traced from boundaries.
    Areas = 2,
    /// Isles attached to their enclosing areas.
    AttachIsles = 3,
    /// Centroids assigned to areas.
    Centroids = 4,
}

impl BuildLevel {
    /// The complete topology.
    pub const ALL: BuildLevel = BuildLevel::Centroids;

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BuildLevel::None),
            1 => Some(BuildLevel::Base),
            2 => Some(BuildLevel::Areas),
            3 => Some(BuildLevel::AttachIsles),
            4 => Some(BuildLevel::Centroids),
            _ => None,
        }
    }

    /// The stage built after this one, if any.
    pub fn next(self) -> Option<Self> {
        Self::from_code(self.code() + 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildLevel::None => "none",
            BuildLevel::Base => "base",
            BuildLevel::Areas => "areas",
            BuildLevel::AttachIsles => "attach_isles",
            BuildLevel::Centroids => "centroids",
        }
    }
}

impl fmt::Display for BuildLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
