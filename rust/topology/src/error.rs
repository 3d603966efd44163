// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for topology operations.
//!
//! Only unrecoverable conditions are errors. Structural anomalies found while
//! building (dangling boundaries, duplicate centroids, orphan isles) are
//! counted in the build report instead.

use crate::keys::{AreaId, BuildLevel, IsleId, LineId, NodeId};

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during topology operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or writing a map file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file does not start with the expected magic bytes.
    #[error("{file} file has bad magic {found:?}")]
    BadMagic { file: &'static str, found: [u8; 4] },

    /// The byte-order tag in a file header is neither little nor big endian.
    #[error("unsupported byte order tag {0}")]
    UnsupportedByteOrder(u8),

    /// A file was written by a newer, incompatible format version.
    #[error("{file} file version {major}.{minor} is not supported")]
    UnsupportedVersion {
        file: &'static str,
        major: u8,
        minor: u8,
    },

    /// A file is readable but its content is inconsistent.
    #[error("corrupt {file} file: {reason}")]
    Corrupt { file: &'static str, reason: String },

    /// A geometry record cannot be stored or linked as given.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// No geometry record exists at the given handle.
    #[error("no geometry record at offset {0}")]
    GeometryNotFound(u64),

    /// An external geometry driver failed.
    #[error("geometry source error: {0}")]
    Source(String),

    /// The map was opened read-only.
    #[error("map is read-only")]
    ReadOnly,

    /// The operation needs more topology than has been built.
    #[error("operation requires build level {required}, map is at {current}")]
    LevelRequired {
        required: BuildLevel,
        current: BuildLevel,
    },

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("line not found: {0}")]
    LineNotFound(LineId),

    /// Only deleted lines can be restored.
    #[error("line {0} is not deleted")]
    LineAlive(LineId),

    #[error("area not found: {0}")]
    AreaNotFound(AreaId),

    #[error("isle not found: {0}")]
    IsleNotFound(IsleId),

    /// Invalid build options.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn corrupt(file: &'static str, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            file,
            reason: reason.into(),
        }
    }
}
