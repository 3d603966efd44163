// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only geometry source over features from an external driver.
//!
//! The driver is queried once, up front; its features are held in memory
//! and addressed by their 0-based feature id. Topology can be built over
//! them like over the native store, but nothing can be written back.

use std::fmt::Display;

use crate::error::{Error, Result};
use crate::source::{GeometryRecord, GeometrySource, RecordIter, SourceKind};

/// Features delivered by an external driver, addressed by feature id.
#[derive(Debug, Clone)]
pub struct ExternalSource {
    driver: String,
    with_z: bool,
    features: Vec<GeometryRecord>,
}

impl ExternalSource {
    /// Collects the features a driver yields.
    ///
    /// The first driver error aborts collection and is returned as
    /// [`Error::Source`]. Invalid records are rejected the same way.
    pub fn from_driver<I, E>(driver: impl Into<String>, with_z: bool, features: I) -> Result<Self>
    where
        I: IntoIterator<Item = std::result::Result<GeometryRecord, E>>,
        E: Display,
    {
        let driver = driver.into();
        let mut collected = Vec::new();
        for (fid, feature) in features.into_iter().enumerate() {
            let record =
                feature.map_err(|e| Error::Source(format!("{driver}: feature {fid}: {e}")))?;
            record
                .validate()
                .map_err(|e| Error::Source(format!("{driver}: feature {fid}: {e}")))?;
            collected.push(record);
        }
        tracing::debug!(driver = %driver, features = collected.len(), "Loaded external features");
        Ok(Self {
            driver,
            with_z,
            features: collected,
        })
    }

    /// Name of the driver the features came from.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl GeometrySource for ExternalSource {
    fn with_z(&self) -> bool {
        self.with_z
    }

    fn kind(&self) -> SourceKind {
        SourceKind::External
    }

    fn read(&self, handle: u64) -> Result<GeometryRecord> {
        usize::try_from(handle)
            .ok()
            .and_then(|fid| self.features.get(fid))
            .cloned()
            .ok_or(Error::GeometryNotFound(handle))
    }

    fn scan(&self) -> RecordIter<'_> {
        Box::new(
            self.features
                .iter()
                .enumerate()
                .map(|(fid, f)| Ok((fid as u64, f.clone()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::LineType;

    #[test]
    fn feature_ids_are_handles() {
        let features = vec![
            Ok::<_, String>(GeometryRecord::from_xy(LineType::Point, &[(1.0, 2.0)])),
            Ok(GeometryRecord::from_xy(LineType::Line, &[(0.0, 0.0), (1.0, 1.0)])),
        ];
        let source = ExternalSource::from_driver("memory", false, features).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.read(1).unwrap().kind, LineType::Line);
        assert!(matches!(source.read(2), Err(Error::GeometryNotFound(2))));
        let handles: Vec<u64> = source.scan().map(|r| r.unwrap().0).collect();
        assert_eq!(handles, vec![0, 1]);
    }

    #[test]
    fn driver_error_is_source_error() {
        let features = vec![
            Ok(GeometryRecord::from_xy(LineType::Point, &[(1.0, 2.0)])),
            Err("layer vanished"),
        ];
        let err = ExternalSource::from_driver("memory", false, features).unwrap_err();
        assert!(matches!(err, Error::Source(msg) if msg.contains("layer vanished")));
    }

    #[test]
    fn cannot_write() {
        let mut source =
            ExternalSource::from_driver("memory", false, Vec::<std::result::Result<_, String>>::new())
                .unwrap();
        let rec = GeometryRecord::from_xy(LineType::Point, &[(0.0, 0.0)]);
        assert!(matches!(source.write(&rec), Err(Error::ReadOnly)));
        assert!(matches!(source.delete(0), Err(Error::ReadOnly)));
    }
}
