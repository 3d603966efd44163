// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build options.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options that shape a topology build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Endpoints closer than this share a node. 0 merges exact matches only.
    pub snap_tolerance: f64,
    /// Rebuild the category index after a build reaches the full level.
    pub build_category_index: bool,
    /// Report progress every this many records.
    pub progress_interval: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            snap_tolerance: 0.0,
            build_category_index: true,
            progress_interval: 10_000,
        }
    }
}

impl BuildOptions {
    /// Reads options from `VTOPO_*` environment variables. Unset or
    /// unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            snap_tolerance: std::env::var("VTOPO_SNAP_TOLERANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|t: &f64| t.is_finite() && *t >= 0.0)
                .unwrap_or(defaults.snap_tolerance),
            build_category_index: std::env::var("VTOPO_BUILD_CATEGORY_INDEX")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.build_category_index),
            progress_interval: std::env::var("VTOPO_PROGRESS_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.progress_interval),
        }
    }

    /// Parses options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.snap_tolerance.is_finite() && self.snap_tolerance >= 0.0) {
            return Err(Error::Config(format!(
                "snap_tolerance must be a finite non-negative number, got {}",
                self.snap_tolerance
            )));
        }
        if self.progress_interval == 0 {
            return Err(Error::Config("progress_interval must be positive".into()));
        }
        Ok(())
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_defaults() {
        let options = BuildOptions::from_json(r#"{ "snap_tolerance": 0.5 }"#).unwrap();
        assert_eq!(options.snap_tolerance, 0.5);
        assert!(options.build_category_index);
        assert_eq!(options.progress_interval, 10_000);
    }

    #[test]
    fn json_rejects_negative_tolerance() {
        let err = BuildOptions::from_json(r#"{ "snap_tolerance": -1.0 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn json_rejects_malformed_input() {
        assert!(matches!(BuildOptions::from_json("{"), Err(Error::Config(_))));
    }

    #[test]
    fn json_round_trip() {
        let options = BuildOptions {
            snap_tolerance: 0.25,
            build_category_index: false,
            progress_interval: 7,
        };
        assert_eq!(BuildOptions::from_json(&options.to_json().unwrap()).unwrap(), options);
    }

    #[test]
    fn flags() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
