// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration for ixbase trees.
//!
//! A small TOML-loadable options record, following the same
//! `#[serde(default)]` shape the embedding application's config layer uses
//! for its own settings.

use crate::error::{IxError, IxResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default capacity for the node cache and the pattern cache.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Recognized options for a [`crate::tree::Tree`].
///
/// ## Fields
/// - `capacity`: max entries in both the node cache and the pattern cache.
/// - `read_ahead`: whether the executor should prefetch the next leaf in the
///   scan direction while evaluating predicates on the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub capacity: usize,
    pub read_ahead: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            read_ahead: true,
        }
    }
}

impl Options {
    /// Creates options with a custom cache capacity, read-ahead left at the
    /// default (enabled).
    ///
    /// ## Error Conditions
    /// - none; capacity of zero degenerates to an always-evicting cache
    ///   rather than an error, matching the "no silent failure for benign
    ///   configuration" posture of the rest of the crate.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Parses a `[ixbase]` table out of a TOML document, falling back to
    /// defaults for any missing field.
    ///
    /// ## Error Conditions
    /// - `IxError::Backend`: the document is not valid TOML, or the
    ///   `[ixbase]` table does not match this shape.
    pub fn from_toml_str(raw: &str) -> IxResult<Self> {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(default)]
            ixbase: Options,
        }
        let wrapper: Wrapper = toml::from_str(raw).map_err(IxError::backend)?;
        Ok(wrapper.ixbase)
    }

    /// Loads options from a TOML file on disk. Convenience wrapper over
    /// [`Options::from_toml_str`] for embedders that keep a config file
    /// alongside their storage backend.
    pub fn from_toml_file(path: &Path) -> IxResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(IxError::backend)?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_1000() {
        assert_eq!(Options::default().capacity, DEFAULT_CAPACITY);
        assert!(Options::default().read_ahead);
    }

    #[test]
    fn parses_partial_toml() {
        let opts = Options::from_toml_str("[ixbase]\ncapacity = 50\n").unwrap();
        assert_eq!(opts.capacity, 50);
        assert!(opts.read_ahead);
    }

    #[test]
    fn missing_table_falls_back_to_defaults() {
        let opts = Options::from_toml_str("").unwrap();
        assert_eq!(opts, Options::default());
    }

    #[test]
    fn invalid_toml_is_backend_error() {
        let err = Options::from_toml_str("not valid = [").unwrap_err();
        assert!(err.is_retryable());
    }
}
