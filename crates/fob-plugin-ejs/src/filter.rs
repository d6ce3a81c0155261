//! Include/exclude matching for module ids
//!
//! Mirrors Rollup's `createFilter`: relative patterns are anchored at a base
//! directory, `*` stays within one path segment, exclusion wins, and virtual
//! module ids (prefixed with `\0`) never match.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::error::{EjsError, Result};

/// Compiled include/exclude pattern sets
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl PathFilter {
    /// Build a filter from include and exclude patterns
    ///
    /// An empty `include` list accepts every id that is not excluded.
    pub fn new(include: &[String], exclude: &[String], base: &Path) -> Result<Self> {
        Ok(Self {
            include: build_set(include, base)?,
            exclude: build_set(exclude, base)?,
        })
    }

    /// Check whether a module id should be transformed
    pub fn matches(&self, id: &str) -> bool {
        if id.starts_with('\0') {
            return false;
        }

        let id = normalize_separators(id);

        if let Some(exclude) = &self.exclude {
            if exclude.is_match(id.as_str()) {
                return false;
            }
        }

        match &self.include {
            Some(include) => include.is_match(id.as_str()),
            None => true,
        }
    }
}

fn build_set(patterns: &[String], base: &Path) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let anchored = anchor_pattern(pattern, base);
        let glob = GlobBuilder::new(&anchored)
            .literal_separator(true)
            .build()
            .map_err(|source| EjsError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|source| EjsError::InvalidPattern {
            pattern: patterns.join(", "),
            source,
        })
}

/// Resolve a relative pattern against `base`, leaving absolute and `**`
/// patterns alone
fn anchor_pattern(pattern: &str, base: &Path) -> String {
    let pattern = normalize_separators(pattern);
    if pattern.starts_with("**") || pattern.starts_with('/') || is_windows_absolute(&pattern) {
        return pattern;
    }

    let base = normalize_separators(&base.to_string_lossy());
    let base = base.trim_end_matches('/');
    let relative = pattern.trim_start_matches("./");
    format!("{}/{}", base, relative)
}

fn is_windows_absolute(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}
