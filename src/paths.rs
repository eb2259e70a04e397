//! Reconciles tool-reported output paths with the build's expected layout.
//!
//! Batch tools report the files they processed under whatever path they were
//! handed, sometimes with the filesystem root stripped (archive entries never
//! start with `/`). The mapper turns those back into project-relative paths.

use std::collections::HashMap;

/// Source-root markers recognized when no explicit mapping exists.
pub const DEFAULT_SOURCE_ROOT_MARKERS: &[&str] = &["src/main/java", "src/test/java"];

/// Result of resolving a reported path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The path was mapped to a project-relative destination.
    Mapped(String),
    /// No mapping applied; the reported path is kept as is.
    Unmapped(String),
}

/// Returns the part of `path` after the first recognized source-root marker.
///
/// Markers match whole path segments only, so `src/main/javafx/A.java` does
/// not match `src/main/java`. Returns `None` when no marker is present.
#[must_use]
pub fn strip_source_root<'p>(path: &'p str, markers: &[impl AsRef<str>]) -> Option<&'p str> {
    let path = path.trim_start_matches('/');
    for marker in markers {
        let marker = marker.as_ref().trim_matches('/');
        if marker.is_empty() {
            continue;
        }
        if let Some(rest) = path.strip_prefix(marker).and_then(|r| r.strip_prefix('/')) {
            return Some(rest);
        }
        let needle = format!("/{marker}/");
        if let Some(idx) = path.find(&needle) {
            return Some(&path[idx + needle.len()..]);
        }
    }
    None
}

/// Lookup table from tool-reported paths to destination paths.
///
/// Built before a batch tool invocation and consulted afterwards; it does not
/// outlive the stage invocation that built it.
#[derive(Debug, Clone)]
pub struct PathMapper {
    markers: Vec<String>,
    table: HashMap<String, String>,
}

impl Default for PathMapper {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_ROOT_MARKERS.iter().map(|m| (*m).to_string()).collect())
    }
}

impl PathMapper {
    /// Creates an empty mapper recognizing the given source-root markers.
    #[must_use]
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers, table: HashMap::new() }
    }

    /// Records that the tool will report `reported` for a file whose
    /// destination is `destination`.
    ///
    /// Both the exact path and its root-stripped form are recorded, since
    /// archive entries drop the leading `/`.
    pub fn insert(&mut self, reported: &str, destination: &str) {
        let stripped = reported.trim_start_matches('/');
        if stripped != reported {
            self.table.insert(stripped.to_string(), destination.to_string());
        }
        self.table.insert(reported.to_string(), destination.to_string());
    }

    /// Resolves a reported path: exact match first, then the marker-based
    /// fallback, otherwise the reported path unchanged.
    #[must_use]
    pub fn resolve(&self, reported: &str) -> Resolution {
        if let Some(dest) = self.table.get(reported) {
            return Resolution::Mapped(dest.clone());
        }
        if let Some(suffix) = strip_source_root(reported, self.markers.as_slice()) {
            return Resolution::Mapped(suffix.to_string());
        }
        Resolution::Unmapped(reported.to_string())
    }
}
