//! The machine-readable list of generated tests.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// File name of the summary written by the test adapter generator.
pub const SUMMARY_FILE_NAME: &str = "test_summary.json";

/// Generated test script identifiers, e.g. `com/example/FooTest`.
///
/// Unknown fields in the document are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Slash-separated identifiers; may carry a `.js` suffix as written by
    /// the generator.
    pub tests: BTreeSet<String>,
}

impl TestSummary {
    /// Reads a summary file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, or
    /// [`PipelineError::Summary`] if it is not a valid summary.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::Summary { path: path.to_path_buf(), message: e.to_string() })
    }

    /// Identifiers without their `.js` suffix.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|t| t.strip_suffix(".js").unwrap_or(t))
    }

    /// Number of tests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns `true` if no test was generated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Dotted test class name of an identifier: `a/b/FooTest` → `a.b.FooTest`.
#[must_use]
pub fn test_class(identifier: &str) -> String {
    identifier.strip_suffix(".js").unwrap_or(identifier).replace('/', ".")
}
