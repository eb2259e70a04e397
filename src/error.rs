//! Error taxonomy for pipeline stages and the test harness.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The pipeline stage that owns an external tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Incompatible-code stripping.
    Strip,
    /// Java-to-JavaScript transpilation.
    Transpile,
    /// Closure compilation of production entrypoints or test bundles.
    Compile,
    /// Test adapter generation.
    GenerateTests,
}

impl Stage {
    /// Name used for logging and for scratch directory prefixes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strip => "strip",
            Self::Transpile => "transpile",
            Self::Compile => "compile",
            Self::GenerateTests => "generate-tests",
        }
    }

    /// Human-readable name of the tool the stage drives.
    #[must_use]
    pub fn tool(self) -> &'static str {
        match self {
            Self::Strip => "stripper",
            Self::Transpile => "transpiler",
            Self::Compile => "compiler",
            Self::GenerateTests => "test generator",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by stages and the harness to the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The tool exited with a non-zero exit code.
    #[error("{stage} failed with exit code {exit_code}; see the {} error output for details", .stage.tool())]
    ToolFailure {
        /// Failing stage.
        stage: Stage,
        /// Exit code reported by the tool.
        exit_code: i32,
    },

    /// The tool exited successfully but reported error diagnostics.
    #[error("{stage} failed with {errors} error(s); see the {} error output for details", .stage.tool())]
    SilentToolFailure {
        /// Failing stage.
        stage: Stage,
        /// Number of error-level diagnostics.
        errors: u32,
    },

    /// The tool could not be launched.
    #[error("failed to launch the {} for {stage}: {message}", .stage.tool())]
    ToolLaunch {
        /// Stage that tried to launch the tool.
        stage: Stage,
        /// Launch failure detail.
        message: String,
    },

    /// Some files of a per-file strip batch failed.
    #[error("stripping failed for {failed} of {attempted} file(s)")]
    StripFailures {
        /// Number of files whose worker failed.
        failed: usize,
        /// Number of files attempted.
        attempted: usize,
    },

    /// Filesystem access failed.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An incremental state manifest could not be read or written.
    #[error("incremental state error: {0}")]
    State(String),

    /// The test summary could not be read.
    #[error("invalid test summary '{}': {message}", .path.display())]
    Summary {
        /// Summary file path.
        path: PathBuf,
        /// Parse failure detail.
        message: String,
    },

    /// An artifact a stage relies on was not produced upstream.
    #[error("missing artifact '{}'", .path.display())]
    MissingArtifact {
        /// The expected path.
        path: PathBuf,
    },

    /// A test listed in the summary has no compiled bundle to serve.
    #[error("no compiled bundle for test '{test}'")]
    MissingBundle {
        /// Test identifier from the summary.
        test: String,
    },

    /// The browser driver service failed outside of a single test.
    #[error("browser driver error: {0}")]
    Driver(String),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Result alias for pipeline operations.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_names_stage_and_exit_code() {
        let err = PipelineError::ToolFailure { stage: Stage::Transpile, exit_code: 3 };
        assert_eq!(
            err.to_string(),
            "transpile failed with exit code 3; see the transpiler error output for details"
        );
    }

    #[test]
    fn silent_failure_reports_error_count() {
        let err = PipelineError::SilentToolFailure { stage: Stage::Compile, errors: 2 };
        assert!(err.to_string().contains("2 error(s)"));
    }
}
