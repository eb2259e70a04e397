//! Pipeline stages driving the external build tools.
//!
//! Stages are invoked sequentially by the orchestrator; each one runs its
//! tool as an isolated unit of work through the [`ToolRunner`] port and owns
//! a private scratch directory for the duration of the invocation.

pub mod compile;
pub mod strip;
pub mod transpile;

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{PipelineError, Result, Stage};
use crate::ports::{ToolInvocation, ToolOutput, ToolRunner};

/// Runs a tool for `stage`, forwarding its own output to stderr.
///
/// The exit code is left for the caller to interpret.
pub(crate) fn run_tool(
    tools: &dyn ToolRunner,
    stage: Stage,
    invocation: &ToolInvocation,
) -> Result<ToolOutput> {
    log::debug!("{stage}: {}", invocation.display());
    let output = tools
        .invoke(invocation)
        .map_err(|e| PipelineError::ToolLaunch { stage, message: e.to_string() })?;
    forward_output(&output);
    Ok(output)
}

/// Fails with [`PipelineError::ToolFailure`] on a non-zero exit code.
pub(crate) fn check_exit(stage: Stage, output: &ToolOutput) -> Result<()> {
    if output.exit_code == 0 {
        Ok(())
    } else {
        Err(PipelineError::ToolFailure { stage, exit_code: output.exit_code })
    }
}

fn forward_output(output: &ToolOutput) {
    let mut stderr = std::io::stderr().lock();
    for text in [&output.stdout, &output.stderr] {
        if !text.is_empty() {
            let _ = stderr.write_all(text.as_bytes());
            if !text.ends_with('\n') {
                let _ = stderr.write_all(b"\n");
            }
        }
    }
}

/// Private scratch directory of one stage invocation, removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Creates `<root>/<stage>-<uuid>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(root: &Path, stage: Stage) -> Result<Self> {
        let path = root.join(format!("{}-{}", stage.as_str(), uuid::Uuid::new_v4()));
        fs::create_dir_all(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Self { path })
    }

    /// The scratch directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            log::debug!("failed to remove scratch dir {}: {e}", self.path.display());
        }
    }
}

/// Collects every regular file under `roots` (files are taken as is),
/// sorted for deterministic tool arguments.
///
/// # Errors
///
/// Returns an error if a directory cannot be walked.
pub fn collect_files(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for root in roots {
        if root.is_file() {
            files.push(root.clone());
            continue;
        }
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| PipelineError::io(root, e.into()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// Joins paths with the platform path-list separator.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] if a path contains the separator.
pub fn join_path_list(paths: &[PathBuf]) -> Result<String> {
    std::env::join_paths(paths)
        .map(|joined| joined.to_string_lossy().into_owned())
        .map_err(|e| PipelineError::Config(e.to_string()))
}

/// Joins a relative path below `root`, refusing anything that would escape it.
#[must_use]
pub fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut depth = 0_usize;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (depth > 0).then_some(path)
}

/// Removes a file, treating an already-missing file as success.
pub(crate) fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Creates the parent directory of `path`.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e)),
        None => Ok(()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_join_rejects_escapes() {
        let root = Path::new("/out");
        assert_eq!(safe_join(root, "a/./B.js"), Some(PathBuf::from("/out/a/B.js")));
        assert_eq!(safe_join(root, "../etc/passwd"), None);
        assert_eq!(safe_join(root, "a/../../x"), None);
        assert_eq!(safe_join(root, "/abs"), None);
        assert_eq!(safe_join(root, ""), None);
    }

    #[test]
    fn scratch_dir_is_private_and_removed() {
        let root = tempfile::tempdir().unwrap();
        let first = ScratchDir::create(root.path(), Stage::Compile).unwrap();
        let second = ScratchDir::create(root.path(), Stage::Compile).unwrap();
        assert_ne!(first.path(), second.path());
        let path = first.path().to_path_buf();
        assert!(path.is_dir());
        drop(first);
        assert!(!path.exists());
    }

    #[test]
    fn collect_files_is_sorted_and_skips_directories() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("b")).unwrap();
        fs::write(root.path().join("b/Z.js"), "").unwrap();
        fs::write(root.path().join("a.js"), "").unwrap();

        let files = collect_files(&[root.path().to_path_buf()]).unwrap();
        assert_eq!(files, vec![root.path().join("a.js"), root.path().join("b/Z.js")]);
    }

    #[test]
    fn non_zero_exit_is_a_tool_failure() {
        let output = ToolOutput { exit_code: 2, ..ToolOutput::default() };
        let err = check_exit(Stage::Transpile, &output).unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailure { stage: Stage::Transpile, exit_code: 2 }));
    }
}
