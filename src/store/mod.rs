//! Persistence of per-stage incremental manifests.
//!
//! Each stage invocation identity (stage name plus destination directory)
//! owns one manifest file. Directory layout:
//!
//! ```text
//! <root>/
//!   ├── strip-<hash>.yaml
//!   └── ...
//! ```
//!
//! Manifests are loaded at stage start and saved only after the stage
//! succeeded, so a failed run is retried from the previous state.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result, Stage};
use crate::incremental::Manifest;

/// Persistence layer for incremental manifests.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Creates a new store rooted at the given path.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    /// Derives the invocation identity of a stage writing to `destination`.
    #[must_use]
    pub fn key_for(stage: Stage, destination: &Path) -> String {
        let digest = Sha256::digest(destination.to_string_lossy().as_bytes());
        format!("{}-{}", stage.as_str(), &hex::encode(digest)[..16])
    }

    /// Loads the manifest for `key`, or `None` if no run has succeeded yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest exists but cannot be read or parsed.
    pub fn load(&self, key: &str) -> Result<Option<Manifest>> {
        let path = self.manifest_path(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PipelineError::io(path, e)),
        };
        let manifest: Manifest = serde_yaml::from_str(&contents)
            .map_err(|e| PipelineError::State(format!("failed to parse manifest {key}: {e}")))?;
        if manifest.key != key {
            log::warn!("manifest {} belongs to {}, ignoring it", path.display(), manifest.key);
            return Ok(None);
        }
        Ok(Some(manifest))
    }

    /// Saves a manifest under its own key.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let yaml = serde_yaml::to_string(manifest).map_err(|e| {
            PipelineError::State(format!("failed to serialize manifest {}: {e}", manifest.key))
        })?;
        fs::create_dir_all(&self.root).map_err(|e| PipelineError::io(&self.root, e))?;
        let path = self.manifest_path(&manifest.key);
        fs::write(&path, yaml).map_err(|e| PipelineError::io(path, e))
    }

    fn manifest_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.yaml"))
    }
}
