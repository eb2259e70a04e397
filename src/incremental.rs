//! Incremental change tracking over a stable input file set.
//!
//! A [`Snapshot`] fingerprints every file under a set of source roots by
//! content hash. Diffing it against the [`Manifest`] recorded after the last
//! successful run yields the [`ChangeSet`] a stage has to process.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

/// Kind of change detected for a relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Present now, absent before.
    Added,
    /// Present in both, with different content.
    Modified,
    /// Present before, absent now.
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Removed => "REMOVED",
        })
    }
}

/// Fingerprint of one file, as persisted in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// File size in bytes.
    pub size: u64,
    /// Hex-encoded SHA-256 of the content.
    pub sha256: String,
    /// Last modification time, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

/// A file in the current input set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Normalized relative path (`/`-separated) under its source root.
    pub path: String,
    /// Absolute location of the file on disk.
    pub file: PathBuf,
    /// Content identity.
    pub fingerprint: Fingerprint,
}

/// The current state of a stable input file set, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: BTreeMap<String, SourceEntry>,
}

impl Snapshot {
    /// Scans every regular file under `roots`.
    ///
    /// Files under a directory root are keyed by their path below it; a root
    /// that is itself a file is keyed by its file name. Directories are never
    /// entries. When two roots yield the same key, the first root wins.
    ///
    /// # Errors
    ///
    /// Returns an error if a root cannot be walked or a file cannot be read.
    pub fn scan(roots: &[PathBuf]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        scan_into(&mut entries, "", roots)?;
        Ok(Self { entries })
    }

    /// Scans several independent root groups into one snapshot.
    ///
    /// Every key is prefixed with its group name, so equal relative paths in
    /// different groups never mask each other.
    ///
    /// # Errors
    ///
    /// Returns an error if a root cannot be walked or a file cannot be read.
    pub fn scan_groups(groups: &[(&str, &[PathBuf])]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (group, roots) in groups {
            scan_into(&mut entries, &format!("{group}/"), roots)?;
        }
        Ok(Self { entries })
    }

    /// Looks up an entry by relative path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&SourceEntry> {
        self.entries.get(path)
    }

    /// Number of files in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the snapshot has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts the snapshot into a manifest to persist after success.
    #[must_use]
    pub fn to_manifest(&self, key: &str) -> Manifest {
        Manifest {
            key: key.to_string(),
            recorded_at: Utc::now(),
            files: self
                .entries
                .iter()
                .map(|(path, entry)| (path.clone(), entry.fingerprint.clone()))
                .collect(),
        }
    }
}

/// Recorded state of an input set after a successful stage run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Invocation identity this manifest belongs to.
    pub key: String,
    /// When the manifest was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Fingerprints by relative path.
    pub files: BTreeMap<String, Fingerprint>,
}

/// Files that differ between the previous manifest and the current snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<String, ChangeKind>,
}

impl ChangeSet {
    /// Computes the changes from `previous` to `current`.
    ///
    /// Without a previous manifest every current file is `Added`.
    #[must_use]
    pub fn between(previous: Option<&Manifest>, current: &Snapshot) -> Self {
        let mut changes = BTreeMap::new();
        let Some(previous) = previous else {
            for path in current.entries.keys() {
                changes.insert(path.clone(), ChangeKind::Added);
            }
            return Self { changes };
        };

        for (path, entry) in &current.entries {
            match previous.files.get(path) {
                None => {
                    changes.insert(path.clone(), ChangeKind::Added);
                }
                Some(old) if !same_content(old, &entry.fingerprint) => {
                    changes.insert(path.clone(), ChangeKind::Modified);
                }
                Some(_) => {}
            }
        }
        for path in previous.files.keys() {
            if !current.entries.contains_key(path) {
                changes.insert(path.clone(), ChangeKind::Removed);
            }
        }
        Self { changes }
    }

    /// Builds a change set from explicit entries; later entries for the same
    /// path replace earlier ones.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, ChangeKind)>,
        S: Into<String>,
    {
        Self { changes: entries.into_iter().map(|(p, k)| (p.into(), k)).collect() }
    }

    /// Kind of change for a path, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<ChangeKind> {
        self.changes.get(path).copied()
    }

    /// Iterates over `(path, kind)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ChangeKind)> {
        self.changes.iter().map(|(p, k)| (p.as_str(), *k))
    }

    /// Paths that need (re)processing: added or modified.
    pub fn to_process(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, k)| *k != ChangeKind::Removed).map(|(p, _)| p)
    }

    /// Paths whose outputs must be deleted.
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, k)| *k == ChangeKind::Removed).map(|(p, _)| p)
    }

    /// Number of changed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn scan_into(
    entries: &mut BTreeMap<String, SourceEntry>,
    prefix: &str,
    roots: &[PathBuf],
) -> Result<()> {
    for root in roots {
        if !root.exists() {
            log::debug!("source root {} does not exist, skipping", root.display());
            continue;
        }
        let base = if root.is_file() {
            root.parent().unwrap_or(root.as_path())
        } else {
            root.as_path()
        };
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                PipelineError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = format!("{prefix}{}", relative_path(base, entry.path()));
            if entries.contains_key(&path) {
                log::warn!("duplicate source path {path} in {}, ignoring", root.display());
                continue;
            }
            let fingerprint = fingerprint(entry.path())?;
            entries.insert(
                path.clone(),
                SourceEntry { path, file: entry.path().to_path_buf(), fingerprint },
            );
        }
    }
    Ok(())
}

fn same_content(old: &Fingerprint, new: &Fingerprint) -> bool {
    old.size == new.size && old.sha256 == new.sha256
}

/// Normalized `/`-separated path of `file` relative to `root`.
#[must_use]
pub fn relative_path(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Computes the fingerprint of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn fingerprint(file: &Path) -> Result<Fingerprint> {
    let mut reader = fs::File::open(file).map_err(|e| PipelineError::io(file, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];
    let mut size = 0_u64;
    loop {
        let n = reader.read(&mut buf).map_err(|e| PipelineError::io(file, e))?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buf[..n]);
    }
    let modified = fs::metadata(file).and_then(|m| m.modified()).ok().map(DateTime::<Utc>::from);
    Ok(Fingerprint { size, sha256: hex::encode(hasher.finalize()), modified })
}
