//! Removal of code marked incompatible with the JavaScript runtime.
//!
//! The per-file variant is incremental: only added or modified files are
//! handed to the stripper, and outputs of removed files are deleted. The
//! legacy batch variant runs the stripper once over every file to process
//! and unpacks the archive it produces, reconciling entry paths through a
//! [`PathMapper`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::{check_exit, ensure_parent, remove_if_present, run_tool, safe_join, ScratchDir};
use crate::context::ServiceContext;
use crate::error::{PipelineError, Result, Stage};
use crate::incremental::{ChangeSet, Snapshot};
use crate::paths::{PathMapper, Resolution};
use crate::ports::ToolInvocation;
use crate::store::StateStore;

/// Name of the archive the batch stripper writes into the scratch directory.
const BATCH_ARCHIVE: &str = "stripped.zip";

/// What a strip run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripReport {
    /// Relative paths written.
    pub written: Vec<String>,
    /// Relative paths whose outputs were deleted.
    pub deleted: Vec<String>,
    /// Archive entries kept under their reported path (batch variant only).
    pub unmapped: Vec<String>,
}

/// Strips every added or modified file of `changes` into `destination`,
/// one isolated tool invocation per file, and deletes outputs of removed
/// files.
///
/// A failing file does not stop the others; the run fails once all files
/// were attempted.
///
/// The stripper is called as `-d <target file> <source file>`: here `-d`
/// names the output file itself, not a directory.
///
/// # Errors
///
/// Returns [`PipelineError::StripFailures`] if any file failed, or an I/O
/// error deleting a removed output.
pub fn strip(
    ctx: &ServiceContext,
    snapshot: &Snapshot,
    changes: &ChangeSet,
    destination: &Path,
) -> Result<StripReport> {
    let deleted = delete_removed(changes, destination)?;

    let pending: Vec<&str> = changes.to_process().collect();
    let results: Vec<(String, Result<()>)> = pending
        .par_iter()
        .map(|path| ((*path).to_string(), strip_file(ctx, snapshot, path, destination)))
        .collect();

    let mut written = Vec::new();
    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(()) => written.push(path),
            Err(e) => {
                log::error!("failed to strip {path}: {e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(PipelineError::StripFailures { failed, attempted: pending.len() });
    }
    log::info!("stripped {} file(s), deleted {}", written.len(), deleted.len());
    Ok(StripReport { written, deleted, unmapped: Vec::new() })
}

fn strip_file(
    ctx: &ServiceContext,
    snapshot: &Snapshot,
    path: &str,
    destination: &Path,
) -> Result<()> {
    let entry = snapshot
        .get(path)
        .ok_or_else(|| PipelineError::MissingArtifact { path: PathBuf::from(path) })?;
    let target = output_path(destination, path)?;
    ensure_parent(&target)?;
    let invocation = ToolInvocation::new(
        &ctx.tools_config.stripper,
        vec![
            "-d".to_string(),
            target.to_string_lossy().into_owned(),
            entry.file.to_string_lossy().into_owned(),
        ],
    );
    let output = run_tool(ctx.tools.as_ref(), Stage::Strip, &invocation)?;
    check_exit(Stage::Strip, &output)
}

/// Legacy variant: one stripper invocation over all files to process,
/// producing an archive that is unpacked into `destination`.
///
/// Archive entries whose path cannot be mapped back are kept under their
/// reported path and logged as a warning.
///
/// # Errors
///
/// Returns [`PipelineError::ToolFailure`] if the stripper fails, or an I/O
/// error reading the archive or writing outputs.
pub fn strip_batch(
    ctx: &ServiceContext,
    snapshot: &Snapshot,
    changes: &ChangeSet,
    destination: &Path,
) -> Result<StripReport> {
    let deleted = delete_removed(changes, destination)?;

    let mut mapper = PathMapper::new(ctx.source_root_markers.clone());
    let mut files = Vec::new();
    for path in changes.to_process() {
        let entry = snapshot
            .get(path)
            .ok_or_else(|| PipelineError::MissingArtifact { path: PathBuf::from(path) })?;
        let reported = entry.file.to_string_lossy().into_owned();
        mapper.insert(&reported, path);
        files.push(reported);
    }
    if files.is_empty() {
        return Ok(StripReport { deleted, ..StripReport::default() });
    }

    let scratch = ScratchDir::create(&ctx.scratch_root, Stage::Strip)?;
    let archive = scratch.path().join(BATCH_ARCHIVE);
    let mut args = vec!["-d".to_string(), archive.to_string_lossy().into_owned()];
    args.extend(files);
    log::info!("stripping {} file(s) in one batch", args.len() - 2);
    let output = run_tool(
        ctx.tools.as_ref(),
        Stage::Strip,
        &ToolInvocation::new(&ctx.tools_config.stripper, args),
    )?;
    check_exit(Stage::Strip, &output)?;

    let (written, unmapped) = unpack(&archive, &mapper, destination)?;
    Ok(StripReport { written, deleted, unmapped })
}

/// Extracts `archive` into `destination`, renaming entries through `mapper`.
fn unpack(
    archive: &Path,
    mapper: &PathMapper,
    destination: &Path,
) -> Result<(Vec<String>, Vec<String>)> {
    let file = fs::File::open(archive).map_err(|e| PipelineError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| zip_error(archive, e))?;
    let mut written = Vec::new();
    let mut unmapped = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| zip_error(archive, e))?;
        if entry.is_dir() {
            continue;
        }
        let reported = entry.name().to_string();
        let relative = match mapper.resolve(&reported) {
            Resolution::Mapped(path) => path,
            Resolution::Unmapped(path) => {
                log::warn!("could not map stripped entry {path}; keeping it under that path");
                unmapped.push(path.clone());
                path
            }
        };
        let Some(target) = safe_join(destination, &relative) else {
            log::warn!("skipping archive entry {reported} escaping {}", destination.display());
            continue;
        };
        ensure_parent(&target)?;
        let mut out = fs::File::create(&target).map_err(|e| PipelineError::io(&target, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| PipelineError::io(&target, e))?;
        written.push(relative);
    }
    written.sort();
    unmapped.sort();
    Ok((written, unmapped))
}

fn zip_error(archive: &Path, err: zip::result::ZipError) -> PipelineError {
    PipelineError::io(archive, io::Error::other(err))
}

fn delete_removed(changes: &ChangeSet, destination: &Path) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for path in changes.removed() {
        if remove_if_present(&output_path(destination, path)?)? {
            log::debug!("deleted stale output {path}");
        }
        deleted.push(path.to_string());
    }
    Ok(deleted)
}

fn output_path(destination: &Path, relative: &str) -> Result<PathBuf> {
    safe_join(destination, relative)
        .ok_or_else(|| PipelineError::MissingArtifact { path: PathBuf::from(relative) })
}

/// Options for [`run_incremental`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StripMode {
    /// One invocation per changed file.
    #[default]
    PerFile,
    /// One invocation over all changed files, producing an archive.
    Batch,
}

/// Scans `sources`, strips what changed since the last successful run into
/// `destination`, and records the new state only if stripping succeeded.
///
/// # Errors
///
/// Propagates scanning, stripping, and state persistence errors.
pub fn run_incremental(
    ctx: &ServiceContext,
    store: &StateStore,
    sources: &[PathBuf],
    destination: &Path,
    mode: StripMode,
) -> Result<StripReport> {
    let key = StateStore::key_for(Stage::Strip, destination);
    let snapshot = Snapshot::scan(sources)?;
    if snapshot.is_empty() {
        log::warn!("strip: no source files found");
    }
    let previous = store.load(&key)?;
    let changes = ChangeSet::between(previous.as_ref(), &snapshot);
    if changes.is_empty() {
        log::info!("strip: up to date");
        return Ok(StripReport::default());
    }
    log::debug!("strip: {} of {} tracked file(s) changed", changes.len(), snapshot.len());
    fs::create_dir_all(destination).map_err(|e| PipelineError::io(destination, e))?;
    let report = match mode {
        StripMode::PerFile => strip(ctx, &snapshot, &changes, destination)?,
        StripMode::Batch => strip_batch(ctx, &snapshot, &changes, destination)?,
    };
    store.save(&snapshot.to_manifest(&key))?;
    Ok(report)
}
