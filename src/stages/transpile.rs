//! Whole-set transpilation of Java sources to JavaScript.
//!
//! The transpiler is always run over the complete source set; there is no
//! per-file narrowing since inter-file dependencies are not tracked. The
//! recorded manifest only lets an unchanged input set skip the run.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{check_exit, collect_files, join_path_list, run_tool};
use crate::context::ServiceContext;
use crate::error::{PipelineError, Result, Stage};
use crate::incremental::{ChangeSet, Snapshot};
use crate::ports::ToolInvocation;
use crate::store::StateStore;

/// Inputs of one transpiler run.
#[derive(Debug, Clone, Default)]
pub struct TranspileRequest {
    /// Java source files or directories holding them.
    pub sources: Vec<PathBuf>,
    /// Native JavaScript passthrough files or directories.
    pub native_js_sources: Vec<PathBuf>,
    /// Compile classpath entries.
    pub classpath: Vec<PathBuf>,
    /// Output directory, recreated on every run.
    pub destination: PathBuf,
}

/// Builds the transpiler argument list.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] if a path list cannot be joined.
pub fn transpiler_args(request: &TranspileRequest, sources: &[PathBuf]) -> Result<Vec<String>> {
    let mut args = vec!["-d".to_string(), request.destination.to_string_lossy().into_owned()];
    if !request.classpath.is_empty() {
        args.push("-classpath".to_string());
        args.push(join_path_list(&request.classpath)?);
    }
    if !request.native_js_sources.is_empty() {
        args.push("-nativesourcepath".to_string());
        args.push(join_path_list(&request.native_js_sources)?);
    }
    args.extend(sources.iter().map(|s| s.to_string_lossy().into_owned()));
    Ok(args)
}

/// Runs the transpiler once over every source of `request`.
///
/// Returns the number of source files handed to the transpiler; an empty
/// source set invokes nothing.
///
/// # Errors
///
/// Returns [`PipelineError::ToolFailure`] when the transpiler exits non-zero,
/// or an I/O error preparing the destination.
pub fn transpile(ctx: &ServiceContext, request: &TranspileRequest) -> Result<usize> {
    let sources = collect_files(&request.sources)?;
    if sources.is_empty() {
        log::info!("transpile: no sources");
        return Ok(0);
    }
    reset_dir(&request.destination)?;

    log::info!("transpiling {} source file(s)", sources.len());
    let invocation =
        ToolInvocation::new(&ctx.tools_config.transpiler, transpiler_args(request, &sources)?);
    let output = run_tool(ctx.tools.as_ref(), Stage::Transpile, &invocation)?;
    check_exit(Stage::Transpile, &output)?;
    Ok(sources.len())
}

/// Transpiles unless no input changed since the last successful run.
///
/// # Errors
///
/// Propagates scanning, transpiler, and state persistence errors.
pub fn run_incremental(
    ctx: &ServiceContext,
    store: &StateStore,
    request: &TranspileRequest,
) -> Result<Option<usize>> {
    let key = StateStore::key_for(Stage::Transpile, &request.destination);
    let snapshot = Snapshot::scan_groups(&[
        ("sources", request.sources.as_slice()),
        ("native", request.native_js_sources.as_slice()),
        ("classpath", request.classpath.as_slice()),
    ])?;
    let changes = ChangeSet::between(store.load(&key)?.as_ref(), &snapshot);
    if changes.is_empty() && request.destination.is_dir() {
        log::info!("transpile: up to date");
        return Ok(None);
    }
    let count = transpile(ctx, request)?;
    store.save(&snapshot.to_manifest(&key))?;
    Ok(Some(count))
}

fn reset_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::io(dir, e)),
    }
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ToolOutput;
    use crate::stages::testing::FakeTools;

    fn request(root: &Path) -> TranspileRequest {
        TranspileRequest {
            sources: vec![root.join("src")],
            native_js_sources: Vec::new(),
            classpath: Vec::new(),
            destination: root.join("out"),
        }
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn minimal_arguments() {
        let req = TranspileRequest { destination: PathBuf::from("/out"), ..Default::default() };
        let args = transpiler_args(&req, &[PathBuf::from("/src/A.java")]).unwrap();
        assert_eq!(args, vec!["-d", "/out", "/src/A.java"]);
    }

    #[test]
    fn classpath_and_native_sources_are_path_lists() {
        let req = TranspileRequest {
            classpath: vec![PathBuf::from("/a.jar"), PathBuf::from("/b.jar")],
            native_js_sources: vec![PathBuf::from("/native")],
            destination: PathBuf::from("/out"),
            ..Default::default()
        };
        let args = transpiler_args(&req, &[PathBuf::from("/src/A.java")]).unwrap();
        let sep = if cfg!(windows) { ";" } else { ":" };
        assert_eq!(
            args,
            vec![
                "-d".to_string(),
                "/out".to_string(),
                "-classpath".to_string(),
                format!("/a.jar{sep}/b.jar"),
                "-nativesourcepath".to_string(),
                "/native".to_string(),
                "/src/A.java".to_string(),
            ]
        );
    }

    #[test]
    fn non_zero_exit_is_a_transpile_failure() {
        let work = tempfile::tempdir().unwrap();
        write(&work.path().join("src/A.java"), "class A {}");
        let ctx = ServiceContext::for_tests(FakeTools::exiting(3, "error: A.java"), work.path());

        let err = transpile(&ctx, &request(work.path())).unwrap_err();

        assert!(matches!(err, PipelineError::ToolFailure { stage: Stage::Transpile, exit_code: 3 }));
        assert_eq!(
            err.to_string(),
            "transpile failed with exit code 3; see the transpiler error output for details"
        );
    }

    #[test]
    fn stale_outputs_are_removed_before_each_run() {
        let work = tempfile::tempdir().unwrap();
        write(&work.path().join("src/A.java"), "class A {}");
        write(&work.path().join("out/Gone.js"), "stale");
        let ctx = ServiceContext::for_tests(FakeTools::exiting(0, ""), work.path());

        assert_eq!(transpile(&ctx, &request(work.path())).unwrap(), 1);

        assert!(work.path().join("out").is_dir());
        assert!(!work.path().join("out/Gone.js").exists());
    }

    #[test]
    fn empty_source_set_invokes_nothing() {
        let work = tempfile::tempdir().unwrap();
        let ctx = ServiceContext::for_tests(
            FakeTools::new(|_| Err("transpiler must not run".into())),
            work.path(),
        );
        assert_eq!(transpile(&ctx, &request(work.path())).unwrap(), 0);
    }

    #[test]
    fn unchanged_inputs_skip_the_transpiler() {
        let work = tempfile::tempdir().unwrap();
        write(&work.path().join("src/A.java"), "class A {}");
        let ctx = ServiceContext::for_tests(
            FakeTools::new(|invocation| {
                let out = Path::new(&invocation.args[1]);
                fs::write(out.join("A.js"), "A")?;
                Ok(ToolOutput::default())
            }),
            work.path(),
        );
        let store = StateStore::new(&work.path().join("state"));
        let req = request(work.path());

        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(1));
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), None);

        write(&work.path().join("src/B.java"), "class B {}");
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(2));
    }

    fn writing_transpiler() -> FakeTools {
        FakeTools::new(|invocation| {
            fs::write(Path::new(&invocation.args[1]).join("A.js"), "A")?;
            Ok(ToolOutput::default())
        })
    }

    #[test]
    fn change_in_any_classpath_jar_reruns_the_transpiler() {
        let work = tempfile::tempdir().unwrap();
        write(&work.path().join("src/A.java"), "class A {}");
        write(&work.path().join("lib/a.jar"), "a1");
        write(&work.path().join("lib/b.jar"), "b1");
        let ctx = ServiceContext::for_tests(writing_transpiler(), work.path());
        let store = StateStore::new(&work.path().join("state"));
        let req = TranspileRequest {
            classpath: vec![work.path().join("lib/a.jar"), work.path().join("lib/b.jar")],
            ..request(work.path())
        };

        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(1));
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), None);

        write(&work.path().join("lib/b.jar"), "b2");
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(1));
    }

    #[test]
    fn classpath_directory_does_not_mask_sources() {
        let work = tempfile::tempdir().unwrap();
        write(&work.path().join("src/a/B.java"), "class B {}");
        write(&work.path().join("classes/a/B.java"), "class B {}");
        let ctx = ServiceContext::for_tests(writing_transpiler(), work.path());
        let store = StateStore::new(&work.path().join("state"));
        let req = TranspileRequest {
            classpath: vec![work.path().join("classes")],
            ..request(work.path())
        };
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(1));

        write(&work.path().join("classes/a/B.java"), "class B { int x; }");
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(1));
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), None);

        write(&work.path().join("src/a/B.java"), "class B { int y; }");
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(1));
    }

    #[test]
    fn single_file_sources_are_tracked_individually() {
        let work = tempfile::tempdir().unwrap();
        write(&work.path().join("src/a/A.java"), "class A {}");
        write(&work.path().join("src/b/B.java"), "class B {}");
        let ctx = ServiceContext::for_tests(writing_transpiler(), work.path());
        let store = StateStore::new(&work.path().join("state"));
        let req = TranspileRequest {
            sources: vec![work.path().join("src/a/A.java"), work.path().join("src/b/B.java")],
            ..request(work.path())
        };

        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(2));
        write(&work.path().join("src/b/B.java"), "class B { int z; }");
        assert_eq!(run_incremental(&ctx, &store, &req).unwrap(), Some(2));
    }
}
