//! Closure compilation of transpiled output into a single script.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{check_exit, run_tool, ScratchDir};
use crate::context::ServiceContext;
use crate::error::{PipelineError, Result, Stage};
use crate::ports::ToolInvocation;

/// Namespace marker prefixed to every entrypoint.
const ENTRY_POINT_PREFIX: &str = "goog:";

/// Name of the defines file written to the scratch directory.
pub const DEFINES_FILE_NAME: &str = "config.js";

static DIAGNOSTIC_TALLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) error\(s\), (\d+) warning\(s\)").expect("valid tally regex")
});

/// Optimization level passed to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CompilationLevel {
    /// Whitespace and comment removal only.
    WhitespaceOnly,
    /// Local renaming and simple optimizations.
    Simple,
    /// Whole-program optimizations.
    Advanced,
    /// Concatenation of inputs in dependency order.
    Bundle,
}

impl CompilationLevel {
    /// The compiler's canonical flag value.
    #[must_use]
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::WhitespaceOnly => "WHITESPACE_ONLY",
            Self::Simple => "SIMPLE_OPTIMIZATIONS",
            Self::Advanced => "ADVANCED_OPTIMIZATIONS",
            Self::Bundle => "BUNDLE",
        }
    }
}

impl fmt::Display for CompilationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

impl FromStr for CompilationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WHITESPACE" | "WHITESPACE_ONLY" => Ok(Self::WhitespaceOnly),
            "SIMPLE" | "SIMPLE_OPTIMIZATIONS" => Ok(Self::Simple),
            "ADVANCED" | "ADVANCED_OPTIMIZATIONS" => Ok(Self::Advanced),
            "BUNDLE" => Ok(Self::Bundle),
            other => Err(format!("unknown compilation level: {other}")),
        }
    }
}

impl TryFrom<String> for CompilationLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompilationLevel> for String {
    fn from(level: CompilationLevel) -> Self {
        level.as_flag().to_string()
    }
}

/// Compiler options shared by production and test compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosureOptions {
    /// Debug build (`--debug`) instead of `goog.DEBUG=false`.
    pub debug: bool,
    /// Keep test functions exported for the in-page test runner.
    pub export_test_functions: bool,
    /// Let the compiler inject polyfills.
    pub rewrite_polyfills: bool,
    /// Optimization level.
    pub compilation_level: CompilationLevel,
    /// `jre.logging.logLevel` define.
    pub jre_logging_log_level: String,
    /// `jre.checks.checkLevel` define.
    pub jre_checks_check_level: String,
    /// `jre.classMetadata` define.
    pub jre_class_metadata: String,
    /// Caller-supplied defines; override the base defines on collision.
    pub defines: IndexMap<String, String>,
}

impl Default for ClosureOptions {
    fn default() -> Self {
        Self::production()
    }
}

impl ClosureOptions {
    /// Defaults for production bundles.
    #[must_use]
    pub fn production() -> Self {
        Self {
            debug: false,
            export_test_functions: false,
            rewrite_polyfills: false,
            compilation_level: CompilationLevel::Advanced,
            jre_logging_log_level: "OFF".to_string(),
            jre_checks_check_level: "NORMAL".to_string(),
            jre_class_metadata: "STRIPPED".to_string(),
            defines: IndexMap::new(),
        }
    }

    /// Defaults for test bundles.
    #[must_use]
    pub fn tests() -> Self {
        Self {
            debug: true,
            export_test_functions: true,
            compilation_level: CompilationLevel::Simple,
            ..Self::production()
        }
    }

    /// Base defines overlaid by [`ClosureOptions::defines`].
    #[must_use]
    pub fn merged_defines(&self) -> IndexMap<String, String> {
        let mut defines = IndexMap::from([
            ("jre.checks.checkLevel".to_string(), self.jre_checks_check_level.clone()),
            ("jre.logging.logLevel".to_string(), self.jre_logging_log_level.clone()),
            ("jre.classMetadata".to_string(), self.jre_class_metadata.clone()),
        ]);
        for (key, value) in &self.defines {
            defines.insert(key.clone(), value.clone());
        }
        defines
    }
}

/// Renders the defines file consumed by the compiler.
///
/// # Errors
///
/// Returns an error if the defines cannot be serialized.
pub fn render_defines(defines: &IndexMap<String, String>) -> Result<String> {
    let json = serde_json::to_string_pretty(defines)
        .map_err(|e| PipelineError::Config(format!("failed to serialize defines: {e}")))?;
    Ok(format!("var CLOSURE_DEFINES = {json};"))
}

/// How an input file is handed to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A zip of JS sources, passed with `--jszip`.
    Archive,
    /// A plain JS file, passed as is.
    Script,
    /// Anything else (source maps, stray files); not passed.
    Ignored,
}

/// Classifies an input file by name.
#[must_use]
pub fn classify_input(path: &Path) -> InputKind {
    let name = path.file_name().map(|n| n.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
    if name.ends_with(".zip") || name.ends_with(".jszip") {
        InputKind::Archive
    } else if name.ends_with(".js") {
        InputKind::Script
    } else {
        InputKind::Ignored
    }
}

/// Inputs of one compiler invocation.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    /// Input files (JS, JS archives; other files are ignored).
    pub sources: &'a [PathBuf],
    /// Entrypoint module names, without the namespace marker.
    pub entrypoints: &'a [String],
    /// Compiler options.
    pub options: &'a ClosureOptions,
    /// Output directory.
    pub destination: &'a Path,
    /// Output script file name within `destination`.
    pub output_filename: &'a str,
}

/// Builds the compiler argument list; deterministic for a given request.
#[must_use]
pub fn compiler_args(request: &CompileRequest<'_>, defines_file: &Path) -> Vec<String> {
    let options = request.options;
    let output = request.destination.join(request.output_filename);
    let output = output.to_string_lossy().into_owned();
    let source_map = format!("{output}.map");
    let location_mapping = format!("{output}|{}", request.output_filename);

    let mut args = Vec::new();
    for entrypoint in request.entrypoints {
        args.push("--entry_point".to_string());
        args.push(format!("{ENTRY_POINT_PREFIX}{entrypoint}"));
    }
    args.extend(
        [
            "--js_output_file",
            output.as_str(),
            "--create_source_map",
            source_map.as_str(),
            "--language_in",
            "ECMASCRIPT_2017",
            "--language_out",
            "ECMASCRIPT5",
            "--compilation_level",
            options.compilation_level.as_flag(),
            "--dependency_mode",
            "PRUNE_LEGACY",
            "--warning_level",
            "VERBOSE",
            "--generate_exports",
            "--process_closure_primitives",
            "--define=goog.json.USE_NATIVE_JSON",
            "--hide_warnings_for=closure/goog/base.js",
            "--source_map_location_mapping",
            location_mapping.as_str(),
            if options.debug { "--debug" } else { "--define=goog.DEBUG=false" },
            "--jscomp_off",
            "analyzerChecks",
            "--jscomp_off",
            "reportUnknownTypes",
        ]
        .map(str::to_string),
    );
    if options.compilation_level == CompilationLevel::Advanced {
        args.push("--use_types_for_optimization".to_string());
    }
    if options.export_test_functions {
        args.push("--export_test_functions".to_string());
    }
    args.push(defines_file.to_string_lossy().into_owned());
    for source in request.sources {
        let path = source.to_string_lossy().into_owned();
        match classify_input(source) {
            InputKind::Archive => {
                args.push("--jszip".to_string());
                args.push(path);
            }
            InputKind::Script => args.push(path),
            InputKind::Ignored => {}
        }
    }
    args.push(format!("--rewrite_polyfills={}", options.rewrite_polyfills));
    args
}

/// Error and warning counts reported by the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticTally {
    /// Error-level diagnostics.
    pub errors: u32,
    /// Warning-level diagnostics.
    pub warnings: u32,
}

impl DiagnosticTally {
    /// Reads the last `N error(s), M warning(s)` summary line in `output`.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        DIAGNOSTIC_TALLY
            .captures_iter(output)
            .last()
            .map(|caps| Self {
                errors: caps[1].parse().unwrap_or(u32::MAX),
                warnings: caps[2].parse().unwrap_or(u32::MAX),
            })
            .unwrap_or_default()
    }
}

/// Runs the compiler for one set of entrypoints.
///
/// Fails if the compiler exits non-zero, and also if it exits zero while
/// reporting error diagnostics.
///
/// # Errors
///
/// Returns [`PipelineError::ToolFailure`], [`PipelineError::SilentToolFailure`],
/// or an I/O error writing the defines file.
pub fn compile(ctx: &ServiceContext, request: &CompileRequest<'_>) -> Result<()> {
    let scratch = ScratchDir::create(&ctx.scratch_root, Stage::Compile)?;
    compile_in(ctx, request, scratch.path())
}

/// Like [`compile`], using an existing scratch directory owned by the caller.
pub(crate) fn compile_in(
    ctx: &ServiceContext,
    request: &CompileRequest<'_>,
    scratch: &Path,
) -> Result<()> {
    let defines_file = scratch.join(DEFINES_FILE_NAME);
    let defines = render_defines(&request.options.merged_defines())?;
    fs::write(&defines_file, defines).map_err(|e| PipelineError::io(&defines_file, e))?;
    fs::create_dir_all(request.destination)
        .map_err(|e| PipelineError::io(request.destination, e))?;

    log::info!(
        "compiling {} into {}",
        request.entrypoints.join(", "),
        request.destination.join(request.output_filename).display()
    );
    let invocation =
        ToolInvocation::new(&ctx.tools_config.compiler, compiler_args(request, &defines_file));
    let output = run_tool(ctx.tools.as_ref(), Stage::Compile, &invocation)?;
    check_exit(Stage::Compile, &output)?;

    let tally = DiagnosticTally::parse(&format!("{}\n{}", output.stdout, output.stderr));
    if tally.errors > 0 {
        return Err(PipelineError::SilentToolFailure { stage: Stage::Compile, errors: tally.errors });
    }
    if tally.warnings > 0 {
        log::info!("compiler reported {} warning(s)", tally.warnings);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::FakeTools;
    use pretty_assertions::assert_eq;

    fn request<'a>(
        sources: &'a [PathBuf],
        entrypoints: &'a [String],
        options: &'a ClosureOptions,
        destination: &'a Path,
    ) -> CompileRequest<'a> {
        CompileRequest { sources, entrypoints, options, destination, output_filename: "app.js" }
    }

    #[test]
    fn parses_compilation_levels() {
        assert_eq!("advanced".parse::<CompilationLevel>(), Ok(CompilationLevel::Advanced));
        assert_eq!("SIMPLE_OPTIMIZATIONS".parse::<CompilationLevel>(), Ok(CompilationLevel::Simple));
        assert_eq!("WHITESPACE".parse::<CompilationLevel>(), Ok(CompilationLevel::WhitespaceOnly));
        assert_eq!("BUNDLE".parse::<CompilationLevel>(), Ok(CompilationLevel::Bundle));
        assert!("FAST".parse::<CompilationLevel>().is_err());
    }

    #[test]
    fn defines_without_overrides_are_the_three_base_keys() {
        let defines = ClosureOptions::production().merged_defines();
        assert_eq!(
            defines.into_iter().collect::<Vec<_>>(),
            vec![
                ("jre.checks.checkLevel".to_string(), "NORMAL".to_string()),
                ("jre.logging.logLevel".to_string(), "OFF".to_string()),
                ("jre.classMetadata".to_string(), "STRIPPED".to_string()),
            ]
        );
    }

    #[test]
    fn override_replaces_base_define() {
        let mut options = ClosureOptions::production();
        options.defines.insert("jre.logging.logLevel".into(), "ALL".into());
        options.defines.insert("app.flag".into(), "true".into());

        let defines = options.merged_defines();
        assert_eq!(defines.len(), 4);
        assert_eq!(defines["jre.logging.logLevel"], "ALL");
        assert_eq!(defines.get_index(1).map(|(k, _)| k.as_str()), Some("jre.logging.logLevel"));
    }

    #[test]
    fn renders_defines_file() {
        let rendered = render_defines(&ClosureOptions::production().merged_defines()).unwrap();
        assert!(rendered.starts_with("var CLOSURE_DEFINES = {\n  \"jre.checks.checkLevel\": \"NORMAL\""));
        assert!(rendered.ends_with("};"));
    }

    #[test]
    fn classifies_inputs_by_extension() {
        assert_eq!(classify_input(Path::new("lib.ZIP")), InputKind::Archive);
        assert_eq!(classify_input(Path::new("lib.jszip")), InputKind::Archive);
        assert_eq!(classify_input(Path::new("a/B.js")), InputKind::Script);
        assert_eq!(classify_input(Path::new("a/B.js.map")), InputKind::Ignored);
        assert_eq!(classify_input(Path::new("a/B.java")), InputKind::Ignored);
    }

    #[test]
    fn builds_arguments_in_order() {
        let sources = [PathBuf::from("/in/a.js"), PathBuf::from("/in/b.js.map"), PathBuf::from("/in/lib.zip")];
        let entrypoints = ["app.Main".to_string()];
        let options = ClosureOptions::production();
        let args = compiler_args(
            &request(&sources, &entrypoints, &options, Path::new("/out")),
            Path::new("/tmp/config.js"),
        );

        assert_eq!(&args[..2], ["--entry_point", "goog:app.Main"]);
        assert_eq!(&args[2..4], ["--js_output_file", "/out/app.js"]);
        assert!(args.contains(&"--define=goog.DEBUG=false".to_string()));
        assert!(args.contains(&"/out/app.js|app.js".to_string()));
        assert_eq!(
            &args[args.len() - 6..],
            [
                "--use_types_for_optimization",
                "/tmp/config.js",
                "/in/a.js",
                "--jszip",
                "/in/lib.zip",
                "--rewrite_polyfills=false",
            ]
        );
    }

    #[test]
    fn only_advanced_uses_type_optimization() {
        let entrypoints = ["app.Main".to_string()];
        for level in [CompilationLevel::WhitespaceOnly, CompilationLevel::Simple, CompilationLevel::Bundle] {
            let options = ClosureOptions { compilation_level: level, ..ClosureOptions::production() };
            let args = compiler_args(
                &request(&[], &entrypoints, &options, Path::new("/out")),
                Path::new("/tmp/config.js"),
            );
            assert!(!args.contains(&"--use_types_for_optimization".to_string()));
            assert!(args.contains(&level.as_flag().to_string()));
        }
    }

    #[test]
    fn test_options_use_debug_and_export_flags() {
        let entrypoints = ["javatests.a.FooTest_AdapterSuite".to_string()];
        let options = ClosureOptions::tests();
        let args = compiler_args(
            &request(&[], &entrypoints, &options, Path::new("/out")),
            Path::new("/tmp/config.js"),
        );
        assert!(args.contains(&"--debug".to_string()));
        assert!(args.contains(&"--export_test_functions".to_string()));
        assert!(args.contains(&"SIMPLE_OPTIMIZATIONS".to_string()));
    }

    #[test]
    fn parses_last_tally_line() {
        let tally = DiagnosticTally::parse("0 error(s), 1 warning(s)\nlater\n2 error(s), 5 warning(s)\n");
        assert_eq!(tally, DiagnosticTally { errors: 2, warnings: 5 });
        assert_eq!(DiagnosticTally::parse("nothing"), DiagnosticTally::default());
    }

    #[test]
    fn writes_defines_file_and_invokes_compiler() {
        let out = tempfile::tempdir().unwrap();
        let tools = FakeTools::new(|invocation| {
            let config = invocation.args.iter().find(|a| a.ends_with("config.js")).unwrap();
            let text = fs::read_to_string(config).unwrap();
            assert!(text.contains("jre.classMetadata"));
            Ok(crate::ports::ToolOutput::default())
        });
        let ctx = ServiceContext::for_tests(tools, out.path());
        let entrypoints = ["app.Main".to_string()];
        let options = ClosureOptions::production();

        compile(&ctx, &request(&[], &entrypoints, &options, &out.path().join("dist"))).unwrap();

        assert!(out.path().join("dist").is_dir());
    }

    #[test]
    fn non_zero_exit_fails() {
        let out = tempfile::tempdir().unwrap();
        let ctx = ServiceContext::for_tests(FakeTools::exiting(1, "1 error(s), 0 warning(s)"), out.path());
        let entrypoints = ["app.Main".to_string()];
        let options = ClosureOptions::production();

        let err = compile(&ctx, &request(&[], &entrypoints, &options, out.path())).unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailure { stage: Stage::Compile, exit_code: 1 }));
    }

    #[test]
    fn zero_exit_with_errors_is_a_silent_failure() {
        let out = tempfile::tempdir().unwrap();
        let ctx = ServiceContext::for_tests(
            FakeTools::exiting(0, "JSC_UNDEFINED_VARIABLE\n3 error(s), 0 warning(s)\n"),
            out.path(),
        );
        let entrypoints = ["app.Main".to_string()];
        let options = ClosureOptions::production();

        let err = compile(&ctx, &request(&[], &entrypoints, &options, out.path())).unwrap_err();
        assert!(matches!(err, PipelineError::SilentToolFailure { stage: Stage::Compile, errors: 3 }));
    }

    #[test]
    fn warnings_alone_succeed() {
        let out = tempfile::tempdir().unwrap();
        let ctx = ServiceContext::for_tests(FakeTools::exiting(0, "0 error(s), 4 warning(s)"), out.path());
        let entrypoints = ["app.Main".to_string()];
        let options = ClosureOptions::production();

        assert!(compile(&ctx, &request(&[], &entrypoints, &options, out.path())).is_ok());
    }
}
