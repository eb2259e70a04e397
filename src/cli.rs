//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI parser for `jspipe`.
#[derive(Debug, Parser)]
#[command(
    name = "jspipe",
    version,
    about = "Compile Java sources to browser JavaScript and run their tests"
)]
pub struct Cli {
    /// Configuration file (defaults to `jspipe.yaml` when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Strip code marked incompatible with the JavaScript runtime.
    Strip(StripArgs),
    /// Transpile Java sources to JavaScript.
    Transpile(TranspileArgs),
    /// Compile JavaScript into an optimized bundle.
    Compile(CompileArgs),
    /// Generate JavaScript test adapters from compiled test classes.
    GenerateTests(GenerateTestsArgs),
    /// Compile one browser bundle per generated test.
    CompileTests(CompileTestsArgs),
    /// Run compiled test bundles in headless browsers.
    Test(TestArgs),
}

/// Arguments of `jspipe strip`.
#[derive(Debug, Args)]
pub struct StripArgs {
    /// Source roots to strip.
    #[arg(long = "source", required = true)]
    pub sources: Vec<PathBuf>,
    /// Output directory mirroring the source layout.
    #[arg(long, short = 'd')]
    pub destination: PathBuf,
    /// Run the stripper once over all changed files and unpack its archive.
    #[arg(long)]
    pub batch: bool,
}

/// Arguments of `jspipe transpile`.
#[derive(Debug, Args)]
pub struct TranspileArgs {
    /// Java source files or directories.
    #[arg(long = "source", required = true)]
    pub sources: Vec<PathBuf>,
    /// Native JavaScript sources passed through to the output.
    #[arg(long = "native-source")]
    pub native_js_sources: Vec<PathBuf>,
    /// Compile classpath entries.
    #[arg(long = "classpath")]
    pub classpath: Vec<PathBuf>,
    /// Output directory.
    #[arg(long, short = 'd')]
    pub destination: PathBuf,
}

/// Arguments of `jspipe compile`.
#[derive(Debug, Args)]
pub struct CompileArgs {
    /// JavaScript inputs: files, directories, or `.zip`/`.jszip` archives.
    #[arg(long = "source", required = true)]
    pub sources: Vec<PathBuf>,
    /// Entrypoint module names.
    #[arg(long = "entry-point", required = true)]
    pub entrypoints: Vec<String>,
    /// Output directory.
    #[arg(long, short = 'd')]
    pub destination: PathBuf,
    /// Output script file name.
    #[arg(long, default_value = "app.js")]
    pub output: String,
    /// Compilation level overriding the configured one.
    #[arg(long)]
    pub compilation_level: Option<String>,
    /// Extra defines as `key=value`, overriding the configured ones.
    #[arg(long = "define", value_parser = parse_define)]
    pub defines: Vec<(String, String)>,
}

/// Arguments of `jspipe generate-tests`.
#[derive(Debug, Args)]
pub struct GenerateTestsArgs {
    /// Directories of compiled test classes.
    #[arg(long = "test-classes", required = true)]
    pub test_classes_dirs: Vec<PathBuf>,
    /// Ant-style include patterns over class file paths.
    #[arg(long = "include")]
    pub includes: Vec<String>,
    /// Ant-style exclude patterns over class file paths.
    #[arg(long = "exclude")]
    pub excludes: Vec<String>,
    /// Test compile classpath entries.
    #[arg(long = "classpath")]
    pub classpath: Vec<PathBuf>,
    /// Classpath holding the test annotations.
    #[arg(long = "annotation-classpath")]
    pub annotation_classpath: Vec<PathBuf>,
    /// Bootstrap classpath entries.
    #[arg(long = "bootclasspath")]
    pub bootstrap_classpath: Vec<PathBuf>,
    /// Annotation processor path entries.
    #[arg(long = "processorpath")]
    pub processor_path: Vec<PathBuf>,
    /// Source language level.
    #[arg(long)]
    pub source_compatibility: Option<String>,
    /// Output directory for adapters and the test summary.
    #[arg(long, short = 'd')]
    pub destination: PathBuf,
}

/// Arguments of `jspipe compile-tests`.
#[derive(Debug, Args)]
pub struct CompileTestsArgs {
    /// Generator output holding `test_summary.json` and the adapters.
    #[arg(long)]
    pub generated: PathBuf,
    /// Further compiler inputs (transpiled tests and their dependencies).
    #[arg(long = "source")]
    pub sources: Vec<PathBuf>,
    /// Root of the per-test output directories.
    #[arg(long, short = 'd')]
    pub destination: PathBuf,
}

/// Arguments of `jspipe test`.
#[derive(Debug, Args)]
pub struct TestArgs {
    /// Directory of compiled test bundles.
    #[arg(long)]
    pub tests: PathBuf,
    /// Directory receiving one result file per test.
    #[arg(long)]
    pub reports: PathBuf,
    /// Test summary to check the bundles against.
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

fn parse_define(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}
