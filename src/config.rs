//! Pipeline configuration loaded from `jspipe.yaml` and the environment.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::paths::DEFAULT_SOURCE_ROOT_MARKERS;
use crate::stages::compile::ClosureOptions;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "jspipe.yaml";

/// Commands used to launch the external tools.
///
/// Each command is a program followed by leading arguments, so a jar-based
/// tool is configured as `["java", "-jar", "tool.jar"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Incompatible-code stripper.
    pub stripper: Vec<String>,
    /// Java-to-JavaScript transpiler.
    pub transpiler: Vec<String>,
    /// Closure compiler.
    pub compiler: Vec<String>,
    /// Java compiler running the test adapter annotation processor.
    pub test_generator: Vec<String>,
    /// Major version of the runtime hosting the test generator.
    pub test_generator_runtime: u32,
    /// Browser driver binary.
    pub chromedriver: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            stripper: vec!["gwt-incompatible-stripper".to_string()],
            transpiler: vec!["j2cl".to_string()],
            compiler: vec!["closure-compiler".to_string()],
            test_generator: vec!["javac".to_string()],
            test_generator_runtime: 11,
            chromedriver: PathBuf::from("chromedriver"),
        }
    }
}

/// Browser test harness settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Per-test script execution timeout.
    pub script_timeout_secs: u64,
    /// Interval of the in-page readiness poll.
    pub poll_interval_ms: u64,
    /// Maximum concurrent browser sessions; available parallelism when unset.
    pub max_parallel: Option<usize>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self { script_timeout_secs: 60, poll_interval_ms: 200, max_parallel: None }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tool commands.
    pub tools: ToolsConfig,
    /// Directory holding incremental manifests.
    pub state_dir: PathBuf,
    /// Root of per-invocation scratch directories.
    pub scratch_dir: PathBuf,
    /// Source-root markers used to reconcile archive entry paths.
    pub source_root_markers: Vec<String>,
    /// Options for production compilation.
    pub compile: ClosureOptions,
    /// Options for test compilation.
    pub compile_tests: ClosureOptions,
    /// Browser harness settings.
    pub harness: HarnessConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tools: ToolsConfig::default(),
            state_dir: PathBuf::from(".jspipe/state"),
            scratch_dir: PathBuf::from(".jspipe/tmp"),
            source_root_markers: DEFAULT_SOURCE_ROOT_MARKERS
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            compile: ClosureOptions::production(),
            compile_tests: ClosureOptions::tests(),
            harness: HarnessConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from `path` (or `jspipe.yaml` when `None`), then
    /// applies `.env` and `JSPIPE_*` environment overrides.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_yaml(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
    }

    /// Parses configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns the parser message when the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// Applies `JSPIPE_*` overrides from the given variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let command = |key: &str| {
            lookup(key)
                .map(|v| v.split_whitespace().map(String::from).collect::<Vec<_>>())
                .filter(|v| !v.is_empty())
        };
        if let Some(cmd) = command("JSPIPE_STRIPPER") {
            self.tools.stripper = cmd;
        }
        if let Some(cmd) = command("JSPIPE_TRANSPILER") {
            self.tools.transpiler = cmd;
        }
        if let Some(cmd) = command("JSPIPE_COMPILER") {
            self.tools.compiler = cmd;
        }
        if let Some(cmd) = command("JSPIPE_TEST_GENERATOR") {
            self.tools.test_generator = cmd;
        }
        if let Some(driver) = lookup("JSPIPE_CHROMEDRIVER").filter(|v| !v.is_empty()) {
            self.tools.chromedriver = PathBuf::from(driver);
        }
    }

    /// Checks that every tool command names a program.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the first empty command.
    pub fn validate(&self) -> Result<()> {
        let tools = &self.tools;
        for (name, cmd) in [
            ("stripper", &tools.stripper),
            ("transpiler", &tools.transpiler),
            ("compiler", &tools.compiler),
            ("test_generator", &tools.test_generator),
        ] {
            if cmd.first().is_none_or(String::is_empty) {
                return Err(PipelineError::Config(format!("tools.{name} must name a program")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::compile::CompilationLevel;

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(PipelineConfig::from_yaml("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = PipelineConfig::from_yaml(
            r"
tools:
  compiler: [java, -jar, closure-compiler.jar]
compile:
  compilation_level: SIMPLE
  defines:
    app.flag: 'true'
harness:
  script_timeout_secs: 5
",
        )
        .unwrap();

        assert_eq!(config.tools.compiler, vec!["java", "-jar", "closure-compiler.jar"]);
        assert_eq!(config.tools.transpiler, vec!["j2cl"]);
        assert_eq!(config.compile.compilation_level, CompilationLevel::Simple);
        assert_eq!(config.compile.defines["app.flag"], "true");
        assert_eq!(config.compile.jre_class_metadata, "STRIPPED");
        assert_eq!(config.compile_tests, ClosureOptions::tests());
        assert_eq!(config.harness.script_timeout_secs, 5);
        assert_eq!(config.harness.poll_interval_ms, 200);
    }

    #[test]
    fn rejects_unknown_compilation_level() {
        let err = PipelineConfig::from_yaml("compile:\n  compilation_level: TURBO\n").unwrap_err();
        assert!(err.contains("unknown compilation level"));
    }

    #[test]
    fn environment_overrides_tools() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(|key| match key {
            "JSPIPE_COMPILER" => Some("java -jar cc.jar".to_string()),
            "JSPIPE_CHROMEDRIVER" => Some("/opt/chromedriver".to_string()),
            "JSPIPE_STRIPPER" => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(config.tools.compiler, vec!["java", "-jar", "cc.jar"]);
        assert_eq!(config.tools.chromedriver, PathBuf::from("/opt/chromedriver"));
        assert_eq!(config.tools.stripper, ToolsConfig::default().stripper);
    }

    #[test]
    fn validate_rejects_empty_command() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        config.tools.transpiler.clear();
        assert!(matches!(config.validate(), Err(PipelineError::Config(msg)) if msg.contains("transpiler")));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PipelineConfig::load(Some(&dir.path().join("nope.yaml"))).is_err());
    }
}
