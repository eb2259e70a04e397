//! Service context bundling all port trait objects.

use std::path::PathBuf;

use crate::adapters::live::tool::LiveToolRunner;
use crate::adapters::live::webdriver::ChromeDriverLauncher;
use crate::config::{PipelineConfig, ToolsConfig};
use crate::ports::browser::{BrowserLauncher, DriverFuture};
use crate::ports::tool::ToolRunner;
use crate::ports::DriverService;

/// Bundles all port trait objects plus the settings every stage needs.
///
/// Constructors wire up different adapter implementations (live, or
/// caller-supplied doubles).
pub struct ServiceContext {
    /// Runner for external tool invocations.
    pub tools: Box<dyn ToolRunner>,
    /// Launcher for the browser driver service.
    pub browsers: Box<dyn BrowserLauncher>,
    /// Commands of the external tools.
    pub tools_config: ToolsConfig,
    /// Root under which per-invocation scratch directories are created.
    pub scratch_root: PathBuf,
    /// Source-root markers for archive path reconciliation.
    pub source_root_markers: Vec<String>,
}

impl ServiceContext {
    /// Creates a live context: subprocess tools and a `chromedriver` service.
    #[must_use]
    pub fn live(config: &PipelineConfig) -> Self {
        Self::new(
            config,
            Box::new(LiveToolRunner),
            Box::new(ChromeDriverLauncher::new(config.tools.chromedriver.clone())),
        )
    }

    /// Creates a context from explicit adapters.
    #[must_use]
    pub fn new(
        config: &PipelineConfig,
        tools: Box<dyn ToolRunner>,
        browsers: Box<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            tools,
            browsers,
            tools_config: config.tools.clone(),
            scratch_root: config.scratch_dir.clone(),
            source_root_markers: config.source_root_markers.clone(),
        }
    }

    /// Creates a context with the given tool runner, scratch space under
    /// `root`, and no usable browser.
    #[cfg(test)]
    pub(crate) fn for_tests(tools: impl ToolRunner + 'static, root: &std::path::Path) -> Self {
        let config =
            PipelineConfig { scratch_dir: root.join(".scratch"), ..PipelineConfig::default() };
        Self::new(&config, Box::new(tools), Box::new(NoBrowser))
    }
}

/// Launcher used where no browser is expected to be started.
#[derive(Debug, Default)]
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn start(&self) -> DriverFuture<'_, Box<dyn DriverService>> {
        Box::pin(async { Err("no browser driver configured".into()) })
    }
}
