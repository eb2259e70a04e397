//! Parallel execution of test pages in browser sessions.
//!
//! Per run: `NoTests → Serving → {RunningTest}* → Stopped`. The driver
//! service and the file server are stopped on every exit path once started.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::http::TestServer;
use crate::config::HarnessConfig;
use crate::context::ServiceContext;
use crate::error::{PipelineError, Result};
use crate::ports::{BoxError, BrowserSession, DriverService};
use crate::stages::compile_tests::{INDEX_PAGE, TEST_SCRIPT};
use crate::summary::{test_class, TestSummary};

/// Slack on top of the script timeout before a silent driver is abandoned.
const DRIVER_GRACE: Duration = Duration::from_secs(30);

/// Harness settings resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessOptions {
    /// Per-test script execution timeout.
    pub script_timeout: Duration,
    /// Interval of the in-page readiness poll.
    pub poll_interval: Duration,
    /// Maximum concurrent browser sessions.
    pub max_parallel: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self::from(&HarnessConfig::default())
    }
}

impl From<&HarnessConfig> for HarnessOptions {
    fn from(config: &HarnessConfig) -> Self {
        let available = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            script_timeout: Duration::from_secs(config.script_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_parallel: config.max_parallel.unwrap_or(available).max(1),
        }
    }
}

/// How one test ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// The in-page runner reported success.
    Passed,
    /// The in-page runner reported failure or was missing.
    Failed,
    /// Driving the test failed; the message is in the result file.
    Errored(String),
}

/// Result of one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// Test name: the bundle directory name.
    pub name: String,
    /// Outcome.
    pub outcome: TestOutcome,
    /// Result file holding the browser log or the error.
    pub result_file: PathBuf,
}

/// Results of a harness run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessReport {
    /// Per-test results sorted by name; empty when there was nothing to run.
    pub results: Vec<TestResult>,
}

impl HarnessReport {
    /// Returns `true` if at least one test was run.
    #[must_use]
    pub fn did_work(&self) -> bool {
        !self.results.is_empty()
    }

    /// Tests that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| r.outcome != TestOutcome::Passed)
    }
}

/// Script polling the global `G_testRunner` until it finishes, resolving
/// with its success flag; a missing runner resolves `false` immediately.
#[must_use]
pub fn readiness_script(poll_interval: Duration) -> String {
    format!(
        r"var callback = arguments[arguments.length - 1];
window.setInterval(function() {{
  if (!window['G_testRunner']) {{
    console.log('ERROR: G_testRunner not defined. ' +
        'Did you remember to goog.require(\'goog.testing.jsunit\')?');
    callback(false);
    return;
  }}
  if (window['G_testRunner'].isFinished()) {{
    callback(window['G_testRunner'].isSuccess());
  }}
}}, {});",
        poll_interval.as_millis()
    )
}

/// Finds `<tests_dir>/*/index.html`, keyed by test name, valued by the
/// request path of the page.
///
/// # Errors
///
/// Returns an error if `tests_dir` exists but cannot be listed.
pub fn discover_tests(tests_dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut tests = BTreeMap::new();
    let entries = match fs::read_dir(tests_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tests),
        Err(e) => return Err(PipelineError::io(tests_dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(tests_dir, e))?;
        if !entry.path().join(INDEX_PAGE).is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let page = format!("/{name}/{INDEX_PAGE}");
        tests.insert(name, page);
    }
    Ok(tests)
}

/// Checks that every test of `summary` has a compiled bundle.
///
/// # Errors
///
/// Returns [`PipelineError::MissingBundle`] for the first test without its
/// page or script.
pub fn verify_summary(tests_dir: &Path, summary: &TestSummary) -> Result<()> {
    for identifier in summary.identifiers() {
        let dir = tests_dir.join(test_class(identifier));
        if !dir.join(INDEX_PAGE).is_file() || !dir.join(TEST_SCRIPT).is_file() {
            return Err(PipelineError::MissingBundle { test: identifier.to_string() });
        }
    }
    Ok(())
}

/// Runs every test bundle under `tests_dir`, writing
/// `<reports_dir>/<test>.txt` for each.
///
/// Failing tests do not fail the run; they are listed in the report and
/// announced on stdout.
///
/// # Errors
///
/// Returns an error if the bundles do not match `summary`, the reports
/// directory or a result file cannot be created, or the server or driver
/// service cannot be started.
pub async fn run_tests(
    ctx: &ServiceContext,
    tests_dir: &Path,
    reports_dir: &Path,
    options: &HarnessOptions,
    summary: Option<&TestSummary>,
) -> Result<HarnessReport> {
    if let Some(summary) = summary {
        verify_summary(tests_dir, summary)?;
    }
    let tests = discover_tests(tests_dir)?;
    if tests.is_empty() {
        log::info!("no test pages under {}; no work performed", tests_dir.display());
        return Ok(HarnessReport::default());
    }

    fs::create_dir_all(reports_dir).map_err(|e| PipelineError::io(reports_dir, e))?;
    let mut planned = Vec::with_capacity(tests.len());
    for (name, page) in tests {
        let result_file = reports_dir.join(format!("{name}.txt"));
        fs::File::create(&result_file).map_err(|e| PipelineError::io(&result_file, e))?;
        planned.push((name, page, result_file));
    }

    let server = TestServer::start(tests_dir).await.map_err(|e| PipelineError::io(tests_dir, e))?;
    let service: Arc<dyn DriverService> = match ctx.browsers.start().await {
        Ok(service) => Arc::from(service),
        Err(e) => {
            server.stop().await;
            return Err(PipelineError::Driver(e.to_string()));
        }
    };

    log::info!("running {} test(s), {} at a time", planned.len(), options.max_parallel);
    let results = run_all(&service, &server, planned, options).await;

    if let Err(e) = service.stop().await {
        log::warn!("failed to stop the browser driver: {e}");
    }
    server.stop().await;

    let mut results = results?;
    results.sort_by(|a, b| a.name.cmp(&b.name));
    let report = HarnessReport { results };
    for failed in report.failures() {
        println!("Test failed: {}", failed.name);
    }
    Ok(report)
}

async fn run_all(
    service: &Arc<dyn DriverService>,
    server: &TestServer,
    planned: Vec<(String, String, PathBuf)>,
    options: &HarnessOptions,
) -> Result<Vec<TestResult>> {
    let permits = Arc::new(Semaphore::new(options.max_parallel));
    let mut tasks = JoinSet::new();
    let mut pending: BTreeMap<String, PathBuf> = BTreeMap::new();
    for (name, page, result_file) in planned {
        let service = Arc::clone(service);
        let permits = Arc::clone(&permits);
        let url = server.url(&page);
        let options = options.clone();
        pending.insert(name.clone(), result_file.clone());
        tasks.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => run_one(service.as_ref(), &url, &options).await,
                Err(e) => Err(e.into()),
            };
            record(name, outcome, result_file)
        });
    }

    let mut results = Vec::with_capacity(pending.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                let result = result?;
                pending.remove(&result.name);
                results.push(result);
            }
            Err(e) => log::error!("test task failed: {e}"),
        }
    }
    for (name, result_file) in pending {
        let result = record(name, Err("test task did not complete".into()), result_file)?;
        results.push(result);
    }
    Ok(results)
}

/// Writes the result file of one test.
fn record(
    name: String,
    outcome: std::result::Result<(bool, Vec<String>), BoxError>,
    result_file: PathBuf,
) -> Result<TestResult> {
    let (outcome, text) = match outcome {
        Ok((true, logs)) => (TestOutcome::Passed, logs.join("\n")),
        Ok((false, logs)) => (TestOutcome::Failed, logs.join("\n")),
        Err(e) => {
            log::warn!("test {name} errored: {e}");
            (TestOutcome::Errored(e.to_string()), format!("Error: {e}\n"))
        }
    };
    fs::write(&result_file, text).map_err(|e| PipelineError::io(&result_file, e))?;
    Ok(TestResult { name, outcome, result_file })
}

/// Drives one test in its own session; the session is quit on every path.
async fn run_one(
    service: &dyn DriverService,
    url: &str,
    options: &HarnessOptions,
) -> std::result::Result<(bool, Vec<String>), BoxError> {
    let mut session = service.new_session().await?;
    let outcome = drive(session.as_mut(), url, options).await;
    let quit = session.quit().await;
    let outcome = outcome?;
    quit?;
    Ok(outcome)
}

async fn drive(
    session: &mut dyn BrowserSession,
    url: &str,
    options: &HarnessOptions,
) -> std::result::Result<(bool, Vec<String>), BoxError> {
    session.navigate(url).await?;
    session.set_script_timeout(options.script_timeout).await?;
    let script = readiness_script(options.poll_interval);
    let value = tokio::time::timeout(
        options.script_timeout + DRIVER_GRACE,
        session.execute_async_script(&script),
    )
    .await
    .map_err(|_| format!("script timeout: no result after {:?}", options.script_timeout))??;
    let success = value
        .as_bool()
        .ok_or_else(|| format!("test runner returned a non-boolean result: {value}"))?;
    let logs = session.browser_logs().await?;
    Ok((success, logs))
}
