//! Browser test harness: serves compiled test bundles and drives one
//! browser session per test, writing one result file per test.

pub mod http;
pub mod runner;

pub use http::TestServer;
pub use runner::{
    discover_tests, readiness_script, run_tests, verify_summary, HarnessOptions, HarnessReport,
    TestOutcome, TestResult,
};
